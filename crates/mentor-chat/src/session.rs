//! Session identity for one conversation surface.
//!
//! The process-wide slot is read once to seed the surface. After that the
//! surface owns its id; the slot is only written back so a restart can
//! resume the same thread.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use mentor_core::error::MentorError;
use mentor_core::types::SessionId;
use mentor_storage::LocalStateRepository;

/// Local-state key of the current-session slot.
pub const CURRENT_SESSION_KEY: &str = "history-session-id";

/// Persisted seed for the current session id.
pub trait SessionSlot: Send + Sync {
    fn load(&self) -> Result<Option<SessionId>, MentorError>;
    fn store(&self, id: &SessionId) -> Result<(), MentorError>;
    fn clear(&self) -> Result<(), MentorError>;
}

impl SessionSlot for LocalStateRepository {
    fn load(&self) -> Result<Option<SessionId>, MentorError> {
        Ok(self
            .get(CURRENT_SESSION_KEY)?
            .map(|entry| SessionId(entry.value))
            .filter(|id| !id.as_str().is_empty()))
    }

    fn store(&self, id: &SessionId) -> Result<(), MentorError> {
        self.put(CURRENT_SESSION_KEY, id.as_str())
    }

    fn clear(&self) -> Result<(), MentorError> {
        self.remove(CURRENT_SESSION_KEY)
    }
}

/// In-process slot, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemorySessionSlot {
    id: Mutex<Option<SessionId>>,
}

impl MemorySessionSlot {
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id: Mutex::new(Some(id)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<SessionId>>, MentorError> {
        self.id
            .lock()
            .map_err(|e| MentorError::Storage(format!("session slot lock poisoned: {}", e)))
    }
}

impl SessionSlot for MemorySessionSlot {
    fn load(&self) -> Result<Option<SessionId>, MentorError> {
        Ok(self.lock()?.clone())
    }

    fn store(&self, id: &SessionId) -> Result<(), MentorError> {
        *self.lock()? = Some(id.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), MentorError> {
        *self.lock()? = None;
        Ok(())
    }
}

/// Surface-local owner of the current session id.
pub struct SessionIdentity {
    slot: Arc<dyn SessionSlot>,
    current: Option<SessionId>,
    seeded: bool,
}

impl SessionIdentity {
    pub fn new(slot: Arc<dyn SessionSlot>) -> Self {
        Self {
            slot,
            current: None,
            seeded: false,
        }
    }

    /// Return the current id, minting one if none is held.
    ///
    /// The slot is consulted only on the first call.
    pub fn get_or_create(&mut self) -> SessionId {
        if let Some(id) = &self.current {
            return id.clone();
        }

        if !self.seeded {
            self.seeded = true;
            match self.slot.load() {
                Ok(Some(id)) => {
                    info!(session_id = %id, "Session resumed");
                    self.current = Some(id.clone());
                    return id;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Failed to read session slot"),
            }
        }

        let id = SessionId::generate();
        if let Err(e) = self.slot.store(&id) {
            warn!(error = %e, "Failed to persist session id");
        }
        info!(session_id = %id, "Session minted");
        self.current = Some(id.clone());
        id
    }

    pub fn current(&self) -> Option<&SessionId> {
        self.current.as_ref()
    }

    /// Drop the id so the next `get_or_create` mints a fresh one.
    pub fn clear(&mut self) {
        if let Some(id) = self.current.take() {
            info!(session_id = %id, "Session cleared");
        }
        self.seeded = true;
        if let Err(e) = self.slot.clear() {
            warn!(error = %e, "Failed to clear session slot");
        }
    }

    /// Switch to an existing session, e.g. one picked from history.
    pub fn adopt(&mut self, id: SessionId) {
        if let Err(e) = self.slot.store(&id) {
            warn!(error = %e, "Failed to persist session id");
        }
        info!(session_id = %id, "Session adopted");
        self.seeded = true;
        self.current = Some(id);
    }
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("current", &self.current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_storage::Database;

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut identity = SessionIdentity::new(Arc::new(MemorySessionSlot::default()));
        let first = identity.get_or_create();
        let second = identity.get_or_create();
        assert_eq!(first, second);
    }

    #[test]
    fn test_seeds_from_slot() {
        let slot = Arc::new(MemorySessionSlot::with_id(SessionId::from("session_1_abc")));
        let mut identity = SessionIdentity::new(slot);
        assert_eq!(identity.get_or_create(), SessionId::from("session_1_abc"));
    }

    #[test]
    fn test_minted_id_written_back() {
        let slot = Arc::new(MemorySessionSlot::default());
        let mut identity = SessionIdentity::new(slot.clone());
        let id = identity.get_or_create();
        assert_eq!(slot.load().unwrap(), Some(id));
    }

    #[test]
    fn test_clear_mints_new_id() {
        let slot = Arc::new(MemorySessionSlot::default());
        let mut identity = SessionIdentity::new(slot.clone());
        let first = identity.get_or_create();
        identity.clear();
        assert!(identity.current().is_none());
        assert!(slot.load().unwrap().is_none());

        let second = identity.get_or_create();
        assert_ne!(first, second);
    }

    #[test]
    fn test_surfaces_do_not_share_ids_after_seed() {
        let slot: Arc<dyn SessionSlot> = Arc::new(MemorySessionSlot::default());
        let mut a = SessionIdentity::new(slot.clone());
        let a_id = a.get_or_create();

        // Second surface seeds from the same slot, then diverges.
        let mut b = SessionIdentity::new(slot.clone());
        assert_eq!(b.get_or_create(), a_id);
        b.clear();
        let b_id = b.get_or_create();

        assert_eq!(a.get_or_create(), a_id);
        assert_ne!(a_id, b_id);
    }

    #[test]
    fn test_adopt() {
        let slot = Arc::new(MemorySessionSlot::default());
        let mut identity = SessionIdentity::new(slot.clone());
        identity.get_or_create();
        identity.adopt(SessionId::from("picked"));
        assert_eq!(identity.get_or_create(), SessionId::from("picked"));
        assert_eq!(slot.load().unwrap(), Some(SessionId::from("picked")));
    }

    #[test]
    fn test_local_state_slot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentor.db");

        let first = {
            let repo = LocalStateRepository::new(Arc::new(Database::new(&path).unwrap()));
            SessionIdentity::new(Arc::new(repo)).get_or_create()
        };
        let repo = LocalStateRepository::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(SessionIdentity::new(Arc::new(repo)).get_or_create(), first);
    }
}
