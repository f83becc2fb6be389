//! History adapter: persistence for the current user's sessions.
//!
//! Saving after an exchange never fails the conversation; errors are logged.
//! With no signed-in user every operation is a no-op.

use std::sync::Arc;

use tracing::{debug, warn};

use mentor_core::error::MentorError;
use mentor_core::types::{CurrentUser, HistoryRecord, ModuleType, SessionContent, SessionId, Turn};
use mentor_storage::HistoryRepository;

use crate::error::ChatError;

/// Record store keyed by user and session.
pub trait HistoryStore: Send + Sync {
    fn save(
        &self,
        user_id: &str,
        session_id: &SessionId,
        module: ModuleType,
        content: &SessionContent,
        title: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<HistoryRecord, MentorError>;

    fn get_by_session(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> Result<Option<HistoryRecord>, MentorError>;

    fn list_all(
        &self,
        user_id: &str,
        module: Option<ModuleType>,
    ) -> Result<Vec<HistoryRecord>, MentorError>;

    fn delete(&self, user_id: &str, session_id: &SessionId) -> Result<bool, MentorError>;

    fn delete_all_by_module(&self, user_id: &str, module: ModuleType)
        -> Result<usize, MentorError>;
}

impl HistoryStore for HistoryRepository {
    fn save(
        &self,
        user_id: &str,
        session_id: &SessionId,
        module: ModuleType,
        content: &SessionContent,
        title: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<HistoryRecord, MentorError> {
        HistoryRepository::save(self, user_id, session_id, module, content, title, metadata)
    }

    fn get_by_session(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> Result<Option<HistoryRecord>, MentorError> {
        HistoryRepository::get_by_session(self, user_id, session_id)
    }

    fn list_all(
        &self,
        user_id: &str,
        module: Option<ModuleType>,
    ) -> Result<Vec<HistoryRecord>, MentorError> {
        HistoryRepository::list_all(self, user_id, module)
    }

    fn delete(&self, user_id: &str, session_id: &SessionId) -> Result<bool, MentorError> {
        HistoryRepository::delete(self, user_id, session_id)
    }

    fn delete_all_by_module(
        &self,
        user_id: &str,
        module: ModuleType,
    ) -> Result<usize, MentorError> {
        HistoryRepository::delete_all_by_module(self, user_id, module)
    }
}

/// Source of the signed-in user.
pub trait UserProvider: Send + Sync {
    fn current_user(&self) -> Option<CurrentUser>;
}

/// A fixed user, or anonymous.
#[derive(Debug, Clone, Default)]
pub struct StaticUser(pub Option<CurrentUser>);

impl UserProvider for StaticUser {
    fn current_user(&self) -> Option<CurrentUser> {
        self.0.clone()
    }
}

/// Outcome of a multi-session delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub requested: usize,
    pub deleted: usize,
    pub failed: Vec<SessionId>,
}

impl DeleteSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// History operations scoped to the current user and one module.
#[derive(Clone)]
pub struct HistoryAdapter {
    store: Arc<dyn HistoryStore>,
    users: Arc<dyn UserProvider>,
    module: ModuleType,
}

impl HistoryAdapter {
    pub fn new(store: Arc<dyn HistoryStore>, users: Arc<dyn UserProvider>, module: ModuleType) -> Self {
        Self {
            store,
            users,
            module,
        }
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.users.current_user()
    }

    pub fn module(&self) -> ModuleType {
        self.module
    }

    /// Persist the full turn list for `session_id`. Returns whether a record
    /// was written.
    pub fn save(
        &self,
        session_id: &SessionId,
        turns: &[Turn],
        title: Option<&str>,
        metadata: serde_json::Value,
    ) -> bool {
        let Some(user) = self.current_user() else {
            debug!(session_id = %session_id, "No user; history not saved");
            return false;
        };
        let content = SessionContent {
            messages: turns.to_vec(),
        };
        match self.store.save(
            &user.id,
            session_id,
            self.module,
            &content,
            title,
            Some(&metadata),
        ) {
            Ok(record) => {
                debug!(
                    session_id = %session_id,
                    turns = turns.len(),
                    titled = record.title.is_some(),
                    "History saved"
                );
                true
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to save history");
                false
            }
        }
    }

    /// Stored turns for `session_id`, if any.
    pub fn load(&self, session_id: &SessionId) -> Option<Vec<Turn>> {
        let user = self.current_user()?;
        match self.store.get_by_session(&user.id, session_id) {
            Ok(record) => record.map(|r| r.content.messages),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to load history");
                None
            }
        }
    }

    /// All records for the user, most recently updated first.
    pub fn list(&self, module: Option<ModuleType>) -> Result<Vec<HistoryRecord>, ChatError> {
        let Some(user) = self.current_user() else {
            return Ok(Vec::new());
        };
        Ok(self.store.list_all(&user.id, module)?)
    }

    pub fn delete(&self, session_id: &SessionId) -> Result<bool, ChatError> {
        let Some(user) = self.current_user() else {
            return Ok(false);
        };
        Ok(self.store.delete(&user.id, session_id)?)
    }

    /// Delete every listed session. All deletions are attempted; failures are
    /// reported in the summary.
    pub fn delete_many(&self, session_ids: &[SessionId]) -> DeleteSummary {
        let mut summary = DeleteSummary {
            requested: session_ids.len(),
            ..DeleteSummary::default()
        };
        let Some(user) = self.current_user() else {
            summary.failed = session_ids.to_vec();
            return summary;
        };

        for id in session_ids {
            match self.store.delete(&user.id, id) {
                Ok(true) => summary.deleted += 1,
                Ok(false) => summary.failed.push(id.clone()),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Failed to delete history");
                    summary.failed.push(id.clone());
                }
            }
        }
        summary
    }

    pub fn clear_module(&self, module: ModuleType) -> Result<usize, ChatError> {
        let Some(user) = self.current_user() else {
            return Ok(0);
        };
        Ok(self.store.delete_all_by_module(&user.id, module)?)
    }

    /// Delete the user's records in every module.
    pub fn delete_everything(&self) -> Result<usize, ChatError> {
        let Some(user) = self.current_user() else {
            return Ok(0);
        };
        let mut removed = 0;
        let mut first_error = None;
        for module in ModuleType::ALL {
            match self.store.delete_all_by_module(&user.id, module) {
                Ok(n) => removed += n,
                Err(e) => {
                    warn!(module = %module, error = %e, "Failed to clear history module");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(removed),
        }
    }
}

impl std::fmt::Debug for HistoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryAdapter")
            .field("module", &self.module)
            .finish()
    }
}
