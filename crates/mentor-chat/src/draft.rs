//! Debounced persistence of the unsent input.
//!
//! Every write restarts a quiet-period timer; only the value present when
//! the timer fires is committed. The timer is cancelled on clear and when
//! the store is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use mentor_core::config::DraftConfig;
use mentor_core::error::MentorError;
use mentor_storage::LocalStateRepository;

/// Where committed drafts live.
pub trait DraftBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, MentorError>;
    fn save(&self, key: &str, value: &str) -> Result<(), MentorError>;
    fn remove(&self, key: &str) -> Result<(), MentorError>;
}

impl DraftBackend for LocalStateRepository {
    fn load(&self, key: &str) -> Result<Option<String>, MentorError> {
        Ok(self.get(key)?.map(|draft| draft.value))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), MentorError> {
        self.put(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), MentorError> {
        LocalStateRepository::remove(self, key)
    }
}

/// In-process drafts that count commits.
#[derive(Debug, Default)]
pub struct MemoryDrafts {
    values: Mutex<HashMap<String, String>>,
    commits: AtomicUsize,
}

impl MemoryDrafts {
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, MentorError> {
        self.values
            .lock()
            .map_err(|e| MentorError::Storage(format!("draft lock poisoned: {}", e)))
    }
}

impl DraftBackend for MemoryDrafts {
    fn load(&self, key: &str) -> Result<Option<String>, MentorError> {
        Ok(self.values()?.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), MentorError> {
        self.values()?.insert(key.to_string(), value.to_string());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MentorError> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Debounced draft autosave for one key.
pub struct DraftStore {
    backend: Arc<dyn DraftBackend>,
    key: String,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every rewrite, clear and drop. A commit task only saves
    /// while its generation is still current.
    generation: Arc<Mutex<u64>>,
}

impl DraftStore {
    pub fn new(backend: Arc<dyn DraftBackend>, key: impl Into<String>, debounce: Duration) -> Self {
        Self {
            backend,
            key: key.into(),
            debounce,
            pending: Mutex::new(None),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    pub fn from_config(backend: Arc<dyn DraftBackend>, config: &DraftConfig) -> Self {
        Self::new(
            backend,
            config.key.clone(),
            Duration::from_millis(config.debounce_ms),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Schedule `value` to be committed after the quiet period.
    ///
    /// A blank value cancels any pending commit and writes nothing; the
    /// last committed draft stays in place. Must be called within a Tokio
    /// runtime.
    pub fn write(&self, value: &str) {
        let scheduled = self.cancel_pending();
        if value.trim().is_empty() {
            return;
        }

        let backend = Arc::clone(&self.backend);
        let generation = Arc::clone(&self.generation);
        let key = self.key.clone();
        let value = value.to_string();
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let current = generation.lock().unwrap_or_else(PoisonError::into_inner);
            if *current != scheduled {
                debug!(key = %key, "Draft superseded before commit");
                return;
            }
            match backend.save(&key, &value) {
                Ok(()) => debug!(key = %key, chars = value.chars().count(), "Draft committed"),
                Err(e) => warn!(key = %key, error = %e, "Failed to commit draft"),
            }
        });

        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(handle);
        }
    }

    /// Last committed value, if any and non-empty.
    pub fn restore(&self) -> Option<String> {
        match self.backend.load(&self.key) {
            Ok(value) => value.filter(|v| !v.trim().is_empty()),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to restore draft");
                None
            }
        }
    }

    /// Remove the committed value now and cancel any pending commit.
    pub fn clear(&self) {
        self.cancel_pending();
        if let Err(e) = self.backend.remove(&self.key) {
            warn!(key = %self.key, error = %e, "Failed to clear draft");
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Abort the pending commit and start a new generation.
    ///
    /// Waits for a commit that is already saving, so nothing it writes can
    /// land after this returns.
    fn cancel_pending(&self) -> u64 {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }
        let mut current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *current += 1;
        *current
    }
}

impl Drop for DraftStore {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl std::fmt::Debug for DraftStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftStore")
            .field("key", &self.key)
            .field("debounce", &self.debounce)
            .finish()
    }
}
