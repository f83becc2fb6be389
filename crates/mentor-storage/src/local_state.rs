//! Key/value slots that survive restarts.
//!
//! Holds the input draft and the current-session slot.

use std::sync::Arc;

use rusqlite::OptionalExtension;

use mentor_core::error::MentorError;
use mentor_core::types::{Draft, Timestamp};

use crate::db::Database;

#[derive(Debug, Clone)]
pub struct LocalStateRepository {
    db: Arc<Database>,
}

impl LocalStateRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Read a slot, if set.
    pub fn get(&self, key: &str) -> Result<Option<Draft>, MentorError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT key, value, saved_at FROM local_state WHERE key = ?1",
                [key],
                |row| {
                    Ok(Draft {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        saved_at: Timestamp(row.get(2)?),
                    })
                },
            )
            .optional()
            .map_err(|e| MentorError::Storage(e.to_string()))
        })
    }

    /// Write a slot, replacing any previous value.
    pub fn put(&self, key: &str, value: &str) -> Result<(), MentorError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO local_state (key, value, saved_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value, saved_at = excluded.saved_at",
                rusqlite::params![key, value, Timestamp::now().0],
            )
            .map_err(|e| MentorError::Storage(format!("Failed to write local state: {}", e)))?;
            Ok(())
        })
    }

    /// Remove a slot. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<(), MentorError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM local_state WHERE key = ?1", [key])
                .map_err(|e| MentorError::Storage(format!("Failed to remove local state: {}", e)))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_repo() -> LocalStateRepository {
        LocalStateRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_put_and_get() {
        let repo = make_repo();
        repo.put("chat-input-draft", "photosynthesis").unwrap();
        let draft = repo.get("chat-input-draft").unwrap().unwrap();
        assert_eq!(draft.value, "photosynthesis");
        assert_eq!(draft.key, "chat-input-draft");
    }

    #[test]
    fn test_put_overwrites() {
        let repo = make_repo();
        repo.put("k", "one").unwrap();
        repo.put("k", "two").unwrap();
        assert_eq!(repo.get("k").unwrap().unwrap().value, "two");
    }

    #[test]
    fn test_get_missing() {
        let repo = make_repo();
        assert!(repo.get("absent").unwrap().is_none());
    }

    #[test]
    fn test_remove() {
        let repo = make_repo();
        repo.put("k", "v").unwrap();
        repo.remove("k").unwrap();
        assert!(repo.get("k").unwrap().is_none());
        // Second removal is a no-op.
        repo.remove("k").unwrap();
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mentor.db");
        {
            let repo = LocalStateRepository::new(Arc::new(Database::new(&path).unwrap()));
            repo.put("current-session", "session_1_abc").unwrap();
        }
        let repo = LocalStateRepository::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(
            repo.get("current-session").unwrap().unwrap().value,
            "session_1_abc"
        );
    }
}
