//! SQLite-backed history records.
//!
//! One row per (user, session). Every save writes the full turn list by
//! value; the title is set once and survives later saves.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use mentor_core::error::MentorError;
use mentor_core::types::{HistoryRecord, ModuleType, SessionContent, SessionId, Timestamp};

use crate::db::Database;

const SELECT_COLUMNS: &str = "SELECT id, user_id, session_id, module_type, title, content, metadata, created_at, updated_at
     FROM history";

/// Repository for saved conversation sessions.
#[derive(Debug, Clone)]
pub struct HistoryRepository {
    db: Arc<Database>,
}

impl HistoryRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or update the record for `(user_id, session_id)`.
    ///
    /// An existing title is never replaced; `None` keeps whatever is stored.
    /// Metadata is replaced only when provided.
    pub fn save(
        &self,
        user_id: &str,
        session_id: &SessionId,
        module: ModuleType,
        content: &SessionContent,
        title: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<HistoryRecord, MentorError> {
        let body = serde_json::to_string(content)?;
        let meta = metadata.map(serde_json::to_string).transpose()?;
        let now = Timestamp::now();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO history (id, user_id, session_id, module_type, title, content, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT (user_id, session_id) DO UPDATE SET
                    module_type = excluded.module_type,
                    title       = COALESCE(history.title, excluded.title),
                    content     = excluded.content,
                    metadata    = COALESCE(excluded.metadata, history.metadata),
                    updated_at  = excluded.updated_at",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    user_id,
                    session_id.as_str(),
                    module.as_str(),
                    title,
                    body,
                    meta,
                    now.0,
                ],
            )
            .map_err(|e| MentorError::Storage(format!("Failed to save history: {}", e)))?;
            Ok(())
        })?;

        self.get_by_session(user_id, session_id)?
            .ok_or_else(|| MentorError::NotFound(format!("history for session {}", session_id)))
    }

    /// Fetch the record for one session, if any.
    pub fn get_by_session(
        &self,
        user_id: &str,
        session_id: &SessionId,
    ) -> Result<Option<HistoryRecord>, MentorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE user_id = ?1 AND session_id = ?2",
                    SELECT_COLUMNS
                ))
                .map_err(|e| MentorError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![user_id, session_id.as_str()], |row| {
                    Ok(row_to_record(row))
                })
                .optional()
                .map_err(|e| MentorError::Storage(e.to_string()))?;

            match result {
                Some(record) => Ok(Some(record?)),
                None => Ok(None),
            }
        })
    }

    /// List a user's records, most recently updated first.
    pub fn list_all(
        &self,
        user_id: &str,
        module: Option<ModuleType>,
    ) -> Result<Vec<HistoryRecord>, MentorError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "{} WHERE user_id = ?1 AND (?2 IS NULL OR module_type = ?2)
                     ORDER BY updated_at DESC, rowid DESC",
                    SELECT_COLUMNS
                ))
                .map_err(|e| MentorError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![user_id, module.map(|m| m.as_str())],
                    |row| Ok(row_to_record(row)),
                )
                .map_err(|e| MentorError::Storage(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let record = row.map_err(|e| MentorError::Storage(e.to_string()))??;
                records.push(record);
            }
            Ok(records)
        })
    }

    /// Delete one session. Returns whether a row was removed.
    pub fn delete(&self, user_id: &str, session_id: &SessionId) -> Result<bool, MentorError> {
        self.db.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM history WHERE user_id = ?1 AND session_id = ?2",
                    rusqlite::params![user_id, session_id.as_str()],
                )
                .map_err(|e| MentorError::Storage(format!("Failed to delete history: {}", e)))?;
            Ok(removed > 0)
        })
    }

    /// Delete every record of one module. Returns the number removed.
    pub fn delete_all_by_module(
        &self,
        user_id: &str,
        module: ModuleType,
    ) -> Result<usize, MentorError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM history WHERE user_id = ?1 AND module_type = ?2",
                rusqlite::params![user_id, module.as_str()],
            )
            .map_err(|e| MentorError::Storage(format!("Failed to clear history: {}", e)))
        })
    }

    /// Count a user's records.
    pub fn count(&self, user_id: &str) -> Result<u64, MentorError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM history WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .map_err(|e| MentorError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<HistoryRecord, MentorError> {
    let id: String = row.get(0).map_err(|e| MentorError::Storage(e.to_string()))?;
    let user_id: String = row.get(1).map_err(|e| MentorError::Storage(e.to_string()))?;
    let session_id: String = row.get(2).map_err(|e| MentorError::Storage(e.to_string()))?;
    let module: String = row.get(3).map_err(|e| MentorError::Storage(e.to_string()))?;
    let title: Option<String> = row.get(4).map_err(|e| MentorError::Storage(e.to_string()))?;
    let content: String = row.get(5).map_err(|e| MentorError::Storage(e.to_string()))?;
    let metadata: Option<String> = row.get(6).map_err(|e| MentorError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(7).map_err(|e| MentorError::Storage(e.to_string()))?;
    let updated_at: i64 = row.get(8).map_err(|e| MentorError::Storage(e.to_string()))?;

    Ok(HistoryRecord {
        id: Uuid::parse_str(&id).map_err(|e| MentorError::Storage(e.to_string()))?,
        user_id,
        session_id: SessionId(session_id),
        module: module.parse()?,
        title,
        content: serde_json::from_str(&content)?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
        created_at: Timestamp(created_at),
        updated_at: Timestamp(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mentor_core::types::Turn;
    use serde_json::json;

    fn make_repo() -> HistoryRepository {
        HistoryRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn content(texts: &[&str]) -> SessionContent {
        SessionContent {
            messages: texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    if i % 2 == 0 {
                        Turn::user(*t)
                    } else {
                        Turn::assistant(*t)
                    }
                })
                .collect(),
        }
    }

    // ---- save / get ----

    #[test]
    fn test_save_and_get() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        let saved = repo
            .save(
                "u-1",
                &sid,
                ModuleType::Chat,
                &content(&["hi", "hello"]),
                Some("Greetings"),
                Some(&json!({"mode": "normal"})),
            )
            .unwrap();

        assert_eq!(saved.title.as_deref(), Some("Greetings"));
        let loaded = repo.get_by_session("u-1", &sid).unwrap().unwrap();
        assert_eq!(loaded.content.messages.len(), 2);
        assert_eq!(loaded.content.messages[0].content, "hi");
        assert_eq!(loaded.metadata.unwrap()["mode"], "normal");
        assert_eq!(loaded.module, ModuleType::Chat);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let repo = make_repo();
        assert!(repo
            .get_by_session("u-1", &SessionId::from("nope"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_is_scoped_to_user() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save("u-1", &sid, ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        assert!(repo.get_by_session("u-2", &sid).unwrap().is_none());
    }

    // ---- upsert semantics ----

    #[test]
    fn test_save_replaces_content_by_value() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save("u-1", &sid, ModuleType::Chat, &content(&["a", "b"]), None, None)
            .unwrap();
        let second = repo
            .save(
                "u-1",
                &sid,
                ModuleType::Chat,
                &content(&["a", "b", "c", "d"]),
                None,
                None,
            )
            .unwrap();
        assert_eq!(second.content.messages.len(), 4);
        assert_eq!(repo.count("u-1").unwrap(), 1);
    }

    #[test]
    fn test_title_is_set_once() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save("u-1", &sid, ModuleType::Chat, &content(&["a"]), Some("First"), None)
            .unwrap();
        let again = repo
            .save("u-1", &sid, ModuleType::Chat, &content(&["a", "b"]), Some("Second"), None)
            .unwrap();
        assert_eq!(again.title.as_deref(), Some("First"));

        let kept = repo
            .save("u-1", &sid, ModuleType::Chat, &content(&["a", "b", "c"]), None, None)
            .unwrap();
        assert_eq!(kept.title.as_deref(), Some("First"));
    }

    #[test]
    fn test_title_can_arrive_late() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save("u-1", &sid, ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        let titled = repo
            .save("u-1", &sid, ModuleType::Chat, &content(&["a", "b"]), Some("Late"), None)
            .unwrap();
        assert_eq!(titled.title.as_deref(), Some("Late"));
    }

    #[test]
    fn test_metadata_kept_when_absent() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save(
            "u-1",
            &sid,
            ModuleType::Chat,
            &content(&["a"]),
            None,
            Some(&json!({"mode": "weakness"})),
        )
        .unwrap();
        let record = repo
            .save("u-1", &sid, ModuleType::Chat, &content(&["a", "b"]), None, None)
            .unwrap();
        assert_eq!(record.metadata.unwrap()["mode"], "weakness");
    }

    #[test]
    fn test_created_at_preserved_across_saves() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        let first = repo
            .save("u-1", &sid, ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        let second = repo
            .save("u-1", &sid, ModuleType::Chat, &content(&["a", "b"]), None, None)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    // ---- list ----

    #[test]
    fn test_list_all_with_module_filter() {
        let repo = make_repo();
        repo.save("u-1", &"s-1".into(), ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        repo.save("u-1", &"s-2".into(), ModuleType::Career, &content(&["b"]), None, None)
            .unwrap();
        repo.save("u-2", &"s-3".into(), ModuleType::Chat, &content(&["c"]), None, None)
            .unwrap();

        assert_eq!(repo.list_all("u-1", None).unwrap().len(), 2);
        let chats = repo.list_all("u-1", Some(ModuleType::Chat)).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].session_id, SessionId::from("s-1"));
        assert!(repo.list_all("u-1", Some(ModuleType::Notes)).unwrap().is_empty());
    }

    // ---- delete ----

    #[test]
    fn test_delete_one() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save("u-1", &sid, ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        assert!(repo.delete("u-1", &sid).unwrap());
        assert!(!repo.delete("u-1", &sid).unwrap());
        assert_eq!(repo.count("u-1").unwrap(), 0);
    }

    #[test]
    fn test_delete_other_users_session_is_noop() {
        let repo = make_repo();
        let sid = SessionId::from("s-1");
        repo.save("u-1", &sid, ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        assert!(!repo.delete("u-2", &sid).unwrap());
        assert_eq!(repo.count("u-1").unwrap(), 1);
    }

    #[test]
    fn test_delete_all_by_module() {
        let repo = make_repo();
        repo.save("u-1", &"s-1".into(), ModuleType::Chat, &content(&["a"]), None, None)
            .unwrap();
        repo.save("u-1", &"s-2".into(), ModuleType::Chat, &content(&["b"]), None, None)
            .unwrap();
        repo.save("u-1", &"s-3".into(), ModuleType::Notes, &content(&["c"]), None, None)
            .unwrap();

        assert_eq!(repo.delete_all_by_module("u-1", ModuleType::Chat).unwrap(), 2);
        let rest = repo.list_all("u-1", None).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].module, ModuleType::Notes);
    }
}
