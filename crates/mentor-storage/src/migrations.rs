//! Database schema migrations.
//!
//! Applies the schema for the history and local_state tables, tracked in
//! schema_migrations.

use rusqlite::Connection;
use tracing::info;

use mentor_core::error::MentorError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), MentorError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| MentorError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| MentorError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: history records and local state.
fn apply_v1(conn: &Connection) -> Result<(), MentorError> {
    conn.execute_batch(
        "
        -- One row per (user, session). Content is the full turn list as JSON.
        CREATE TABLE IF NOT EXISTS history (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            session_id  TEXT NOT NULL,
            module_type TEXT NOT NULL
                        CHECK (module_type IN ('chat', 'notes', 'career', 'exam_planner', 'confusion')),
            title       TEXT,
            content     TEXT NOT NULL DEFAULT '{\"messages\":[]}',
            metadata    TEXT,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL,
            UNIQUE (user_id, session_id)
        );

        CREATE INDEX IF NOT EXISTS idx_history_user_updated
            ON history (user_id, updated_at DESC);

        CREATE INDEX IF NOT EXISTS idx_history_user_module
            ON history (user_id, module_type, updated_at DESC);

        -- Small key/value slots that survive restarts (drafts, current session).
        CREATE TABLE IF NOT EXISTS local_state (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            saved_at    INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| MentorError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
