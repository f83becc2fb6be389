//! SQLite handle shared by the history and local-state repositories.
//!
//! One connection behind a Mutex. File databases run in WAL mode with a
//! busy timeout, since two `mentor` processes may share the same file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use mentor_core::error::MentorError;

use crate::migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
                            PRAGMA synchronous = NORMAL;
                            PRAGMA foreign_keys = ON;";

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> MentorError {
    move |e| MentorError::Storage(format!("{}: {}", context, e))
}

pub struct Database {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases.
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn new(path: &Path) -> Result<Self, MentorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(storage_err("Failed to open database"))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(storage_err("Failed to set busy timeout"))?;
        conn.execute_batch(FILE_PRAGMAS)
            .map_err(storage_err("Failed to set pragmas"))?;

        let db = Self::init(conn, Some(path.to_path_buf()))?;
        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Private database for tests. Nothing survives the handle.
    pub fn in_memory() -> Result<Self, MentorError> {
        let conn =
            Connection::open_in_memory().map_err(storage_err("Failed to open in-memory db"))?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, MentorError> {
        migrations::run_migrations(&conn)?;
        debug!(in_memory = path.is_none(), "Schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, MentorError>
    where
        F: FnOnce(&Connection) -> Result<T, MentorError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| MentorError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
