//! SQLite-backed owner media table.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{OwnerError, OwnerMedia, OwnerRef, OwnerUpdater};

/// Stores the current media of each owning entity in an `owner_media` table.
///
/// Stands in for the product schema (storyboards, episodes, voices) that the
/// orchestrator only needs one column pair from.
pub struct SqliteOwnerMediaStore {
    conn: Mutex<Connection>,
}

impl SqliteOwnerMediaStore {
    pub fn new(path: &Path) -> Result<Self, OwnerError> {
        let conn = Connection::open(path).map_err(|e| OwnerError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, OwnerError> {
        let conn =
            Connection::open_in_memory().map_err(|e| OwnerError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), OwnerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS owner_media (
                owner_kind TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                media_url TEXT NOT NULL,
                duration_secs REAL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (owner_kind, owner_id)
            );
            "#,
        )
        .map_err(|e| OwnerError::Storage(e.to_string()))
    }

    /// Current media of `owner`, if any was ever set.
    pub fn get(&self, owner: &OwnerRef) -> Result<Option<OwnerMedia>, OwnerError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT media_url, duration_secs FROM owner_media WHERE owner_kind = ? AND owner_id = ?",
            params![owner.kind.as_str(), owner.id],
            |row| {
                Ok(OwnerMedia {
                    url: row.get(0)?,
                    duration_secs: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(|e| OwnerError::Storage(e.to_string()))
    }
}

#[async_trait]
impl OwnerUpdater for SqliteOwnerMediaStore {
    async fn set_media(&self, owner: &OwnerRef, media: &OwnerMedia) -> Result<(), OwnerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO owner_media (owner_kind, owner_id, media_url, duration_secs, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(owner_kind, owner_id) DO UPDATE SET \
             media_url = excluded.media_url, \
             duration_secs = COALESCE(excluded.duration_secs, owner_media.duration_secs), \
             updated_at = excluded.updated_at",
            params![
                owner.kind.as_str(),
                owner.id,
                media.url,
                media.duration_secs,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| OwnerError::Storage(e.to_string()))?;
        Ok(())
    }
}
