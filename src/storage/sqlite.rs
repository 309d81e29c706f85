use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::adaptive::modeling::ProficiencyNetwork;
use crate::adaptive::types::{PerformanceRecord, UserProfile};
use crate::storage::{ModelStore, ProfileStore, StorageError, StorageResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS user_profiles (
    user_id    TEXT PRIMARY KEY,
    data       TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS proficiency_models (
    user_id    TEXT NOT NULL,
    topic      TEXT NOT NULL,
    data       TEXT NOT NULL,
    trained_at TEXT NOT NULL,
    PRIMARY KEY (user_id, topic)
);

CREATE TABLE IF NOT EXISTS performance_history (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    TEXT NOT NULL,
    topic      TEXT NOT NULL,
    data       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_performance_history_key
    ON performance_history (user_id, topic, id);
"#;

/// Embedded SQLite store holding JSON documents.
pub struct SqliteStore {
    connection: Mutex<Connection>,
    db_path: String,
}

impl SqliteStore {
    /// Opens (creating if needed) a database file in WAL mode and applies the schema.
    pub fn open<P: AsRef<Path>>(db_path: P) -> StorageResult<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        let connection = Connection::open(&db_path)?;
        connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;

        let store = Self {
            connection: Mutex::new(connection),
            db_path: path_str,
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn in_memory() -> StorageResult<Self> {
        let store = Self {
            connection: Mutex::new(Connection::open_in_memory()?),
            db_path: ":memory:".to_string(),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    fn get_connection(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|e| StorageError::LockError(e.to_string()))
    }
}

impl ProfileStore for SqliteStore {
    fn load_profile(&self, user_id: &str) -> StorageResult<Option<UserProfile>> {
        let conn = self.get_connection()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_profile(&self, profile: &UserProfile) -> StorageResult<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.get_connection()?;
        conn.execute(
            r#"
            INSERT INTO user_profiles (user_id, data, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![profile.user_id, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn list_profiles(&self) -> StorageResult<Vec<UserProfile>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare("SELECT user_id, data FROM user_profiles ORDER BY rowid")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let mut profiles = Vec::with_capacity(rows.len());
        for (user_id, json) in rows {
            match serde_json::from_str(&json) {
                Ok(profile) => profiles.push(profile),
                Err(err) => {
                    tracing::error!(error = %err, user_id = %user_id, "Skipping unreadable profile");
                }
            }
        }
        Ok(profiles)
    }

    fn profile_count(&self) -> StorageResult<usize> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM user_profiles", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }
}

impl ModelStore for SqliteStore {
    fn load_model(&self, user_id: &str, topic: &str) -> StorageResult<Option<ProficiencyNetwork>> {
        let conn = self.get_connection()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM proficiency_models WHERE user_id = ?1 AND topic = ?2",
                params![user_id, topic],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn save_model(
        &self,
        user_id: &str,
        topic: &str,
        model: &ProficiencyNetwork,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(model)?;
        let conn = self.get_connection()?;
        conn.execute(
            r#"
            INSERT INTO proficiency_models (user_id, topic, data, trained_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, topic) DO UPDATE SET
                data = excluded.data,
                trained_at = excluded.trained_at
            "#,
            params![user_id, topic, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn load_history(&self, user_id: &str, topic: &str) -> StorageResult<Vec<PerformanceRecord>> {
        let conn = self.get_connection()?;
        load_history_with(&conn, user_id, topic)
    }

    fn append_history(
        &self,
        user_id: &str,
        topic: &str,
        record: &PerformanceRecord,
    ) -> StorageResult<Vec<PerformanceRecord>> {
        let json = serde_json::to_string(record)?;
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO performance_history (user_id, topic, data) VALUES (?1, ?2, ?3)",
            params![user_id, topic, json],
        )?;
        load_history_with(&conn, user_id, topic)
    }
}

fn load_history_with(
    conn: &Connection,
    user_id: &str,
    topic: &str,
) -> StorageResult<Vec<PerformanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT data FROM performance_history WHERE user_id = ?1 AND topic = ?2 ORDER BY id",
    )?;
    let rows: Vec<String> = stmt
        .query_map(params![user_id, topic], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    rows.iter()
        .map(|json| serde_json::from_str(json).map_err(StorageError::from))
        .collect()
}
