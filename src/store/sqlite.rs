use anyhow::{anyhow, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use super::{ScriptStore, ScriptSummary};
use crate::models::script::Script;

/// Default database location under the platform data directory.
fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("could not find data directory"))?;
    let db_path = data_dir.join("com.recplay.engine").join("scripts.db");

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    Ok(db_path)
}

/// SQLite-backed script store. The full script rides along as a JSON
/// column; the indexed columns exist for listings.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at the platform default location.
    pub fn open_default() -> Result<Self> {
        let path = default_db_path()?;
        info!(path = %path.display(), "opening script store");
        Self::open(&path)
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Private throwaway database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("lock error: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scripts (
                uuid TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                action_count INTEGER NOT NULL DEFAULT 0,
                start_time INTEGER NOT NULL DEFAULT 0,
                script TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_scripts_saved_at ON scripts(saved_at DESC);
            "#,
        )?;

        Ok(())
    }
}

impl ScriptStore for SqliteStore {
    fn save(&self, script: &Script) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("lock error: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO scripts (uuid, url, action_count, start_time, script, saved_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(uuid) DO UPDATE SET
                url = excluded.url,
                action_count = excluded.action_count,
                start_time = excluded.start_time,
                script = excluded.script,
                saved_at = excluded.saved_at
            "#,
            params![
                script.uuid,
                script.url,
                script.actions.len() as u32,
                script.start_time,
                serde_json::to_string(script)?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn load(&self, uuid: &str) -> Result<Option<Script>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("lock error: {}", e))?;

        let json: Option<String> = conn
            .query_row(
                "SELECT script FROM scripts WHERE uuid = ?1",
                params![uuid],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, uuid: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| anyhow!("lock error: {}", e))?;
        let deleted = conn.execute("DELETE FROM scripts WHERE uuid = ?1", params![uuid])?;
        Ok(deleted > 0)
    }

    fn list(&self) -> Result<Vec<ScriptSummary>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT uuid, url, action_count, start_time, saved_at
            FROM scripts
            ORDER BY saved_at DESC
            "#,
        )?;

        let summaries: Vec<ScriptSummary> = stmt
            .query_map([], |row| {
                Ok(ScriptSummary {
                    uuid: row.get(0)?,
                    url: row.get(1)?,
                    action_count: row.get(2)?,
                    start_time: row.get(3)?,
                    saved_at: {
                        let ts: String = row.get(4)?;
                        chrono::DateTime::parse_from_rfc3339(&ts)
                            .map(|dt| dt.with_timezone(&Utc))
                            .unwrap_or_else(|_| Utc::now())
                    },
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(summaries)
    }
}

impl Clone for SqliteStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::{Action, ActionKind, ElementHints};

    fn sample_script(uuid: &str) -> Script {
        let mut script = Script::new(uuid, "https://example.com/login");
        script.push(Action::new(
            0,
            ActionKind::Click {
                selector: "#sign-in".to_string(),
            },
            ElementHints {
                text: Some("Sign in".to_string()),
                ..Default::default()
            },
            "https://example.com/login",
        ));
        script
    }

    #[test]
    fn save_load_round_trip_preserves_actions() {
        let store = SqliteStore::open_in_memory().unwrap();
        let script = sample_script("s-1");
        store.save(&script).unwrap();

        let loaded = store.load("s-1").unwrap().unwrap();
        assert_eq!(loaded, script);
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn save_by_same_uuid_overwrites() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut script = sample_script("s-2");
        store.save(&script).unwrap();

        script.push(Action::new(
            1,
            ActionKind::Navigate {
                url: "https://example.com/home".to_string(),
            },
            ElementHints::default(),
            "https://example.com/login",
        ));
        store.save(&script).unwrap();

        let loaded = store.load("s-2").unwrap().unwrap();
        assert_eq!(loaded.actions.len(), 2);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn delete_reports_whether_anything_went() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(&sample_script("s-3")).unwrap();

        assert!(store.delete("s-3").unwrap());
        assert!(!store.delete("s-3").unwrap());
    }

    #[test]
    fn listing_carries_counts_without_bodies() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.save(&sample_script("s-4")).unwrap();

        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].uuid, "s-4");
        assert_eq!(list[0].action_count, 1);
        assert_eq!(list[0].url, "https://example.com/login");
    }
}
