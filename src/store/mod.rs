//! Script persistence.
//!
//! The service keeps finished recordings in a [`ScriptStore`]; SQLite in
//! production, an in-memory map for tests and ephemeral setups.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::script::Script;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Listing row; enough to render a script picker without loading bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSummary {
    pub uuid: String,
    pub url: String,
    pub action_count: u32,
    /// Unix epoch milliseconds at the start of the recording.
    pub start_time: i64,
    pub saved_at: DateTime<Utc>,
}

/// Storage for finished recordings. `save` upserts by uuid.
pub trait ScriptStore: Send + Sync {
    fn save(&self, script: &Script) -> Result<()>;
    fn load(&self, uuid: &str) -> Result<Option<Script>>;
    fn delete(&self, uuid: &str) -> Result<bool>;
    /// Newest first.
    fn list(&self) -> Result<Vec<ScriptSummary>>;
}
