use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{ScriptStore, ScriptSummary};
use crate::models::script::Script;

/// Map-backed store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    scripts: DashMap<String, (Script, DateTime<Utc>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptStore for MemoryStore {
    fn save(&self, script: &Script) -> Result<()> {
        self.scripts
            .insert(script.uuid.clone(), (script.clone(), Utc::now()));
        Ok(())
    }

    fn load(&self, uuid: &str) -> Result<Option<Script>> {
        Ok(self.scripts.get(uuid).map(|entry| entry.value().0.clone()))
    }

    fn delete(&self, uuid: &str) -> Result<bool> {
        Ok(self.scripts.remove(uuid).is_some())
    }

    fn list(&self) -> Result<Vec<ScriptSummary>> {
        let mut summaries: Vec<ScriptSummary> = self
            .scripts
            .iter()
            .map(|entry| {
                let (script, saved_at) = entry.value();
                ScriptSummary {
                    uuid: script.uuid.clone(),
                    url: script.url.clone(),
                    action_count: script.actions.len() as u32,
                    start_time: script.start_time,
                    saved_at: *saved_at,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn behaves_like_a_store() {
        let store = MemoryStore::new();
        let script = Script::new("m-1", "https://example.com/");
        store.save(&script).unwrap();

        assert_eq!(store.load("m-1").unwrap(), Some(script));
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(store.delete("m-1").unwrap());
        assert!(store.load("m-1").unwrap().is_none());
    }
}
