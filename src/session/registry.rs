use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::AppError;

/// Keyed set of live sessions, shared across handlers.
///
/// One instance per session family (recordings, playbacks) lives on the
/// application state; handlers go through it instead of touching a map of
/// their own. Entries are `Arc`ed so a handler can keep working with a
/// session that another request has since removed.
pub struct SessionRegistry<T> {
    sessions: DashMap<String, Arc<T>>,
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Registers a session under `id`. Refuses to displace a live one;
    /// callers that want supersession remove the old entry first.
    pub fn create(&self, id: impl Into<String>, session: T) -> Result<Arc<T>, AppError> {
        let id = id.into();
        let session = Arc::new(session);
        match self.sessions.entry(id.clone()) {
            dashmap::Entry::Occupied(_) => Err(AppError::SessionConflict(id)),
            dashmap::Entry::Vacant(slot) => {
                slot.insert(session.clone());
                debug!(id, "session registered");
                Ok(session)
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(id, "session removed");
        }
        removed
    }

    pub fn ids(&self) -> Vec<String> {
        self.sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_get_remove_round_trip() {
        let registry = SessionRegistry::new();
        registry.create("a", 1u32).unwrap();
        assert_eq!(registry.get("a").as_deref(), Some(&1));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove("a").as_deref(), Some(&1));
        assert!(registry.get("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn duplicate_id_is_a_conflict() {
        let registry = SessionRegistry::new();
        registry.create("a", 1u32).unwrap();
        match registry.create("a", 2u32) {
            Err(AppError::SessionConflict(id)) => assert_eq!(id, "a"),
            other => panic!("expected conflict, got {other:?}"),
        }
        // the original entry survives the failed insert
        assert_eq!(registry.get("a").as_deref(), Some(&1));
    }

    #[test]
    fn handle_outlives_removal() {
        let registry = SessionRegistry::new();
        let held = registry.create("a", String::from("live")).unwrap();
        registry.remove("a");
        assert_eq!(held.as_str(), "live");
    }
}
