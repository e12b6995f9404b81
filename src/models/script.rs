use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::action::{Action, ActionKind};

/// A recorded flow: an ordered list of actions plus the page it starts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub uuid: String,
    /// URL the recording started on; replay begins here.
    pub url: String,
    pub actions: Vec<Action>,
    /// Unix epoch milliseconds at the start of the recording.
    pub start_time: i64,
}

impl Script {
    pub fn new(uuid: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            url: url.into(),
            actions: Vec::new(),
            start_time: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_fresh_uuid(url: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), url)
    }

    /// Index the next appended action gets. Indices stay contiguous from
    /// zero, including across page navigations within one recording.
    pub fn next_index(&self) -> u32 {
        self.actions.len() as u32
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Collapses bursts of per-keystroke `type` actions into the final value.
    ///
    /// Adjacent `type` actions on the same selector and page URL are folded
    /// into the last one of the run, then all indices are renumbered to stay
    /// contiguous. Never applied implicitly; callers opt in when a recording
    /// is finalized. The result is stable under repeated application.
    pub fn compacted(&self) -> Script {
        let mut kept: Vec<Action> = Vec::with_capacity(self.actions.len());

        for action in &self.actions {
            if let ActionKind::TypeText { selector, .. } = &action.kind {
                if let Some(last) = kept.last() {
                    let same_target = matches!(
                        &last.kind,
                        ActionKind::TypeText { selector: prev, .. }
                            if prev == selector && last.url == action.url
                    );
                    if same_target {
                        kept.pop();
                    }
                }
            }
            kept.push(action.clone());
        }

        for (i, action) in kept.iter_mut().enumerate() {
            action.index = i as u32;
        }

        Script {
            uuid: self.uuid.clone(),
            url: self.url.clone(),
            actions: kept,
            start_time: self.start_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::ElementHints;

    fn type_action(index: u32, selector: &str, value: &str, url: &str) -> Action {
        Action::new(
            index,
            ActionKind::TypeText {
                selector: selector.to_string(),
                value: value.to_string(),
            },
            ElementHints::default(),
            url,
        )
    }

    fn click_action(index: u32, selector: &str, url: &str) -> Action {
        Action::new(
            index,
            ActionKind::Click {
                selector: selector.to_string(),
            },
            ElementHints::default(),
            url,
        )
    }

    #[test]
    fn keystroke_bursts_collapse_to_final_value() {
        let url = "https://example.com/login";
        let mut script = Script::new("s-1", url);
        script.push(type_action(0, "#email", "a", url));
        script.push(type_action(1, "#email", "ab", url));
        script.push(type_action(2, "#email", "abc@example.com", url));
        script.push(click_action(3, "#next", url));
        script.push(type_action(4, "#password", "h", url));
        script.push(type_action(5, "#password", "hunter2", url));

        let compacted = script.compacted();
        assert_eq!(compacted.actions.len(), 3);
        assert_eq!(
            compacted.actions[0].kind,
            ActionKind::TypeText {
                selector: "#email".to_string(),
                value: "abc@example.com".to_string()
            }
        );
        assert_eq!(
            compacted.actions[2].kind,
            ActionKind::TypeText {
                selector: "#password".to_string(),
                value: "hunter2".to_string()
            }
        );

        let indices: Vec<u32> = compacted.actions.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2], "indices are renumbered contiguously");
    }

    #[test]
    fn type_runs_on_different_pages_are_kept_apart() {
        let mut script = Script::new("s-2", "https://example.com/a");
        script.push(type_action(0, "#q", "ru", "https://example.com/a"));
        script.push(type_action(1, "#q", "rust", "https://example.com/b"));

        let compacted = script.compacted();
        assert_eq!(
            compacted.actions.len(),
            2,
            "same selector on a different page is a different field"
        );
    }

    #[test]
    fn compaction_is_idempotent() {
        let url = "https://example.com/";
        let mut script = Script::new("s-3", url);
        script.push(type_action(0, "#a", "x", url));
        script.push(type_action(1, "#a", "xy", url));
        script.push(click_action(2, "#go", url));
        script.push(type_action(3, "#b", "z", url));

        let once = script.compacted();
        let twice = once.compacted();
        assert_eq!(once, twice);
    }

    #[test]
    fn untouched_scripts_pass_through() {
        let url = "https://example.com/";
        let mut script = Script::new("s-4", url);
        script.push(click_action(0, "#one", url));
        script.push(click_action(1, "#two", url));

        let compacted = script.compacted();
        assert_eq!(compacted, script);
    }
}
