use serde::{Deserialize, Serialize};

/// Snapshot of an event's target element, built by the capture script at
/// dispatch time. Everything here is best-effort; replay only depends on
/// `path` plus whatever fallback metadata was available.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetInfo {
    /// Absolute ancestor-indexed path from the document root, e.g.
    /// `/html/body/div[2]/form/input[1]`. `None` for window-level targets.
    pub path: Option<String>,
    pub tag_name: Option<String>,
    /// Visible text, truncated by the capture script.
    pub text: Option<String>,
    pub aria_label: Option<String>,
    pub data_test_id: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    /// Human label: aria-label, placeholder, or trimmed text.
    pub display_name: Option<String>,
    pub input_type: Option<String>,
    pub class_name: Option<String>,
    /// Target sits inside a form element.
    pub in_form: bool,
    /// Target is, or sits inside, a form-submit control.
    pub form_submitter: bool,
    /// Target accepts text input (text-ish input, textarea, contenteditable).
    pub editable: bool,
}

/// One DOM event forwarded from the capture script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEvent {
    /// `location.href` when the event fired.
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub kind: PageEventKind,
}

impl PageEvent {
    pub fn new(url: impl Into<String>, kind: PageEventKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PageEventKind {
    /// Authoritative click signal; `button` 0 is the primary button.
    PointerDown {
        target: TargetInfo,
        #[serde(default)]
        button: i32,
    },
    /// Click events matching a recent pointer-down are duplicates; standalone
    /// ones (keyboard activation, synthetic dispatch) still count.
    Click { target: TargetInfo },
    Input { target: TargetInfo, value: String },
    Change {
        target: TargetInfo,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        checked: Option<bool>,
    },
    Submit { target: TargetInfo },
    KeyDown { target: TargetInfo, key: String },
    Focus { target: TargetInfo },
    /// `target: None` is a window scroll; coordinates are the final scroll
    /// offsets at dispatch time.
    Scroll {
        #[serde(default)]
        target: Option<TargetInfo>,
        x: f64,
        y: f64,
    },
    MediaPlay { target: TargetInfo, position: f64 },
    MediaPause { target: TargetInfo, position: f64 },
    MediaSeeking { target: TargetInfo, position: f64 },
    /// Page is unloading; `destination` is best-effort (a recently clicked
    /// link, when the capture script saw one).
    Unload {
        #[serde(default)]
        destination: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_payloads_deserialize_by_event_tag() {
        let raw = r#"{
            "url": "https://example.com/login",
            "event": "input",
            "target": {
                "path": "/html/body/form/input[1]",
                "tagName": "input",
                "inputType": "email",
                "inForm": true,
                "editable": true
            },
            "value": "user@example.com"
        }"#;

        let event: PageEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.url, "https://example.com/login");
        match event.kind {
            PageEventKind::Input { target, value } => {
                assert_eq!(target.path.as_deref(), Some("/html/body/form/input[1]"));
                assert!(target.editable);
                assert_eq!(value, "user@example.com");
            }
            other => panic!("expected input event, got {other:?}"),
        }
    }

    #[test]
    fn window_scroll_has_no_target() {
        let raw = r#"{"url":"https://example.com/","event":"scroll","x":0,"y":512.5}"#;
        let event: PageEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event.kind,
            PageEventKind::Scroll {
                target: None,
                x: 0.0,
                y: 512.5
            }
        );
    }
}
