use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fallback metadata captured alongside the primary selector. The resolver
/// derives its fallback strategies and its acceptance checks from these.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ElementHints {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.text.is_none()
            && self.aria_label.is_none()
            && self.data_test_id.is_none()
            && self.role.is_none()
            && self.tag_name.is_none()
            && self.name.is_none()
    }
}

/// What an action does, with exactly the payload that kind needs.
///
/// The persisted form is the flat [`WireAction`]; this enum is what the rest
/// of the engine works with, so a `Select` always has a value and a
/// `Navigate` always has a destination.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Click { selector: String },
    TypeText { selector: String, value: String },
    Select { selector: String, value: String },
    Check { selector: String },
    Uncheck { selector: String },
    Submit { selector: String },
    Navigate { url: String },
    /// `selector: None` targets the document.
    Keypress { selector: Option<String>, key: String },
    Focus { selector: String },
    /// `selector: None` targets the window.
    Scroll { selector: Option<String>, x: f64, y: f64 },
    /// Media kinds tolerate a missing selector; the driver falls back to the
    /// first video element on the page.
    Seek { selector: Option<String>, seconds: f64 },
    Play { selector: Option<String>, seconds: f64 },
    Pause { selector: Option<String>, seconds: f64 },
    Watch { selector: Option<String>, seconds: f64 },
    OtpCheckpoint { prompt: String },
}

/// Sentinel selector meaning "the window" for scroll actions.
pub const WINDOW_SENTINEL: &str = "window";
/// Sentinel selector meaning "the document" for keypress actions.
pub const DOCUMENT_SENTINEL: &str = "document";

impl ActionKind {
    /// Wire name of this kind. The set is closed; unknown names are rejected
    /// at decode time.
    pub fn name(&self) -> &'static str {
        match self {
            ActionKind::Click { .. } => "click",
            ActionKind::TypeText { .. } => "type",
            ActionKind::Select { .. } => "select",
            ActionKind::Check { .. } => "check",
            ActionKind::Uncheck { .. } => "uncheck",
            ActionKind::Submit { .. } => "submit",
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::Keypress { .. } => "keypress",
            ActionKind::Focus { .. } => "focus",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Seek { .. } => "seek",
            ActionKind::Play { .. } => "play",
            ActionKind::Pause { .. } => "pause",
            ActionKind::Watch { .. } => "watch",
            ActionKind::OtpCheckpoint { .. } => "otp_checkpoint",
        }
    }

    /// Selector of the element this action resolves, when it has one.
    /// Window/document sentinels and selector-less media actions yield `None`.
    pub fn element_selector(&self) -> Option<&str> {
        match self {
            ActionKind::Click { selector }
            | ActionKind::TypeText { selector, .. }
            | ActionKind::Select { selector, .. }
            | ActionKind::Check { selector }
            | ActionKind::Uncheck { selector }
            | ActionKind::Submit { selector }
            | ActionKind::Focus { selector } => Some(selector),
            ActionKind::Keypress { selector, .. }
            | ActionKind::Scroll { selector, .. }
            | ActionKind::Seek { selector, .. }
            | ActionKind::Play { selector, .. }
            | ActionKind::Pause { selector, .. }
            | ActionKind::Watch { selector, .. } => selector.as_deref(),
            ActionKind::Navigate { .. } | ActionKind::OtpCheckpoint { .. } => None,
        }
    }

    /// Media playback kinds are exempt from pacing and highlighting.
    pub fn is_media(&self) -> bool {
        matches!(
            self,
            ActionKind::Seek { .. }
                | ActionKind::Play { .. }
                | ActionKind::Pause { .. }
                | ActionKind::Watch { .. }
        )
    }
}

/// One recorded step of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireAction", try_from = "WireAction")]
pub struct Action {
    /// Position in the script. Contiguous from zero, including across page
    /// navigations within one recording.
    pub index: u32,
    pub kind: ActionKind,
    pub hints: ElementHints,
    /// Page URL at capture time. Informational only.
    pub url: String,
}

impl Action {
    pub fn new(index: u32, kind: ActionKind, hints: ElementHints, url: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            hints,
            url: url.into(),
        }
    }

    /// Short human label for progress reporting: the display name when one
    /// was captured, otherwise the selector or kind name.
    pub fn label(&self) -> String {
        if let Some(name) = &self.hints.display_name {
            return name.clone();
        }
        match self.kind.element_selector() {
            Some(selector) => selector.to_string(),
            None => self.kind.name().to_string(),
        }
    }
}

/// Flat persisted form of an [`Action`]. Field names are part of the wire
/// format shared with existing script files and must not change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAction {
    pub index: u32,
    #[serde(rename = "type")]
    pub action_type: String,
    pub selector: Option<String>,
    pub value: Option<serde_json::Value>,
    #[serde(flatten)]
    pub hints: ElementHints,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ActionDecodeError {
    #[error("unknown action type '{0}'")]
    UnknownType(String),
    #[error("action '{kind}' at index {index} is missing a selector")]
    MissingSelector { kind: String, index: u32 },
    #[error("action '{kind}' at index {index} has a missing or invalid value: {detail}")]
    BadValue {
        kind: String,
        index: u32,
        detail: String,
    },
}

impl From<Action> for WireAction {
    fn from(action: Action) -> Self {
        use serde_json::{json, Value};

        let (selector, value) = match &action.kind {
            ActionKind::Click { selector }
            | ActionKind::Submit { selector }
            | ActionKind::Focus { selector } => (Some(selector.clone()), None),
            ActionKind::TypeText { selector, value } | ActionKind::Select { selector, value } => {
                (Some(selector.clone()), Some(Value::String(value.clone())))
            }
            ActionKind::Check { selector } => (Some(selector.clone()), Some(Value::Bool(true))),
            ActionKind::Uncheck { selector } => (Some(selector.clone()), Some(Value::Bool(false))),
            ActionKind::Navigate { url } => (None, Some(Value::String(url.clone()))),
            ActionKind::Keypress { selector, key } => (
                Some(
                    selector
                        .clone()
                        .unwrap_or_else(|| DOCUMENT_SENTINEL.to_string()),
                ),
                Some(Value::String(key.clone())),
            ),
            ActionKind::Scroll { selector, x, y } => (
                Some(
                    selector
                        .clone()
                        .unwrap_or_else(|| WINDOW_SENTINEL.to_string()),
                ),
                Some(json!({ "x": x, "y": y })),
            ),
            ActionKind::Seek { selector, seconds }
            | ActionKind::Play { selector, seconds }
            | ActionKind::Pause { selector, seconds }
            | ActionKind::Watch { selector, seconds } => {
                (selector.clone(), Some(json!(seconds)))
            }
            ActionKind::OtpCheckpoint { prompt } => (None, Some(Value::String(prompt.clone()))),
        };

        WireAction {
            index: action.index,
            action_type: action.kind.name().to_string(),
            selector,
            value,
            hints: action.hints,
            url: action.url,
        }
    }
}

impl TryFrom<WireAction> for Action {
    type Error = ActionDecodeError;

    fn try_from(wire: WireAction) -> Result<Self, Self::Error> {
        let index = wire.index;
        let kind_name = wire.action_type.as_str();

        let selector = || -> Result<String, ActionDecodeError> {
            wire.selector
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or(ActionDecodeError::MissingSelector {
                    kind: kind_name.to_string(),
                    index,
                })
        };
        let string_value = || -> Result<String, ActionDecodeError> {
            match &wire.value {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                other => Err(ActionDecodeError::BadValue {
                    kind: kind_name.to_string(),
                    index,
                    detail: format!("expected a string, got {other:?}"),
                }),
            }
        };
        let seconds_value = || -> Result<f64, ActionDecodeError> {
            wire.value
                .as_ref()
                .and_then(|v| v.as_f64())
                .ok_or(ActionDecodeError::BadValue {
                    kind: kind_name.to_string(),
                    index,
                    detail: "expected a number of seconds".to_string(),
                })
        };
        // Media selectors are optional but never a sentinel.
        let media_selector = || wire.selector.clone().filter(|s| !s.is_empty());

        let kind = match kind_name {
            "click" => ActionKind::Click {
                selector: selector()?,
            },
            "type" => ActionKind::TypeText {
                selector: selector()?,
                value: string_value()?,
            },
            "select" => ActionKind::Select {
                selector: selector()?,
                value: string_value()?,
            },
            "check" => ActionKind::Check {
                selector: selector()?,
            },
            "uncheck" => ActionKind::Uncheck {
                selector: selector()?,
            },
            "submit" => ActionKind::Submit {
                selector: selector()?,
            },
            "navigate" => ActionKind::Navigate {
                url: match &wire.value {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    None => String::new(),
                    other => {
                        return Err(ActionDecodeError::BadValue {
                            kind: kind_name.to_string(),
                            index,
                            detail: format!("expected a URL string, got {other:?}"),
                        })
                    }
                },
            },
            "keypress" => ActionKind::Keypress {
                selector: wire
                    .selector
                    .clone()
                    .filter(|s| !s.is_empty() && s != DOCUMENT_SENTINEL),
                key: string_value()?,
            },
            "scroll" => {
                let target = wire
                    .selector
                    .clone()
                    .filter(|s| !s.is_empty() && s != WINDOW_SENTINEL);
                let (x, y) = match &wire.value {
                    Some(serde_json::Value::Object(map)) => (
                        map.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0),
                        map.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0),
                    ),
                    other => {
                        return Err(ActionDecodeError::BadValue {
                            kind: kind_name.to_string(),
                            index,
                            detail: format!("expected {{x, y}} coordinates, got {other:?}"),
                        })
                    }
                };
                ActionKind::Scroll {
                    selector: target,
                    x,
                    y,
                }
            }
            "seek" => ActionKind::Seek {
                selector: media_selector(),
                seconds: seconds_value()?,
            },
            "play" => ActionKind::Play {
                selector: media_selector(),
                seconds: seconds_value()?,
            },
            "pause" => ActionKind::Pause {
                selector: media_selector(),
                seconds: seconds_value()?,
            },
            "watch" => ActionKind::Watch {
                selector: media_selector(),
                seconds: seconds_value()?,
            },
            "otp_checkpoint" => ActionKind::OtpCheckpoint {
                prompt: string_value()?,
            },
            other => return Err(ActionDecodeError::UnknownType(other.to_string())),
        };

        Ok(Action {
            index,
            kind,
            hints: wire.hints,
            url: wire.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(action: &Action) -> Action {
        let encoded = serde_json::to_string(action).unwrap();
        serde_json::from_str(&encoded).unwrap()
    }

    #[test]
    fn click_roundtrips_with_camel_case_hints() {
        let action = Action::new(
            0,
            ActionKind::Click {
                selector: "#login".to_string(),
            },
            ElementHints {
                display_name: Some("Log in".to_string()),
                aria_label: Some("Log in".to_string()),
                data_test_id: Some("login-button".to_string()),
                tag_name: Some("button".to_string()),
                ..Default::default()
            },
            "https://example.com/",
        );

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "click");
        assert_eq!(value["selector"], "#login");
        assert_eq!(value["ariaLabel"], "Log in");
        assert_eq!(value["dataTestId"], "login-button");
        assert_eq!(value["tagName"], "button");
        assert_eq!(value["displayName"], "Log in");
        assert!(value.get("text").is_none(), "empty hints are omitted");

        assert_eq!(roundtrip(&action), action);
    }

    #[test]
    fn scroll_window_uses_sentinel_selector() {
        let action = Action::new(
            3,
            ActionKind::Scroll {
                selector: None,
                x: 0.0,
                y: 640.0,
            },
            ElementHints::default(),
            "https://example.com/feed",
        );

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["selector"], "window");
        assert_eq!(value["value"]["y"], 640.0);

        let decoded = roundtrip(&action);
        assert_eq!(
            decoded.kind,
            ActionKind::Scroll {
                selector: None,
                x: 0.0,
                y: 640.0
            }
        );
    }

    #[test]
    fn keypress_document_uses_sentinel_selector() {
        let action = Action::new(
            1,
            ActionKind::Keypress {
                selector: None,
                key: "Escape".to_string(),
            },
            ElementHints::default(),
            "https://example.com/",
        );

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["selector"], "document");
        assert_eq!(roundtrip(&action).kind, action.kind);
    }

    #[test]
    fn check_and_uncheck_carry_boolean_values() {
        let check = Action::new(
            0,
            ActionKind::Check {
                selector: "#subscribe".to_string(),
            },
            ElementHints::default(),
            "https://example.com/",
        );
        let value = serde_json::to_value(&check).unwrap();
        assert_eq!(value["value"], true);

        let uncheck = Action::new(
            1,
            ActionKind::Uncheck {
                selector: "#subscribe".to_string(),
            },
            ElementHints::default(),
            "https://example.com/",
        );
        let value = serde_json::to_value(&uncheck).unwrap();
        assert_eq!(value["value"], false);
        assert_eq!(roundtrip(&uncheck).kind, uncheck.kind);
    }

    #[test]
    fn unknown_action_type_is_rejected() {
        let wire = json!({
            "index": 0,
            "type": "hover",
            "selector": "#menu",
            "value": null,
            "url": "https://example.com/"
        });
        let err = serde_json::from_value::<Action>(wire).unwrap_err();
        assert!(err.to_string().contains("unknown action type"));
    }

    #[test]
    fn click_without_selector_is_rejected() {
        let wire = json!({
            "index": 2,
            "type": "click",
            "selector": null,
            "value": null,
            "url": "https://example.com/"
        });
        let err = serde_json::from_value::<Action>(wire).unwrap_err();
        assert!(err.to_string().contains("missing a selector"));
    }

    #[test]
    fn otp_checkpoint_has_null_selector_and_prompt_value() {
        let action = Action::new(
            4,
            ActionKind::OtpCheckpoint {
                prompt: "Enter your 6-digit OTP".to_string(),
            },
            ElementHints::default(),
            "https://example.com/verify",
        );

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value["type"], "otp_checkpoint");
        assert_eq!(value["selector"], serde_json::Value::Null);
        assert_eq!(value["value"], "Enter your 6-digit OTP");
        assert_eq!(roundtrip(&action), action);
    }

    #[test]
    fn media_action_without_selector_stays_selectorless() {
        let wire = json!({
            "index": 7,
            "type": "play",
            "selector": null,
            "value": 12.5,
            "url": "https://example.com/watch"
        });
        let action: Action = serde_json::from_value(wire).unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Play {
                selector: None,
                seconds: 12.5
            }
        );
    }
}
