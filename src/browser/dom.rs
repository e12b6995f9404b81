use serde::{Deserialize, Serialize};

/// Driver-scoped handle for a DOM node. Valid until the page navigates;
/// operations on a stale id fail and callers re-resolve.
pub type NodeId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Point-in-time description of one DOM node, as reported by the page.
///
/// This is the only view of the page the resolver and the challenge
/// detectors get; everything they decide is decided on these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSnapshot {
    pub node: NodeId,
    /// Lowercase tag name.
    pub tag: String,
    pub id: Option<String>,
    pub text: Option<String>,
    pub name: Option<String>,
    pub aria_label: Option<String>,
    pub data_test_id: Option<String>,
    pub role: Option<String>,
    pub input_type: Option<String>,
    pub class_name: Option<String>,
    pub placeholder: Option<String>,
    pub autocomplete: Option<String>,
    pub max_length: Option<i64>,
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub visible: bool,
    pub disabled: bool,
    pub in_viewport: bool,
    pub width: f64,
    pub height: f64,
}

impl NodeSnapshot {
    pub fn has_size(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Accepts typed text: text-ish inputs, textareas, contenteditable
    /// (reported by the page with role `textbox`).
    pub fn is_text_entry(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => !matches!(
                self.input_type.as_deref(),
                Some(
                    "checkbox" | "radio" | "button" | "submit" | "reset" | "file" | "image"
                        | "range" | "color" | "hidden"
                )
            ),
            _ => self.role.as_deref() == Some("textbox"),
        }
    }

    pub fn is_checkbox(&self) -> bool {
        self.tag == "input" && self.input_type.as_deref() == Some("checkbox")
    }

    pub fn is_radio(&self) -> bool {
        self.tag == "input" && self.input_type.as_deref() == Some("radio")
    }

    pub fn is_checkable(&self) -> bool {
        self.is_checkbox() || self.is_radio()
    }

    pub fn is_select(&self) -> bool {
        self.tag == "select"
    }

    pub fn is_form(&self) -> bool {
        self.tag == "form"
    }

    /// Any text the page exposes for this node, preferring visible text.
    pub fn label_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(self.aria_label.as_deref())
            .or(self.value.as_deref())
            .or(self.placeholder.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_entry_covers_inputs_textareas_and_textbox_roles() {
        let mut node = NodeSnapshot {
            tag: "input".to_string(),
            input_type: Some("email".to_string()),
            ..Default::default()
        };
        assert!(node.is_text_entry());

        node.input_type = Some("checkbox".to_string());
        assert!(!node.is_text_entry());
        assert!(node.is_checkbox());

        let textarea = NodeSnapshot {
            tag: "textarea".to_string(),
            ..Default::default()
        };
        assert!(textarea.is_text_entry());

        let editable_div = NodeSnapshot {
            tag: "div".to_string(),
            role: Some("textbox".to_string()),
            ..Default::default()
        };
        assert!(editable_div.is_text_entry());
    }

    #[test]
    fn untyped_input_counts_as_text_entry() {
        let node = NodeSnapshot {
            tag: "input".to_string(),
            input_type: None,
            ..Default::default()
        };
        assert!(node.is_text_entry(), "inputs default to type=text");
    }
}
