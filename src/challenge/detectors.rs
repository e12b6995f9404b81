use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::browser::dom::NodeSnapshot;
use crate::browser::driver::{DynPage, SelectorKind};
use crate::error::EngineResult;

/// The two verification challenges the engine knows how to wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Pin,
    Otp,
}

impl fmt::Display for ChallengeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeKind::Pin => write!(f, "PIN"),
            ChallengeKind::Otp => write!(f, "OTP"),
        }
    }
}

const OTP_PHRASES: &[&str] = &[
    r"one[ -]?time (?:passcode|password|code)",
    r"verification code",
    r"enter (?:the|your) .{0,20}code",
    r"security code",
    r"2-step verification",
    r"two[ -]?factor",
    r"code (?:was |has been )?sent",
];

const PIN_PHRASES: &[&str] = &[
    r"enter (?:your |a )?pin",
    r"security pin",
    r"pin code",
    r"\d-digit pin",
    r"create (?:a |your )?pin",
];

/// Page-content heuristics for PIN dialogs and OTP pages.
///
/// A marker phrase alone is not enough for the OTP case; pages mention
/// verification codes in copy all the time. The detector also wants to see
/// somewhere to put a code, or a verify control next to the phrase.
pub struct ChallengeDetector {
    otp_set: RegexSet,
    otp_patterns: Vec<Regex>,
    pin_set: RegexSet,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        // the built-in phrase lists are valid patterns
        Self::new(OTP_PHRASES, PIN_PHRASES).unwrap_or_else(|_| unreachable!())
    }
}

impl ChallengeDetector {
    pub fn new(otp_phrases: &[&str], pin_phrases: &[&str]) -> Result<Self, regex::Error> {
        let ci = |p: &&str| format!("(?i){p}");
        Ok(Self {
            otp_set: RegexSet::new(otp_phrases.iter().map(ci))?,
            otp_patterns: otp_phrases
                .iter()
                .map(|p| Regex::new(&ci(p)))
                .collect::<Result<_, _>>()?,
            pin_set: RegexSet::new(pin_phrases.iter().map(ci))?,
        })
    }

    /// Whether the page currently shows an OTP entry step. Returns the
    /// prompt line for checkpoint labelling.
    pub async fn otp_page(&self, page: &DynPage) -> EngineResult<Option<String>> {
        let text = page.visible_text().await?;
        if !self.otp_set.is_match(&text) {
            return Ok(None);
        }

        let inputs = page.query(SelectorKind::Css, "input").await?;
        let has_entry =
            inputs.iter().any(is_code_input) || count_digit_boxes(&inputs) >= 4;

        let has_verify = if has_entry {
            true
        } else {
            let mut controls = page.query(SelectorKind::Css, "button").await?;
            controls.extend(page.query(SelectorKind::Css, "[role=\"button\"]").await?);
            controls.extend(inputs.iter().cloned());
            controls.iter().any(is_verify_control)
        };

        if !has_verify {
            return Ok(None);
        }

        Ok(Some(self.otp_prompt(&text)))
    }

    /// Whether a visible dialog is asking for a PIN.
    pub async fn pin_dialog(&self, page: &DynPage) -> EngineResult<bool> {
        for selector in ["[role=\"dialog\"]", "dialog", ".modal"] {
            let dialogs = page.query(SelectorKind::Css, selector).await?;
            for dialog in dialogs {
                if !dialog.visible {
                    continue;
                }
                if let Some(text) = dialog.text.as_deref() {
                    if self.pin_set.is_match(text) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// The line of page text the first marker matched on, trimmed for use as
    /// a checkpoint prompt.
    fn otp_prompt(&self, text: &str) -> String {
        for line in text.lines() {
            if self.otp_patterns.iter().any(|p| p.is_match(line)) {
                let trimmed = line.trim();
                let prompt: String = trimmed.chars().take(80).collect();
                if !prompt.is_empty() {
                    return prompt;
                }
            }
        }
        "Enter the verification code".to_string()
    }
}

/// A consolidated code field: `autocomplete="one-time-code"`, an otp-ish
/// id/name/label, or a short numeric input.
pub fn is_code_input(node: &NodeSnapshot) -> bool {
    if !node.visible || !node.is_text_entry() {
        return false;
    }
    if node.autocomplete.as_deref() == Some("one-time-code") {
        return true;
    }
    let labels = [
        node.id.as_deref(),
        node.name.as_deref(),
        node.placeholder.as_deref(),
        node.aria_label.as_deref(),
    ];
    if labels.iter().flatten().any(|value| {
        let value = value.to_lowercase();
        value.contains("otp")
            || value.contains("passcode")
            || value.contains("token")
            || (value.contains("code") && !value.contains("postcode") && !value.contains("zip"))
    }) {
        return true;
    }
    matches!(node.input_type.as_deref(), Some("tel") | Some("number"))
        && node.max_length.is_some_and(|m| (4..=8).contains(&m))
}

/// One box of a split per-digit code entry: a tiny single-character input.
pub fn is_digit_box(node: &NodeSnapshot) -> bool {
    if !node.visible || node.tag != "input" {
        return false;
    }
    let single_char = node.max_length.is_some_and(|m| (1..=2).contains(&m));
    let narrow = node.width > 0.0 && node.width < 60.0;
    let code_classed = node.class_name.as_deref().is_some_and(|class| {
        let class = class.to_lowercase();
        ["otp", "code", "digit", "pin"]
            .iter()
            .any(|k| class.contains(k))
    });
    single_char || (narrow && code_classed)
}

pub fn count_digit_boxes(nodes: &[NodeSnapshot]) -> usize {
    nodes.iter().filter(|n| is_digit_box(n)).count()
}

/// A control that would submit a challenge: a visible button-ish element
/// labelled verify/confirm/continue and the like.
pub fn is_verify_control(node: &NodeSnapshot) -> bool {
    if !node.visible {
        return false;
    }
    let button_like = node.tag == "button"
        || node.role.as_deref() == Some("button")
        || (node.tag == "input"
            && matches!(node.input_type.as_deref(), Some("submit") | Some("button")));
    if !button_like {
        return false;
    }
    node.label_text().is_some_and(|label| {
        let label = label.trim().to_lowercase();
        ["verify", "confirm", "continue", "submit", "next", "send", "done"]
            .iter()
            .any(|k| label.starts_with(k))
    })
}
