use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace};

use super::wait::{poll_until, CancelToken, PollError, PollOptions};
use crate::browser::dom::NodeSnapshot;
use crate::browser::driver::{DynPage, SelectorKind};
use crate::error::{EngineError, EngineResult};
use crate::models::action::ElementHints;

/// Fallback text strategies only make sense for short recorded text; long
/// text is layout noise, not identity.
const MAX_HINT_TEXT: usize = 100;
/// How much of the recorded text goes into a generated XPath.
const XPATH_TEXT_PREFIX: usize = 50;

const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub timeout: Duration,
    pub interval: Duration,
    /// Pause after scrolling an off-screen element into view.
    pub settle: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            interval: Duration::from_millis(50),
            settle: Duration::from_millis(300),
        }
    }
}

impl ResolveOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
struct Strategy {
    kind: SelectorKind,
    expr: String,
    name: &'static str,
}

/// Multi-strategy element resolver.
///
/// Tries the recorded primary selector first, then derived fallbacks in a
/// fixed order, re-running the whole ladder on a short cadence until the
/// timeout. A candidate is only accepted when it is visible and matches the
/// recorded metadata, so a stale primary selector cannot silently land on
/// the wrong element.
pub struct Resolver {
    page: DynPage,
}

impl Resolver {
    pub fn new(page: DynPage) -> Self {
        Self { page }
    }

    /// Resolves to the first acceptable candidate.
    pub async fn resolve(
        &self,
        selector: &str,
        hints: &ElementHints,
        options: &ResolveOptions,
        cancel: &CancelToken,
    ) -> EngineResult<NodeSnapshot> {
        self.resolve_where(selector, hints, options, cancel, |_| true)
            .await
    }

    /// Resolves to a candidate that is also ready to receive the action:
    /// enabled and laid out with a nonzero box. Off-viewport candidates are
    /// scrolled to the viewport center and given a settle delay.
    pub async fn resolve_interactable(
        &self,
        selector: &str,
        hints: &ElementHints,
        options: &ResolveOptions,
        cancel: &CancelToken,
    ) -> EngineResult<NodeSnapshot> {
        let snapshot = self
            .resolve_where(selector, hints, options, cancel, |candidate| {
                !candidate.disabled && candidate.has_size()
            })
            .await?;

        if !snapshot.in_viewport {
            trace!(selector, node = snapshot.node, "scrolling target into view");
            self.page.scroll_into_view(snapshot.node).await?;
            sleep(options.settle).await;
        }

        Ok(snapshot)
    }

    async fn resolve_where(
        &self,
        selector: &str,
        hints: &ElementHints,
        options: &ResolveOptions,
        cancel: &CancelToken,
        extra: impl Fn(&NodeSnapshot) -> bool + Send + Sync,
    ) -> EngineResult<NodeSnapshot> {
        let strategies = Arc::new(build_strategies(selector, hints));
        let hints = Arc::new(hints.clone());
        let page = self.page.clone();
        let extra = &extra;

        let result = poll_until(
            PollOptions::new(options.interval, options.timeout),
            cancel,
            move || {
                let strategies = strategies.clone();
                let hints = hints.clone();
                let page = page.clone();
                async move {
                    for strategy in strategies.iter() {
                        let candidates = match page.query(strategy.kind, &strategy.expr).await {
                            Ok(candidates) => candidates,
                            // A malformed generated selector must not sink
                            // the remaining strategies.
                            Err(EngineError::Driver(err)) => {
                                trace!(strategy = strategy.name, error = %err, "strategy query failed");
                                continue;
                            }
                            Err(err) => return Err(err),
                        };
                        for candidate in candidates {
                            if accept(&candidate, &hints) && extra(&candidate) {
                                trace!(
                                    strategy = strategy.name,
                                    node = candidate.node,
                                    "candidate accepted"
                                );
                                return Ok(Some(candidate));
                            }
                        }
                    }
                    Ok(None)
                }
            },
        )
        .await;

        match result {
            Ok(snapshot) => {
                debug!(selector, node = snapshot.node, "element resolved");
                Ok(snapshot)
            }
            Err(PollError::TimedOut(timeout)) => Err(EngineError::ElementNotFound {
                selector: selector.to_string(),
                timeout,
            }),
            Err(PollError::Cancelled) => Err(EngineError::Cancelled),
            Err(PollError::Failed(err)) => Err(err),
        }
    }
}

/// Builds the ordered strategy ladder for one action. The primary selector
/// always comes first; fallbacks exist only where the recording captured the
/// metadata they need.
fn build_strategies(selector: &str, hints: &ElementHints) -> Vec<Strategy> {
    let mut strategies = vec![Strategy {
        kind: SelectorKind::detect(selector),
        expr: selector.to_string(),
        name: "primary",
    }];

    if let Some(test_id) = hints.data_test_id.as_deref().filter(|v| !v.is_empty()) {
        strategies.push(Strategy {
            kind: SelectorKind::Css,
            expr: format!("[data-testid=\"{}\"]", css_attr_value(test_id)),
            name: "data-testid",
        });
    }

    if let Some(label) = hints.aria_label.as_deref().filter(|v| !v.is_empty()) {
        strategies.push(Strategy {
            kind: SelectorKind::Css,
            expr: format!("[aria-label=\"{}\"]", css_attr_value(label)),
            name: "aria-label",
        });
    }

    let short_text = hints
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.chars().count() < MAX_HINT_TEXT);

    if let (Some(text), Some(tag)) = (short_text, hints.tag_name.as_deref()) {
        strategies.push(Strategy {
            kind: SelectorKind::Xpath,
            expr: format!(
                "//{}[contains(translate(., '{UPPER}', '{LOWER}'), {})]",
                tag.to_lowercase(),
                xpath_literal(&text_prefix(text).to_lowercase())
            ),
            name: "tag-text",
        });
    }

    if let (Some(text), Some(role)) = (short_text, hints.role.as_deref()) {
        strategies.push(Strategy {
            kind: SelectorKind::Xpath,
            expr: format!(
                "//*[@role={} and contains(translate(., '{UPPER}', '{LOWER}'), {})]",
                xpath_literal(role),
                xpath_literal(&text_prefix(text).to_lowercase())
            ),
            name: "role-text",
        });
    }

    strategies
}

/// Visibility plus metadata agreement. Text matches as a case-insensitive
/// substring in either direction, so both a trimmed recording and a grown
/// live label pass.
fn accept(candidate: &NodeSnapshot, hints: &ElementHints) -> bool {
    if !candidate.visible {
        return false;
    }

    if let Some(tag) = hints.tag_name.as_deref() {
        if !candidate.tag.eq_ignore_ascii_case(tag) {
            return false;
        }
    }

    let expected_text = hints
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && t.chars().count() < MAX_HINT_TEXT);
    if let Some(expected) = expected_text {
        let expected = expected.to_lowercase();
        let got = candidate
            .text
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .to_lowercase();
        if got.is_empty() {
            return false;
        }
        if !got.contains(&expected) && !expected.contains(&got) {
            return false;
        }
    }

    if let Some(name) = hints.name.as_deref() {
        if candidate.name.as_deref() != Some(name) {
            return false;
        }
    }

    true
}

fn text_prefix(text: &str) -> String {
    text.chars().take(XPATH_TEXT_PREFIX).collect()
}

/// Value for a double-quoted CSS attribute selector.
fn css_attr_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// XPath 1.0 has no string escapes; mixed-quote text needs a concat() form.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value.split('\'').map(|part| format!("'{part}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hints() -> ElementHints {
        ElementHints {
            display_name: Some("Send".to_string()),
            text: Some("Send".to_string()),
            aria_label: Some("Send message".to_string()),
            data_test_id: Some("send-btn".to_string()),
            role: Some("button".to_string()),
            tag_name: Some("button".to_string()),
            name: None,
        }
    }

    #[test]
    fn strategy_ladder_is_ordered_and_complete() {
        let strategies = build_strategies("#send", &hints());
        let names: Vec<&str> = strategies.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["primary", "data-testid", "aria-label", "tag-text", "role-text"]
        );
        assert_eq!(strategies[0].kind, SelectorKind::Css);
        assert_eq!(strategies[1].expr, "[data-testid=\"send-btn\"]");
        assert_eq!(strategies[2].expr, "[aria-label=\"Send message\"]");
        assert_eq!(strategies[3].kind, SelectorKind::Xpath);
        assert!(strategies[3].expr.starts_with("//button[contains("));
    }

    #[test]
    fn xpath_primary_selector_is_detected() {
        let strategies = build_strategies("/html/body/div[2]/button", &ElementHints::default());
        assert_eq!(strategies.len(), 1);
        assert_eq!(strategies[0].kind, SelectorKind::Xpath);
    }

    #[test]
    fn long_text_produces_no_text_strategies() {
        let mut h = hints();
        h.text = Some("x".repeat(150));
        let strategies = build_strategies("#send", &h);
        let names: Vec<&str> = strategies.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["primary", "data-testid", "aria-label"]);
    }

    #[test]
    fn acceptance_requires_visibility_and_matching_metadata() {
        let h = hints();

        let mut candidate = NodeSnapshot {
            tag: "button".to_string(),
            text: Some("Send".to_string()),
            visible: true,
            ..Default::default()
        };
        assert!(accept(&candidate, &h));

        candidate.visible = false;
        assert!(!accept(&candidate, &h));

        candidate.visible = true;
        candidate.tag = "a".to_string();
        assert!(!accept(&candidate, &h), "tag mismatch must reject");

        candidate.tag = "button".to_string();
        candidate.text = Some("Cancel".to_string());
        assert!(!accept(&candidate, &h), "text mismatch must reject");

        candidate.text = Some("send now".to_string());
        assert!(
            accept(&candidate, &h),
            "case-insensitive substring matches in either direction"
        );
    }

    #[test]
    fn acceptance_checks_name_exactly_when_recorded() {
        let h = ElementHints {
            name: Some("email".to_string()),
            ..Default::default()
        };
        let mut candidate = NodeSnapshot {
            tag: "input".to_string(),
            name: Some("email".to_string()),
            visible: true,
            ..Default::default()
        };
        assert!(accept(&candidate, &h));

        candidate.name = Some("username".to_string());
        assert!(!accept(&candidate, &h));
    }

    #[test]
    fn xpath_literals_handle_mixed_quotes() {
        assert_eq!(xpath_literal("plain"), "'plain'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal("say \"it's\""),
            "concat('say \"it', \"'\", 's\"')"
        );
    }
}
