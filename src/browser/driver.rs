use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::dom::{NodeId, NodeSnapshot};
use crate::error::EngineResult;
use crate::models::event::PageEvent;

/// How a selector expression should be evaluated against the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    Xpath,
}

impl SelectorKind {
    /// Recorded selectors carry no explicit kind; XPath is recognized by
    /// shape (`/`, `//` or a grouped `(/` prefix), everything else is CSS.
    pub fn detect(expr: &str) -> Self {
        if expr.starts_with('/') || expr.starts_with("(/") {
            SelectorKind::Xpath
        } else {
            SelectorKind::Css
        }
    }
}

/// Playback state of a media element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaState {
    pub playing: bool,
    pub muted: bool,
    pub current_time: f64,
    pub ended: bool,
}

/// Everything the engine needs from a live page, behind one seam.
///
/// The recorder, resolver, player and challenge detectors are written
/// against this trait only; the CDP implementation lives in
/// [`super::cdp::CdpPage`] and tests swap in a scripted fake. Node ids are
/// scoped to the implementation and go stale on navigation.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Current `location.href`.
    async fn url(&self) -> EngineResult<String>;

    async fn navigate(&self, url: &str) -> EngineResult<()>;

    /// Whether the document has reached `readyState === "complete"`.
    async fn document_complete(&self) -> EngineResult<bool>;

    /// Milliseconds since the last DOM mutation the page observer saw, or
    /// `None` when no probe data is available (treated as quiet).
    async fn ms_since_last_mutation(&self) -> EngineResult<Option<u64>>;

    /// Evaluates a selector and snapshots every match, registering each node
    /// for later operations.
    async fn query(&self, kind: SelectorKind, expr: &str) -> EngineResult<Vec<NodeSnapshot>>;

    /// Full visible text of the page body.
    async fn visible_text(&self) -> EngineResult<String>;

    /// Starts forwarding capture events; installing the listeners twice on
    /// one page is a no-op on the page side. Can only be taken once per
    /// driver instance.
    async fn start_capture(&self) -> EngineResult<mpsc::UnboundedReceiver<PageEvent>>;

    async fn scroll_into_view(&self, node: NodeId) -> EngineResult<()>;

    /// Draws a transient outline around the node. Best-effort.
    async fn highlight(&self, node: NodeId) -> EngineResult<()>;

    async fn click(&self, node: NodeId) -> EngineResult<()>;

    async fn focus(&self, node: NodeId) -> EngineResult<()>;

    /// Replaces the node's value and fires `input` and `change`, the way a
    /// framework-bound field expects.
    async fn set_text(&self, node: NodeId, value: &str) -> EngineResult<()>;

    async fn set_checked(&self, node: NodeId, checked: bool) -> EngineResult<()>;

    /// Selects the option with the given value and fires `change`.
    async fn select_option(&self, node: NodeId, value: &str) -> EngineResult<()>;

    /// Native form submission (`requestSubmit`).
    async fn submit(&self, node: NodeId) -> EngineResult<()>;

    /// Dispatches a key press on the node, or on the document when `node`
    /// is `None`.
    async fn press_key(&self, node: Option<NodeId>, key: &str) -> EngineResult<()>;

    /// Scrolls the node, or the window when `node` is `None`, to the given
    /// offsets.
    async fn scroll_to(&self, node: Option<NodeId>, x: f64, y: f64) -> EngineResult<()>;

    /// State of the media element matching `selector`, falling back to the
    /// first video on the page. `None` when there is no media element.
    async fn media_state(&self, selector: Option<&str>) -> EngineResult<Option<MediaState>>;

    async fn media_seek(&self, selector: Option<&str>, seconds: f64) -> EngineResult<()>;

    /// Attempts to start playback. Returns `false` when the page refused
    /// (autoplay policy); callers retry muted or fall back to the controls.
    async fn media_play(&self, selector: Option<&str>, muted: bool) -> EngineResult<bool>;

    async fn media_pause(&self, selector: Option<&str>) -> EngineResult<()>;

    async fn close(&self);
}

/// Shared handle to a page driver.
pub type DynPage = Arc<dyn PageDriver>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_kind_detection_follows_prefix_shape() {
        assert_eq!(SelectorKind::detect("/html/body/div[2]"), SelectorKind::Xpath);
        assert_eq!(SelectorKind::detect("//button[@id='go']"), SelectorKind::Xpath);
        assert_eq!(SelectorKind::detect("(//input)[1]"), SelectorKind::Xpath);
        assert_eq!(SelectorKind::detect("#login"), SelectorKind::Css);
        assert_eq!(SelectorKind::detect("button.primary"), SelectorKind::Css);
        assert_eq!(
            SelectorKind::detect("[data-testid=\"send\"]"),
            SelectorKind::Css
        );
    }
}
