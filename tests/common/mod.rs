//! Shared test doubles for driving the engine without a browser: a scripted
//! page driver, a progress sink that collects events, and a canned code
//! lookup.

#![allow(dead_code)] // shared across test binaries; each uses a subset

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use recplay::browser::{MediaState, NodeId, NodeSnapshot, PageDriver, SelectorKind};
use recplay::error::{EngineError, EngineResult};
use recplay::models::PageEvent;
use recplay::notify::{ProgressEvent, ProgressSink};
use recplay::otp::{OtpLookup, OtpOutcome};

type SetTextHook = Box<dyn Fn(NodeId, &str) -> Option<String> + Send>;

/// Scripted page: queries answer from a registry keyed by the exact selector
/// expression, every driver call lands in an operation log, and tests mutate
/// the page (text, nodes, media) mid-flight to simulate what a live site
/// would do.
pub struct FakePage {
    url: Mutex<String>,
    body_text: Mutex<String>,
    nodes: Mutex<HashMap<String, Vec<NodeSnapshot>>>,
    media: Mutex<Option<MediaState>>,
    document_complete: AtomicBool,
    quiet_ms: Mutex<Option<u64>>,
    ops: Mutex<Vec<String>>,
    events_tx: mpsc::UnboundedSender<PageEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<PageEvent>>>,
    failing_queries: Mutex<HashSet<String>>,
    interrupt_clicks: Mutex<HashSet<NodeId>>,
    refuse_unmuted_play: AtomicBool,
    on_set_text: Mutex<Option<SetTextHook>>,
}

impl FakePage {
    pub fn new(url: &str) -> Arc<FakePage> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(FakePage {
            url: Mutex::new(url.to_string()),
            body_text: Mutex::new(String::new()),
            nodes: Mutex::new(HashMap::new()),
            media: Mutex::new(None),
            document_complete: AtomicBool::new(true),
            quiet_ms: Mutex::new(None),
            ops: Mutex::new(Vec::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            failing_queries: Mutex::new(HashSet::new()),
            interrupt_clicks: Mutex::new(HashSet::new()),
            refuse_unmuted_play: AtomicBool::new(false),
            on_set_text: Mutex::new(None),
        })
    }

    /// Registers the nodes a query for `expr` returns, replacing any earlier
    /// registration for the same expression.
    pub fn set_nodes(&self, expr: &str, nodes: Vec<NodeSnapshot>) {
        self.nodes.lock().unwrap().insert(expr.to_string(), nodes);
    }

    pub fn clear_nodes(&self, expr: &str) {
        self.nodes.lock().unwrap().remove(expr);
    }

    pub fn set_body_text(&self, text: &str) {
        *self.body_text.lock().unwrap() = text.to_string();
    }

    pub fn set_media(&self, state: Option<MediaState>) {
        *self.media.lock().unwrap() = state;
    }

    pub fn set_document_complete(&self, complete: bool) {
        self.document_complete.store(complete, Ordering::SeqCst);
    }

    pub fn set_quiet_ms(&self, ms: Option<u64>) {
        *self.quiet_ms.lock().unwrap() = ms;
    }

    /// Makes queries for `expr` fail like a malformed selector would.
    pub fn fail_query(&self, expr: &str) {
        self.failing_queries.lock().unwrap().insert(expr.to_string());
    }

    /// Makes a click on `node` tear down the execution context, the way a
    /// link click does on a real page.
    pub fn interrupt_click_on(&self, node: NodeId) {
        self.interrupt_clicks.lock().unwrap().insert(node);
    }

    pub fn refuse_unmuted_play(&self) {
        self.refuse_unmuted_play.store(true, Ordering::SeqCst);
    }

    /// Runs `hook` on every `set_text`; a `Some` return replaces the page's
    /// visible body text, simulating the page reacting to the input.
    pub fn on_set_text(&self, hook: impl Fn(NodeId, &str) -> Option<String> + Send + 'static) {
        *self.on_set_text.lock().unwrap() = Some(Box::new(hook));
    }

    /// Pushes a capture event into the stream `start_capture` handed out.
    pub fn emit(&self, event: PageEvent) {
        let _ = self.events_tx.send(event);
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Log entries starting with `prefix`, for asserting on one operation
    /// kind without caring about the rest.
    pub fn ops_with(&self, prefix: &str) -> Vec<String> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|op| op.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn log(&self, entry: String) {
        self.ops.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn url(&self) -> EngineResult<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn navigate(&self, url: &str) -> EngineResult<()> {
        self.log(format!("navigate {url}"));
        *self.url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn document_complete(&self) -> EngineResult<bool> {
        Ok(self.document_complete.load(Ordering::SeqCst))
    }

    async fn ms_since_last_mutation(&self) -> EngineResult<Option<u64>> {
        Ok(*self.quiet_ms.lock().unwrap())
    }

    async fn query(&self, _kind: SelectorKind, expr: &str) -> EngineResult<Vec<NodeSnapshot>> {
        if self.failing_queries.lock().unwrap().contains(expr) {
            return Err(EngineError::Driver(anyhow::anyhow!(
                "selector failed to evaluate: {expr}"
            )));
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .get(expr)
            .cloned()
            .unwrap_or_default())
    }

    async fn visible_text(&self) -> EngineResult<String> {
        Ok(self.body_text.lock().unwrap().clone())
    }

    async fn start_capture(&self) -> EngineResult<mpsc::UnboundedReceiver<PageEvent>> {
        self.events_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| EngineError::Driver(anyhow::anyhow!("capture already started")))
    }

    async fn scroll_into_view(&self, node: NodeId) -> EngineResult<()> {
        self.log(format!("scroll_into_view {node}"));
        Ok(())
    }

    async fn highlight(&self, node: NodeId) -> EngineResult<()> {
        self.log(format!("highlight {node}"));
        Ok(())
    }

    async fn click(&self, node: NodeId) -> EngineResult<()> {
        self.log(format!("click {node}"));
        if self.interrupt_clicks.lock().unwrap().contains(&node) {
            return Err(EngineError::NavigationInterrupted);
        }
        Ok(())
    }

    async fn focus(&self, node: NodeId) -> EngineResult<()> {
        self.log(format!("focus {node}"));
        Ok(())
    }

    async fn set_text(&self, node: NodeId, value: &str) -> EngineResult<()> {
        self.log(format!("set_text {node} {value}"));
        let replacement = {
            let hook = self.on_set_text.lock().unwrap();
            hook.as_ref().and_then(|h| h(node, value))
        };
        if let Some(text) = replacement {
            *self.body_text.lock().unwrap() = text;
        }
        Ok(())
    }

    async fn set_checked(&self, node: NodeId, checked: bool) -> EngineResult<()> {
        self.log(format!("set_checked {node} {checked}"));
        Ok(())
    }

    async fn select_option(&self, node: NodeId, value: &str) -> EngineResult<()> {
        self.log(format!("select_option {node} {value}"));
        Ok(())
    }

    async fn submit(&self, node: NodeId) -> EngineResult<()> {
        self.log(format!("submit {node}"));
        Ok(())
    }

    async fn press_key(&self, node: Option<NodeId>, key: &str) -> EngineResult<()> {
        match node {
            Some(node) => self.log(format!("press_key {node} {key}")),
            None => self.log(format!("press_key document {key}")),
        }
        Ok(())
    }

    async fn scroll_to(&self, node: Option<NodeId>, x: f64, y: f64) -> EngineResult<()> {
        match node {
            Some(node) => self.log(format!("scroll_to {node} {x} {y}")),
            None => self.log(format!("scroll_to window {x} {y}")),
        }
        Ok(())
    }

    async fn media_state(&self, _selector: Option<&str>) -> EngineResult<Option<MediaState>> {
        Ok(*self.media.lock().unwrap())
    }

    async fn media_seek(&self, _selector: Option<&str>, seconds: f64) -> EngineResult<()> {
        self.log(format!("media_seek {seconds}"));
        if let Some(state) = self.media.lock().unwrap().as_mut() {
            state.current_time = seconds;
        }
        Ok(())
    }

    async fn media_play(&self, _selector: Option<&str>, muted: bool) -> EngineResult<bool> {
        self.log(format!("media_play muted={muted}"));
        if self.refuse_unmuted_play.load(Ordering::SeqCst) && !muted {
            return Ok(false);
        }
        if let Some(state) = self.media.lock().unwrap().as_mut() {
            state.playing = true;
            state.muted = muted;
        }
        Ok(true)
    }

    async fn media_pause(&self, _selector: Option<&str>) -> EngineResult<()> {
        self.log("media_pause".to_string());
        if let Some(state) = self.media.lock().unwrap().as_mut() {
            state.playing = false;
        }
        Ok(())
    }

    async fn close(&self) {
        self.log("close".to_string());
    }
}

/// A visible, in-viewport node with a sensible box; tests override fields
/// from here.
pub fn node(id: NodeId, tag: &str) -> NodeSnapshot {
    NodeSnapshot {
        node: id,
        tag: tag.to_string(),
        visible: true,
        in_viewport: true,
        width: 200.0,
        height: 32.0,
        ..Default::default()
    }
}

pub fn button(id: NodeId, label: &str) -> NodeSnapshot {
    let mut n = node(id, "button");
    n.text = Some(label.to_string());
    n
}

pub fn text_input(id: NodeId) -> NodeSnapshot {
    let mut n = node(id, "input");
    n.input_type = Some("text".to_string());
    n
}

/// A consolidated one-time-code entry field.
pub fn code_input(id: NodeId) -> NodeSnapshot {
    let mut n = text_input(id);
    n.autocomplete = Some("one-time-code".to_string());
    n
}

pub fn dialog(id: NodeId, text: &str) -> NodeSnapshot {
    let mut n = node(id, "div");
    n.role = Some("dialog".to_string());
    n.text = Some(text.to_string());
    n
}

/// Progress sink that keeps every event for later assertions.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<CollectingSink> {
        Arc::new(CollectingSink::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Wire names of the collected events, in emission order.
    pub fn event_names(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| {
                serde_json::to_value(event).unwrap()["event"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    pub fn finished_outcomes(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Finished { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect()
    }

    pub fn failed_indices(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::ActionFailed { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }

    pub fn completed_indices(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::ActionCompleted { index, .. } => Some(index),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for CollectingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Code lookup with a fixed answer; records the terms of every call.
pub struct StubLookup {
    outcome: OtpOutcome,
    calls: Mutex<Vec<Vec<String>>>,
}

impl StubLookup {
    pub fn finds(code: &str) -> Arc<StubLookup> {
        Arc::new(StubLookup {
            outcome: OtpOutcome::found(code),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn misses(reason: &str) -> Arc<StubLookup> {
        Arc::new(StubLookup {
            outcome: OtpOutcome::not_found(reason),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Terms of every lookup made so far.
    pub fn seen(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OtpLookup for StubLookup {
    async fn lookup(&self, terms: &[String]) -> anyhow::Result<OtpOutcome> {
        self.calls.lock().unwrap().push(terms.to_vec());
        Ok(self.outcome.clone())
    }
}
