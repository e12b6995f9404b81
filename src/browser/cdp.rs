use anyhow::anyhow;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, EvaluateParams, EventBindingCalled,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::dom::{NodeId, NodeSnapshot, Viewport};
use super::driver::{MediaState, PageDriver, SelectorKind};
use super::inject::{CAPTURE_SCRIPT, EMIT_BINDING, HELPERS_SCRIPT};
use crate::error::{EngineError, EngineResult};
use crate::models::event::PageEvent;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub url: String,
    pub headless: bool,
    pub viewport: Viewport,
}

impl LaunchOptions {
    pub fn new(url: impl Into<String>, headless: bool) -> Self {
        Self {
            url: url.into(),
            headless,
            viewport: Viewport::default(),
        }
    }
}

/// [`PageDriver`] backed by a Chromium instance over CDP.
///
/// All queries and node operations run through the helper script installed
/// for every new document, so node ids survive soft DOM churn but not
/// navigations. Capture events arrive over a CDP binding the moment the page
/// dispatches them; nothing polls.
pub struct CdpPage {
    browser: Mutex<Option<Browser>>,
    page: Page,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    capture_taken: Mutex<bool>,
}

impl CdpPage {
    /// Launches a browser, prepares the page helpers and navigates to the
    /// starting URL.
    pub async fn launch(options: &LaunchOptions) -> EngineResult<Arc<Self>> {
        let mut config = BrowserConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding");
        if !options.headless {
            config = config.with_head();
        }

        let (browser, mut handler) = Browser::launch(
            config
                .build()
                .map_err(|e| EngineError::Driver(anyhow!("browser config: {e}")))?,
        )
        .await
        .map_err(map_cdp_err)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await.map_err(map_cdp_err)?;

        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(options.viewport.width as i64)
                .height(options.viewport.height as i64)
                .device_scale_factor(1.0)
                .mobile(false)
                .build()
                .map_err(|e| EngineError::Driver(anyhow!("viewport params: {e}")))?,
        )
        .await
        .map_err(map_cdp_err)?;

        // Helpers are re-armed for every document this page loads.
        page.execute(
            AddScriptToEvaluateOnNewDocumentParams::builder()
                .source(HELPERS_SCRIPT)
                .build()
                .map_err(|e| EngineError::Driver(anyhow!("inject params: {e}")))?,
        )
        .await
        .map_err(map_cdp_err)?;

        let driver = Self {
            browser: Mutex::new(Some(browser)),
            page,
            handler_task: Mutex::new(Some(handler_task)),
            capture_taken: Mutex::new(false),
        };
        driver.eval::<serde_json::Value>(HELPERS_SCRIPT.to_string()).await?;

        info!(url = %options.url, headless = options.headless, "browser launched");
        driver.page.goto(options.url.as_str()).await.map_err(map_cdp_err)?;

        Ok(Arc::new(driver))
    }

    async fn eval<T: DeserializeOwned>(&self, expression: String) -> EngineResult<T> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| EngineError::Driver(anyhow!("evaluate params: {e}")))?;
        let result = self.page.evaluate(params).await.map_err(map_cdp_err)?;
        result
            .into_value::<T>()
            .map_err(|e| EngineError::Driver(anyhow!("unexpected evaluate result: {e}")))
    }

    async fn eval_unit(&self, expression: String) -> EngineResult<()> {
        self.eval::<serde_json::Value>(expression).await?;
        Ok(())
    }
}

/// JSON string literal safe to splice into an evaluated expression.
fn js_str(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn js_opt_str(value: Option<&str>) -> String {
    match value {
        Some(v) => js_str(v),
        None => "null".to_string(),
    }
}

fn js_opt_node(node: Option<NodeId>) -> String {
    match node {
        Some(id) => id.to_string(),
        None => "null".to_string(),
    }
}

fn map_cdp_err(err: CdpError) -> EngineError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("execution context was destroyed")
        || lower.contains("cannot find context")
        || lower.contains("inspected target navigated or closed")
    {
        EngineError::NavigationInterrupted
    } else {
        EngineError::Driver(anyhow!(message))
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn url(&self) -> EngineResult<String> {
        let url = self.page.url().await.map_err(map_cdp_err)?;
        Ok(url.unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn navigate(&self, url: &str) -> EngineResult<()> {
        self.page.goto(url).await.map_err(map_cdp_err)?;
        Ok(())
    }

    async fn document_complete(&self) -> EngineResult<bool> {
        self.eval("document.readyState === 'complete'".to_string())
            .await
    }

    async fn ms_since_last_mutation(&self) -> EngineResult<Option<u64>> {
        self.eval("window.__recplay ? window.__recplay.msSinceMutation() : null".to_string())
            .await
    }

    async fn query(&self, kind: SelectorKind, expr: &str) -> EngineResult<Vec<NodeSnapshot>> {
        let kind_name = match kind {
            SelectorKind::Css => "css",
            SelectorKind::Xpath => "xpath",
        };
        self.eval(format!(
            "window.__recplay.query({}, {})",
            js_str(kind_name),
            js_str(expr)
        ))
        .await
    }

    async fn visible_text(&self) -> EngineResult<String> {
        self.eval("document.body ? document.body.innerText : ''".to_string())
            .await
    }

    async fn start_capture(&self) -> EngineResult<mpsc::UnboundedReceiver<PageEvent>> {
        {
            let mut taken = self.capture_taken.lock().await;
            if *taken {
                return Err(EngineError::Driver(anyhow!(
                    "capture stream already taken for this page"
                )));
            }
            *taken = true;
        }

        self.page
            .execute(AddBindingParams::new(EMIT_BINDING))
            .await
            .map_err(map_cdp_err)?;
        self.page
            .execute(
                AddScriptToEvaluateOnNewDocumentParams::builder()
                    .source(CAPTURE_SCRIPT)
                    .build()
                    .map_err(|e| EngineError::Driver(anyhow!("inject params: {e}")))?,
            )
            .await
            .map_err(map_cdp_err)?;
        // Arm the document that is already loaded; the install is guarded,
        // so doing this after a reload is harmless.
        self.eval_unit(CAPTURE_SCRIPT.to_string()).await?;

        let mut stream = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(map_cdp_err)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if event.name != EMIT_BINDING {
                    continue;
                }
                match serde_json::from_str::<PageEvent>(&event.payload) {
                    Ok(parsed) => {
                        if tx.send(parsed).is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(error = %err, "dropping unparseable capture payload"),
                }
            }
            debug!("capture event stream closed");
        });

        info!("capture binding installed");
        Ok(rx)
    }

    async fn scroll_into_view(&self, node: NodeId) -> EngineResult<()> {
        self.eval_unit(format!("window.__recplay.scrollIntoView({node})"))
            .await
    }

    async fn highlight(&self, node: NodeId) -> EngineResult<()> {
        self.eval_unit(format!("window.__recplay.highlight({node})"))
            .await
    }

    async fn click(&self, node: NodeId) -> EngineResult<()> {
        self.eval_unit(format!("window.__recplay.click({node})")).await
    }

    async fn focus(&self, node: NodeId) -> EngineResult<()> {
        self.eval_unit(format!("window.__recplay.focus({node})")).await
    }

    async fn set_text(&self, node: NodeId, value: &str) -> EngineResult<()> {
        self.eval_unit(format!(
            "window.__recplay.setText({node}, {})",
            js_str(value)
        ))
        .await
    }

    async fn set_checked(&self, node: NodeId, checked: bool) -> EngineResult<()> {
        self.eval_unit(format!("window.__recplay.setChecked({node}, {checked})"))
            .await
    }

    async fn select_option(&self, node: NodeId, value: &str) -> EngineResult<()> {
        self.eval_unit(format!(
            "window.__recplay.selectOption({node}, {})",
            js_str(value)
        ))
        .await
    }

    async fn submit(&self, node: NodeId) -> EngineResult<()> {
        self.eval_unit(format!("window.__recplay.submit({node})")).await
    }

    async fn press_key(&self, node: Option<NodeId>, key: &str) -> EngineResult<()> {
        self.eval_unit(format!(
            "window.__recplay.pressKey({}, {})",
            js_opt_node(node),
            js_str(key)
        ))
        .await
    }

    async fn scroll_to(&self, node: Option<NodeId>, x: f64, y: f64) -> EngineResult<()> {
        self.eval_unit(format!(
            "window.__recplay.scrollTo({}, {x}, {y})",
            js_opt_node(node)
        ))
        .await
    }

    async fn media_state(&self, selector: Option<&str>) -> EngineResult<Option<MediaState>> {
        self.eval(format!(
            "window.__recplay.mediaState({})",
            js_opt_str(selector)
        ))
        .await
    }

    async fn media_seek(&self, selector: Option<&str>, seconds: f64) -> EngineResult<()> {
        self.eval_unit(format!(
            "window.__recplay.mediaSeek({}, {seconds})",
            js_opt_str(selector)
        ))
        .await
    }

    async fn media_play(&self, selector: Option<&str>, muted: bool) -> EngineResult<bool> {
        #[derive(serde::Deserialize)]
        struct PlayResult {
            found: bool,
            started: bool,
        }
        let result: PlayResult = self
            .eval(format!(
                "window.__recplay.mediaPlay({}, {muted})",
                js_opt_str(selector)
            ))
            .await?;
        if !result.found {
            return Err(EngineError::Driver(anyhow!("no media element on page")));
        }
        Ok(result.started)
    }

    async fn media_pause(&self, selector: Option<&str>) -> EngineResult<()> {
        self.eval_unit(format!(
            "window.__recplay.mediaPause({})",
            js_opt_str(selector)
        ))
        .await
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(err) = browser.close().await {
                warn!(error = %err, "browser close failed");
            }
            let _ = browser.wait().await;
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
    }
}
