use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use super::otp_entry::enter_code;
use crate::browser::dom::NodeSnapshot;
use crate::browser::driver::{DynPage, SelectorKind};
use crate::challenge::{ChallengeDetector, ChallengeKind};
use crate::error::{EngineError, EngineResult};
use crate::models::action::{Action, ActionKind};
use crate::models::script::Script;
use crate::models::session::PlaybackState;
use crate::notify::{ProgressEvent, ProgressSink};
use crate::otp::OtpLookup;
use crate::resolve::wait::{poll_until, CancelSource, PollError, PollOptions};
use crate::resolve::{ResolveOptions, Resolver};

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Think-time pause before each non-media action.
    pub pacing: Duration,
    /// Budget for the best-effort pre-action highlight resolve.
    pub highlight_timeout: Duration,
    pub resolve: ResolveOptions,
    /// The DOM must be mutation-quiet for this long to count as stable.
    pub stability_quiet: Duration,
    /// Hard bound on the stability wait; playback proceeds regardless after.
    pub stability_timeout: Duration,
    pub stability_interval: Duration,
    /// Cadence while blocked on an operator-resolved challenge.
    pub challenge_poll: Duration,
    /// Beat after starting a navigation, so the unload gets underway.
    pub post_navigation_grace: Duration,
    pub otp_lookup_timeout: Duration,
    /// Search terms for the code lookup; when empty, the checkpoint prompt
    /// and the script's host are used.
    pub otp_search_terms: Vec<String>,
    /// Settle time after entering a code before re-checking the page.
    pub otp_entry_settle: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_secs(1),
            highlight_timeout: Duration::from_secs(1),
            resolve: ResolveOptions::default(),
            stability_quiet: Duration::from_millis(100),
            stability_timeout: Duration::from_secs(10),
            stability_interval: Duration::from_millis(100),
            challenge_poll: Duration::from_millis(500),
            post_navigation_grace: Duration::from_millis(300),
            otp_lookup_timeout: Duration::from_secs(120),
            otp_search_terms: Vec::new(),
            otp_entry_settle: Duration::from_secs(1),
        }
    }
}

/// How one `run` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Stopped,
    /// A navigation tore down the execution context. The host re-enters
    /// with `resume_index` once the new document is up.
    Interrupted { resume_index: u32 },
}

impl PlaybackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackOutcome::Completed => "completed",
            PlaybackOutcome::Stopped => "stopped",
            PlaybackOutcome::Interrupted { .. } => "interrupted",
        }
    }
}

enum Exec {
    Done,
    Navigated,
}

/// Replays a script against a page, one action at a time.
///
/// Per-action failures are reported and skipped; the loop only gives up on
/// failures of its own machinery. Navigations end the current `run` with
/// [`PlaybackOutcome::Interrupted`] and the host re-invokes `run` with the
/// returned resume index, so one logical playback can span several calls.
/// `stop` latches: once requested, current and future runs wind down.
pub struct Player {
    page: DynPage,
    resolver: Resolver,
    detector: ChallengeDetector,
    sink: Arc<dyn ProgressSink>,
    otp: Arc<dyn OtpLookup>,
    config: PlayerConfig,
    state: Arc<Mutex<PlaybackState>>,
    cancel: CancelSource,
}

impl Player {
    pub fn new(
        page: DynPage,
        sink: Arc<dyn ProgressSink>,
        otp: Arc<dyn OtpLookup>,
        config: PlayerConfig,
    ) -> Self {
        let resolver = Resolver::new(page.clone());
        let (cancel, _) = CancelSource::new();
        Self {
            page,
            resolver,
            detector: ChallengeDetector::default(),
            sink,
            otp,
            config,
            state: Arc::new(Mutex::new(PlaybackState::idle())),
            cancel,
        }
    }

    /// Requests a stop. The in-flight action completes naturally; the loop
    /// exits before starting another.
    pub fn stop(&self) {
        info!("playback stop requested");
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn state(&self) -> PlaybackState {
        self.state.lock().await.clone()
    }

    /// Plays `script` from `resume_index` to the end, or until a stop,
    /// navigation or machinery failure. Emits a terminal `finished` event
    /// exactly once per playback session: interrupted runs expect a
    /// follow-up call and stay silent.
    pub async fn run(
        &self,
        script: Arc<Script>,
        resume_index: u32,
    ) -> EngineResult<PlaybackOutcome> {
        {
            let mut state = self.state.lock().await;
            state.start(
                script.uuid.clone(),
                resume_index,
                script.actions.len() as u32,
            );
        }
        info!(
            uuid = %script.uuid,
            resume_index,
            total = script.actions.len(),
            "playback run starting"
        );

        let result = self.run_inner(&script, resume_index).await;

        let last_index = {
            let mut state = self.state.lock().await;
            state.finish();
            state.current_index
        };

        match result {
            Ok(outcome) => {
                info!(uuid = %script.uuid, outcome = outcome.as_str(), "playback run ended");
                if !matches!(outcome, PlaybackOutcome::Interrupted { .. }) {
                    self.sink.emit(ProgressEvent::Finished {
                        uuid: script.uuid.clone(),
                        last_index,
                        outcome: outcome.as_str().to_string(),
                    });
                }
                Ok(outcome)
            }
            Err(err) => {
                error!(uuid = %script.uuid, error = %err, "playback run aborted");
                self.sink.emit(ProgressEvent::Finished {
                    uuid: script.uuid.clone(),
                    last_index,
                    outcome: "aborted".to_string(),
                });
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        script: &Script,
        resume_index: u32,
    ) -> EngineResult<PlaybackOutcome> {
        match self.wait_for_stable_page().await {
            Ok(()) => {}
            Err(EngineError::Cancelled) => return Ok(PlaybackOutcome::Stopped),
            Err(err) => return Err(EngineError::CriticalLoopFailure(err.to_string())),
        }

        for action in script.actions.iter().filter(|a| a.index >= resume_index) {
            if self.is_stopped() {
                return Ok(PlaybackOutcome::Stopped);
            }

            self.state.lock().await.current_index = action.index;
            self.sink.emit(ProgressEvent::ActionStarted {
                uuid: script.uuid.clone(),
                index: action.index,
                kind: action.kind.name().to_string(),
                label: action.label(),
                total: script.actions.len() as u32,
            });

            if let ActionKind::OtpCheckpoint { prompt } = &action.kind {
                match self.handle_checkpoint(script, action, prompt).await {
                    Ok(()) => {
                        self.sink.emit(ProgressEvent::ActionCompleted {
                            uuid: script.uuid.clone(),
                            index: action.index,
                        });
                    }
                    Err(EngineError::Cancelled) => return Ok(PlaybackOutcome::Stopped),
                    Err(err) => {
                        error!(index = action.index, error = %err, "checkpoint failed");
                        self.sink.emit(ProgressEvent::ActionFailed {
                            uuid: script.uuid.clone(),
                            index: action.index,
                            error: err.to_string(),
                        });
                    }
                }
                continue;
            }

            if !action.kind.is_media() {
                self.highlight(action).await;
                sleep(self.config.pacing).await;
            }

            // A challenge already on screen blocks the action; it still
            // executes once the operator clears the screen.
            match self.block_on_live_challenges(script, action.index).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => return Ok(PlaybackOutcome::Stopped),
                Err(EngineError::NavigationInterrupted) => {
                    return Ok(PlaybackOutcome::Interrupted {
                        resume_index: action.index,
                    });
                }
                Err(err) => return Err(EngineError::CriticalLoopFailure(err.to_string())),
            }

            match self.execute(action).await {
                Ok(Exec::Done) => {
                    self.sink.emit(ProgressEvent::ActionCompleted {
                        uuid: script.uuid.clone(),
                        index: action.index,
                    });
                }
                Ok(Exec::Navigated) => {
                    self.sink.emit(ProgressEvent::ActionCompleted {
                        uuid: script.uuid.clone(),
                        index: action.index,
                    });
                    debug!(index = action.index, "navigation started, run will re-enter");
                    return Ok(PlaybackOutcome::Interrupted {
                        resume_index: action.index + 1,
                    });
                }
                Err(EngineError::NavigationInterrupted) => {
                    // the action's own effect tore the context down, which
                    // is how clicks on links end up; the attempt counts
                    self.sink.emit(ProgressEvent::ActionCompleted {
                        uuid: script.uuid.clone(),
                        index: action.index,
                    });
                    debug!(index = action.index, "context destroyed, run will re-enter");
                    return Ok(PlaybackOutcome::Interrupted {
                        resume_index: action.index + 1,
                    });
                }
                Err(EngineError::ChallengeInterrupt(kind)) => {
                    warn!(index = action.index, %kind, "challenge interrupted the action");
                    self.sink.emit(ProgressEvent::ChallengeRequired {
                        uuid: script.uuid.clone(),
                        index: action.index,
                        challenge: kind,
                        manual: true,
                    });
                    self.set_waiting(Some(kind)).await;
                    match self.wait_until_cleared(kind).await {
                        Ok(()) => {}
                        Err(EngineError::Cancelled) => return Ok(PlaybackOutcome::Stopped),
                        Err(err) => {
                            return Err(EngineError::CriticalLoopFailure(err.to_string()))
                        }
                    }
                    self.set_waiting(None).await;
                    // the interrupted action is skipped, not retried: the
                    // challenge consumed the attempt
                    self.sink.emit(ProgressEvent::ActionFailed {
                        uuid: script.uuid.clone(),
                        index: action.index,
                        error: format!("skipped after {kind} challenge"),
                    });
                }
                Err(EngineError::Cancelled) => return Ok(PlaybackOutcome::Stopped),
                Err(err) if looks_like_video_chrome(action) => {
                    warn!(
                        index = action.index,
                        error = %err,
                        "click on video chrome failed, continuing"
                    );
                    self.sink.emit(ProgressEvent::ActionCompleted {
                        uuid: script.uuid.clone(),
                        index: action.index,
                    });
                }
                Err(err) => {
                    error!(index = action.index, error = %err, "action failed");
                    self.sink.emit(ProgressEvent::ActionFailed {
                        uuid: script.uuid.clone(),
                        index: action.index,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(PlaybackOutcome::Completed)
    }

    /// Executes one action, converting resolution failures into challenge
    /// interrupts when a challenge turns out to have taken over the page.
    async fn execute(&self, action: &Action) -> EngineResult<Exec> {
        let result = self.dispatch(action).await;
        match &result {
            Err(EngineError::ElementNotFound { .. })
            | Err(EngineError::ElementKindMismatch { .. }) => {
                if let Ok(Some(_)) = self.detector.otp_page(&self.page).await {
                    return Err(EngineError::ChallengeInterrupt(ChallengeKind::Otp));
                }
                if let Ok(true) = self.detector.pin_dialog(&self.page).await {
                    return Err(EngineError::ChallengeInterrupt(ChallengeKind::Pin));
                }
                result
            }
            _ => result,
        }
    }

    async fn dispatch(&self, action: &Action) -> EngineResult<Exec> {
        let cancel = self.cancel.token();
        let options = &self.config.resolve;

        match &action.kind {
            ActionKind::Click { selector } => {
                let node = self
                    .resolver
                    .resolve_interactable(selector, &action.hints, options, &cancel)
                    .await?;
                self.page.click(node.node).await?;
            }

            ActionKind::TypeText { selector, value } => {
                let node = self
                    .resolver
                    .resolve_interactable(selector, &action.hints, options, &cancel)
                    .await?;
                if !node.is_text_entry() {
                    return Err(EngineError::ElementKindMismatch {
                        expected: "text input",
                        found: node.tag,
                    });
                }
                self.page.focus(node.node).await?;
                self.page.set_text(node.node, value).await?;
            }

            ActionKind::Select { selector, value } => {
                let node = self
                    .resolver
                    .resolve_interactable(selector, &action.hints, options, &cancel)
                    .await?;
                if !node.is_select() {
                    return Err(EngineError::ElementKindMismatch {
                        expected: "select",
                        found: node.tag,
                    });
                }
                self.page.select_option(node.node, value).await?;
            }

            ActionKind::Check { selector } => {
                let node = self
                    .resolver
                    .resolve_interactable(selector, &action.hints, options, &cancel)
                    .await?;
                if !node.is_checkable() {
                    return Err(EngineError::ElementKindMismatch {
                        expected: "checkbox or radio",
                        found: node.tag,
                    });
                }
                self.page.set_checked(node.node, true).await?;
            }

            ActionKind::Uncheck { selector } => {
                let node = self
                    .resolver
                    .resolve_interactable(selector, &action.hints, options, &cancel)
                    .await?;
                if !node.is_checkable() {
                    return Err(EngineError::ElementKindMismatch {
                        expected: "checkbox or radio",
                        found: node.tag,
                    });
                }
                self.page.set_checked(node.node, false).await?;
            }

            ActionKind::Submit { selector } => {
                let node = self
                    .resolver
                    .resolve(selector, &action.hints, options, &cancel)
                    .await?;
                if !node.is_form() {
                    return Err(EngineError::ElementKindMismatch {
                        expected: "form",
                        found: node.tag,
                    });
                }
                self.page.submit(node.node).await?;
            }

            ActionKind::Navigate { url } => {
                if url.is_empty() {
                    warn!(index = action.index, "navigate action with no destination, skipping");
                    return Ok(Exec::Done);
                }
                let current = self.page.url().await?;
                if current == *url {
                    debug!(index = action.index, "already at destination");
                    return Ok(Exec::Done);
                }
                self.page.navigate(url).await?;
                sleep(self.config.post_navigation_grace).await;
                return Ok(Exec::Navigated);
            }

            ActionKind::Keypress { selector, key } => match selector {
                Some(selector) => {
                    let node = self
                        .resolver
                        .resolve_interactable(selector, &action.hints, options, &cancel)
                        .await?;
                    self.page.press_key(Some(node.node), key).await?;
                }
                None => self.page.press_key(None, key).await?,
            },

            ActionKind::Focus { selector } => {
                let node = self
                    .resolver
                    .resolve_interactable(selector, &action.hints, options, &cancel)
                    .await?;
                self.page.focus(node.node).await?;
            }

            ActionKind::Scroll { selector, x, y } => match selector {
                Some(selector) => {
                    let node = self
                        .resolver
                        .resolve(selector, &action.hints, options, &cancel)
                        .await?;
                    self.page.scroll_to(Some(node.node), *x, *y).await?;
                }
                None => self.page.scroll_to(None, *x, *y).await?,
            },

            ActionKind::Seek { selector, seconds } => {
                self.page.media_seek(selector.as_deref(), *seconds).await?;
            }

            ActionKind::Play { selector, seconds } => {
                self.media_play(selector.as_deref(), *seconds).await?;
            }

            ActionKind::Pause { selector, .. } => {
                self.page.media_pause(selector.as_deref()).await?;
            }

            ActionKind::Watch { selector, seconds } => {
                self.media_watch(selector.as_deref(), *seconds).await?;
            }

            ActionKind::OtpCheckpoint { .. } => {
                // handled before dispatch; as an action effect this is a no-op
            }
        }

        Ok(Exec::Done)
    }

    async fn media_play(&self, selector: Option<&str>, seconds: f64) -> EngineResult<()> {
        if let Some(state) = self.page.media_state(selector).await? {
            if (state.current_time - seconds).abs() > 1.0 {
                self.page.media_seek(selector, seconds).await?;
            }
            if state.playing {
                return Ok(());
            }
        }
        self.ensure_playing(selector).await
    }

    /// Unmuted first, muted second, the page's own play control last.
    async fn ensure_playing(&self, selector: Option<&str>) -> EngineResult<()> {
        if self.page.media_play(selector, false).await? {
            return Ok(());
        }
        warn!("unmuted playback refused, retrying muted");
        if self.page.media_play(selector, true).await? {
            return Ok(());
        }
        warn!("muted playback refused, looking for a play control");
        let mut controls = self.page.query(SelectorKind::Css, "button").await?;
        controls.extend(self.page.query(SelectorKind::Css, "[role=\"button\"]").await?);
        if let Some(control) = controls.iter().find(|n| is_play_control(n)) {
            self.page.click(control.node).await?;
            return Ok(());
        }
        Err(EngineError::Driver(anyhow!(
            "page refused to start media playback"
        )))
    }

    async fn media_watch(&self, selector: Option<&str>, seconds: f64) -> EngineResult<()> {
        match self.page.media_state(selector).await? {
            Some(state) if state.playing => {}
            Some(_) => self.ensure_playing(selector).await?,
            None => {
                return Err(EngineError::Driver(anyhow!("no media element to watch")));
            }
        }
        // the recorded dwell is replayed literally
        info!(seconds, "dwelling on playing media");
        let mut cancel = self.cancel.token();
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            _ = sleep(Duration::from_secs_f64(seconds.max(0.0))) => Ok(()),
        }
    }

    /// Best-effort pre-action highlight on a short budget; a miss never
    /// delays the action beyond that budget.
    async fn highlight(&self, action: &Action) {
        let Some(selector) = action.kind.element_selector() else {
            return;
        };
        let cancel = self.cancel.token();
        let options = ResolveOptions {
            timeout: self.config.highlight_timeout,
            ..self.config.resolve.clone()
        };
        match self
            .resolver
            .resolve(selector, &action.hints, &options, &cancel)
            .await
        {
            Ok(node) => {
                if let Err(err) = self.page.highlight(node.node).await {
                    trace!(index = action.index, error = %err, "highlight failed");
                }
            }
            Err(err) => trace!(index = action.index, error = %err, "highlight skipped"),
        }
    }

    /// Resolves a recorded checkpoint automatically: look the code up, type
    /// it in, confirm the challenge went away. Anything short of that is
    /// [`EngineError::ChallengeUnresolved`] and the caller falls back to the
    /// operator.
    async fn resolve_checkpoint_auto(&self, script: &Script, prompt: &str) -> EngineResult<()> {
        let code = self
            .lookup_code(script, prompt)
            .await
            .map_err(|err| EngineError::ChallengeUnresolved(err.to_string()))?;
        info!("verification code retrieved, entering");

        match enter_code(&self.page, &code).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(EngineError::ChallengeUnresolved(
                    "no code entry ui found on page".to_string(),
                ))
            }
            // verification often navigates; that is success, not failure
            Err(EngineError::NavigationInterrupted) => return Ok(()),
            Err(err) => return Err(EngineError::ChallengeUnresolved(err.to_string())),
        }

        sleep(self.config.otp_entry_settle).await;
        match self.detector.otp_page(&self.page).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(EngineError::ChallengeUnresolved(
                "challenge still present after code entry".to_string(),
            )),
            Err(EngineError::NavigationInterrupted) => Ok(()),
            Err(err) => Err(EngineError::ChallengeUnresolved(err.to_string())),
        }
    }

    async fn handle_checkpoint(
        &self,
        script: &Script,
        action: &Action,
        prompt: &str,
    ) -> EngineResult<()> {
        info!(index = action.index, prompt, "checkpoint reached");
        self.sink.emit(ProgressEvent::ChallengeRequired {
            uuid: script.uuid.clone(),
            index: action.index,
            challenge: ChallengeKind::Otp,
            manual: false,
        });
        self.set_waiting(Some(ChallengeKind::Otp)).await;

        let result = match self.resolve_checkpoint_auto(script, prompt).await {
            Ok(()) => Ok(()),
            Err(EngineError::ChallengeUnresolved(reason)) => {
                warn!(reason, "automatic code entry failed, waiting for operator");
                self.sink.emit(ProgressEvent::ChallengeRequired {
                    uuid: script.uuid.clone(),
                    index: action.index,
                    challenge: ChallengeKind::Otp,
                    manual: true,
                });
                self.wait_until_cleared(ChallengeKind::Otp).await
            }
            Err(err) => Err(err),
        };

        self.set_waiting(None).await;
        result
    }

    async fn lookup_code(&self, script: &Script, prompt: &str) -> anyhow::Result<String> {
        let terms = if self.config.otp_search_terms.is_empty() {
            let mut terms = vec![prompt.to_string()];
            if let Some(host) = host_of(&script.url) {
                terms.push(host);
            }
            terms
        } else {
            self.config.otp_search_terms.clone()
        };

        debug!(?terms, "looking up verification code");
        let outcome = tokio::time::timeout(self.config.otp_lookup_timeout, self.otp.lookup(&terms))
            .await
            .map_err(|_| anyhow!("code lookup timed out"))??;

        if outcome.success {
            outcome
                .otp
                .filter(|code| !code.is_empty())
                .ok_or_else(|| anyhow!("lookup reported success without a code"))
        } else {
            Err(anyhow!(outcome
                .error
                .unwrap_or_else(|| "lookup unsuccessful".to_string())))
        }
    }

    /// Pre-action live check: if a challenge is on screen, block until the
    /// operator clears it, then let the action proceed.
    async fn block_on_live_challenges(&self, script: &Script, index: u32) -> EngineResult<()> {
        let otp_present = match self.detector.otp_page(&self.page).await {
            Ok(found) => found.is_some(),
            Err(EngineError::NavigationInterrupted) => return Err(EngineError::NavigationInterrupted),
            Err(err) => return Err(err),
        };
        if otp_present {
            warn!(index, "otp challenge on screen, waiting for operator");
            self.sink.emit(ProgressEvent::ChallengeRequired {
                uuid: script.uuid.clone(),
                index,
                challenge: ChallengeKind::Otp,
                manual: true,
            });
            self.set_waiting(Some(ChallengeKind::Otp)).await;
            self.wait_until_cleared(ChallengeKind::Otp).await?;
            self.set_waiting(None).await;
        }

        if self.detector.pin_dialog(&self.page).await? {
            warn!(index, "pin dialog on screen, waiting for operator");
            self.sink.emit(ProgressEvent::ChallengeRequired {
                uuid: script.uuid.clone(),
                index,
                challenge: ChallengeKind::Pin,
                manual: true,
            });
            self.set_waiting(Some(ChallengeKind::Pin)).await;
            self.wait_until_cleared(ChallengeKind::Pin).await?;
            self.set_waiting(None).await;
        }

        Ok(())
    }

    /// Polls until the challenge leaves the screen. Unbounded by design;
    /// only a stop request ends it early.
    async fn wait_until_cleared(&self, kind: ChallengeKind) -> EngineResult<()> {
        let mut cancel = self.cancel.token();
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let present = match kind {
                ChallengeKind::Otp => match self.detector.otp_page(&self.page).await {
                    Ok(found) => found.is_some(),
                    // mid-navigation; the next settled poll decides
                    Err(EngineError::NavigationInterrupted) => true,
                    Err(err) => return Err(err),
                },
                ChallengeKind::Pin => match self.detector.pin_dialog(&self.page).await {
                    Ok(found) => found,
                    Err(EngineError::NavigationInterrupted) => true,
                    Err(err) => return Err(err),
                },
            };
            if !present {
                info!(%kind, "challenge cleared");
                return Ok(());
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = sleep(self.config.challenge_poll) => {}
            }
        }
    }

    /// Document loaded plus a short mutation-quiet window, bounded; a page
    /// that never settles gets played anyway.
    async fn wait_for_stable_page(&self) -> EngineResult<()> {
        let cancel = self.cancel.token();
        let page = self.page.clone();
        let quiet = self.config.stability_quiet;

        let result = poll_until(
            PollOptions::new(self.config.stability_interval, self.config.stability_timeout),
            &cancel,
            move || {
                let page = page.clone();
                async move {
                    let complete = match page.document_complete().await {
                        Ok(complete) => complete,
                        Err(EngineError::NavigationInterrupted) => false,
                        Err(err) => return Err(err),
                    };
                    if !complete {
                        return Ok(None);
                    }
                    let quiet_ok = match page.ms_since_last_mutation().await {
                        Ok(Some(ms)) => Duration::from_millis(ms) >= quiet,
                        Ok(None) => true,
                        Err(EngineError::NavigationInterrupted) => false,
                        Err(err) => return Err(err),
                    };
                    Ok(quiet_ok.then_some(()))
                }
            },
        )
        .await;

        match result {
            Ok(()) => {
                debug!("page stable");
                Ok(())
            }
            Err(PollError::TimedOut(_)) => {
                warn!("page never settled, proceeding anyway");
                Ok(())
            }
            Err(PollError::Cancelled) => Err(EngineError::Cancelled),
            Err(PollError::Failed(err)) => Err(err),
        }
    }

    async fn set_waiting(&self, kind: Option<ChallengeKind>) {
        self.state.lock().await.waiting_on = kind;
    }
}

/// Clicks whose recorded target smells like video player chrome: failures
/// there are warnings, not failed steps, because transport controls come
/// and go with the player skin.
fn looks_like_video_chrome(action: &Action) -> bool {
    if !matches!(action.kind, ActionKind::Click { .. }) {
        return false;
    }
    if matches!(
        action.hints.tag_name.as_deref(),
        Some("video") | Some("audio")
    ) {
        return true;
    }
    if action.hints.role.as_deref() == Some("slider") {
        return true;
    }
    let label = [
        action.hints.aria_label.as_deref(),
        action.hints.display_name.as_deref(),
        action.hints.text.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase();
    ["play", "pause", "mute", "volume", "fullscreen", "caption", "scrub", "seek"]
        .iter()
        .any(|k| label.contains(k))
}

fn is_play_control(node: &NodeSnapshot) -> bool {
    if !node.visible {
        return false;
    }
    let labelled_play = node.label_text().is_some_and(|label| {
        let label = label.to_lowercase();
        label.contains("play") && !label.contains("playlist")
    });
    let classed_play = node
        .class_name
        .as_deref()
        .is_some_and(|class| class.to_lowercase().contains("play"));
    labelled_play || classed_play
}

fn host_of(url: &str) -> Option<String> {
    let rest = url.split("//").nth(1)?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').next_back()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
