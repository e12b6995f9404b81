use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use super::classify::{hints_from, is_media_chrome, scroll_key};
use crate::challenge::ChallengeFlags;
use crate::error::{EngineError, EngineResult};
use crate::models::action::{Action, ActionKind, ElementHints};
use crate::models::event::{PageEvent, PageEventKind, TargetInfo};
use crate::models::script::Script;
use crate::models::session::RecordingState;
use crate::resolve::wait::CancelSource;

#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    /// A click following a pointer-down on the same element within this
    /// window is the same gesture, not a second action.
    pub click_dedupe_window: Duration,
    /// Scroll events settle for this long before one action is emitted at
    /// the final position.
    pub scroll_debounce: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            click_dedupe_window: Duration::from_millis(100),
            scroll_debounce: Duration::from_millis(200),
        }
    }
}

struct PendingScroll {
    key: String,
    selector: Option<String>,
    hints: ElementHints,
    x: f64,
    y: f64,
    url: String,
    deadline: Instant,
}

struct MediaWatch {
    selector: Option<String>,
    hints: ElementHints,
    url: String,
    started: Instant,
}

struct RecorderInner {
    state: RecordingState,
    script: Option<Script>,
    last_click: Option<(String, Instant)>,
    pending_scroll: Option<PendingScroll>,
    last_scroll: HashMap<String, (f64, f64)>,
    media: Option<MediaWatch>,
    pump_running: bool,
    pump_cancel: Option<CancelSource>,
}

impl RecorderInner {
    fn reset_side_state(&mut self) {
        self.last_click = None;
        self.pending_scroll = None;
        self.last_scroll.clear();
        self.media = None;
    }
}

/// Turns raw capture events into recorded actions.
///
/// The recorder is a state machine over one script: `start` binds a script
/// (fresh or resumed, so indices stay contiguous across host restarts),
/// `pause`/`resume` gate classification, `stop` detaches and hands the
/// script back. Events stream in through [`Recorder::attach`]; while either
/// challenge flag is raised, nothing the user does is captured.
pub struct Recorder {
    inner: Arc<Mutex<RecorderInner>>,
    action_tx: broadcast::Sender<Action>,
    flags: ChallengeFlags,
    config: RecorderConfig,
}

impl Recorder {
    pub fn new(flags: ChallengeFlags, config: RecorderConfig) -> Self {
        let (action_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                state: RecordingState::idle(),
                script: None,
                last_click: None,
                pending_scroll: None,
                last_scroll: HashMap::new(),
                media: None,
                pump_running: false,
                pump_cancel: None,
            })),
            action_tx,
            flags,
            config,
        }
    }

    /// Begins (or resumes) recording into `script`. Starting over an active
    /// session supersedes it; the new script's identity wins.
    pub async fn start(&self, script: Script) -> RecordingState {
        let mut inner = self.inner.lock().await;
        if inner.script.is_some() {
            info!(uuid = %script.uuid, "recording restarted, superseding active session");
        } else {
            info!(uuid = %script.uuid, next_index = script.next_index(), "recording started");
        }
        inner.state.start(script.uuid.clone(), script.next_index());
        inner.script = Some(script);
        inner.reset_side_state();
        inner.state.clone()
    }

    pub async fn pause(&self) -> RecordingState {
        let mut inner = self.inner.lock().await;
        inner.state.pause();
        debug!(uuid = %inner.state.uuid, "recording paused");
        inner.state.clone()
    }

    pub async fn resume(&self) -> RecordingState {
        let mut inner = self.inner.lock().await;
        inner.state.resume();
        debug!(uuid = %inner.state.uuid, "recording resumed");
        inner.state.clone()
    }

    /// Ends the session and returns the raw script. Pending debounced state
    /// is flushed first so nothing the user did gets lost. Compaction is the
    /// caller's choice, never applied here.
    pub async fn stop(&self) -> Option<Script> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        close_media_watch(&mut inner, &self.action_tx, now);
        flush_scroll(&mut inner, &self.action_tx);
        if let Some(cancel) = inner.pump_cancel.take() {
            cancel.cancel();
        }
        inner.state.finish();
        let script = inner.script.take();
        if let Some(script) = &script {
            info!(uuid = %script.uuid, actions = script.actions.len(), "recording stopped");
        }
        script
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.lock().await.state.clone()
    }

    /// Copy of the script as recorded so far, for incremental persistence.
    pub async fn script_snapshot(&self) -> Option<Script> {
        self.inner.lock().await.script.clone()
    }

    /// Every recorded action is also broadcast as it happens.
    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.action_tx.subscribe()
    }

    /// Classifies one capture event. The pump calls this for every event it
    /// receives; tests drive it directly.
    pub async fn handle_event(&self, event: PageEvent) {
        let mut inner = self.inner.lock().await;
        classify_event(
            &mut inner,
            &self.action_tx,
            &self.flags,
            self.config,
            event,
        );
    }

    /// Appends a privacy checkpoint for a newly detected OTP challenge.
    /// Called on the rising edge of the OTP flag, not per event.
    pub async fn note_otp_challenge(&self, prompt: &str) {
        let mut inner = self.inner.lock().await;
        append_checkpoint(&mut inner, &self.action_tx, prompt);
    }

    /// Spawns the event pump over a capture stream. One pump per recorder;
    /// the stream survives navigations, so this is called once per session.
    pub async fn attach(&self, mut events: mpsc::UnboundedReceiver<PageEvent>) -> EngineResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.pump_running {
            return Err(EngineError::Driver(anyhow!("event pump already attached")));
        }
        inner.pump_running = true;
        let (cancel, mut cancel_token) = CancelSource::new();
        inner.pump_cancel = Some(cancel);
        drop(inner);

        let inner = self.inner.clone();
        let tx = self.action_tx.clone();
        let flags = self.flags.clone();
        let config = self.config;
        let mut otp_watch = self.flags.otp_watch();
        // only transitions after this point count as edges
        otp_watch.borrow_and_update();
        let mut otp_alive = true;

        tokio::spawn(async move {
            loop {
                let deadline = {
                    inner
                        .lock()
                        .await
                        .pending_scroll
                        .as_ref()
                        .map(|p| p.deadline)
                };

                tokio::select! {
                    _ = cancel_token.cancelled() => break,

                    changed = otp_watch.changed(), if otp_alive => {
                        match changed {
                            Ok(()) => {
                                let prompt = otp_watch.borrow_and_update().clone();
                                if let Some(prompt) = prompt {
                                    let mut guard = inner.lock().await;
                                    append_checkpoint(&mut guard, &tx, &prompt);
                                }
                            }
                            Err(_) => otp_alive = false,
                        }
                    }

                    maybe = events.recv() => match maybe {
                        Some(event) => {
                            let mut guard = inner.lock().await;
                            classify_event(&mut guard, &tx, &flags, config, event);
                        }
                        None => {
                            warn!("capture stream closed, stopping event pump");
                            break;
                        }
                    },

                    _ = async { sleep_until(deadline.unwrap_or_else(Instant::now)).await },
                        if deadline.is_some() =>
                    {
                        let mut guard = inner.lock().await;
                        flush_scroll(&mut guard, &tx);
                    }
                }
            }
            let mut guard = inner.lock().await;
            guard.pump_running = false;
            guard.pump_cancel = None;
            debug!("recorder event pump stopped");
        });

        Ok(())
    }
}

fn classify_event(
    inner: &mut RecorderInner,
    tx: &broadcast::Sender<Action>,
    flags: &ChallengeFlags,
    config: RecorderConfig,
    event: PageEvent,
) {
    if !inner.state.is_capturing() || inner.script.is_none() {
        return;
    }
    // Everything the user does on a challenge screen stays out of the script.
    if flags.any_active() {
        trace!("challenge on screen, event suppressed");
        return;
    }

    let url = event.url;
    let now = Instant::now();

    match event.kind {
        PageEventKind::PointerDown { target, button } => {
            if button != 0 || is_media_chrome(&target) {
                return;
            }
            let Some(path) = target.path.clone() else {
                return;
            };
            record(
                inner,
                tx,
                ActionKind::Click {
                    selector: path.clone(),
                },
                hints_from(&target),
                url,
            );
            inner.last_click = Some((path, now));
        }

        PageEventKind::Click { target } => {
            if is_media_chrome(&target) {
                return;
            }
            let Some(path) = target.path.clone() else {
                return;
            };
            if let Some((last_path, at)) = &inner.last_click {
                if *last_path == path && now.duration_since(*at) <= config.click_dedupe_window {
                    trace!(%path, "duplicate click suppressed");
                    return;
                }
            }
            // keyboard or synthetic activation with no pointer-down
            record(
                inner,
                tx,
                ActionKind::Click {
                    selector: path.clone(),
                },
                hints_from(&target),
                url,
            );
            inner.last_click = Some((path, now));
        }

        PageEventKind::Input { target, value } => {
            if !target.editable {
                return;
            }
            let Some(path) = target.path.clone() else {
                return;
            };
            record(
                inner,
                tx,
                ActionKind::TypeText {
                    selector: path,
                    value,
                },
                hints_from(&target),
                url,
            );
        }

        PageEventKind::Change {
            target,
            value,
            checked,
        } => {
            let Some(path) = target.path.clone() else {
                return;
            };
            if target.tag_name.as_deref() == Some("select") {
                if let Some(value) = value {
                    record(
                        inner,
                        tx,
                        ActionKind::Select {
                            selector: path,
                            value,
                        },
                        hints_from(&target),
                        url,
                    );
                }
            } else if matches!(
                target.input_type.as_deref(),
                Some("checkbox") | Some("radio")
            ) {
                let kind = match checked {
                    Some(true) => ActionKind::Check { selector: path },
                    Some(false) if target.input_type.as_deref() == Some("checkbox") => {
                        ActionKind::Uncheck { selector: path }
                    }
                    // radio deselection is a side effect of checking another
                    _ => return,
                };
                record(inner, tx, kind, hints_from(&target), url);
            }
            // text field change events carry nothing input events did not
        }

        PageEventKind::Submit { target } => {
            let Some(path) = target.path.clone() else {
                return;
            };
            record(
                inner,
                tx,
                ActionKind::Submit { selector: path },
                hints_from(&target),
                url,
            );
        }

        PageEventKind::KeyDown { target, key } => {
            if key != "Enter" {
                return;
            }
            if target.form_submitter {
                // Enter on a submit control is just a click on it
                let Some(path) = target.path.clone() else {
                    return;
                };
                record(
                    inner,
                    tx,
                    ActionKind::Click { selector: path },
                    hints_from(&target),
                    url,
                );
            } else if !target.editable {
                record(
                    inner,
                    tx,
                    ActionKind::Keypress {
                        selector: target.path.clone(),
                        key,
                    },
                    hints_from(&target),
                    url,
                );
            } else if target.in_form {
                let Some(path) = target.path.clone() else {
                    return;
                };
                record(
                    inner,
                    tx,
                    ActionKind::Keypress {
                        selector: Some(path),
                        key,
                    },
                    hints_from(&target),
                    url,
                );
            }
            // Enter in a standalone textarea is a newline, not an action
        }

        PageEventKind::Focus { target } => {
            if !target.editable {
                return;
            }
            let Some(path) = target.path.clone() else {
                return;
            };
            record(
                inner,
                tx,
                ActionKind::Focus { selector: path },
                hints_from(&target),
                url,
            );
        }

        PageEventKind::Scroll { target, x, y } => {
            stash_scroll(inner, tx, config, target, x, y, url, now);
        }

        PageEventKind::MediaPlay { target, position } => {
            let selector = target.path.clone();
            record(
                inner,
                tx,
                ActionKind::Play {
                    selector: selector.clone(),
                    seconds: position,
                },
                hints_from(&target),
                url.clone(),
            );
            if inner.media.is_none() {
                inner.media = Some(MediaWatch {
                    selector,
                    hints: hints_from(&target),
                    url,
                    started: now,
                });
            }
        }

        PageEventKind::MediaPause { target, position } => {
            close_media_watch(inner, tx, now);
            record(
                inner,
                tx,
                ActionKind::Pause {
                    selector: target.path.clone(),
                    seconds: position,
                },
                hints_from(&target),
                url,
            );
        }

        PageEventKind::MediaSeeking { target, position } => {
            let was_watching = close_media_watch(inner, tx, now);
            let selector = target.path.clone();
            record(
                inner,
                tx,
                ActionKind::Seek {
                    selector: selector.clone(),
                    seconds: position,
                },
                hints_from(&target),
                url.clone(),
            );
            if was_watching {
                // playback continues after the seek; a new watch segment starts
                inner.media = Some(MediaWatch {
                    selector,
                    hints: hints_from(&target),
                    url,
                    started: now,
                });
            }
        }

        PageEventKind::Unload { destination } => {
            close_media_watch(inner, tx, now);
            record(
                inner,
                tx,
                ActionKind::Navigate {
                    url: destination.unwrap_or_default(),
                },
                ElementHints::default(),
                url,
            );
        }
    }
}

/// Appends an `otp_checkpoint` on the rising edge of the OTP flag. Bypasses
/// the event gate (the gate exists precisely because this challenge is on
/// screen) but still respects pause.
fn append_checkpoint(inner: &mut RecorderInner, tx: &broadcast::Sender<Action>, prompt: &str) {
    if !inner.state.is_capturing() {
        return;
    }
    flush_scroll(inner, tx);
    let url = inner
        .script
        .as_ref()
        .map(|s| {
            s.actions
                .last()
                .map(|a| a.url.clone())
                .unwrap_or_else(|| s.url.clone())
        })
        .unwrap_or_default();
    info!(prompt, "otp challenge detected, appending checkpoint");
    append(
        inner,
        tx,
        ActionKind::OtpCheckpoint {
            prompt: prompt.to_string(),
        },
        ElementHints::default(),
        url,
    );
}

/// Appends an action, flushing any pending scroll first so ordering matches
/// what the user actually did.
fn record(
    inner: &mut RecorderInner,
    tx: &broadcast::Sender<Action>,
    kind: ActionKind,
    hints: ElementHints,
    url: String,
) {
    flush_scroll(inner, tx);
    append(inner, tx, kind, hints, url);
}

fn append(
    inner: &mut RecorderInner,
    tx: &broadcast::Sender<Action>,
    kind: ActionKind,
    hints: ElementHints,
    url: String,
) {
    let Some(script) = inner.script.as_mut() else {
        return;
    };
    let action = Action::new(script.next_index(), kind, hints, url);
    debug!(index = action.index, kind = action.kind.name(), "action recorded");
    script.push(action.clone());
    inner.state.next_index = script.next_index();
    let _ = tx.send(action);
}

#[allow(clippy::too_many_arguments)]
fn stash_scroll(
    inner: &mut RecorderInner,
    tx: &broadcast::Sender<Action>,
    config: RecorderConfig,
    target: Option<TargetInfo>,
    x: f64,
    y: f64,
    url: String,
    now: Instant,
) {
    let key = scroll_key(target.as_ref());

    // a burst on a different target flushes the one in flight
    if inner
        .pending_scroll
        .as_ref()
        .is_some_and(|p| p.key != key)
    {
        flush_scroll(inner, tx);
    }

    let (selector, hints) = match &target {
        Some(t) => (t.path.clone(), hints_from(t)),
        None => (None, ElementHints::default()),
    };
    inner.pending_scroll = Some(PendingScroll {
        key,
        selector,
        hints,
        x,
        y,
        url,
        deadline: now + config.scroll_debounce,
    });
}

fn flush_scroll(inner: &mut RecorderInner, tx: &broadcast::Sender<Action>) {
    let Some(pending) = inner.pending_scroll.take() else {
        return;
    };
    // settling back where the last recorded scroll left it is a no-op
    if inner.last_scroll.get(&pending.key) == Some(&(pending.x, pending.y)) {
        return;
    }
    inner
        .last_scroll
        .insert(pending.key.clone(), (pending.x, pending.y));
    append(
        inner,
        tx,
        ActionKind::Scroll {
            selector: pending.selector,
            x: pending.x,
            y: pending.y,
        },
        pending.hints,
        pending.url,
    );
}

/// Emits the accumulated watch action, if a media session is open. Returns
/// whether one was open. Always runs before the action that ended it, so
/// replay reproduces the dwell time at the right point.
fn close_media_watch(
    inner: &mut RecorderInner,
    tx: &broadcast::Sender<Action>,
    now: Instant,
) -> bool {
    flush_scroll(inner, tx);
    let Some(watch) = inner.media.take() else {
        return false;
    };
    let seconds = now.duration_since(watch.started).as_secs_f64();
    append(
        inner,
        tx,
        ActionKind::Watch {
            selector: watch.selector,
            seconds,
        },
        watch.hints,
        watch.url,
    );
    true
}
