use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::browser::driver::DynPage;
use crate::challenge::ChallengeMonitor;
use crate::config::Config;
use crate::models::action::Action;
use crate::notify::{ProgressEvent, ProgressSink};
use crate::otp::{HttpOtpLookup, NullLookup, OtpLookup};
use crate::recording::Recorder;
use crate::replay::Player;
use crate::session::SessionRegistry;
use crate::store::{MemoryStore, ScriptStore, SqliteStore};

/// Event types broadcast to WebSocket clients.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// An action was just recorded.
    Recorded { uuid: String, action: Action },
    /// Playback progress, already in wire shape.
    Progress(ProgressEvent),
    Error { uuid: String, error: String },
    Pong,
}

/// A live recording: the launched page, the recorder pump feeding off it
/// and the challenge monitor gating it.
pub struct ActiveRecording {
    pub page: DynPage,
    pub recorder: Arc<Recorder>,
    pub monitor: ChallengeMonitor,
    pub monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl ActiveRecording {
    /// Stops the monitor and the browser. The recorder itself is stopped
    /// separately because its script is the thing being salvaged.
    pub async fn teardown(&self) {
        self.monitor.stop();
        if let Some(task) = self.monitor_task.lock().await.take() {
            task.abort();
        }
        self.page.close().await;
    }
}

/// A live playback: the player plus the page it drives. The host loop
/// removes the entry when the run winds down.
pub struct ActivePlayback {
    pub page: DynPage,
    pub player: Arc<Player>,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ScriptStore>,
    pub otp: Arc<dyn OtpLookup>,
    pub recordings: SessionRegistry<ActiveRecording>,
    pub playbacks: SessionRegistry<ActivePlayback>,
    pub ws_broadcast: broadcast::Sender<WsEvent>,
    /// Serializes browser launches so two requests cannot race two Chromes.
    pub launch_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (tx, _) = broadcast::channel(1024);

        let store: Arc<dyn ScriptStore> = match &config.script_db {
            Some(path) => match SqliteStore::open(path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "script store open failed, falling back to memory");
                    Arc::new(MemoryStore::new())
                }
            },
            None => match SqliteStore::open_default() {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    error!(error = %e, "script store init failed, falling back to memory");
                    Arc::new(MemoryStore::new())
                }
            },
        };

        let otp: Arc<dyn OtpLookup> = match &config.otp_lookup_url {
            Some(url) => match HttpOtpLookup::new(url.clone()) {
                Ok(lookup) => {
                    info!(endpoint = %url, "otp lookup client configured");
                    Arc::new(lookup)
                }
                Err(e) => {
                    warn!(error = %e, "otp lookup client init failed, checkpoints will wait for the operator");
                    Arc::new(NullLookup)
                }
            },
            None => Arc::new(NullLookup),
        };

        Self {
            config,
            store,
            otp,
            recordings: SessionRegistry::new(),
            playbacks: SessionRegistry::new(),
            ws_broadcast: tx,
            launch_lock: Mutex::new(()),
        }
    }

    /// State with explicit store and lookup, for tests and embedding.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn ScriptStore>,
        otp: Arc<dyn OtpLookup>,
    ) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            config,
            store,
            otp,
            recordings: SessionRegistry::new(),
            playbacks: SessionRegistry::new(),
            ws_broadcast: tx,
            launch_lock: Mutex::new(()),
        }
    }

    pub fn broadcast(&self, event: WsEvent) {
        // no receivers is routine
        let _ = self.ws_broadcast.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WsEvent> {
        self.ws_broadcast.subscribe()
    }
}

/// Routes player progress into the WebSocket broadcast.
pub struct WsProgressSink {
    tx: broadcast::Sender<WsEvent>,
}

impl WsProgressSink {
    pub fn new(tx: broadcast::Sender<WsEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for WsProgressSink {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(WsEvent::Progress(event));
    }
}
