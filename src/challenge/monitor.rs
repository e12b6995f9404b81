use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::detectors::ChallengeDetector;
use crate::browser::driver::DynPage;
use crate::error::EngineError;
use crate::resolve::wait::CancelSource;

/// Read side of the challenge monitor: two level-style flags the recorder
/// consults before turning events into actions.
#[derive(Clone)]
pub struct ChallengeFlags {
    pin: watch::Receiver<bool>,
    otp: watch::Receiver<Option<String>>,
}

impl ChallengeFlags {
    pub fn pin_active(&self) -> bool {
        *self.pin.borrow()
    }

    pub fn otp_active(&self) -> bool {
        self.otp.borrow().is_some()
    }

    /// Capture must stay off while either challenge is on screen.
    pub fn any_active(&self) -> bool {
        self.pin_active() || self.otp_active()
    }

    /// Raw OTP channel, for waiting on transitions. The value is the
    /// detected prompt while the challenge is up.
    pub fn otp_watch(&self) -> watch::Receiver<Option<String>> {
        self.otp.clone()
    }
}

/// Polls the challenge detectors against a page and publishes the results
/// as change-only watch flags, so consumers can both sample the level and
/// select on the edges.
pub struct ChallengeMonitor {
    pin_tx: watch::Sender<bool>,
    otp_tx: watch::Sender<Option<String>>,
    detector: Arc<ChallengeDetector>,
    interval: Duration,
    cancel: CancelSource,
}

impl ChallengeMonitor {
    pub fn new(interval: Duration) -> Self {
        Self::with_detector(interval, ChallengeDetector::default())
    }

    pub fn with_detector(interval: Duration, detector: ChallengeDetector) -> Self {
        let (pin_tx, _) = watch::channel(false);
        let (otp_tx, _) = watch::channel(None);
        let (cancel, _) = CancelSource::new();
        Self {
            pin_tx,
            otp_tx,
            detector: Arc::new(detector),
            interval,
            cancel,
        }
    }

    pub fn flags(&self) -> ChallengeFlags {
        ChallengeFlags {
            pin: self.pin_tx.subscribe(),
            otp: self.otp_tx.subscribe(),
        }
    }

    /// Starts the polling loop against `page`. The loop keeps the last
    /// known state across transient driver errors; a navigation mid-poll
    /// is normal during recording.
    pub fn spawn(&self, page: DynPage) -> JoinHandle<()> {
        let pin_tx = self.pin_tx.clone();
        let otp_tx = self.otp_tx.clone();
        let detector = self.detector.clone();
        let interval = self.interval;
        let mut cancel = self.cancel.token();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                match detector.pin_dialog(&page).await {
                    Ok(pin) => set_pin(&pin_tx, pin),
                    Err(EngineError::NavigationInterrupted) => continue,
                    Err(err) => trace!(error = %err, "pin probe failed"),
                }

                match detector.otp_page(&page).await {
                    Ok(otp) => set_otp(&otp_tx, otp),
                    Err(EngineError::NavigationInterrupted) => continue,
                    Err(err) => trace!(error = %err, "otp probe failed"),
                }
            }
            debug!("challenge monitor stopped");
        })
    }

    /// Direct flag injection, for embedders that run their own detection.
    pub fn set_pin(&self, active: bool) {
        set_pin(&self.pin_tx, active);
    }

    pub fn set_otp(&self, prompt: Option<String>) {
        set_otp(&self.otp_tx, prompt);
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChallengeMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn set_pin(tx: &watch::Sender<bool>, active: bool) {
    let changed = tx.send_if_modified(|current| {
        if *current != active {
            *current = active;
            true
        } else {
            false
        }
    });
    if changed {
        debug!(active, "pin challenge flag changed");
    }
}

fn set_otp(tx: &watch::Sender<Option<String>>, prompt: Option<String>) {
    let changed = tx.send_if_modified(|current| {
        if current.is_some() != prompt.is_some() {
            *current = prompt.clone();
            true
        } else {
            false
        }
    });
    if changed {
        debug!(active = tx.borrow().is_some(), "otp challenge flag changed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_report_level_and_edges() {
        let monitor = ChallengeMonitor::new(Duration::from_millis(500));
        let flags = monitor.flags();
        assert!(!flags.any_active());

        monitor.set_otp(Some("Enter your code".to_string()));
        assert!(flags.otp_active());
        assert!(flags.any_active());

        let mut watch = flags.otp_watch();
        // the pending change notification corresponds to the set above
        watch.borrow_and_update();

        monitor.set_otp(Some("Enter your code".to_string()));
        assert!(
            !watch.has_changed().unwrap(),
            "same level must not signal another edge"
        );

        monitor.set_otp(None);
        assert!(watch.has_changed().unwrap());
        assert!(!flags.otp_active());
    }

    #[tokio::test]
    async fn pin_flag_toggles_independently() {
        let monitor = ChallengeMonitor::new(Duration::from_millis(500));
        let flags = monitor.flags();

        monitor.set_pin(true);
        assert!(flags.pin_active());
        assert!(!flags.otp_active());

        monitor.set_pin(false);
        assert!(!flags.any_active());
    }
}
