use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};

use crate::error::{EngineError, EngineResult};

/// Owning half of a cancellation signal. Drop-safe: receivers just see the
/// channel close and treat it as cancelled.
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx })
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Cheap cloneable view of a [`CancelSource`].
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the source cancels (or is dropped).
    pub async fn cancelled(&mut self) {
        // wait_for errors when the sender is gone, which counts as cancelled
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }

    /// A token that never fires; for waits that have no owner to cancel them.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // leak the sender so the channel stays open
        std::mem::forget(tx);
        Self { rx }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(EngineError),
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollOptions {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Runs `probe` on a fixed cadence until it yields a value, the deadline
/// passes, the token cancels, or the probe fails outright.
///
/// The probe distinguishes "keep trying" (`Ok(None)`) from hard failure
/// (`Err`); driver errors like a torn-down execution context surface
/// immediately instead of burning the rest of the timeout.
pub async fn poll_until<T, F, Fut>(
    options: PollOptions,
    cancel: &CancelToken,
    mut probe: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EngineResult<Option<T>>>,
{
    let deadline = Instant::now() + options.timeout;
    let mut cancel = cancel.clone();

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        match probe().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {}
            Err(err) => return Err(PollError::Failed(err)),
        }

        if Instant::now() + options.interval > deadline {
            return Err(PollError::TimedOut(options.timeout));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = sleep(options.interval) => {}
        }
    }
}

impl From<PollError> for EngineError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::TimedOut(timeout) => EngineError::ElementNotFound {
                selector: String::new(),
                timeout,
            },
            PollError::Cancelled => EngineError::Cancelled,
            PollError::Failed(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn poll_returns_first_successful_probe() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let (_source, token) = CancelSource::new();

        let result = poll_until(
            PollOptions::new(Duration::from_millis(50), Duration::from_secs(15)),
            &token,
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Ok(if n >= 3 { Some(n) } else { None })
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_after_budget() {
        let (_source, token) = CancelSource::new();
        let started = Instant::now();

        let result: Result<(), _> = poll_until(
            PollOptions::new(Duration::from_millis(50), Duration::from_secs(2)),
            &token,
            || async { Ok(None) },
        )
        .await;

        assert!(matches!(result, Err(PollError::TimedOut(_))));
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(1950) && elapsed <= Duration::from_millis(2100),
            "waited {elapsed:?}, expected about the 2s budget"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_wait_early() {
        let (source, token) = CancelSource::new();

        let waiter = tokio::spawn(async move {
            poll_until::<(), _, _>(
                PollOptions::new(Duration::from_millis(50), Duration::from_secs(60)),
                &token,
                || async { Ok(None) },
            )
            .await
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        source.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(PollError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_aborts_immediately() {
        let (_source, token) = CancelSource::new();
        let started = Instant::now();

        let result: Result<(), _> = poll_until(
            PollOptions::new(Duration::from_millis(50), Duration::from_secs(15)),
            &token,
            || async { Err(crate::error::EngineError::NavigationInterrupted) },
        )
        .await;

        assert!(matches!(
            result,
            Err(PollError::Failed(EngineError::NavigationInterrupted))
        ));
        assert!(started.elapsed() < Duration::from_millis(10));
    }
}
