//! Recurring curation loop.
//!
//! Fires [`Curator::run_curation`] on a fixed interval. Each firing runs as
//! its own task so a hung platform call never stalls the timer; a tick that
//! arrives while the previous firing is still running is skipped, not queued.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::scheduler::{CurationOutcome, Curator};

/// How long shutdown waits for a firing that is still running.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

/// Held for the duration of one firing; clears the in-flight flag on drop,
/// including when the firing panics.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CurationLoop {
    curator: Curator,
    interval: Duration,
    in_flight: Arc<AtomicBool>,
}

impl CurationLoop {
    pub fn new(curator: Curator, interval: Duration) -> Self {
        Self {
            curator,
            interval,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start one firing in the background, unless one is already running.
    pub fn try_fire(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            tracing::debug!("Previous curation still running, skipping tick");
            return None;
        };

        let curator = self.curator.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match catch_task_panic(curator.run_curation()).await {
                Ok(Ok(CurationOutcome::NoSources)) => {}
                Ok(Ok(outcome)) => tracing::debug!(?outcome, "Curation firing finished"),
                Ok(Err(e)) => tracing::warn!(error = %e, "Curation firing failed"),
                Err(panic_msg) => tracing::error!(error = %panic_msg, "Curation firing panicked"),
            }
        }))
    }

    /// Fire immediately, then every `interval`, until `shutdown` resolves.
    ///
    /// A firing in progress at shutdown is awaited for up to
    /// a minute before returning.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval_secs = self.interval.as_secs(), "Curation loop started");

        let mut current: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    tracing::info!("Curation loop stopping");
                    break;
                }

                _ = ticker.tick() => {
                    if let Some(handle) = self.try_fire() {
                        current = Some(handle);
                    }
                }
            }
        }

        if let Some(handle) = current.filter(|h| !h.is_finished()) {
            tracing::info!("Waiting for the running curation firing to finish");
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Curation firing did not complete"),
                Err(_) => tracing::warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "Curation firing still running at shutdown, abandoning it"
                ),
            }
        }
    }
}

/// Run a future, converting a panic into `Err(message)`.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            }
        })
}
