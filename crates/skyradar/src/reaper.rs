//! Periodic eviction of stale aircraft.
//!
//! The [`Reaper`] sweeps the store on a fixed interval and removes every
//! record that has gone without a report for longer than the stale timeout.
//! Each evicted record is handed to an [`ExpiryHook`], which is where the
//! flight history archive plugs in.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::position::PositionRecord;
use crate::store::AircraftStore;

/// Side effect run for every record the reaper evicts.
#[async_trait::async_trait]
pub trait ExpiryHook: Send + Sync {
    /// Called once per evicted record, after it has left the store.
    ///
    /// # Errors
    ///
    /// Failures are logged by the reaper; the record stays evicted.
    async fn on_expire(&self, record: &PositionRecord) -> Result<()>;
}

/// An [`ExpiryHook`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExpiry;

#[async_trait::async_trait]
impl ExpiryHook for NoopExpiry {
    async fn on_expire(&self, _record: &PositionRecord) -> Result<()> {
        Ok(())
    }
}

/// What a single sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Records examined.
    pub scanned: usize,
    /// Records evicted.
    pub removed: usize,
    /// Evicted records whose hook failed.
    pub hook_failures: usize,
    /// Incidents dropped from the log for falling out of the window.
    pub incidents_pruned: usize,
}

/// Staleness sweeper for an [`AircraftStore`].
pub struct Reaper {
    store: Arc<AircraftStore>,
    hook: Arc<dyn ExpiryHook>,
    timeout: Duration,
    interval: Duration,
}

impl std::fmt::Debug for Reaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaper")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Reaper {
    /// Create a reaper evicting records idle for longer than `timeout`,
    /// sweeping every `interval` once spawned.
    #[must_use]
    pub fn new(
        store: Arc<AircraftStore>,
        hook: Arc<dyn ExpiryHook>,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            hook,
            timeout,
            interval,
        }
    }

    /// Run one sweep against the store's clock.
    ///
    /// Candidates come from a snapshot; each one is removed only if it is
    /// still stale at removal time, so a report that arrives mid-sweep keeps
    /// its record. Never fails: hook errors and hook panics are counted and
    /// logged.
    pub async fn sweep(&self) -> ReapReport {
        let now = self.store.clock().now();
        let candidates = self.store.list_all();
        let mut report = ReapReport {
            scanned: candidates.len(),
            ..ReapReport::default()
        };

        for candidate in candidates.iter().filter(|r| r.is_stale(now, self.timeout)) {
            let Some(expired) = self.store.remove_if_stale(&candidate.id, now, self.timeout)
            else {
                continue;
            };
            report.removed += 1;
            debug!(
                id = %expired.id,
                callsign = %expired.callsign,
                last_updated_at = %expired.last_updated_at,
                "Reaped stale aircraft"
            );

            match AssertUnwindSafe(self.hook.on_expire(&expired))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.hook_failures += 1;
                    warn!(id = %expired.id, error = %e, "Expiry hook failed");
                }
                Err(_) => {
                    report.hook_failures += 1;
                    warn!(id = %expired.id, "Expiry hook panicked");
                }
            }
        }

        report.incidents_pruned = self.store.incidents().prune(now);
        report
    }

    /// Start sweeping on a background task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> ReaperHandle {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        let task = {
            let stop_signal = Arc::clone(&stop_signal);
            let wake = Arc::clone(&wake);
            tokio::spawn(async move {
                info!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    interval_secs = self.interval.as_secs_f64(),
                    "Reaper started"
                );
                let mut ticker = tokio::time::interval(self.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        () = wake.notified() => {}
                    }
                    if stop_signal.load(Ordering::SeqCst) {
                        break;
                    }

                    let report = self.sweep().await;
                    if report.removed > 0 || report.hook_failures > 0 {
                        info!(
                            removed = report.removed,
                            hook_failures = report.hook_failures,
                            remaining = self.store.len(),
                            "Reaper sweep"
                        );
                    }
                }
                info!("Reaper stopped");
            })
        };

        ReaperHandle {
            stop_signal,
            wake,
            task,
        }
    }
}

/// Control handle for a spawned [`Reaper`].
#[derive(Debug)]
pub struct ReaperHandle {
    stop_signal: Arc<AtomicBool>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the reaper to stop after its current sweep.
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Stop the reaper and wait for its task to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the reaper task panicked.
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.task.await?;
        Ok(())
    }
}
