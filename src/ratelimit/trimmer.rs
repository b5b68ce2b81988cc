//! Periodic background trimming.
//!
//! `RateLimiter::check` already trims opportunistically. Workloads that mostly
//! consume without checking can run a trimmer task so idle identifiers are
//! still reclaimed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Shortest interval a trimmer will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running trimmer task.
///
/// Dropping the handle also stops the task.
pub struct TrimmerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TrimmerHandle {
    /// Stop the trimmer and wait for it to exit.
    pub async fn shutdown(self) {
        // The task may already be gone if the runtime is shutting down.
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Trimmer task ended abnormally");
        }
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task on the current tokio runtime that calls
/// [`RateLimiter::trim`] every `interval`.
///
/// Intervals below one millisecond are raised to one millisecond.
pub fn spawn_trimmer<C>(limiter: Arc<RateLimiter<C>>, interval: Duration) -> TrimmerHandle
where
    C: Clock + 'static,
{
    let interval = interval.max(MIN_INTERVAL);
    let (shutdown, mut stop) = oneshot::channel::<()>();

    info!(
        interval_ms = interval.as_millis() as u64,
        "Starting periodic trimmer"
    );

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut stop => {
                    debug!("Periodic trimmer stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = limiter.trim();
                    trace!(
                        evicted = evicted,
                        remaining = limiter.record_count(),
                        "Periodic trim pass"
                    );
                }
            }
        }
    });

    TrimmerHandle { shutdown, task }
}
