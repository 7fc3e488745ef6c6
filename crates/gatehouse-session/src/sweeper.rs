//! Background expiry: evicts sessions idle for longer than their lifetime.
//!
//! The sweeper is a Tokio task running a fixed-interval loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown => break,
//!         _ = ticker.tick() => registry.lock().await.sweep_expired(now, lifetime),
//!     }
//! }
//! ```
//!
//! Sweep cadence is a liveness property: a session may outlive its lifetime
//! by up to one interval. If the task falls behind (a long lock wait, a
//! starved runtime), missed ticks are skipped rather than replayed in a
//! burst.

use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{SessionConfig, SharedRegistry};

/// Handle to a running sweeper task.
///
/// Dropping the handle without calling [`stop`](Self::stop) also ends the
/// task (its shutdown channel closes), but without waiting for it.
pub struct Sweeper {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    ///
    /// The first sweep happens one `sweep_interval` (plus up to
    /// `sweep_jitter`) after spawning, then every `sweep_interval`.
    pub fn spawn(registry: SharedRegistry, config: &SessionConfig) -> Self {
        let config = config.clone().validated();
        let jitter = if config.sweep_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max = u64::try_from(config.sweep_jitter.as_micros()).unwrap_or(u64::MAX);
            Duration::from_micros(rand::rng().random_range(0..=max))
        };

        tracing::debug!(
            interval = ?config.sweep_interval,
            lifetime = ?config.lifetime,
            ?jitter,
            "session sweeper started"
        );

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            registry,
            config.lifetime,
            config.sweep_interval,
            jitter,
            shutdown_rx,
        ));

        Self { shutdown, task }
    }

    /// Stops the sweeper and waits for the task to finish.
    ///
    /// Once this returns, no further sweep will run.
    pub async fn stop(self) {
        // The task may already be gone if it panicked; a failed send is fine.
        let _ = self.shutdown.send(());

        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "session sweeper panicked");
            }
        }
        tracing::debug!("session sweeper stopped");
    }

    /// `true` once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run(
    registry: SharedRegistry,
    lifetime: Duration,
    interval: Duration,
    jitter: Duration,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = time::interval_at(Instant::now() + interval + jitter, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Shutdown wins over a tick that became ready at the same time.
            biased;
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let removed = registry
                    .lock()
                    .await
                    .sweep_expired(Instant::now(), lifetime);
                if !removed.is_empty() {
                    tracing::debug!(count = removed.len(), "expired sessions swept");
                }
            }
        }
    }
}
