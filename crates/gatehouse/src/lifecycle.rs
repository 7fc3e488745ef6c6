//! Conference lifecycle hook: purges sessions when their conference ends.
//!
//! The conference manager (elsewhere) announces ended conferences on a
//! `tokio::sync::broadcast` channel. While the authority runs, a small task
//! listens on its own receiver; dropping that receiver on stop is what
//! unregisters the authority.

use gatehouse_protocol::SessionToken;
use gatehouse_session::SharedRegistry;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

/// "Conference `conference_name` is over."
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConferenceEnded {
    pub conference_name: String,
}

impl ConferenceEnded {
    pub fn new(conference_name: impl Into<String>) -> Self {
        Self {
            conference_name: conference_name.into(),
        }
    }
}

/// A source of conference-end notifications.
///
/// Each call to `subscribe` must return a fresh receiver; the subscription
/// ends when that receiver is dropped. A plain
/// `broadcast::Sender<ConferenceEnded>` already is such a source.
pub trait ConferenceLifecycle: Send + Sync + 'static {
    fn subscribe(&self) -> broadcast::Receiver<ConferenceEnded>;
}

impl ConferenceLifecycle for broadcast::Sender<ConferenceEnded> {
    fn subscribe(&self) -> broadcast::Receiver<ConferenceEnded> {
        broadcast::Sender::subscribe(self)
    }
}

/// Applies a conference-end notification to the registry.
///
/// Does nothing unless eager destruction is enabled; otherwise sessions of
/// the ended conference are left to expire so a returning participant can
/// rejoin without logging in again.
pub(crate) async fn conference_ended(
    registry: &SharedRegistry,
    destroy_on_conference_end: bool,
    conference_name: &str,
) -> Vec<SessionToken> {
    if !destroy_on_conference_end {
        tracing::trace!(conference = %conference_name, "conference ended, keeping sessions");
        return Vec::new();
    }

    let removed = registry.lock().await.purge_by_conference(conference_name);
    tracing::info!(
        conference = %conference_name,
        count = removed.len(),
        "sessions purged for ended conference"
    );
    removed
}

/// The running subscription task.
pub(crate) struct LifecycleHook {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl LifecycleHook {
    pub(crate) fn spawn(
        registry: SharedRegistry,
        destroy_on_conference_end: bool,
        events: broadcast::Receiver<ConferenceEnded>,
    ) -> Self {
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(
            registry,
            destroy_on_conference_end,
            events,
            shutdown_rx,
        ));
        Self { shutdown, task }
    }

    /// Stops listening and waits for the task, dropping the receiver.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            if e.is_panic() {
                tracing::error!(error = %e, "conference lifecycle hook panicked");
            }
        }
    }
}

async fn run(
    registry: SharedRegistry,
    destroy_on_conference_end: bool,
    mut events: broadcast::Receiver<ConferenceEnded>,
    mut shutdown: oneshot::Receiver<()>,
) {
    tracing::debug!("subscribed to conference lifecycle");

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(ended) => {
                    conference_ended(
                        &registry,
                        destroy_on_conference_end,
                        &ended.conference_name,
                    )
                    .await;
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Missed purges are caught later by expiry.
                    tracing::warn!(missed, "conference lifecycle receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("conference lifecycle source closed");
                    break;
                }
            },
        }
    }

    tracing::debug!("unsubscribed from conference lifecycle");
}
