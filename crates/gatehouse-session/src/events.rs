//! Session lifecycle events and the sink that receives them.
//!
//! The registry reports every creation and removal to an [`EventSink`].
//! Where those events end up (an audit log, an analytics pipeline, a
//! metrics exporter) is up to the host. Having no sink at all is allowed:
//! the registry logs the miss and carries on.

use std::collections::BTreeMap;

use gatehouse_protocol::SessionToken;

/// Verifier-specific properties recorded with a new session (e.g. the SSO
/// provider's subject id, the authentication method used).
pub type Properties = BTreeMap<String, String>;

/// Why a session left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Explicitly destroyed (logout).
    Destroyed,
    /// Idle for longer than the configured lifetime.
    Expired,
    /// Its conference ended while eager destruction was enabled.
    ConferenceEnded,
}

/// Something that happened to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Created {
        session_id: SessionToken,
        identity: String,
        machine_id: String,
        properties: Properties,
    },
    Destroyed {
        session_id: SessionToken,
        identity: String,
        machine_id: String,
        reason: RemovalReason,
    },
}

impl SessionEvent {
    /// The session this event is about.
    pub fn session_id(&self) -> &SessionToken {
        match self {
            Self::Created { session_id, .. } | Self::Destroyed { session_id, .. } => {
                session_id
            }
        }
    }
}

/// Receives session events.
///
/// Called while the registry lock is held, so implementations must not
/// block: hand the event to a channel or a buffered writer and return.
///
/// Any `Fn(SessionEvent)` closure is a sink, which is handy in tests:
///
/// ```rust
/// use std::sync::Arc;
/// use gatehouse_session::{SessionEvent, SessionRegistry};
///
/// let registry = SessionRegistry::with_event_sink(Arc::new(|event: SessionEvent| {
///     println!("session event: {event:?}");
/// }));
/// assert!(registry.is_empty());
/// ```
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: SessionEvent);
}

impl<F> EventSink for F
where
    F: Fn(SessionEvent) + Send + Sync + 'static,
{
    fn emit(&self, event: SessionEvent) {
        self(event)
    }
}
