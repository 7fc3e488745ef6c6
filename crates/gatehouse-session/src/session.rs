//! Session types: the record of one authenticated device.
//!
//! A session ties together:
//! - WHO authenticated (`identity`)
//! - FROM WHERE (`machine_id`, plus the currently attached `peer_address`)
//! - FOR WHAT (`conference_name`)
//! - WHEN it was last used (`last_activity`, drives expiry)

use std::fmt;
use std::time::Duration;

use gatehouse_protocol::{PeerAddress, SessionToken};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session lifetime and expiry sweeping.
///
/// Loaded once by the host (this crate never reads files or the
/// environment). `#[serde(default)]` lets a host config file mention only
/// the fields it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a session may sit idle before the sweeper evicts it.
    ///
    /// Default: 24 hours.
    pub lifetime: Duration,

    /// How often the sweeper scans the registry.
    ///
    /// A session can outlive `lifetime` by up to one interval. Default: 10s.
    pub sweep_interval: Duration,

    /// Destroy every session of a conference as soon as that conference
    /// ends, instead of letting them expire.
    ///
    /// Default: `false` (sessions survive so a returning participant can
    /// rejoin without logging in again).
    pub destroy_on_conference_end: bool,

    /// Upper bound for random delay added to the first sweep, so several
    /// authorities started at the same instant don't sweep in lockstep.
    pub sweep_jitter: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(10),
            destroy_on_conference_end: false,
            sweep_jitter: Duration::from_millis(500),
        }
    }
}

impl SessionConfig {
    /// Shortest sweep interval accepted. Anything faster is busy-looping
    /// on the registry lock.
    pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Rules:
    /// - `sweep_interval` raised to [`Self::MIN_SWEEP_INTERVAL`].
    /// - `sweep_jitter` capped at `sweep_interval`.
    pub fn validated(mut self) -> Self {
        if self.sweep_interval < Self::MIN_SWEEP_INTERVAL {
            tracing::warn!(
                interval = ?self.sweep_interval,
                min = ?Self::MIN_SWEEP_INTERVAL,
                "sweep_interval below minimum, clamping"
            );
            self.sweep_interval = Self::MIN_SWEEP_INTERVAL;
        }
        if self.sweep_jitter > self.sweep_interval {
            tracing::warn!(
                jitter = ?self.sweep_jitter,
                interval = ?self.sweep_interval,
                "sweep_jitter exceeds sweep_interval, clamping"
            );
            self.sweep_jitter = self.sweep_interval;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One authenticated device in one conference.
///
/// Only the registry holds the live copy; everything outside it sees either
/// a `&Session` borrowed under the registry lock or a cloned snapshot. So
/// the identity fields are effectively immutable once created.
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique token, generated by the registry.
    pub token: SessionToken,

    /// The device this session is bound to.
    pub machine_id: String,

    /// The principal the verifier resolved.
    pub identity: String,

    /// The conference the session was created for.
    pub conference_name: String,

    /// The connection currently using this session. Reattaching overwrites.
    pub peer_address: Option<PeerAddress>,

    /// Refreshed on every successful use.
    pub last_activity: Instant,

    pub created_at: Instant,
}

impl Session {
    pub(crate) fn new(
        token: SessionToken,
        machine_id: &str,
        identity: &str,
        conference_name: &str,
    ) -> Self {
        let now = Instant::now();
        Self {
            token,
            machine_id: machine_id.to_owned(),
            identity: identity.to_owned(),
            conference_name: conference_name.to_owned(),
            peer_address: None,
            last_activity: now,
            created_at: now,
        }
    }

    /// How long the session has been idle as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    /// `true` once the session has been idle for strictly longer than
    /// `lifetime`.
    pub fn is_expired(&self, now: Instant, lifetime: Duration) -> bool {
        self.idle_for(now) > lifetime
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session[{}@{} conference={} token={}]",
            self.identity, self.machine_id, self.conference_name, self.token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionToken::new("t1"), "m1", "alice", "room1")
    }

    #[test]
    fn test_config_default_values() {
        let config = SessionConfig::default();
        assert_eq!(config.lifetime, Duration::from_secs(86_400));
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert!(!config.destroy_on_conference_end);
    }

    #[test]
    fn test_validated_clamps_tiny_interval() {
        let config = SessionConfig {
            sweep_interval: Duration::ZERO,
            sweep_jitter: Duration::ZERO,
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(config.sweep_interval, SessionConfig::MIN_SWEEP_INTERVAL);
    }

    #[test]
    fn test_validated_caps_jitter_at_interval() {
        let config = SessionConfig {
            sweep_interval: Duration::from_secs(1),
            sweep_jitter: Duration::from_secs(5),
            ..SessionConfig::default()
        }
        .validated();

        assert_eq!(config.sweep_jitter, Duration::from_secs(1));
    }

    #[test]
    fn test_validated_keeps_sane_values() {
        let config = SessionConfig::default();
        assert_eq!(config.clone().validated(), config);
    }

    #[test]
    fn test_config_deserializes_partial_document() {
        let json = r#"{ "destroy_on_conference_end": true }"#;

        let config: SessionConfig = serde_json::from_str(json).unwrap();

        assert!(config.destroy_on_conference_end);
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_new_session_has_no_peer() {
        let s = session();
        assert!(s.peer_address.is_none());
        assert_eq!(s.last_activity, s.created_at);
    }

    #[test]
    fn test_is_expired_uses_strict_comparison() {
        let s = session();
        let lifetime = Duration::from_secs(60);

        assert!(!s.is_expired(s.last_activity + lifetime, lifetime));
        assert!(s.is_expired(
            s.last_activity + lifetime + Duration::from_millis(1),
            lifetime
        ));
    }

    #[test]
    fn test_idle_for_saturates_for_past_instant() {
        let s = session();
        let earlier = s.last_activity - Duration::from_millis(5);

        assert_eq!(s.idle_for(earlier), Duration::ZERO);
    }

    #[test]
    fn test_display_includes_identity_and_token() {
        let text = session().to_string();
        assert!(text.contains("alice@m1"));
        assert!(text.contains("token=t1"));
    }
}
