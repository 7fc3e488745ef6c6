//! The session registry: every live authentication session.
//!
//! This is the central piece of the session layer. It's responsible for:
//! - Creating sessions with collision-free tokens
//! - Looking sessions up by token, by (machine, identity), or by peer
//! - Attaching the current connection to a session
//! - Removing sessions on logout, expiry, or conference end
//! - Reporting creations and removals to the [`EventSink`]
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself: it is a plain
//! `HashMap`. Callers share it as a [`SharedRegistry`]: one
//! `tokio::sync::Mutex` that request handlers, the sweeper, and the
//! conference-end hook all take. Every method here runs to completion
//! under that lock, so nobody ever sees a half-applied change.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gatehouse_protocol::{PeerAddress, SessionToken};
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{EventSink, Properties, RemovalReason, Session, SessionEvent};

/// The registry handle shared between the authority and its background
/// tasks. One lock for everything: session churn follows conference joins,
/// not media traffic, so contention is not a concern.
pub type SharedRegistry = Arc<Mutex<SessionRegistry>>;

/// All live sessions, keyed by token.
///
/// ## Lifecycle
///
/// ```text
/// create() ──→ attach() ──→ attach() ... ──→ destroy()            [logout]
///                                       └──→ sweep_expired()      [idle]
///                                       └──→ purge_by_conference() [ended]
/// ```
///
/// Every removal is final; a removed token is never handed out again while
/// the registry lives (tokens are 128-bit random, and creation retries on
/// the off chance of a collision with a live one).
pub struct SessionRegistry {
    sessions: HashMap<SessionToken, Session>,
    sink: Option<Arc<dyn EventSink>>,
    token_source: fn() -> String,
}

impl SessionRegistry {
    /// Creates an empty registry with no event sink.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            sink: None,
            token_source: generate_token,
        }
    }

    /// Creates an empty registry that reports to `sink`.
    pub fn with_event_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::new()
        }
    }

    /// Replaces (or removes) the event sink.
    pub fn set_event_sink(&mut self, sink: Option<Arc<dyn EventSink>>) {
        self.sink = sink;
    }

    /// Wraps the registry in the shared lock.
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Creates a new session and returns it.
    ///
    /// Always succeeds: if the generated token collides with a live one
    /// (astronomically unlikely, but possible), a new token is drawn.
    /// `properties` are forwarded to the sink with the "created" event.
    pub fn create(
        &mut self,
        machine_id: &str,
        identity: &str,
        conference_name: &str,
        properties: Properties,
    ) -> &Session {
        let token = self.unused_token();
        let session =
            Session::new(token.clone(), machine_id, identity, conference_name);

        tracing::info!(
            %token,
            %identity,
            %machine_id,
            conference = %conference_name,
            "authentication session created"
        );

        self.emit(SessionEvent::Created {
            session_id: token.clone(),
            identity: identity.to_owned(),
            machine_id: machine_id.to_owned(),
            properties,
        });

        // `entry().or_insert()` hands back a reference to the value it
        // just stored, so no second lookup is needed.
        self.sessions.entry(token).or_insert(session)
    }

    /// Looks up a session by token.
    pub fn get(&self, token: &SessionToken) -> Option<&Session> {
        self.sessions.get(token)
    }

    /// Finds the session a given identity holds on a given machine.
    ///
    /// Returns `None` if either argument is empty: an anonymous request
    /// can't claim somebody's session.
    pub fn find_by_identity(
        &self,
        machine_id: &str,
        identity: &str,
    ) -> Option<&Session> {
        if machine_id.is_empty() || identity.is_empty() {
            return None;
        }
        self.sessions
            .values()
            .find(|s| s.identity == identity && s.machine_id == machine_id)
    }

    /// Finds the session currently attached to `peer`.
    pub fn find_by_peer(&self, peer: &PeerAddress) -> Option<&Session> {
        if peer.is_empty() {
            return None;
        }
        self.sessions
            .values()
            .find(|s| s.peer_address.as_ref() == Some(peer))
    }

    /// Attaches `peer` to the session and refreshes its activity timestamp.
    ///
    /// A session carries one peer at a time (the new one wins), and a peer
    /// belongs to one session at a time: it is detached from whichever
    /// session held it before.
    ///
    /// Returns `None` if the token is unknown.
    pub fn attach(
        &mut self,
        token: &SessionToken,
        peer: PeerAddress,
    ) -> Option<&Session> {
        if !self.sessions.contains_key(token) {
            return None;
        }

        for other in self.sessions.values_mut() {
            if other.token != *token && other.peer_address.as_ref() == Some(&peer)
            {
                tracing::debug!(
                    token = %other.token,
                    %peer,
                    "peer moved to another session, detaching"
                );
                other.peer_address = None;
            }
        }

        let session = self.sessions.get_mut(token)?;
        session.peer_address = Some(peer);
        session.touch();
        Some(&*session)
    }

    /// Removes a session. Returns `true` if it existed.
    pub fn destroy(&mut self, token: &SessionToken) -> bool {
        let Some(session) = self.sessions.remove(token) else {
            return false;
        };

        tracing::info!(%session, "authentication session destroyed");
        self.emit(SessionEvent::Destroyed {
            session_id: session.token,
            identity: session.identity,
            machine_id: session.machine_id,
            reason: RemovalReason::Destroyed,
        });
        true
    }

    /// Removes every session created for `conference_name`.
    ///
    /// Returns the removed tokens.
    pub fn purge_by_conference(
        &mut self,
        conference_name: &str,
    ) -> Vec<SessionToken> {
        self.remove_where(RemovalReason::ConferenceEnded, |s| {
            s.conference_name == conference_name
        })
    }

    /// Removes every session idle for longer than `lifetime` as of `now`.
    ///
    /// Returns the removed tokens.
    pub fn sweep_expired(
        &mut self,
        now: Instant,
        lifetime: Duration,
    ) -> Vec<SessionToken> {
        self.remove_where(RemovalReason::Expired, |s| s.is_expired(now, lifetime))
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterates over all live sessions in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    fn remove_where(
        &mut self,
        reason: RemovalReason,
        mut doomed: impl FnMut(&Session) -> bool,
    ) -> Vec<SessionToken> {
        let removed: Vec<SessionToken> = self
            .sessions
            .values()
            .filter(|s| doomed(s))
            .map(|s| s.token.clone())
            .collect();

        for token in &removed {
            let Some(session) = self.sessions.remove(token) else {
                continue;
            };
            tracing::info!(%session, ?reason, "removing authentication session");
            self.emit(SessionEvent::Destroyed {
                session_id: session.token,
                identity: session.identity,
                machine_id: session.machine_id,
                reason,
            });
        }
        removed
    }

    fn unused_token(&self) -> SessionToken {
        loop {
            let token = SessionToken::new((self.token_source)());
            if !self.sessions.contains_key(&token) {
                return token;
            }
            tracing::debug!("session token collision, regenerating");
        }
    }

    fn emit(&self, event: SessionEvent) {
        match &self.sink {
            Some(sink) => sink.emit(event),
            None => tracing::error!(
                session_id = %event.session_id(),
                "unable to emit session event: no event sink configured"
            ),
        }
    }

    #[cfg(test)]
    fn with_token_source(token_source: fn() -> String) -> Self {
        Self {
            token_source,
            ..Self::new()
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Tokens are bearer credentials for a conference login, so they must not
/// be guessable; 2^128 possibilities keeps them out of reach.
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionRegistry`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.
    //!
    //! Expiry is tested by handing `sweep_expired` an explicit `now` in the
    //! future instead of sleeping, which keeps these tests instant.

    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    // -- Helpers ----------------------------------------------------------

    /// A sink that remembers everything it was sent.
    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<SessionEvent>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl RecordingSink {
        fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    fn registry_with_sink() -> (SessionRegistry, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let registry = SessionRegistry::with_event_sink(sink.clone());
        (registry, sink)
    }

    fn create(
        registry: &mut SessionRegistry,
        machine: &str,
        identity: &str,
        conference: &str,
    ) -> SessionToken {
        registry
            .create(machine, identity, conference, Properties::new())
            .token
            .clone()
    }

    fn peer(addr: &str) -> PeerAddress {
        PeerAddress::new(addr)
    }

    const HOUR: Duration = Duration::from_secs(3600);

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_returns_session_with_given_fields() {
        let mut registry = SessionRegistry::new();

        let session = registry.create("m1", "alice", "room1", Properties::new());

        assert_eq!(session.machine_id, "m1");
        assert_eq!(session.identity, "alice");
        assert_eq!(session.conference_name, "room1");
        assert!(session.peer_address.is_none());
        // 16 random bytes as hex.
        assert_eq!(session.token.as_str().len(), 32);
    }

    #[test]
    fn test_create_many_sessions_all_tokens_unique() {
        let mut registry = SessionRegistry::new();

        let tokens: HashSet<SessionToken> = (0..500)
            .map(|i| create(&mut registry, "m1", &format!("user{i}"), "room1"))
            .collect();

        assert_eq!(tokens.len(), 500);
        assert_eq!(registry.len(), 500);
    }

    #[test]
    fn test_create_retries_on_token_collision() {
        // The first three draws all produce "dup"; the fourth produces a
        // fresh value. The second create must skip past the collisions.
        static DRAWS: AtomicUsize = AtomicUsize::new(0);
        fn colliding_source() -> String {
            let n = DRAWS.fetch_add(1, Ordering::SeqCst);
            if n < 3 { "dup".to_string() } else { format!("fresh-{n}") }
        }

        let mut registry = SessionRegistry::with_token_source(colliding_source);

        let first = create(&mut registry, "m1", "alice", "room1");
        let second = create(&mut registry, "m1", "bob", "room1");

        assert_eq!(first.as_str(), "dup");
        assert_eq!(second.as_str(), "fresh-3");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_create_emits_created_event_with_properties() {
        let (mut registry, sink) = registry_with_sink();
        let mut props = Properties::new();
        props.insert("provider".into(), "sso".into());

        let token = registry.create("m1", "alice", "room1", props.clone()).token.clone();

        assert_eq!(
            sink.events(),
            vec![SessionEvent::Created {
                session_id: token,
                identity: "alice".into(),
                machine_id: "m1".into(),
                properties: props,
            }]
        );
    }

    #[test]
    fn test_create_without_sink_still_succeeds() {
        let mut registry = SessionRegistry::new();

        create(&mut registry, "m1", "alice", "room1");

        assert_eq!(registry.len(), 1);
    }

    // =====================================================================
    // get() / find_by_identity() / find_by_peer()
    // =====================================================================

    #[test]
    fn test_get_unknown_token_returns_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get(&SessionToken::new("nope")).is_none());
    }

    #[test]
    fn test_get_returns_created_session() {
        let mut registry = SessionRegistry::new();
        let token = create(&mut registry, "m1", "alice", "room1");

        let session = registry.get(&token).expect("session should exist");

        assert_eq!(session.identity, "alice");
    }

    #[test]
    fn test_find_by_identity_matches_both_fields() {
        let mut registry = SessionRegistry::new();
        let alice_m1 = create(&mut registry, "m1", "alice", "room1");
        create(&mut registry, "m2", "alice", "room1");
        create(&mut registry, "m1", "bob", "room1");

        let found = registry.find_by_identity("m1", "alice").unwrap();

        assert_eq!(found.token, alice_m1);
    }

    #[test]
    fn test_find_by_identity_empty_input_returns_none() {
        let mut registry = SessionRegistry::new();
        create(&mut registry, "", "alice", "room1");
        create(&mut registry, "m1", "", "room1");

        assert!(registry.find_by_identity("", "alice").is_none());
        assert!(registry.find_by_identity("m1", "").is_none());
    }

    #[test]
    fn test_find_by_identity_no_match_returns_none() {
        let mut registry = SessionRegistry::new();
        create(&mut registry, "m1", "alice", "room1");

        assert!(registry.find_by_identity("m2", "alice").is_none());
    }

    #[test]
    fn test_find_by_peer_after_attach() {
        let mut registry = SessionRegistry::new();
        let token = create(&mut registry, "m1", "alice", "room1");
        registry.attach(&token, peer("room1/alice"));

        let found = registry.find_by_peer(&peer("room1/alice")).unwrap();

        assert_eq!(found.token, token);
        assert!(registry.find_by_peer(&peer("room1/bob")).is_none());
    }

    #[test]
    fn test_find_by_peer_empty_address_returns_none() {
        let registry = SessionRegistry::new();
        assert!(registry.find_by_peer(&peer("")).is_none());
    }

    // =====================================================================
    // attach()
    // =====================================================================

    #[test]
    fn test_attach_unknown_token_returns_none() {
        let mut registry = SessionRegistry::new();
        assert!(registry.attach(&SessionToken::new("x"), peer("p")).is_none());
    }

    #[test]
    fn test_attach_overwrites_previous_peer() {
        let mut registry = SessionRegistry::new();
        let token = create(&mut registry, "m1", "alice", "room1");
        registry.attach(&token, peer("first"));

        let session = registry.attach(&token, peer("second")).unwrap();

        assert_eq!(session.peer_address, Some(peer("second")));
        assert!(registry.find_by_peer(&peer("first")).is_none());
    }

    #[test]
    fn test_attach_moves_peer_between_sessions() {
        let mut registry = SessionRegistry::new();
        let old = create(&mut registry, "m1", "alice", "room1");
        let new = create(&mut registry, "m1", "bob", "room1");
        registry.attach(&old, peer("shared"));

        registry.attach(&new, peer("shared"));

        assert!(registry.get(&old).unwrap().peer_address.is_none());
        assert_eq!(registry.find_by_peer(&peer("shared")).unwrap().token, new);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_refreshes_last_activity() {
        let mut registry = SessionRegistry::new();
        let token = create(&mut registry, "m1", "alice", "room1");
        let created = registry.get(&token).unwrap().last_activity;

        tokio::time::advance(Duration::from_secs(30)).await;
        let session = registry.attach(&token, peer("p")).unwrap();

        assert_eq!(session.last_activity, created + Duration::from_secs(30));
    }

    // =====================================================================
    // destroy()
    // =====================================================================

    #[test]
    fn test_destroy_existing_returns_true_and_emits() {
        let (mut registry, sink) = registry_with_sink();
        let token = create(&mut registry, "m1", "alice", "room1");

        assert!(registry.destroy(&token));

        assert!(registry.get(&token).is_none());
        assert_eq!(
            sink.events().last(),
            Some(&SessionEvent::Destroyed {
                session_id: token,
                identity: "alice".into(),
                machine_id: "m1".into(),
                reason: RemovalReason::Destroyed,
            })
        );
    }

    #[test]
    fn test_destroy_twice_second_returns_false() {
        let (mut registry, sink) = registry_with_sink();
        let token = create(&mut registry, "m1", "alice", "room1");

        assert!(registry.destroy(&token));
        assert!(!registry.destroy(&token));

        // created + one destroyed, nothing for the failed attempt.
        assert_eq!(sink.events().len(), 2);
    }

    // =====================================================================
    // purge_by_conference()
    // =====================================================================

    #[test]
    fn test_purge_by_conference_removes_only_matching() {
        let (mut registry, sink) = registry_with_sink();
        let a = create(&mut registry, "m1", "alice", "room1");
        let b = create(&mut registry, "m2", "bob", "room1");
        let c = create(&mut registry, "m3", "carol", "room2");

        let mut removed = registry.purge_by_conference("room1");
        removed.sort();

        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(removed, expected);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&c).is_some());

        let conference_ended = sink
            .events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    SessionEvent::Destroyed { reason: RemovalReason::ConferenceEnded, .. }
                )
            })
            .count();
        assert_eq!(conference_ended, 2);
    }

    #[test]
    fn test_purge_by_conference_unknown_name_is_noop() {
        let mut registry = SessionRegistry::new();
        create(&mut registry, "m1", "alice", "room1");

        assert!(registry.purge_by_conference("nowhere").is_empty());
        assert_eq!(registry.len(), 1);
    }

    // =====================================================================
    // sweep_expired()
    // =====================================================================

    #[test]
    fn test_sweep_expired_removes_idle_sessions() {
        let mut registry = SessionRegistry::new();
        let token = create(&mut registry, "m1", "alice", "room1");
        let later = Instant::now() + HOUR + Duration::from_secs(1);

        let removed = registry.sweep_expired(later, HOUR);

        assert_eq!(removed, vec![token]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_expired_keeps_sessions_within_lifetime() {
        let mut registry = SessionRegistry::new();
        create(&mut registry, "m1", "alice", "room1");

        let removed = registry.sweep_expired(Instant::now(), HOUR);

        assert!(removed.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_expired_spares_recently_attached() {
        let mut registry = SessionRegistry::new();
        let stale = create(&mut registry, "m1", "alice", "room1");
        let fresh = create(&mut registry, "m2", "bob", "room1");

        tokio::time::advance(Duration::from_secs(50)).await;
        registry.attach(&fresh, peer("bob"));
        tokio::time::advance(Duration::from_secs(20)).await;

        let removed = registry.sweep_expired(Instant::now(), Duration::from_secs(60));

        assert_eq!(removed, vec![stale]);
        assert!(registry.get(&fresh).is_some());
    }

    #[test]
    fn test_sweep_expired_emits_expired_reason() {
        let (mut registry, sink) = registry_with_sink();
        let token = create(&mut registry, "m1", "alice", "room1");

        registry.sweep_expired(Instant::now() + HOUR * 2, HOUR);

        assert_eq!(
            sink.events().last(),
            Some(&SessionEvent::Destroyed {
                session_id: token,
                identity: "alice".into(),
                machine_id: "m1".into(),
                reason: RemovalReason::Expired,
            })
        );
    }

    // =====================================================================
    // len() / is_empty() / iter()
    // =====================================================================

    #[test]
    fn test_len_tracks_session_count() {
        let mut registry = SessionRegistry::new();
        assert!(registry.is_empty());

        let token = create(&mut registry, "m1", "alice", "room1");
        create(&mut registry, "m2", "bob", "room1");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.iter().count(), 2);

        registry.destroy(&token);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_debug_does_not_dump_sessions() {
        let mut registry = SessionRegistry::new();
        create(&mut registry, "m1", "alice", "room1");

        let text = format!("{registry:?}");

        assert!(text.contains("sessions: 1"));
        assert!(!text.contains("alice"));
    }
}
