//! The authentication authority: runs the conference join/logout protocol.
//!
//! A join goes through three phases:
//!
//! ```text
//!   1. pre-check   [registry lock]   token exists? bound to this machine?
//!   2. verify      [no lock]         Verifier::verify (may do network I/O)
//!   3. commit      [registry lock]   reuse-or-create session, attach peer
//!   then           [no lock]         notify listeners, build the response
//! ```
//!
//! Splitting the critical section this way means a slow identity provider
//! never stalls other joins, the sweeper, or logouts.

use std::sync::Arc;

use gatehouse_protocol::{
    AuthError, JoinRequest, JoinResponse, LogoutRequest, LogoutResponse,
    PeerAddress, SessionToken,
};
use gatehouse_session::{
    Session, SessionConfig, SessionRegistry, SharedRegistry, Sweeper,
};
use tokio::sync::Mutex;

use crate::lifecycle::{self, LifecycleHook};
use crate::listener::ListenerSet;
use crate::{
    AuthenticationListener, ConferenceLifecycle, SessionPolicy, Verified,
    Verifier, VerifyContext,
};

/// Background tasks owned by a started authority.
struct Running {
    sweeper: Sweeper,
    hook: Option<LifecycleHook>,
}

/// What phase 3 should do, decided by phases 1 and 2.
enum Commit {
    /// `TrustToken` policy: refresh the pre-checked session as-is.
    Reuse(SessionToken),
    /// The verifier vouched for this identity.
    Verified(Verified),
}

/// Authenticates conference joins and owns the session lifecycle.
///
/// Generic over the [`Verifier`] so the credential check is chosen at
/// construction and statically dispatched.
///
/// ## Lifecycle
///
/// ```text
/// builder().build() ──→ start() ──→ process_join() / process_logout() ... ──→ stop()
///                          │                                                  │
///                          └─ spawns sweeper + conference hook ───────────────┘ (awaited)
/// ```
///
/// Requests can be processed before `start()`; sessions just won't expire
/// or react to conference ends until it is called.
pub struct AuthAuthority<V: Verifier> {
    registry: SharedRegistry,
    verifier: V,
    config: SessionConfig,
    listeners: ListenerSet,
    conferences: Option<Arc<dyn ConferenceLifecycle>>,
    running: Mutex<Option<Running>>,
}

impl<V: Verifier> AuthAuthority<V> {
    /// Creates a builder around the given verifier.
    pub fn builder(verifier: V) -> AuthAuthorityBuilder<V> {
        AuthAuthorityBuilder::new(verifier)
    }

    /// The registry this authority operates on.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// The effective (validated) configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    // -----------------------------------------------------------------
    // Listeners
    // -----------------------------------------------------------------

    /// Registers a listener. Returns `false` if this handle was already
    /// registered.
    pub fn add_listener(&self, listener: Arc<dyn AuthenticationListener>) -> bool {
        self.listeners.add(listener)
    }

    /// Unregisters a listener. Returns `false` if it wasn't registered.
    pub fn remove_listener(&self, listener: &Arc<dyn AuthenticationListener>) -> bool {
        self.listeners.remove(listener)
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Starts the expiry sweeper and subscribes to conference lifecycle
    /// events. Calling it on a running authority does nothing.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            tracing::debug!("authentication authority already running");
            return;
        }

        let sweeper = Sweeper::spawn(Arc::clone(&self.registry), &self.config);
        let hook = self.conferences.as_ref().map(|source| {
            LifecycleHook::spawn(
                Arc::clone(&self.registry),
                self.config.destroy_on_conference_end,
                source.subscribe(),
            )
        });

        *running = Some(Running { sweeper, hook });

        tracing::info!(
            lifetime = ?self.config.lifetime,
            sweep_interval = ?self.config.sweep_interval,
            destroy_on_conference_end = self.config.destroy_on_conference_end,
            "authentication authority started"
        );
    }

    /// Stops the sweeper and drops the conference subscription, waiting
    /// for both tasks to exit. Calling it on a stopped authority does
    /// nothing.
    pub async fn stop(&self) {
        let Some(Running { sweeper, hook }) = self.running.lock().await.take() else {
            return;
        };

        sweeper.stop().await;
        if let Some(hook) = hook {
            hook.stop().await;
        }

        tracing::info!("authentication authority stopped");
    }

    /// `true` between `start()` and `stop()`.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    // -----------------------------------------------------------------
    // Protocol
    // -----------------------------------------------------------------

    /// Handles a conference join request arriving from `requester`.
    ///
    /// # Errors
    /// - [`AuthError::NotAcceptable`]: no machine id, or the token belongs
    ///   to a different machine or a different identity
    /// - [`AuthError::SessionInvalid`]: the token is unknown (or vanished
    ///   while the request was in flight)
    /// - [`AuthError::VerificationFailed`]: the verifier said no
    pub async fn process_join(
        &self,
        request: &JoinRequest,
        requester: &PeerAddress,
    ) -> Result<JoinResponse, AuthError> {
        if request.machine_id.is_empty() {
            tracing::debug!(%requester, "join rejected: no machine id");
            return Err(AuthError::NotAcceptable(
                "machine identity missing".into(),
            ));
        }

        // Phase 1: pre-check the presented token.
        let presented = {
            let registry = self.registry.lock().await;
            request
                .presented_token()
                .map(|token| check_session(&registry, token, &request.machine_id))
                .transpose()?
        };

        // Phase 2: verification, lock released.
        let commit = match presented {
            Some(session) if self.verifier.session_policy() == SessionPolicy::TrustToken => {
                Commit::Reuse(session.token)
            }
            presented => {
                let ctx = VerifyContext {
                    request,
                    peer: requester,
                    session: presented.as_ref(),
                };
                let verified = self.verifier.verify(&ctx).await.map_err(|failure| {
                    tracing::debug!(
                        %requester,
                        machine_id = %request.machine_id,
                        reason = %failure,
                        "join rejected by verifier"
                    );
                    AuthError::from(failure)
                })?;
                if verified.identity.is_empty() {
                    tracing::warn!(%requester, "verifier resolved an empty identity");
                    return Err(AuthError::VerificationFailed(
                        "no identity resolved".into(),
                    ));
                }
                // A token only ever stands for the identity it was issued to.
                if let Some(session) = presented.as_ref() {
                    if session.identity != verified.identity {
                        tracing::debug!(
                            %requester,
                            token = %session.token,
                            expected = %session.identity,
                            got = %verified.identity,
                            "join rejected: identity mismatch"
                        );
                        return Err(AuthError::NotAcceptable(
                            "session identity mismatch".into(),
                        ));
                    }
                }
                Commit::Verified(verified)
            }
        };

        // Phase 3: commit.
        let session = {
            let mut registry = self.registry.lock().await;
            let token = match commit {
                Commit::Reuse(token) => {
                    if registry.get(&token).is_none() {
                        tracing::debug!(%token, "session vanished during join");
                        return Err(AuthError::SessionInvalid);
                    }
                    token
                }
                Commit::Verified(verified) => {
                    match registry.find_by_identity(&request.machine_id, &verified.identity) {
                        Some(existing) => existing.token.clone(),
                        None => registry
                            .create(
                                &request.machine_id,
                                &verified.identity,
                                &request.conference_name,
                                verified.properties,
                            )
                            .token
                            .clone(),
                    }
                }
            };
            registry
                .attach(&token, requester.clone())
                .cloned()
                .ok_or(AuthError::SessionInvalid)?
        };

        tracing::info!(
            %requester,
            identity = %session.identity,
            token = %session.token,
            "peer authenticated"
        );
        self.listeners
            .notify(requester, &session.identity, &session.token);

        Ok(JoinResponse {
            identity: session.identity,
            session_token: session.token,
        })
    }

    /// Handles a logout request: destroys the session and reports where
    /// the user should go to finish logging out externally, if anywhere.
    ///
    /// # Errors
    /// Returns [`AuthError::SessionInvalid`] if the token is unknown,
    /// including the second of two logouts for the same token.
    pub async fn process_logout(
        &self,
        request: &LogoutRequest,
    ) -> Result<LogoutResponse, AuthError> {
        let mut registry = self.registry.lock().await;

        let session = registry
            .get(&request.session_token)
            .ok_or(AuthError::SessionInvalid)?;
        let logout_url = self.verifier.logout_url(session);

        registry.destroy(&request.session_token);

        Ok(LogoutResponse { logout_url })
    }

    /// Resolves the identity behind an already authenticated peer.
    pub async fn lookup_identity(&self, peer: &PeerAddress) -> Option<String> {
        self.registry
            .lock()
            .await
            .find_by_peer(peer)
            .map(|s| s.identity.clone())
    }

    /// Reacts to the end of a conference. Purges its sessions if eager
    /// destruction is configured; otherwise does nothing.
    pub async fn on_conference_ended(&self, conference_name: &str) {
        lifecycle::conference_ended(
            &self.registry,
            self.config.destroy_on_conference_end,
            conference_name,
        )
        .await;
    }

    /// A snapshot of the session behind `token`.
    pub async fn session(&self, token: &SessionToken) -> Option<Session> {
        self.registry.lock().await.get(token).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.lock().await.len()
    }
}

/// Checks that a presented token names a live session bound to
/// `machine_id`, and returns a snapshot of it.
fn check_session(
    registry: &SessionRegistry,
    token: &SessionToken,
    machine_id: &str,
) -> Result<Session, AuthError> {
    let session = registry.get(token).ok_or_else(|| {
        tracing::debug!(%token, "join rejected: unknown session");
        AuthError::SessionInvalid
    })?;

    if session.machine_id != machine_id {
        tracing::debug!(
            %token,
            expected = %session.machine_id,
            got = %machine_id,
            "join rejected: machine mismatch"
        );
        return Err(AuthError::NotAcceptable(
            "machine identity mismatch".into(),
        ));
    }
    Ok(session.clone())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for an [`AuthAuthority`].
///
/// # Example
///
/// ```rust,ignore
/// let authority = AuthAuthority::builder(MyVerifier)
///     .config(SessionConfig { destroy_on_conference_end: true, ..Default::default() })
///     .registry(SessionRegistry::with_event_sink(sink).into_shared())
///     .conference_lifecycle(Arc::new(conference_events_tx))
///     .build();
/// authority.start().await;
/// ```
pub struct AuthAuthorityBuilder<V: Verifier> {
    verifier: V,
    config: SessionConfig,
    registry: Option<SharedRegistry>,
    conferences: Option<Arc<dyn ConferenceLifecycle>>,
}

impl<V: Verifier> AuthAuthorityBuilder<V> {
    /// Creates a builder with default configuration and a fresh registry.
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            config: SessionConfig::default(),
            registry: None,
            conferences: None,
        }
    }

    /// Sets the session configuration. Out-of-range values are clamped.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses an existing registry instead of creating an empty one (e.g.
    /// one with an event sink attached).
    pub fn registry(mut self, registry: SharedRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Subscribes to conference-end notifications from `source` while the
    /// authority is running.
    pub fn conference_lifecycle(mut self, source: Arc<dyn ConferenceLifecycle>) -> Self {
        self.conferences = Some(source);
        self
    }

    pub fn build(self) -> AuthAuthority<V> {
        let config = self.config.validated();
        tracing::info!(lifetime = ?config.lifetime, "authentication lifetime configured");
        if config.destroy_on_conference_end {
            tracing::info!("sessions are destroyed when their conference ends");
        }

        AuthAuthority {
            registry: self
                .registry
                .unwrap_or_else(|| SessionRegistry::new().into_shared()),
            verifier: self.verifier,
            config,
            listeners: ListenerSet::default(),
            conferences: self.conferences,
            running: Mutex::new(None),
        }
    }
}
