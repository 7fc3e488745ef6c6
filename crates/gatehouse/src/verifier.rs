//! Pluggable credential verification.
//!
//! Gatehouse never inspects credentials itself: checking a password, an
//! OAuth token, an SSO assertion, or a header set by a trusted proxy is the
//! job of a [`Verifier`]. The authority calls it with the request, runs the
//! session bookkeeping around it, and stays the same whichever verifier is
//! plugged in.
//!
//! Verification may talk to an external identity provider, so it is async
//! and always runs with the registry lock released.

use gatehouse_protocol::{JoinRequest, PeerAddress};
use gatehouse_session::{Properties, Session};

use crate::VerificationFailure;

/// Whether a request carrying a valid session token still goes through the
/// verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPolicy {
    /// Always run the verifier. The pre-checked session is passed in the
    /// [`VerifyContext`] so the verifier can take it into account.
    #[default]
    Reverify,

    /// A token that exists and matches the requesting machine is proof
    /// enough: skip the verifier and refresh the session.
    TrustToken,
}

/// Everything a verifier gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct VerifyContext<'a> {
    /// The join request, credentials included.
    pub request: &'a JoinRequest,

    /// The connection the request arrived on.
    pub peer: &'a PeerAddress,

    /// The session named by the request's token, if it presented one that
    /// passed the machine check.
    pub session: Option<&'a Session>,
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// The resolved principal. Must not be empty.
    pub identity: String,

    /// Extra facts recorded with the "session created" event.
    pub properties: Properties,
}

impl Verified {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Checks a join request's credentials and resolves an identity.
///
/// # Trait bounds
///
/// - `Send + Sync` → one verifier serves every request task concurrently.
/// - `'static` → it lives as long as the authority.
///
/// # Example
///
/// ```rust
/// use gatehouse::{VerificationFailure, Verified, Verifier, VerifyContext};
///
/// /// Trusts whatever user name the client sends.
/// /// Only for development: never use this in production!
/// struct DevVerifier;
///
/// impl Verifier for DevVerifier {
///     async fn verify(
///         &self,
///         ctx: &VerifyContext<'_>,
///     ) -> Result<Verified, VerificationFailure> {
///         let user = ctx.request.credentials.get("user").ok_or_else(|| {
///             VerificationFailure::MissingCredentials("user".into())
///         })?;
///         Ok(Verified::new(user.clone()))
///     }
/// }
/// ```
pub trait Verifier: Send + Sync + 'static {
    /// Verifies the request and returns who made it.
    ///
    /// # Returns
    /// - `Ok(Verified)`: the identity to bind the session to
    /// - `Err(VerificationFailure)`: refused; the reason reaches the client
    fn verify(
        &self,
        ctx: &VerifyContext<'_>,
    ) -> impl std::future::Future<Output = Result<Verified, VerificationFailure>> + Send;

    /// URL the user should visit to also log out of the external identity
    /// provider, if there is one. Called under the registry lock, so it
    /// must not block.
    fn logout_url(&self, _session: &Session) -> Option<String> {
        None
    }

    /// How requests with a valid session token are treated.
    fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::Reverify
    }
}
