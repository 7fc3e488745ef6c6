//! # Gatehouse
//!
//! Authentication for participants joining real-time conferences.
//!
//! A client asks to join a conference. Gatehouse checks the request (through
//! a [`Verifier`] you supply), issues or reuses a session token bound to the
//! client's device and identity, and accepts that token on later joins so
//! the user doesn't log in again until the session expires, is logged out,
//! or (optionally) its conference ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatehouse::prelude::*;
//!
//! struct AnyoneNamedAlice;
//!
//! impl Verifier for AnyoneNamedAlice {
//!     async fn verify(&self, ctx: &VerifyContext<'_>) -> Result<Verified, VerificationFailure> {
//!         match ctx.request.credentials.get("user").map(String::as_str) {
//!             Some("alice") => Ok(Verified::new("alice")),
//!             _ => Err(VerificationFailure::Rejected("not alice".into())),
//!         }
//!     }
//! }
//!
//! # async fn run() -> Result<(), AuthError> {
//! let authority = AuthAuthority::builder(AnyoneNamedAlice).build();
//! authority.start().await;
//!
//! let request = JoinRequest::new("laptop-1", "standup").with_credential("user", "alice");
//! let response = authority.process_join(&request, &PeerAddress::new("standup/alice")).await?;
//! assert_eq!(response.identity, "alice");
//!
//! authority.stop().await;
//! # Ok(())
//! # }
//! ```

mod authority;
mod error;
mod lifecycle;
mod listener;
mod verifier;

pub use authority::{AuthAuthority, AuthAuthorityBuilder};
pub use error::VerificationFailure;
pub use lifecycle::{ConferenceEnded, ConferenceLifecycle};
pub use listener::AuthenticationListener;
pub use verifier::{SessionPolicy, Verified, Verifier, VerifyContext};

pub use gatehouse_protocol as protocol;
pub use gatehouse_session as session;

/// Everything a host needs to wire up an authority.
pub mod prelude {
    pub use crate::{
        AuthAuthority, AuthAuthorityBuilder, AuthenticationListener,
        ConferenceEnded, ConferenceLifecycle, SessionPolicy,
        VerificationFailure, Verified, Verifier, VerifyContext,
    };
    pub use gatehouse_protocol::{
        AuthError, ErrorKind, ErrorResponse, JoinRequest, JoinResponse,
        LogoutRequest, LogoutResponse, PeerAddress, SessionToken,
    };
    pub use gatehouse_session::{
        EventSink, Properties, RemovalReason, Session, SessionConfig,
        SessionEvent, SessionRegistry, SharedRegistry,
    };
}
