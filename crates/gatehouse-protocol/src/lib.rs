//! Protocol shapes for Gatehouse.
//!
//! This crate defines what a conference participant sends to authenticate
//! and what it gets back:
//!
//! - **Identity types** ([`SessionToken`], [`PeerAddress`]): the keys the
//!   session registry is indexed by.
//! - **Messages** ([`JoinRequest`], [`JoinResponse`], [`LogoutRequest`],
//!   [`LogoutResponse`]): the join/logout exchange, abstracted from
//!   whatever signaling wire format carries it.
//! - **Errors** ([`AuthError`], [`ErrorResponse`]): the terminal failures a
//!   client can receive.
//!
//! # Architecture
//!
//! ```text
//! Signaling layer (stanzas) → Protocol (JoinRequest) → Authority → Registry
//! ```
//!
//! Nothing in here knows about locks, tasks, or verifiers. Parsing these
//! shapes out of a concrete signaling protocol is the host's job.

mod error;
mod types;

pub use error::{AuthError, ErrorKind, ErrorResponse};
pub use types::{
    Credentials, JoinRequest, JoinResponse, LogoutRequest, LogoutResponse,
    PeerAddress, SessionToken,
};
