//! Core protocol types for the join/logout exchange.
//!
//! These are the structures a signaling layer extracts from its own wire
//! format (XMPP stanzas, JSON over WebSocket, whatever) and hands to the
//! authority. They derive serde so hosts that speak JSON can use them as-is.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// An opaque session token issued by the session registry.
///
/// Clients present it on later joins so they don't have to log in again.
/// Newtype over `String` so a token can't be confused with a machine id or
/// an identity name in function signatures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty token, which clients send to mean
    /// "I have no session".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<String> for SessionToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// The network address of a connected participant (a full JID, a socket
/// address, a connection id: whatever the signaling layer routes by).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Wraps a raw address string.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the address is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerAddress {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

/// Credential material attached to a join request.
///
/// Opaque to the core: only the verifier looks inside. A sorted map keeps
/// debug output and serialized form stable.
pub type Credentials = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Join
// ---------------------------------------------------------------------------

/// Client → Server: "Let me into this conference."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Token from an earlier successful join, if the client kept one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<SessionToken>,

    /// Identifier of the requesting device. Sessions are bound to it.
    pub machine_id: String,

    /// The conference the client wants to join.
    pub conference_name: String,

    /// Whatever the verifier needs (password, SSO ticket, header values).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub credentials: Credentials,
}

impl JoinRequest {
    /// A join request with no token and no credentials.
    pub fn new(
        machine_id: impl Into<String>,
        conference_name: impl Into<String>,
    ) -> Self {
        Self {
            session_token: None,
            machine_id: machine_id.into(),
            conference_name: conference_name.into(),
            credentials: Credentials::new(),
        }
    }

    /// Attaches a session token.
    pub fn with_token(mut self, token: impl Into<SessionToken>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Adds one credential entry.
    pub fn with_credential(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    /// The token the client actually presented. An empty token counts as
    /// no token at all.
    pub fn presented_token(&self) -> Option<&SessionToken> {
        self.session_token.as_ref().filter(|t| !t.is_empty())
    }
}

/// Server → Client: "You're in, and here's your session."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    /// The identity the verifier resolved.
    pub identity: String,

    /// Token to present on the next join.
    pub session_token: SessionToken,
}

// ---------------------------------------------------------------------------
// Logout
// ---------------------------------------------------------------------------

/// Client → Server: "End my session."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutRequest {
    /// The session to destroy.
    pub session_token: SessionToken,
}

impl LogoutRequest {
    /// Creates a logout request for the given token.
    pub fn new(session_token: impl Into<SessionToken>) -> Self {
        Self {
            session_token: session_token.into(),
        }
    }
}

/// Server → Client: "Logged out."
///
/// `logout_url` is set when an external identity provider also needs to be
/// visited to finish the logout (single sign-out).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogoutResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,
}

// =========================================================================
// Tests
// =========================================================================
