//! Error types for the join/logout exchange.
//!
//! Every failure here is terminal for the request that caused it. The
//! authority never retries; whether to try again is the client's call.

use serde::{Deserialize, Serialize};

/// Why a join or logout request was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The presented token is not in the registry: it expired, was logged
    /// out, or was never issued.
    #[error("session invalid")]
    SessionInvalid,

    /// The token exists but the request doesn't satisfy its binding
    /// (machine id mismatch, or no machine id at all).
    #[error("not acceptable: {0}")]
    NotAcceptable(String),

    /// The verifier rejected the credentials. The reason is passed through
    /// from the verifier untouched.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

impl AuthError {
    /// The protocol-level condition for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionInvalid => ErrorKind::SessionInvalid,
            Self::NotAcceptable(_) => ErrorKind::NotAcceptable,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
        }
    }

    /// Human-readable detail, if the variant carries one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::SessionInvalid => None,
            Self::NotAcceptable(detail) | Self::VerificationFailed(detail) => {
                Some(detail)
            }
        }
    }

    /// Builds the error response a signaling layer sends back.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            detail: self.detail().map(str::to_owned),
        }
    }
}

/// The error condition carried in an [`ErrorResponse`].
///
/// Serialized in kebab-case (`"session-invalid"`) to line up with the
/// condition names signaling protocols already use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    SessionInvalid,
    NotAcceptable,
    VerificationFailed,
}

/// Server → Client: "Your request was refused."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<AuthError> for ErrorResponse {
    fn from(err: AuthError) -> Self {
        err.to_response()
    }
}
