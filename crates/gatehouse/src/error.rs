//! Failure type for pluggable verifiers.

use gatehouse_protocol::AuthError;

/// Why a [`Verifier`](crate::Verifier) refused a join request.
///
/// The authority turns this into [`AuthError::VerificationFailed`] with the
/// display text as the reason, so the message should make sense to the
/// client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    /// The request carried no usable credentials.
    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    /// Credentials were present but wrong.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The identity provider couldn't be reached or answered garbage.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<VerificationFailure> for AuthError {
    fn from(failure: VerificationFailure) -> Self {
        AuthError::VerificationFailed(failure.to_string())
    }
}

#[cfg(test)]
mod tests {
    use gatehouse_protocol::ErrorKind;

    use super::*;

    #[test]
    fn test_into_auth_error_keeps_reason() {
        let err: AuthError = VerificationFailure::Rejected("bad password".into()).into();

        assert_eq!(err.kind(), ErrorKind::VerificationFailed);
        assert_eq!(err.detail(), Some("credentials rejected: bad password"));
    }

    #[test]
    fn test_unavailable_display() {
        let failure = VerificationFailure::Unavailable("timeout".into());
        assert_eq!(failure.to_string(), "identity provider unavailable: timeout");
    }
}
