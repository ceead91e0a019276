//! Error types for the call lifecycle machine and token decoding.

use thiserror::Error;

use crate::call::CallPhase;

/// Errors raised by the call lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// Recipient validation failed before any backend contact.
    ///
    /// Local precondition failure; never sent to the backend.
    #[error("recipient id must be a non-empty numeric string")]
    InvalidRecipient,

    /// Verification code was empty. The client enforces no format beyond
    /// non-emptiness; the backend decides whether the code matches.
    #[error("verification code must not be empty")]
    EmptyCode,

    /// Operation is not defined for the current phase.
    ///
    /// A UI that respects the advertised phase never triggers this.
    #[error("operation `{operation}` is not valid in phase {phase:?}")]
    InvalidTransition {
        /// Phase the machine was in when the operation was attempted.
        phase: CallPhase,
        /// Name of the attempted operation.
        operation: &'static str,
    },
}

/// Errors raised while decoding an access token's claim segment.
///
/// The client never verifies signatures; it only reads the claims the
/// backend issued, so every variant here means the credential is unusable
/// and the user must re-authenticate.
#[derive(Debug, Error)]
pub enum TokenDecodeError {
    /// Token is not three dot-separated segments.
    #[error("token must have three dot-separated segments")]
    Malformed,

    /// Claim segment is not valid base64url.
    #[error("claim segment is not valid base64url")]
    Base64(#[from] base64::DecodeError),

    /// Claim segment did not decode to a JSON object.
    #[error("claim segment is not valid JSON")]
    Json(#[from] serde_json::Error),

    /// A required numeric claim is absent or has the wrong type.
    #[error("missing or non-numeric claim `{0}`")]
    MissingClaim(&'static str),
}
