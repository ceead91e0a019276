//! Error taxonomy for the client core.
//!
//! Propagation policy: local validation errors never reach the network
//! layer; network and credential errors propagate up to the owning
//! component (session manager or call controller), which resets its own
//! state before surfacing a user-facing message. Nothing is swallowed
//! silently except best-effort logout notification and best-effort
//! credential clearing, which log and still guarantee local state is
//! cleared.

use thiserror::Error;
use voicelink_core::{CallError, TokenDecodeError};

/// Opaque failure from the secure storage backing (keychain/keystore).
#[derive(Debug, Clone, Error)]
#[error("secure storage failure: {0}")]
pub struct VaultError(pub String);

/// Opaque failure from the HTTP transport (connect, timeout, I/O).
#[derive(Debug, Clone, Error)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

/// Opaque failure from the media channel engine.
#[derive(Debug, Clone, Error)]
#[error("media channel failure: {0}")]
pub struct MediaError(pub String);

/// Errors from the session manager.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The credential is malformed. Non-recoverable; forces re-login.
    #[error(transparent)]
    TokenDecode(#[from] TokenDecodeError),

    /// Silent refresh failed. Credentials have already been cleared; the
    /// user must re-authenticate.
    #[error("session expired; re-authentication required")]
    Expired,

    /// The secure store itself failed.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

/// Errors surfaced by the request pipeline and typed endpoint wrappers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server rejected the request again after a token refresh.
    /// Credentials have been cleared; surfaced to the user.
    #[error("authentication failed; server rejected the retried request")]
    AuthenticationFailed,

    /// The server is rate limiting us. The pipeline never sleeps or
    /// retries on its own; that policy belongs to the caller.
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited {
        /// Server-advertised interval before the next attempt.
        retry_after_secs: u64,
    },

    /// Structured rejection from the backend (non-2xx with a detail
    /// payload).
    #[error("backend rejected request with status {status}: {detail}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Server-provided failure detail.
        detail: String,
    },

    /// Session-layer failure while obtaining or refreshing credentials.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Transport-layer failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Secure storage failure while resolving the device identity.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A 2xx response did not match the endpoint's documented shape.
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors surfaced by the call controller.
#[derive(Debug, Error)]
pub enum CallFlowError {
    /// Local lifecycle error (validation or invalid transition).
    #[error(transparent)]
    Call(#[from] CallError),

    /// Backend call failed; the call has been aborted to idle.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Media channel failure; the call has been aborted to idle.
    #[error(transparent)]
    Media(#[from] MediaError),
}
