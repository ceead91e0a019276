//! Session manager: the exclusive owner of the credential record.
//!
//! Refresh is triggered lazily, on read, rather than by a background
//! timer: the token handed to any caller is guaranteed fresh at the moment
//! of use, which matters because requests are dispatched after a
//! nontrivial round trip. Refresh attempts are serialized so a refresh
//! token that is single-use on the backend is never raced.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use voicelink_core::token::decode_claims;

use crate::clock;
use crate::error::{SessionError, VaultError};
use crate::transport::{ApiRequest, Method, Transport};
use crate::vault::{CredentialVault, keys};

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Tokens with less than this time to expiry are refreshed before use.
    pub refresh_threshold: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { refresh_threshold: Duration::from_secs(5 * 60) }
    }
}

/// Expiry metadata derived from the token payload, never client-invented.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenMetadata {
    expires_at_ms: i64,
    issued_at_ms: i64,
}

/// Shape of the backend refresh endpoint's success payload.
#[derive(Debug, Deserialize)]
struct RefreshGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Owns the token lifecycle: store, validity check, silent refresh, clear.
///
/// The credential record is mutated only through this type. The refresh
/// call goes directly to the transport, bypassing the request pipeline:
/// decorating a refresh with another 401-triggered refresh would recurse.
pub struct SessionManager<V, T> {
    vault: Arc<V>,
    transport: Arc<T>,
    config: SessionConfig,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl<V: CredentialVault, T: Transport> SessionManager<V, T> {
    /// Create a session manager over the given vault and transport.
    pub fn new(vault: Arc<V>, transport: Arc<T>, config: SessionConfig) -> Self {
        Self { vault, transport, config, refresh_gate: tokio::sync::Mutex::new(()) }
    }

    /// Explicit lifecycle entry: read persisted state on app start.
    ///
    /// Returns the persisted user id, when a session was restored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Vault`] if the secure store fails.
    pub async fn init(&self) -> Result<Option<String>, SessionError> {
        let user_id = self.vault.get(keys::USER_ID).await?;
        if self.vault.get(keys::ACCESS_TOKEN).await?.is_some() {
            // The persisted metadata answers "when does this session
            // expire" without decoding the token again.
            let expires_at_ms = self
                .vault
                .get(keys::TOKEN_METADATA)
                .await?
                .and_then(|json| serde_json::from_str::<TokenMetadata>(&json).ok())
                .map(|metadata| metadata.expires_at_ms);
            tracing::info!(
                user_id = user_id.as_deref().unwrap_or("unknown"),
                expires_at_ms,
                "restored persisted session"
            );
        } else {
            tracing::info!("no persisted session");
        }
        Ok(user_id)
    }

    /// Persist a credential record, atomically replacing any previous one.
    ///
    /// Expiry and issue timestamps are decoded from the access token; all
    /// fields are written before this returns. The refresh token and user
    /// id are only rewritten when provided, so a refresh that omits the
    /// user id keeps the one stored at login.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TokenDecode`] for a malformed token (the
    /// vault is left untouched) or [`SessionError::Vault`] on storage
    /// failure.
    pub async fn store_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let claims = decode_claims(access_token)?;
        // Saturate: a backend claim near i64::MAX must not overflow the
        // millisecond conversion.
        let metadata = TokenMetadata {
            expires_at_ms: claims.exp.saturating_mul(1000),
            issued_at_ms: claims.iat.saturating_mul(1000),
        };
        let metadata_json =
            serde_json::to_string(&metadata).map_err(|error| VaultError(error.to_string()))?;

        self.vault.set(keys::ACCESS_TOKEN, access_token).await?;
        self.vault.set(keys::TOKEN_METADATA, &metadata_json).await?;
        if let Some(refresh_token) = refresh_token {
            self.vault.set(keys::REFRESH_TOKEN, refresh_token).await?;
        }
        if let Some(user_id) = user_id {
            self.vault.set(keys::USER_ID, user_id).await?;
        }
        Ok(())
    }

    /// The persisted user id, when present.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Vault`] if the secure store fails.
    pub async fn user_id(&self) -> Result<Option<String>, SessionError> {
        Ok(self.vault.get(keys::USER_ID).await?)
    }

    /// Return an access token that is fresh at the moment of use.
    ///
    /// `Ok(None)` means no credential exists and the caller must
    /// re-authenticate. A token within the refresh threshold of expiry is
    /// refreshed transparently; concurrent callers await the same
    /// in-flight refresh rather than triggering duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Expired`] when a required refresh failed
    /// (credentials are already cleared).
    pub async fn valid_access_token(&self) -> Result<Option<String>, SessionError> {
        let Some(token) = self.vault.get(keys::ACCESS_TOKEN).await? else {
            return Ok(None);
        };
        if self.is_fresh(&token)? {
            return Ok(Some(token));
        }

        let _gate = self.refresh_gate.lock().await;
        // Re-check: another caller may have refreshed while we waited.
        if let Some(token) = self.vault.get(keys::ACCESS_TOKEN).await?
            && self.is_fresh(&token)?
        {
            return Ok(Some(token));
        }
        self.refresh_locked().await
    }

    /// Exchange the refresh token for a new credential record.
    ///
    /// `Ok(None)` means no refresh token exists; the caller must
    /// re-authenticate (not an error). On success the record is atomically
    /// replaced and the new access token returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Expired`] on any refresh failure (network,
    /// non-2xx, decode); all credentials are cleared first.
    pub async fn refresh_access_token(&self) -> Result<Option<String>, SessionError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Remove every persisted credential field. Idempotent, best-effort:
    /// failures are logged, never raised, and the device identity is left
    /// intact.
    pub async fn clear_tokens(&self) {
        for key in keys::CREDENTIAL_KEYS {
            if let Err(error) = self.vault.delete(key).await {
                tracing::warn!(key, %error, "failed to delete credential");
            }
        }
    }

    async fn refresh_locked(&self) -> Result<Option<String>, SessionError> {
        let Some(refresh_token) = self.vault.get(keys::REFRESH_TOKEN).await? else {
            tracing::debug!("no refresh token; caller must re-authenticate");
            return Ok(None);
        };

        match self.request_refresh(&refresh_token).await {
            Ok(grant) => {
                match self
                    .store_tokens(&grant.access_token, grant.refresh_token.as_deref(), None)
                    .await
                {
                    Ok(()) => {
                        tracing::debug!("access token refreshed");
                        Ok(Some(grant.access_token))
                    },
                    Err(error) => {
                        tracing::warn!(%error, "refreshed token unusable; clearing credentials");
                        self.clear_tokens().await;
                        Err(SessionError::Expired)
                    },
                }
            },
            Err(reason) => {
                tracing::warn!(reason, "token refresh failed; clearing credentials");
                self.clear_tokens().await;
                Err(SessionError::Expired)
            },
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<RefreshGrant, String> {
        let request = ApiRequest::new(
            Method::Post,
            "/auth/refresh",
            Some(serde_json::json!({ "refresh_token": refresh_token })),
        );
        let response = self.transport.send(request).await.map_err(|error| error.to_string())?;
        if !response.is_success() {
            return Err(format!("refresh endpoint returned status {}", response.status));
        }
        serde_json::from_value(response.body).map_err(|error| error.to_string())
    }

    fn is_fresh(&self, token: &str) -> Result<bool, SessionError> {
        let claims = decode_claims(token)?;
        let remaining = claims.exp.saturating_sub(clock::epoch_secs());
        Ok(remaining > self.config.refresh_threshold.as_secs() as i64)
    }
}
