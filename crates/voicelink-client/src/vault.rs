//! Credential vault capability.
//!
//! Scoped secure key/value persistence, backed in production by the
//! platform keychain/keystore and in tests by an in-memory map. Consumed as
//! an opaque capability; the client never sees the encryption layer.

use async_trait::async_trait;

use crate::error::VaultError;

/// Storage keys used by the client core.
pub mod keys {
    /// The access token credential.
    pub const ACCESS_TOKEN: &str = "voicelink_access_token";
    /// The refresh token credential.
    pub const REFRESH_TOKEN: &str = "voicelink_refresh_token";
    /// The authenticated user's id.
    pub const USER_ID: &str = "voicelink_user_id";
    /// Token metadata (expiry/issue timestamps derived from the token).
    pub const TOKEN_METADATA: &str = "voicelink_token_metadata";
    /// The per-install device identity. Survives logout.
    pub const DEVICE_ID: &str = "voicelink_device_id";

    /// The keys that make up one credential record. Cleared together on
    /// logout or refresh failure; deliberately excludes [`DEVICE_ID`].
    pub const CREDENTIAL_KEYS: [&str; 4] = [ACCESS_TOKEN, REFRESH_TOKEN, USER_ID, TOKEN_METADATA];
}

/// Opaque, scoped key/value persistence with secure delete-all.
///
/// Every operation is atomic per key. `delete` of an absent key succeeds.
/// `clear_all` is the secure wipe of the entire scope (account removal);
/// routine logout instead deletes only [`keys::CREDENTIAL_KEYS`] so the
/// device identity survives the install.
#[async_trait]
pub trait CredentialVault: Send + Sync + 'static {
    /// Read a value, `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError>;

    /// Write a value, replacing any previous value atomically.
    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError>;

    /// Remove a value. Succeeds when the key is absent.
    async fn delete(&self, key: &str) -> Result<(), VaultError>;

    /// Securely remove every value in the scope.
    async fn clear_all(&self) -> Result<(), VaultError>;
}
