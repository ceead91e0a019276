//! Stable per-install device identity.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::clock;
use crate::error::VaultError;
use crate::vault::{CredentialVault, keys};

/// Lazily generates and then pins a device identifier.
///
/// The identifier is minted exactly once per install, persisted in the
/// vault, and survives logout: credential clearing never touches it.
/// After the first resolution the value is served from an in-process
/// cache with no vault round trip.
pub struct DeviceIdentityProvider<V> {
    vault: Arc<V>,
    cached: tokio::sync::OnceCell<String>,
}

impl<V: CredentialVault> DeviceIdentityProvider<V> {
    /// Create a provider over the given vault.
    pub fn new(vault: Arc<V>) -> Self {
        Self { vault, cached: tokio::sync::OnceCell::new() }
    }

    /// The device identifier, minting and persisting one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError`] if the secure store fails. No partial state
    /// is cached on failure, so a later call retries cleanly.
    pub async fn device_id(&self) -> Result<String, VaultError> {
        self.cached
            .get_or_try_init(|| async {
                if let Some(existing) = self.vault.get(keys::DEVICE_ID).await? {
                    return Ok(existing);
                }
                let minted = mint_device_id();
                self.vault.set(keys::DEVICE_ID, &minted).await?;
                tracing::info!(device_id = %minted, "minted device identity");
                Ok(minted)
            })
            .await
            .cloned()
    }
}

fn mint_device_id() -> String {
    let seed = format!("{}-{}", clock::epoch_ms(), rand::random::<u64>());
    hex::encode(Sha256::digest(seed.as_bytes()))
}
