//! In-memory credential vault.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use voicelink_client::error::VaultError;
use voicelink_client::vault::CredentialVault;

/// Hash-map-backed vault with an optional injected failure.
#[derive(Default)]
pub struct MemVault {
    entries: Mutex<HashMap<String, String>>,
    fail_next: Mutex<Option<String>>,
}

impl MemVault {
    /// An empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next vault operation fail with the given message.
    pub fn fail_next(&self, message: &str) {
        *self.lock_fail() = Some(message.to_owned());
    }

    /// Whether the vault holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Snapshot of the stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_entries().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Read an entry synchronously, for assertions.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock_entries().get(key).cloned()
    }

    /// Write an entry synchronously, for test setup.
    pub fn seed(&self, key: &str, value: &str) {
        self.lock_entries().insert(key.to_owned(), value.to_owned());
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_fail(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        match self.fail_next.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take_failure(&self) -> Result<(), VaultError> {
        match self.lock_fail().take() {
            Some(message) => Err(VaultError(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CredentialVault for MemVault {
    async fn get(&self, key: &str) -> Result<Option<String>, VaultError> {
        self.take_failure()?;
        Ok(self.lock_entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), VaultError> {
        self.take_failure()?;
        self.lock_entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), VaultError> {
        self.take_failure()?;
        self.lock_entries().remove(key);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), VaultError> {
        self.take_failure()?;
        self.lock_entries().clear();
        Ok(())
    }
}
