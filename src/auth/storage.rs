use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

/// Durable, encrypted-at-rest storage for secrets
///
/// Implementations must treat a missing entry as `Ok(None)` on read and as a
/// no-op on delete.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read a secret
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a secret, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a secret
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Secret store backed by the operating system keychain
///
/// macOS Keychain, Windows Credential Manager, or the Linux kernel keyring.
/// The keyring API is blocking, so every call runs on the blocking pool.
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    /// Create a store scoped to a keychain service name
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// The keychain service name
    pub fn service(&self) -> &str {
        &self.service
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let service = self.service.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| anyhow!("Failed to open keychain entry '{}': {}", key, e))?;
            match entry.get_password() {
                Ok(value) => {
                    debug!(service = %service, key = %key, "Secret read from keychain");
                    Ok(Some(value))
                }
                Err(keyring::Error::NoEntry) => {
                    debug!(service = %service, key = %key, "No secret found in keychain");
                    Ok(None)
                }
                Err(e) => Err(anyhow!("Failed to read secret '{}': {}", key, e)),
            }
        })
        .await
        .map_err(|e| anyhow!("Keychain task failed: {}", e))?
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let service = self.service.clone();
        let key = key.to_string();
        let value = value.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| anyhow!("Failed to open keychain entry '{}': {}", key, e))?;
            entry
                .set_password(&value)
                .map_err(|e| anyhow!("Failed to write secret '{}': {}", key, e))?;
            info!(service = %service, key = %key, "Secret stored in keychain");
            Ok(())
        })
        .await
        .map_err(|e| anyhow!("Keychain task failed: {}", e))?
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let service = self.service.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| anyhow!("Failed to open keychain entry '{}': {}", key, e))?;
            match entry.delete_credential() {
                Ok(()) => {
                    info!(service = %service, key = %key, "Secret removed from keychain");
                    Ok(())
                }
                Err(keyring::Error::NoEntry) => {
                    debug!(service = %service, key = %key, "No secret to remove from keychain");
                    Ok(())
                }
                Err(e) => Err(anyhow!("Failed to delete secret '{}': {}", key, e)),
            }
        })
        .await
        .map_err(|e| anyhow!("Keychain task failed: {}", e))?
    }
}

/// In-process secret store
///
/// Clones share the same entries, so a clone handed to a second
/// `CredentialStore` behaves like the same keychain after a restart.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key currently holds a value
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() -> Result<()> {
        let store = MemorySecretStore::new();
        assert_eq!(store.get("refresh_token").await?, None);

        store.set("refresh_token", "r1").await?;
        assert_eq!(store.get("refresh_token").await?, Some("r1".to_string()));

        // Clones see the same entries
        let restarted = store.clone();
        assert_eq!(restarted.get("refresh_token").await?, Some("r1".to_string()));

        store.delete("refresh_token").await?;
        store.delete("refresh_token").await?;
        assert!(!restarted.contains("refresh_token"));
        Ok(())
    }
}
