// src/vault/mod.rs
//! Credential vault: encrypted per-user, per-platform session state plus its status lifecycle.
//!
//! The vault never looks at network responses. Connectors classify failures and report
//! outcomes through [`CredentialVault::update_status`] and [`CredentialVault::record_sync`].

pub mod credentials;
pub mod crypto;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::VaultError;
use crate::model::{CredentialPatch, CredentialStatus, Platform, PlatformCredential};
use crate::store::CredentialStore;

pub use credentials::{BrowserCookie, CredentialSet, CredentialValue};
pub use crypto::{KdfParams, VaultCipher};

/// Decrypted credential together with its stored metadata.
#[derive(Debug, Clone)]
pub struct VaultEntry {
    pub credentials: CredentialSet,
    pub status: CredentialStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Clone)]
pub struct CredentialVault {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<VaultCipher>,
}

impl CredentialVault {
    pub fn new(store: Arc<dyn CredentialStore>, cipher: Arc<VaultCipher>) -> Self {
        Self { store, cipher }
    }

    /// Decrypted credential set, or `None` when the user never linked the platform.
    pub async fn get(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<CredentialSet>, VaultError> {
        Ok(self.entry(user_id, platform).await?.map(|e| e.credentials))
    }

    pub async fn entry(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<VaultEntry>, VaultError> {
        let Some(row) = self.store.fetch_credential(user_id, platform).await? else {
            return Ok(None);
        };
        if row.encrypted_blob.is_empty() {
            return Ok(None);
        }
        let plaintext = self.cipher.decrypt(&row.encrypted_blob)?;
        let credentials: CredentialSet = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::Decryption(format!("payload is not a credential set: {e}")))?;
        Ok(Some(VaultEntry {
            credentials,
            status: row.status,
            last_sync_at: row.last_sync_at,
            last_error: row.last_error,
        }))
    }

    /// Link (or relink) a platform. Always resets the status to `active`.
    pub async fn save(
        &self,
        user_id: &str,
        platform: Platform,
        credentials: &CredentialSet,
    ) -> Result<(), VaultError> {
        let json = serde_json::to_vec(credentials)
            .map_err(|e| VaultError::Encryption(format!("serialize credential set: {e}")))?;
        let encrypted_blob = self.cipher.encrypt(&json)?;

        let last_sync_at = self
            .store
            .fetch_credential(user_id, platform)
            .await?
            .and_then(|row| row.last_sync_at);

        self.store
            .upsert_credential(&PlatformCredential {
                user_id: user_id.to_string(),
                platform,
                encrypted_blob,
                status: CredentialStatus::Active,
                last_sync_at,
                last_error: None,
            })
            .await?;
        info!(target: "vault", %platform, entries = credentials.len(), "credential linked");
        Ok(())
    }

    /// Move the credential to `status`, recording `error` when given.
    /// Relinking to `active` goes through [`CredentialVault::save`] instead.
    pub async fn update_status(
        &self,
        user_id: &str,
        platform: Platform,
        status: CredentialStatus,
        error: Option<&str>,
    ) -> Result<(), VaultError> {
        let Some(row) = self.store.fetch_credential(user_id, platform).await? else {
            warn!(target: "vault", %platform, %status, "status update for unknown credential");
            return Ok(());
        };
        if !row.status.can_transition_to(status) {
            return Err(VaultError::InvalidTransition {
                from: row.status.to_string(),
                to: status.to_string(),
            });
        }
        let patch = CredentialPatch {
            status: Some(status),
            last_error: error.map(|e| Some(e.to_string())),
            last_sync_at: None,
        };
        self.store
            .update_credential(user_id, platform, &patch)
            .await?;
        info!(
            target: "vault",
            %platform,
            from = %row.status,
            to = %status,
            "credential status changed"
        );
        Ok(())
    }

    /// Stamp a successful sync and clear any previous error.
    pub async fn record_sync(&self, user_id: &str, platform: Platform) -> Result<(), VaultError> {
        let patch = CredentialPatch {
            status: None,
            last_error: Some(None),
            last_sync_at: Some(Utc::now()),
        };
        self.store
            .update_credential(user_id, platform, &patch)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn vault() -> (Arc<MemoryStore>, CredentialVault) {
        let store = Arc::new(MemoryStore::new());
        let cipher = VaultCipher::derive("unit-secret", "unit-test-salt", crypto::test_params())
            .unwrap();
        let vault = CredentialVault::new(store.clone(), Arc::new(cipher));
        (store, vault)
    }

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let (store, vault) = vault();
        let set = CredentialSet::new().with_plain("session-id", "s1");
        vault.save("u1", Platform::Amazon, &set).await.unwrap();

        assert_eq!(vault.get("u1", Platform::Amazon).await.unwrap(), Some(set));
        assert_eq!(vault.get("u1", Platform::Ltk).await.unwrap(), None);

        let row = store
            .fetch_credential("u1", Platform::Amazon)
            .await
            .unwrap()
            .unwrap();
        assert!(!row.encrypted_blob.contains("s1"));
        assert_eq!(row.status, CredentialStatus::Active);
    }

    #[tokio::test]
    async fn corrupt_blob_is_a_decryption_error_not_none() {
        let (store, vault) = vault();
        vault
            .save("u1", Platform::Mavely, &CredentialSet::new().with_plain("a", "b"))
            .await
            .unwrap();
        let mut row = store
            .fetch_credential("u1", Platform::Mavely)
            .await
            .unwrap()
            .unwrap();
        row.encrypted_blob = "Zm9vYmFyYmF6cXV4cXV1eGZvb2JhcmJhenF1eA".into();
        store.upsert_credential(&row).await.unwrap();

        let err = vault.get("u1", Platform::Mavely).await.unwrap_err();
        assert!(matches!(err, VaultError::Decryption(_)));
    }

    #[tokio::test]
    async fn lifecycle_expire_then_relink() {
        let (_store, vault) = vault();
        let set = CredentialSet::new().with_plain("sid", "1");
        vault.save("u1", Platform::Ltk, &set).await.unwrap();

        vault
            .update_status("u1", Platform::Ltk, CredentialStatus::Expired, Some("Session expired"))
            .await
            .unwrap();
        let e = vault.entry("u1", Platform::Ltk).await.unwrap().unwrap();
        assert_eq!(e.status, CredentialStatus::Expired);
        assert_eq!(e.last_error.as_deref(), Some("Session expired"));

        // Not recoverable through a status update.
        let err = vault
            .update_status("u1", Platform::Ltk, CredentialStatus::Active, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::InvalidTransition { .. }));

        vault.save("u1", Platform::Ltk, &set).await.unwrap();
        let e = vault.entry("u1", Platform::Ltk).await.unwrap().unwrap();
        assert_eq!(e.status, CredentialStatus::Active);
        assert!(e.last_error.is_none());
    }

    #[tokio::test]
    async fn record_sync_clears_error() {
        let (_store, vault) = vault();
        vault
            .save("u1", Platform::ShopMy, &CredentialSet::new().with_plain("api_token", "t"))
            .await
            .unwrap();
        vault
            .update_status(
                "u1",
                Platform::ShopMy,
                CredentialStatus::Active,
                Some("Page load timeout"),
            )
            .await
            .unwrap();
        vault.record_sync("u1", Platform::ShopMy).await.unwrap();

        let e = vault.entry("u1", Platform::ShopMy).await.unwrap().unwrap();
        assert!(e.last_error.is_none());
        assert!(e.last_sync_at.is_some());
    }
}
