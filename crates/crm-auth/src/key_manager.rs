use std::path::Path;
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::crypto::{StoreKey, fill_random};
use crate::errors::{ClientError, Result};
use crate::secret::SecretProvider;

const SALT_LEN: usize = 16;
const META_FILE: &str = "meta.json";

#[cfg(feature = "keyring-support")]
const KEYRING_SERVICE: &str = "crm-client";
#[cfg(feature = "keyring-support")]
const KEYRING_USER: &str = "token-store:v1";

/// Metadata describing how the store key was obtained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMeta {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Base64 salt for Argon2id (passphrase-derived keys only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_salt: Option<String>,
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now(),
            passphrase_salt: None,
        }
    }
}

/// Resolves the token store key from the OS keyring, falling back to a
/// passphrase-derived key.
pub struct KeyManager {
    meta: KeyMeta,
    key: StoreKey,
}

impl KeyManager {
    pub async fn new(storage_dir: &Path, secret_provider: Arc<dyn SecretProvider>) -> Result<Self> {
        let meta_path = storage_dir.join(META_FILE);

        let mut meta = if fs::try_exists(&meta_path).await? {
            let content = fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&content)
                .map_err(|e| ClientError::InvalidResponse(format!("Invalid {META_FILE}: {e}")))?
        } else {
            KeyMeta::default()
        };

        let key = Self::resolve_key(&mut meta, &secret_provider).await?;

        let meta_json = serde_json::to_string_pretty(&meta)?;
        fs::write(&meta_path, meta_json).await?;

        Ok(Self { meta, key })
    }

    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    pub fn meta(&self) -> &KeyMeta {
        &self.meta
    }

    #[cfg(feature = "keyring-support")]
    async fn resolve_key(
        meta: &mut KeyMeta,
        secret_provider: &Arc<dyn SecretProvider>,
    ) -> Result<StoreKey> {
        match Self::load_from_keyring() {
            Ok(key) => {
                tracing::debug!("Loaded token store key from OS keyring");
                Ok(key)
            }
            Err(e) => {
                tracing::debug!("Keyring unavailable ({}), using passphrase fallback", e);
                let key = Self::derive_from_passphrase(meta, secret_provider).await?;
                if let Err(e) = Self::save_to_keyring(&key) {
                    tracing::warn!("Failed to save token store key to keyring: {}", e);
                }
                Ok(key)
            }
        }
    }

    #[cfg(not(feature = "keyring-support"))]
    async fn resolve_key(
        meta: &mut KeyMeta,
        secret_provider: &Arc<dyn SecretProvider>,
    ) -> Result<StoreKey> {
        Self::derive_from_passphrase(meta, secret_provider).await
    }

    #[cfg(feature = "keyring-support")]
    fn keyring_entry() -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)
            .map_err(|e| ClientError::Keyring(format!("Failed to access keyring: {e}")))
    }

    #[cfg(feature = "keyring-support")]
    fn load_from_keyring() -> Result<StoreKey> {
        let key_b64 = Self::keyring_entry()?
            .get_password()
            .map_err(|e| ClientError::Keyring(format!("Failed to read from keyring: {e}")))?;

        let key_bytes: [u8; 32] = STANDARD
            .decode(key_b64)
            .map_err(|_| ClientError::CorruptedStore)?
            .try_into()
            .map_err(|_| ClientError::CorruptedStore)?;

        Ok(StoreKey::from_bytes(key_bytes))
    }

    #[cfg(feature = "keyring-support")]
    fn save_to_keyring(key: &StoreKey) -> Result<()> {
        Self::keyring_entry()?
            .set_password(&STANDARD.encode(key.as_bytes()))
            .map_err(|e| ClientError::Keyring(format!("Failed to write to keyring: {e}")))
    }

    /// Derive the key with Argon2id; the salt is created on first use and
    /// persisted in the metadata.
    async fn derive_from_passphrase(
        meta: &mut KeyMeta,
        secret_provider: &Arc<dyn SecretProvider>,
    ) -> Result<StoreKey> {
        let salt = match &meta.passphrase_salt {
            Some(salt_b64) => STANDARD
                .decode(salt_b64)
                .map_err(|_| ClientError::CorruptedStore)?,
            None => {
                let mut salt = vec![0u8; SALT_LEN];
                fill_random(&mut salt)?;
                meta.passphrase_salt = Some(STANDARD.encode(&salt));
                salt
            }
        };

        let passphrase = secret_provider
            .get_passphrase("Enter passphrase for the CRM token store")
            .await
            .ok_or(ClientError::UserCancelled)?;

        // m=19MiB, t=2, p=1
        let params = Params::new(19 * 1024, 2, 1, Some(32))
            .map_err(|e| ClientError::Crypto(format!("Invalid Argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        argon2
            .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
            .map_err(|e| ClientError::Crypto(format!("Key derivation failed: {e}")))?;

        Ok(StoreKey::from_bytes(key))
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("meta", &self.meta)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
