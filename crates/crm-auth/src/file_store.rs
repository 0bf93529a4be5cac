use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};

use crate::crypto::{self, SealedValue};
use crate::errors::{ClientError, Result};
use crate::key_manager::KeyManager;
use crate::secret::SecretProvider;
use crate::store::{TokenSlot, TokenStore};

const TOKENS_FILE: &str = "tokens.json";
const LOCK_FILE: &str = "lock";

/// File-based encrypted token store
///
/// Keeps the three session slots sealed with AES-256-GCM in a single file.
/// The key comes from the OS keyring, with a passphrase fallback.
///
/// # Directory Structure
/// ```text
/// ~/.local/share/crm-client/tokens/
/// ├── meta.json      # Key metadata (passphrase salt)
/// ├── lock           # Advisory lock file
/// └── tokens.json    # { "auth_token": {..sealed..}, "refresh_token": .., "user": .. }
/// ```
pub struct FileTokenStore {
    tokens_file: PathBuf,
    lock_file: PathBuf,
    key_manager: KeyManager,
    /// Serializes writers inside this process; the file lock covers others
    write_guard: Mutex<()>,
    cache: RwLock<HashMap<TokenSlot, String>>,
}

impl FileTokenStore {
    /// Open (or create) a token store rooted at `storage_dir`
    pub async fn new(
        storage_dir: impl AsRef<Path>,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&storage_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        let key_manager = KeyManager::new(&storage_dir, secret_provider).await?;

        Ok(Self {
            tokens_file: storage_dir.join(TOKENS_FILE),
            lock_file: storage_dir.join(LOCK_FILE),
            key_manager,
            write_guard: Mutex::new(()),
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "crm-client").ok_or_else(|| {
            ClientError::Config("Could not determine data directory".to_string())
        })?;

        Ok(project_dirs.data_dir().join("tokens"))
    }

    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| ClientError::LockTimeout)?;

        Ok(lock_file)
    }

    async fn read_sealed(&self) -> Result<BTreeMap<String, SealedValue>> {
        if !fs::try_exists(&self.tokens_file).await? {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.tokens_file).await?;
        serde_json::from_str(&content).map_err(|e| {
            tracing::error!("Token file {} is unreadable: {}", self.tokens_file.display(), e);
            ClientError::CorruptedStore
        })
    }

    async fn write_sealed(&self, sealed: &BTreeMap<String, SealedValue>) -> Result<()> {
        let json = serde_json::to_string_pretty(sealed)?;

        // Atomic write: temp file, fsync, rename
        let temp_path = self.tokens_file.with_extension("tmp");
        fs::write(&temp_path, json).await?;
        fs::File::open(&temp_path).await?.sync_all().await?;
        fs::rename(&temp_path, &self.tokens_file).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.tokens_file, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    async fn load_from_disk(&self, slot: TokenSlot) -> Result<Option<String>> {
        let sealed = self.read_sealed().await?;
        match sealed.get(slot.key()) {
            Some(value) => {
                let plaintext = crypto::open(self.key_manager.key(), value, slot.key())?;
                Ok(Some(plaintext.as_str().to_string()))
            }
            None => Ok(None),
        }
    }

    /// Read-modify-write of the token file under both locks
    async fn update<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, SealedValue>) -> Result<()>,
    {
        let _guard = self.write_guard.lock().await;
        let _lock = self.acquire_lock()?;

        // A corrupted file is replaced rather than blocking every write
        let mut sealed = match self.read_sealed().await {
            Ok(sealed) => sealed,
            Err(ClientError::CorruptedStore) => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        apply(&mut sealed)?;
        self.write_sealed(&sealed).await
    }
}

impl std::fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTokenStore")
            .field("tokens_file", &self.tokens_file)
            .field("key_manager", &self.key_manager)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, slot: TokenSlot) -> Option<String> {
        {
            let cache = self.cache.read().await;
            if let Some(value) = cache.get(&slot) {
                return Some(value.clone());
            }
        }

        match self.load_from_disk(slot).await {
            Ok(Some(value)) => {
                self.cache.write().await.insert(slot, value.clone());
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Failed to load {} from token store: {}", slot, e);
                None
            }
        }
    }

    async fn set(&self, slot: TokenSlot, value: &str) -> Result<()> {
        let sealed_value = crypto::seal(self.key_manager.key(), value, slot.key())?;
        self.update(|sealed| {
            sealed.insert(slot.key().to_string(), sealed_value);
            Ok(())
        })
        .await?;

        self.cache.write().await.insert(slot, value.to_string());
        Ok(())
    }

    async fn remove(&self, slot: TokenSlot) -> Result<()> {
        self.update(|sealed| {
            sealed.remove(slot.key());
            Ok(())
        })
        .await?;

        self.cache.write().await.remove(&slot);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.update(|sealed| {
            sealed.clear();
            Ok(())
        })
        .await?;

        self.cache.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecretProvider;
    use tempfile::TempDir;

    async fn open_store(dir: &Path) -> FileTokenStore {
        let secret_provider = Arc::new(StaticSecretProvider::new("test-passphrase"));
        FileTokenStore::new(dir, secret_provider).await.unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path()).await;

        store.set(TokenSlot::AccessToken, "T1").await.unwrap();
        store.set(TokenSlot::RefreshToken, "R1").await.unwrap();

        assert_eq!(store.get(TokenSlot::AccessToken).await.as_deref(), Some("T1"));
        assert_eq!(store.get(TokenSlot::RefreshToken).await.as_deref(), Some("R1"));
        assert_eq!(store.get(TokenSlot::User).await, None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen_and_are_not_plaintext() {
        let temp = TempDir::new().unwrap();
        {
            let store = open_store(temp.path()).await;
            store.set(TokenSlot::AccessToken, "T1").await.unwrap();
            store
                .set(TokenSlot::User, r#"{"id":1,"username":"alice"}"#)
                .await
                .unwrap();
        }

        let on_disk = std::fs::read_to_string(temp.path().join(TOKENS_FILE)).unwrap();
        assert!(on_disk.contains("auth_token"));
        assert!(!on_disk.contains("alice"));

        let reopened = open_store(temp.path()).await;
        assert_eq!(reopened.get(TokenSlot::AccessToken).await.as_deref(), Some("T1"));
        assert_eq!(
            reopened.get(TokenSlot::User).await.as_deref(),
            Some(r#"{"id":1,"username":"alice"}"#)
        );
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path()).await;

        for slot in TokenSlot::ALL {
            store.set(slot, "value").await.unwrap();
        }
        store.clear().await.unwrap();

        for slot in TokenSlot::ALL {
            assert_eq!(store.get(slot).await, None);
        }

        let reopened = open_store(temp.path()).await;
        for slot in TokenSlot::ALL {
            assert_eq!(reopened.get(slot).await, None);
        }
    }

    #[tokio::test]
    async fn test_corrupted_file_reads_as_empty() {
        let temp = TempDir::new().unwrap();
        let store = open_store(temp.path()).await;
        std::fs::write(temp.path().join(TOKENS_FILE), "not json").unwrap();

        assert_eq!(store.get(TokenSlot::AccessToken).await, None);

        // The next write replaces the damaged file
        store.set(TokenSlot::AccessToken, "T2").await.unwrap();
        let reopened = open_store(temp.path()).await;
        assert_eq!(reopened.get(TokenSlot::AccessToken).await.as_deref(), Some("T2"));
    }
}
