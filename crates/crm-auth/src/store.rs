use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::errors::{ClientError, Result};

/// The three independent slots that make up a persisted session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenSlot {
    AccessToken,
    RefreshToken,
    /// JSON-serialized [`crate::User`]
    User,
}

impl TokenSlot {
    pub const ALL: [TokenSlot; 3] = [Self::AccessToken, Self::RefreshToken, Self::User];

    /// Storage key of the slot
    pub fn key(self) -> &'static str {
        match self {
            Self::AccessToken => "auth_token",
            Self::RefreshToken => "refresh_token",
            Self::User => "user",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.key() == key)
    }
}

impl fmt::Display for TokenSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Device-scoped key/value persistence for session credentials.
///
/// No expiry is tracked here; an expired token is only discovered through a
/// failed authenticated request or an explicit validation call.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Read a slot
    async fn get(&self, slot: TokenSlot) -> Option<String>;

    /// Write a slot
    async fn set(&self, slot: TokenSlot, value: &str) -> Result<()>;

    /// Remove a slot
    async fn remove(&self, slot: TokenSlot) -> Result<()>;

    /// Remove every slot
    async fn clear(&self) -> Result<()> {
        for slot in TokenSlot::ALL {
            self.remove(slot).await?;
        }
        Ok(())
    }
}

/// In-memory token store for testing and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slots: Arc<RwLock<HashMap<TokenSlot, String>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.read().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, slot: TokenSlot) -> Option<String> {
        self.slots.read().ok()?.get(&slot).cloned()
    }

    async fn set(&self, slot: TokenSlot, value: &str) -> Result<()> {
        self.slots
            .write()
            .map_err(|_| ClientError::InvalidResponse("Lock poisoned".to_string()))?
            .insert(slot, value.to_string());
        Ok(())
    }

    async fn remove(&self, slot: TokenSlot) -> Result<()> {
        self.slots
            .write()
            .map_err(|_| ClientError::InvalidResponse("Lock poisoned".to_string()))?
            .remove(&slot);
        Ok(())
    }
}
