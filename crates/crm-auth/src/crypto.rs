use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::errors::{ClientError, Result};

const NONCE_LEN: usize = 12;
const AAD_VERSION: &str = "v1";

/// AES-256 key sealing the token store
#[derive(Clone, ZeroizeOnDrop)]
pub struct StoreKey {
    key: [u8; 32],
}

impl StoreKey {
    /// Generate a new random key
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; 32];
        fill_random(&mut key)?;
        Ok(Self { key })
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Raw key bytes (sensitive)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey([REDACTED])")
    }
}

/// One encrypted slot value as written to disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedValue {
    /// Base64url nonce (12 bytes)
    pub nonce: String,
    /// Base64url ciphertext + tag
    pub ciphertext: String,
    pub aad_version: String,
}

pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| ClientError::Crypto(format!("OS randomness unavailable: {e}")))
}

fn aad(version: &str, slot_key: &str) -> String {
    format!("crm-auth|{version}|{slot_key}")
}

/// Seal a slot value. The slot key is bound as associated data so a value
/// cannot be moved to another slot undetected.
pub fn seal(key: &StoreKey, plaintext: &str, slot_key: &str) -> Result<SealedValue> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_LEN];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad(AAD_VERSION, slot_key);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext.as_bytes(),
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| ClientError::Crypto(format!("Encryption failed: {e}")))?;

    Ok(SealedValue {
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        aad_version: AAD_VERSION.to_string(),
    })
}

/// Open a sealed slot value
pub fn open(key: &StoreKey, sealed: &SealedValue, slot_key: &str) -> Result<Zeroizing<String>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&sealed.nonce)
        .map_err(|_| ClientError::CorruptedStore)?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(ClientError::CorruptedStore);
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = URL_SAFE_NO_PAD
        .decode(&sealed.ciphertext)
        .map_err(|_| ClientError::CorruptedStore)?;

    let aad = aad(&sealed.aad_version, slot_key);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| ClientError::CorruptedStore)?;

    String::from_utf8(plaintext)
        .map(Zeroizing::new)
        .map_err(|_| ClientError::CorruptedStore)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let key = StoreKey::generate().unwrap();
        let sealed = seal(&key, "T1", "auth_token").unwrap();

        assert_ne!(sealed.ciphertext, "T1");
        assert_eq!(open(&key, &sealed, "auth_token").unwrap().as_str(), "T1");
    }

    #[test]
    fn test_value_is_bound_to_its_slot() {
        let key = StoreKey::generate().unwrap();
        let sealed = seal(&key, "R1", "refresh_token").unwrap();

        let moved = open(&key, &sealed, "auth_token");
        assert!(matches!(moved, Err(ClientError::CorruptedStore)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&StoreKey::generate().unwrap(), "T1", "auth_token").unwrap();
        let other = StoreKey::generate().unwrap();

        assert!(matches!(
            open(&other, &sealed, "auth_token"),
            Err(ClientError::CorruptedStore)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = StoreKey::generate().unwrap();
        let mut sealed = seal(&key, "T1", "auth_token").unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(&sealed.ciphertext).unwrap();
        bytes[0] ^= 0xFF;
        sealed.ciphertext = URL_SAFE_NO_PAD.encode(bytes);

        assert!(matches!(
            open(&key, &sealed, "auth_token"),
            Err(ClientError::CorruptedStore)
        ));
    }
}
