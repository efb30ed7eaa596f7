//! Tokenization vault: sensitive values are sealed and replaced by opaque tokens.
//!
//! Values are encrypted with XChaCha20-Poly1305 under a 256-bit key derived from the
//! caller-supplied vault key with SHA-256. The stored blob is `nonce || ciphertext`,
//! hex encoded.

mod sqlite_vault_store;

pub use sqlite_vault_store::{SqliteVaultStore, VAULT_STORE_VERSIONED_SCHEMAS};

use anyhow::Result;
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    XChaCha20Poly1305, XNonce,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub const TOKEN_PREFIX: &str = "tk_";
const NONCE_LEN: usize = 24;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault key is empty")]
    EmptyKey,

    #[error("vault store is not configured")]
    NotConfigured,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("sealed value has an invalid format")]
    InvalidFormat,
}

pub trait VaultStore: Send + Sync {
    /// Seal `value` and return the token that now stands for it.
    fn tokenize(&self, value: &str, key: &str) -> Result<String>;

    /// Resolve tokens to their plaintext. Unknown tokens are absent from the result.
    fn tokens_read(&self, tokens: &[String], key: &str) -> Result<HashMap<String, String>>;

    fn token_delete(&self, token: &str) -> Result<()>;
}

/// Resolve a map of `name -> token` into `name -> plaintext`.
///
/// Empty tokens and tokens the vault does not know resolve to the empty string.
pub fn untokenize(
    vault: Option<&Arc<dyn VaultStore>>,
    key: &str,
    tokens: &HashMap<String, String>,
) -> Result<HashMap<String, String>> {
    let vault = vault.ok_or(VaultError::NotConfigured)?;

    let lookup: Vec<String> = tokens
        .values()
        .filter(|token| !token.is_empty())
        .cloned()
        .collect();
    let values = if lookup.is_empty() {
        HashMap::new()
    } else {
        vault.tokens_read(&lookup, key)?
    };

    Ok(tokens
        .iter()
        .map(|(name, token)| {
            let value = values.get(token).cloned().unwrap_or_default();
            (name.clone(), value)
        })
        .collect())
}

fn derive_key(key: &str) -> Result<[u8; 32], VaultError> {
    if key.is_empty() {
        return Err(VaultError::EmptyKey);
    }
    let digest = Sha256::digest(key.as_bytes());
    let mut derived = [0u8; 32];
    derived.copy_from_slice(&digest);
    Ok(derived)
}

pub(crate) fn seal(value: &str, key: &str) -> Result<String, VaultError> {
    use chacha20poly1305::aead::rand_core::RngCore;

    let key = derive_key(key)?;
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let ciphertext = cipher
        .encrypt(nonce, value.as_bytes())
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut sealed = nonce.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(hex::encode(sealed))
}

pub(crate) fn open(sealed: &str, key: &str) -> Result<String, VaultError> {
    let key = derive_key(key)?;
    let bytes = hex::decode(sealed).map_err(|_| VaultError::InvalidFormat)?;
    if bytes.len() < NONCE_LEN {
        return Err(VaultError::InvalidFormat);
    }
    let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new((&key).into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| VaultError::Decryption(e.to_string()))?;
    String::from_utf8(plaintext).map_err(|_| VaultError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_and_open_with_same_key() {
        let sealed = seal("a@b.com", "secret").unwrap();
        assert_ne!(sealed, "a@b.com");
        assert_eq!(open(&sealed, "secret").unwrap(), "a@b.com");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let sealed = seal("a@b.com", "secret").unwrap();
        assert!(matches!(
            open(&sealed, "other"),
            Err(VaultError::Decryption(_))
        ));
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(seal("x", ""), Err(VaultError::EmptyKey)));
    }

    #[test]
    fn garbage_is_invalid_format() {
        assert!(matches!(open("zz", "k"), Err(VaultError::InvalidFormat)));
        assert!(matches!(open("abcd", "k"), Err(VaultError::InvalidFormat)));
    }

    #[test]
    fn untokenize_without_vault_is_not_configured() {
        let tokens = HashMap::from([("email".to_string(), "tk_1".to_string())]);
        let err = untokenize(None, "k", &tokens).unwrap_err();
        assert_eq!(err.to_string(), "vault store is not configured");
    }
}
