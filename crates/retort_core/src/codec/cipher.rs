//! Field-level symmetric encryption.
//!
//! # Responsibility
//! - Hold per-column keys declared by a model.
//! - Seal wire values with a fresh random nonce and open them again.
//!
//! # Invariants
//! - Sealed form is `nonce || ciphertext` bytes (XChaCha20-Poly1305).
//! - Opening anything that is not a valid sealed value yields `None`; the
//!   caller treats that as "already plain".

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// Nonce length of XChaCha20-Poly1305.
pub const NONCE_LEN: usize = 24;
/// Authentication tag length.
pub const TAG_LEN: usize = 16;
/// Required key length in bytes.
pub const KEY_LEN: usize = 32;

/// Invalid key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLengthError {
    pub actual: usize,
}

impl Display for KeyLengthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "encryption key must be {KEY_LEN} bytes, got {}",
            self.actual
        )
    }
}

impl Error for KeyLengthError {}

/// Symmetric cipher bound to one column key.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: XChaCha20Poly1305,
}

impl FieldCipher {
    pub fn new(key: &[u8]) -> Result<Self, KeyLengthError> {
        let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| KeyLengthError {
            actual: key.len(),
        })?;
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` under a freshly generated nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self.cipher.encrypt(&nonce, plaintext).ok()?;
        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(nonce.as_slice());
        sealed.extend_from_slice(&ciphertext);
        Some(sealed)
    }

    /// Decrypts a sealed value, `None` if it was never sealed with this key.
    pub fn open(&self, sealed: &[u8]) -> Option<Vec<u8>> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .ok()
    }
}

impl Debug for FieldCipher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldCipher(..)")
    }
}

/// Column name to key mapping declared by a model.
#[derive(Debug, Clone, Default)]
pub struct Keyring {
    keys: BTreeMap<String, Vec<u8>>,
}

impl Keyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enrolls `column` for encryption under `key`.
    pub fn with_key(mut self, column: impl Into<String>, key: impl AsRef<[u8]>) -> Self {
        self.keys.insert(column.into(), key.as_ref().to_vec());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Builds one cipher per enrolled column.
    pub fn ciphers(&self) -> Result<BTreeMap<String, FieldCipher>, (String, KeyLengthError)> {
        let mut ciphers = BTreeMap::new();
        for (column, key) in &self.keys {
            let cipher = FieldCipher::new(key).map_err(|err| (column.clone(), err))?;
            ciphers.insert(column.clone(), cipher);
        }
        Ok(ciphers)
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldCipher, Keyring, NONCE_LEN};

    const KEY: [u8; 32] = [7; 32];

    #[test]
    fn seal_then_open_recovers_plaintext_with_fresh_nonces() {
        let cipher = FieldCipher::new(&KEY).unwrap();
        let first = cipher.seal(b"gabriel").unwrap();
        let second = cipher.seal(b"gabriel").unwrap();

        assert_ne!(first[..NONCE_LEN], second[..NONCE_LEN]);
        assert_eq!(cipher.open(&first).unwrap(), b"gabriel");
        assert_eq!(cipher.open(&second).unwrap(), b"gabriel");
    }

    #[test]
    fn open_rejects_plain_and_foreign_values() {
        let cipher = FieldCipher::new(&KEY).unwrap();
        let other = FieldCipher::new(&[9; 32]).unwrap();

        assert!(cipher.open(b"THIS|IS|NOT|ENCRYPTED").is_none());
        assert!(cipher.open(&other.seal(b"secret").unwrap()).is_none());
    }

    #[test]
    fn short_keys_are_rejected() {
        let err = FieldCipher::new(b"fake-encryption-key1").unwrap_err();
        assert_eq!(err.actual, 20);

        let keyring = Keyring::new().with_key("name", b"short");
        let (column, _) = keyring.ciphers().unwrap_err();
        assert_eq!(column, "name");
    }
}
