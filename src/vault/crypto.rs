//! Cryptographic primitives for the credential vault.
//!
//! # Algorithms
//!
//! - **Key Derivation**: Argon2id over the master secret and a fixed salt
//! - **Encryption**: ChaCha20-Poly1305 (authenticated encryption)
//!
//! Blobs are stored as `base64url(nonce || ciphertext)`. A fresh random nonce is drawn for
//! every encryption.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use once_cell::sync::OnceCell;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use tracing::info;

use crate::config::VaultConfig;
use crate::error::VaultError;

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// ChaCha20-Poly1305 auth tag length (16 bytes)
pub const AUTH_TAG_LEN: usize = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    pub fn from_config(cfg: &VaultConfig) -> Self {
        Self {
            memory_kib: cfg.kdf_memory_kib,
            iterations: cfg.kdf_iterations,
            parallelism: cfg.kdf_parallelism,
        }
    }
}

/// Derive a 256-bit key from the master secret using Argon2id.
pub fn derive_key(secret: &[u8], salt: &[u8], params: KdfParams) -> Result<[u8; 32], VaultError> {
    let params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(32),
    )
    .map_err(|e| VaultError::Key(format!("invalid argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(secret, salt, &mut key)
        .map_err(|e| VaultError::Key(format!("key derivation failed: {e}")))?;

    Ok(key)
}

/// Symmetric cipher holding the derived key.
pub struct VaultCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for VaultCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultCipher(..)")
    }
}

static PROCESS_CIPHER: OnceCell<Arc<VaultCipher>> = OnceCell::new();

impl VaultCipher {
    pub fn from_key(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    pub fn derive(secret: &str, salt: &str, params: KdfParams) -> Result<Self, VaultError> {
        if secret.is_empty() {
            return Err(VaultError::Key("master secret is empty".into()));
        }
        let key = derive_key(secret.as_bytes(), salt.as_bytes(), params)?;
        Ok(Self::from_key(&key))
    }

    /// Process-wide cipher derived once from the configured master secret.
    /// The KDF is slow on purpose; later calls reuse the first derivation.
    pub fn process_shared(cfg: &VaultConfig) -> Result<Arc<VaultCipher>, VaultError> {
        PROCESS_CIPHER
            .get_or_try_init(|| {
                let secret = cfg
                    .master_secret()
                    .map_err(|e| VaultError::Key(e.to_string()))?;
                let cipher = Self::derive(&secret, &cfg.salt, KdfParams::from_config(cfg))?;
                info!(target: "vault", "vault key derived");
                Ok(Arc::new(cipher))
            })
            .cloned()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(out))
    }

    pub fn decrypt(&self, blob: &str) -> Result<Vec<u8>, VaultError> {
        let bytes = URL_SAFE
            .decode(blob.trim())
            .map_err(|e| VaultError::Decryption(format!("blob is not base64: {e}")))?;

        if bytes.len() < NONCE_LEN + AUTH_TAG_LEN {
            return Err(VaultError::Decryption(format!(
                "blob too short: {} bytes",
                bytes.len()
            )));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| {
                VaultError::Decryption("authentication failed (wrong key or tampered blob)".into())
            })
    }
}

#[cfg(test)]
pub(crate) fn test_params() -> KdfParams {
    KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_derivation_is_deterministic_per_secret() {
        let k1 = derive_key(b"secret-a", b"fixed-salt", test_params()).unwrap();
        let k2 = derive_key(b"secret-a", b"fixed-salt", test_params()).unwrap();
        let k3 = derive_key(b"secret-b", b"fixed-salt", test_params()).unwrap();
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn encrypt_decrypt_roundtrip_uses_fresh_nonces() {
        let c = VaultCipher::derive("master", "fixed-salt", test_params()).unwrap();
        let a = c.encrypt(b"{\"session\":\"x\"}").unwrap();
        let b = c.encrypt(b"{\"session\":\"x\"}").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), b"{\"session\":\"x\"}");
    }

    #[test]
    fn wrong_key_and_tampering_fail_as_decryption() {
        let c = VaultCipher::derive("master", "fixed-salt", test_params()).unwrap();
        let other = VaultCipher::derive("other", "fixed-salt", test_params()).unwrap();
        let blob = c.encrypt(b"payload").unwrap();

        assert!(matches!(other.decrypt(&blob), Err(VaultError::Decryption(_))));

        let mut raw = URL_SAFE.decode(&blob).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = URL_SAFE.encode(raw);
        assert!(matches!(c.decrypt(&tampered), Err(VaultError::Decryption(_))));

        assert!(matches!(c.decrypt("!!not base64!!"), Err(VaultError::Decryption(_))));
        assert!(matches!(c.decrypt("AAAA"), Err(VaultError::Decryption(_))));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(
            VaultCipher::derive("", "fixed-salt", test_params()),
            Err(VaultError::Key(_))
        ));
    }
}
