//! Cryptographer state for the typed URL data type.
//!
//! Association only needs to know whether typed URL data can be read: either
//! the data type is not encrypted, or a key has been derived from the user's
//! passphrase. Keys are derived with PBKDF2 via `ring` and wiped on drop.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::types::errors::CryptoError;

/// PBKDF2 iteration count for key derivation.
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Salt length in bytes for PBKDF2.
pub const SALT_LENGTH: usize = 16;

/// Derived key length in bytes.
const KEY_LENGTH: usize = 32;

/// Answers whether association may read typed URL data.
pub trait CryptoReadiness {
    fn crypto_ready(&self) -> bool;
}

/// Holds the sync key, if any, and the encryption setting for typed URLs.
pub struct SyncCryptographer {
    rng: SystemRandom,
    encrypt_typed_urls: AtomicBool,
    key: Mutex<Option<Zeroizing<Vec<u8>>>>,
}

impl SyncCryptographer {
    pub fn new(encrypt_typed_urls: bool) -> Self {
        Self {
            rng: SystemRandom::new(),
            encrypt_typed_urls: AtomicBool::new(encrypt_typed_urls),
            key: Mutex::new(None),
        }
    }

    pub fn set_encrypt_typed_urls(&self, encrypt: bool) {
        self.encrypt_typed_urls.store(encrypt, Ordering::SeqCst);
    }

    pub fn encrypt_typed_urls(&self) -> bool {
        self.encrypt_typed_urls.load(Ordering::SeqCst)
    }

    /// Derives a key from `passphrase` and `salt` using PBKDF2-HMAC-SHA256.
    pub fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if passphrase.is_empty() {
            return Err(CryptoError::KeyDerivation("Passphrase cannot be empty".to_string()));
        }
        if salt.len() != SALT_LENGTH {
            return Err(CryptoError::InvalidKey(format!(
                "Salt must be {} bytes, got {}",
                SALT_LENGTH,
                salt.len()
            )));
        }
        let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
            .ok_or_else(|| CryptoError::KeyDerivation("Invalid iteration count".to_string()))?;

        let mut key = Zeroizing::new(vec![0u8; KEY_LENGTH]);
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            iterations,
            salt,
            passphrase.as_bytes(),
            key.as_mut_slice(),
        );
        Ok(key)
    }

    /// Generates a random salt for [`SyncCryptographer::set_passphrase`].
    pub fn generate_salt(&self) -> Result<Vec<u8>, CryptoError> {
        let mut salt = vec![0u8; SALT_LENGTH];
        self.rng
            .fill(&mut salt)
            .map_err(|_| CryptoError::RandomGeneration("Failed to generate salt".to_string()))?;
        Ok(salt)
    }

    /// Derives and installs the sync key. The previous key, if any, is wiped.
    pub fn set_passphrase(&self, passphrase: &str, salt: &[u8]) -> Result<(), CryptoError> {
        let key = self.derive_key(passphrase, salt)?;
        let mut slot = self
            .key
            .lock()
            .map_err(|_| CryptoError::InvalidKey("Key store poisoned".to_string()))?;
        *slot = Some(key);
        log::info!("sync passphrase accepted");
        Ok(())
    }

    pub fn clear_key(&self) {
        if let Ok(mut slot) = self.key.lock() {
            *slot = None;
        }
    }

    pub fn has_key(&self) -> bool {
        self.key.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl Default for SyncCryptographer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CryptoReadiness for SyncCryptographer {
    fn crypto_ready(&self) -> bool {
        !self.encrypt_typed_urls() || self.has_key()
    }
}
