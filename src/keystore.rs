//! Long-term RSA identity and key-half wrapping.
//!
//! Each peer holds one RSA keypair used only to wrap and unwrap the 8-byte
//! session key halves exchanged during the handshake (OAEP with SHA-256).
//! The in-memory store generates its keypair lazily on first use and
//! memoizes it for the store's lifetime.

use std::sync::{Arc, Mutex};

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::info;

use crate::error::SottoError;
use crate::HALF_KEY_LEN;

/// Default RSA modulus size in bits.
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Source of this peer's long-term asymmetric identity.
///
/// The private key never leaves the store in serialized form; the
/// handshake extracts the public half from the returned keypair to put on
/// the wire.
pub trait KeyStore: Send + Sync {
    /// The keypair, generated on first access if necessary.
    fn keypair(&self) -> Result<Arc<RsaPrivateKey>, SottoError>;
}

/// In-memory key store with lazy, memoized generation.
pub struct MemoryKeyStore {
    bits: usize,
    cached: Mutex<Option<Arc<RsaPrivateKey>>>,
}

impl MemoryKeyStore {
    /// Store generating a [`DEFAULT_KEY_BITS`]-bit keypair on first use.
    pub fn new() -> Self {
        Self::with_bits(DEFAULT_KEY_BITS)
    }

    /// Store generating a keypair of the given modulus size on first use.
    ///
    /// OAEP with SHA-256 needs at least 1024 bits to fit an 8-byte half.
    pub fn with_bits(bits: usize) -> Self {
        Self {
            bits,
            cached: Mutex::new(None),
        }
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn keypair(&self) -> Result<Arc<RsaPrivateKey>, SottoError> {
        let mut cached = self.cached.lock().unwrap();
        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }
        info!(bits = self.bits, "generating RSA identity (this may take a while)");
        let key = Arc::new(RsaPrivateKey::new(&mut OsRng, self.bits)?);
        *cached = Some(key.clone());
        Ok(key)
    }
}

/// Generate one fresh 8-byte key half from the OS CSPRNG.
pub fn fresh_half() -> [u8; HALF_KEY_LEN] {
    let mut half = [0u8; HALF_KEY_LEN];
    OsRng.fill_bytes(&mut half);
    half
}

/// Wrap a key half under the peer's public key (OAEP/SHA-256).
pub fn wrap_half(peer: &RsaPublicKey, half: &[u8]) -> Result<Vec<u8>, SottoError> {
    Ok(peer.encrypt(&mut OsRng, Oaep::new::<Sha256>(), half)?)
}

/// Unwrap a received key half with the local private key.
///
/// Any RSA failure here is fatal to the handshake.
pub fn unwrap_half(key: &RsaPrivateKey, wrapped: &[u8]) -> Result<Vec<u8>, SottoError> {
    key.decrypt(Oaep::new::<Sha256>(), wrapped)
        .map_err(|_| SottoError::KeyUnwrapFailed)
}
