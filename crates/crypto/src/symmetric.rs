//! Symmetric-crypto capability: key derivation and AES-CTR encryption.
//!
//! The key agreement core only needs to turn raw key material into a session
//! key, so the capability is a trait. [`AesCtrCipher`] implements it with
//! PBKDF2-HMAC-SHA256 and AES-128 in counter mode.
//!
//! # Ciphertext format
//!
//! `nonce (16 bytes) || ciphertext`, where the nonce is the initial 128-bit
//! big-endian counter block. Each encryption draws a fresh random nonce.

use std::fmt;

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

type Aes128Ctr128BE = ctr::Ctr128BE<Aes128>;

/// Size of the AES-CTR counter block prepended to every ciphertext.
pub const NONCE_LEN: usize = 16;

/// Size of a session key in bytes (AES-128).
pub const KEY_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KdfAlgorithm {
    Pbkdf2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KdfHash {
    Sha256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherAlgorithm {
    AesCtr,
}

/// Parameters handed to [`SymmetricCapability::derive_key`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    pub hash: KdfHash,
    pub salt: &'static [u8],
    pub iterations: u32,
    pub cipher: CipherAlgorithm,
    pub key_bits: usize,
    pub extractable: bool,
}

impl KdfParams {
    /// Parameters for session keys: PBKDF2 with an empty salt and a single
    /// SHA-256 iteration, producing an extractable 128-bit AES-CTR key.
    ///
    /// The input is a group secret with hundreds of bits of entropy, so no
    /// stretching is applied.
    pub const SESSION: KdfParams = KdfParams {
        algorithm: KdfAlgorithm::Pbkdf2,
        hash: KdfHash::Sha256,
        salt: &[],
        iterations: 1,
        cipher: CipherAlgorithm::AesCtr,
        key_bits: 128,
        extractable: true,
    };
}

/// Key derivation and encryption provided by the host.
pub trait SymmetricCapability {
    /// Opaque key object.
    type Key;

    fn derive_key(&self, material: &[u8], params: &KdfParams) -> Result<Self::Key, CryptoError>;

    fn encrypt<R: RngCore + CryptoRng>(
        &self,
        key: &Self::Key,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, key: &Self::Key, data: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// A 128-bit AES-CTR key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    bytes: [u8; KEY_LEN],
    #[zeroize(skip)]
    extractable: bool,
}

impl SessionKey {
    /// Import raw key bytes.
    pub fn from_bytes(bytes: &[u8], extractable: bool) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::KeyDerivationFailed(format!(
                "key must be {} bytes, got {}",
                KEY_LEN, bytes.len()
            ))
        })?;
        Ok(Self { bytes, extractable })
    }

    /// Import a hex-encoded raw key.
    pub fn from_hex(encoded: &str, extractable: bool) -> Result<Self, CryptoError> {
        let mut raw = hex::decode(encoded.trim())
            .map_err(|e| CryptoError::KeyDerivationFailed(format!("invalid key hex: {}", e)))?;
        let key = Self::from_bytes(&raw, extractable);
        raw.zeroize();
        key
    }

    /// Generate a random key.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;
        Ok(Self {
            bytes,
            extractable: true,
        })
    }

    pub fn is_extractable(&self) -> bool {
        self.extractable
    }

    /// Raw key bytes, only for extractable keys.
    pub fn export(&self) -> Result<&[u8], CryptoError> {
        if self.extractable {
            Ok(&self.bytes)
        } else {
            Err(CryptoError::KeyNotExtractable)
        }
    }

    pub fn to_hex(&self) -> Result<String, CryptoError> {
        self.export().map(hex::encode)
    }

    /// Short public identifier: first 8 bytes of SHA-256 over the key.
    pub fn key_id(&self) -> String {
        let digest = Sha256::digest(self.bytes);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("key_id", &self.key_id())
            .field("extractable", &self.extractable)
            .finish()
    }
}

/// PBKDF2-HMAC-SHA256 key derivation with AES-128-CTR encryption.
#[derive(Clone, Copy, Debug, Default)]
pub struct AesCtrCipher;

impl AesCtrCipher {
    fn check_params(params: &KdfParams) -> Result<(), CryptoError> {
        if params.algorithm != KdfAlgorithm::Pbkdf2 || params.hash != KdfHash::Sha256 {
            return Err(CryptoError::KeyDerivationFailed(
                "unsupported key derivation algorithm".into(),
            ));
        }
        if params.cipher != CipherAlgorithm::AesCtr || params.key_bits != KEY_LEN * 8 {
            return Err(CryptoError::KeyDerivationFailed(format!(
                "unsupported target key: {:?} with {} bits",
                params.cipher, params.key_bits
            )));
        }
        if params.iterations == 0 {
            return Err(CryptoError::KeyDerivationFailed("iteration count must be positive".into()));
        }
        Ok(())
    }
}

impl SymmetricCapability for AesCtrCipher {
    type Key = SessionKey;

    fn derive_key(&self, material: &[u8], params: &KdfParams) -> Result<SessionKey, CryptoError> {
        Self::check_params(params)?;
        if material.is_empty() {
            return Err(CryptoError::KeyDerivationFailed("empty key material".into()));
        }

        let mut bytes = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(material, params.salt, params.iterations, &mut bytes);

        Ok(SessionKey {
            bytes,
            extractable: params.extractable,
        })
    }

    fn encrypt<R: RngCore + CryptoRng>(
        &self,
        key: &SessionKey,
        plaintext: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rng.try_fill_bytes(&mut nonce)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;

        let mut cipher = Aes128Ctr128BE::new_from_slices(&key.bytes, &nonce)
            .map_err(|e| CryptoError::EncryptionFailed(format!("Failed to create cipher: {}", e)))?;

        let mut ciphertext = plaintext.to_vec();
        cipher.apply_keystream(&mut ciphertext);

        Ok(join_nonce_ciphertext(&nonce, &ciphertext))
    }

    fn decrypt(&self, key: &SessionKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (nonce, ciphertext) = split_nonce_ciphertext(data)?;

        let mut cipher = Aes128Ctr128BE::new_from_slices(&key.bytes, nonce)
            .map_err(|e| CryptoError::DecryptionFailed(format!("Failed to create cipher: {}", e)))?;

        let mut plaintext = ciphertext.to_vec();
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}

/// Prepend the counter block to the ciphertext.
pub fn join_nonce_ciphertext(nonce: &[u8; NONCE_LEN], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(ciphertext);
    out
}

/// Split `nonce || ciphertext`.
pub fn split_nonce_ciphertext(data: &[u8]) -> Result<(&[u8], &[u8]), CryptoError> {
    if data.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed(format!(
            "ciphertext shorter than the {}-byte nonce",
            NONCE_LEN
        )));
    }
    Ok(data.split_at(NONCE_LEN))
}
