//! Session key derivation from the agreed group secret.

use crate::error::CryptoError;
use crate::symmetric::{KdfParams, SymmetricCapability};

/// Derive the session key from the canonical encoding of a shared secret.
///
/// Always uses [`KdfParams::SESSION`]. Errors from the capability are
/// returned unchanged and nothing is retried.
pub fn derive_session_key<C: SymmetricCapability>(
    capability: &C,
    secret: &[u8],
) -> Result<C::Key, CryptoError> {
    capability.derive_key(secret, &KdfParams::SESSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetric::{AesCtrCipher, SessionKey};

    /// Capability that refuses every derivation.
    struct Unsupported;

    impl SymmetricCapability for Unsupported {
        type Key = SessionKey;

        fn derive_key(
            &self,
            _material: &[u8],
            _params: &KdfParams,
        ) -> Result<SessionKey, CryptoError> {
            Err(CryptoError::KeyDerivationFailed("PBKDF2 not available".into()))
        }

        fn encrypt<R: rand::RngCore + rand::CryptoRng>(
            &self,
            _key: &SessionKey,
            _plaintext: &[u8],
            _rng: &mut R,
        ) -> Result<Vec<u8>, CryptoError> {
            unreachable!()
        }

        fn decrypt(&self, _key: &SessionKey, _data: &[u8]) -> Result<Vec<u8>, CryptoError> {
            unreachable!()
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let secret = [0x5au8; 384];
        let k1 = derive_session_key(&AesCtrCipher, &secret).unwrap();
        let k2 = derive_session_key(&AesCtrCipher, &secret).unwrap();
        assert_eq!(k1, k2);

        let mut other = secret;
        other[0] ^= 1;
        let k3 = derive_session_key(&AesCtrCipher, &other).unwrap();
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_capability_errors_propagate() {
        let err = derive_session_key(&Unsupported, b"secret").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Key derivation failed: PBKDF2 not available"
        );
    }
}
