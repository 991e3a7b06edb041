//! Group parameters shared by every participant of a session.
//!
//! A [`GroupParameters`] value is built once, validated, and then only ever
//! read. Two participants can only agree on a key if they hold identical
//! parameters; the [`ParamsFingerprint`] carried in round 1 messages is how
//! a mismatch is caught.

use sha2::{Digest, Sha256};

use ringkey_types::ParamsFingerprint;

use crate::arith::{Arithmetic, BigUintArithmetic};
use crate::error::CryptoError;

/// 3072-bit MODP prime from RFC 3526, group 15.
pub const RFC3526_3072_MODULUS_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D04507A33",
    "A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7DB3970F85A6E1E4C7",
    "ABF5AE8CDB0933D71E8C94E04A25619DCEE3D2261AD2EE6BF12FFA06D98A0864",
    "D87602733EC86A64521F2B18177B200CBBE117577A615D6C770988C0BAD946E2",
    "08E24FA074E5AB3143DB5BFCE0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
);

/// 2048-bit MODP prime from RFC 3526, group 14.
pub const RFC3526_2048_MODULUS_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05",
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB",
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B",
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF",
);

/// Generator used with the RFC 3526 groups.
pub const DEFAULT_GENERATOR: u64 = 2;

/// Size in bytes of a secret exponent (512-bit exponents).
pub const DEFAULT_EXPONENT_LEN: usize = 64;

/// Smallest modulus accepted by [`GroupParameters::new`].
pub const MIN_MODULUS_BITS: u64 = 2048;

const MAX_EXPONENT_LEN: usize = 512;

/// Prime modulus, generator and exponent size of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupParameters<A: Arithmetic = BigUintArithmetic> {
    arith: A,
    modulus: A::Int,
    generator: A::Int,
    exponent_len: usize,
    modulus_len: usize,
    fingerprint: ParamsFingerprint,
}

impl GroupParameters<BigUintArithmetic> {
    /// RFC 3526 group 15 (3072-bit), generator 2, 64-byte exponents.
    pub fn rfc3526_3072() -> Self {
        Self::from_hex_with(
            BigUintArithmetic,
            RFC3526_3072_MODULUS_HEX,
            DEFAULT_GENERATOR,
            DEFAULT_EXPONENT_LEN,
        )
        .expect("RFC 3526 group 15 is a valid group")
    }

    /// RFC 3526 group 14 (2048-bit), generator 2, 64-byte exponents.
    pub fn rfc3526_2048() -> Self {
        Self::from_hex_with(
            BigUintArithmetic,
            RFC3526_2048_MODULUS_HEX,
            DEFAULT_GENERATOR,
            DEFAULT_EXPONENT_LEN,
        )
        .expect("RFC 3526 group 14 is a valid group")
    }

    /// Custom parameters from a hex modulus, using the default provider.
    pub fn from_hex(
        modulus_hex: &str,
        generator: u64,
        exponent_len: usize,
    ) -> Result<Self, CryptoError> {
        Self::from_hex_with(BigUintArithmetic, modulus_hex, generator, exponent_len)
    }
}

impl Default for GroupParameters<BigUintArithmetic> {
    fn default() -> Self {
        Self::rfc3526_3072()
    }
}

impl<A: Arithmetic> GroupParameters<A> {
    /// Build and validate parameters.
    ///
    /// Rejects moduli that are even or shorter than [`MIN_MODULUS_BITS`],
    /// generators outside `(1, p - 1)` and exponent sizes outside `1..=512`.
    /// Primality of the modulus is the caller's responsibility.
    pub fn new(
        arith: A,
        modulus: A::Int,
        generator: A::Int,
        exponent_len: usize,
    ) -> Result<Self, CryptoError> {
        let bits = arith.bits(&modulus);
        if bits < MIN_MODULUS_BITS {
            return Err(CryptoError::InvalidParameters(format!(
                "modulus has {} bits, need at least {}",
                bits, MIN_MODULUS_BITS
            )));
        }

        let modulus_len = bits.div_ceil(8) as usize;
        let modulus_bytes = arith
            .to_bytes_be_padded(&modulus, modulus_len)
            .ok_or_else(|| CryptoError::InvalidParameters("modulus encoding".into()))?;
        if modulus_bytes[modulus_len - 1] & 1 == 0 {
            return Err(CryptoError::InvalidParameters("modulus is even".into()));
        }

        let one = arith.from_u64(1);
        let p_minus_one = arith.from_bytes_be(&decrement_be(&modulus_bytes));
        if generator <= one || generator >= p_minus_one {
            return Err(CryptoError::InvalidParameters("generator outside (1, p - 1)".into()));
        }

        if exponent_len == 0 || exponent_len > MAX_EXPONENT_LEN {
            return Err(CryptoError::InvalidParameters(format!(
                "exponent length {} outside 1..={}",
                exponent_len, MAX_EXPONENT_LEN
            )));
        }

        let generator_bytes = arith
            .to_bytes_be_padded(&generator, modulus_len)
            .ok_or_else(|| CryptoError::InvalidParameters("generator encoding".into()))?;
        let fingerprint = compute_fingerprint(&modulus_bytes, &generator_bytes, exponent_len);

        Ok(Self {
            arith,
            modulus,
            generator,
            exponent_len,
            modulus_len,
            fingerprint,
        })
    }

    /// Build parameters from a hex modulus with an explicit provider.
    pub fn from_hex_with(
        arith: A,
        modulus_hex: &str,
        generator: u64,
        exponent_len: usize,
    ) -> Result<Self, CryptoError> {
        let modulus = arith
            .from_str_radix(modulus_hex, 16)
            .ok_or_else(|| CryptoError::InvalidParameters("modulus is not valid hex".into()))?;
        let generator = arith.from_u64(generator);
        Self::new(arith, modulus, generator, exponent_len)
    }

    pub fn arith(&self) -> &A {
        &self.arith
    }

    pub fn modulus(&self) -> &A::Int {
        &self.modulus
    }

    pub fn generator(&self) -> &A::Int {
        &self.generator
    }

    /// Size in bytes of a freshly generated secret exponent.
    pub fn exponent_len(&self) -> usize {
        self.exponent_len
    }

    /// Byte length of the modulus; width of every encoded group element.
    pub fn modulus_len(&self) -> usize {
        self.modulus_len
    }

    pub fn modulus_bits(&self) -> u64 {
        self.arith.bits(&self.modulus)
    }

    pub fn fingerprint(&self) -> ParamsFingerprint {
        self.fingerprint
    }

    /// Fail with [`CryptoError::ParameterMismatch`] unless `other` matches.
    pub fn ensure_fingerprint(&self, other: &ParamsFingerprint) -> Result<(), CryptoError> {
        if &self.fingerprint == other {
            Ok(())
        } else {
            Err(CryptoError::ParameterMismatch)
        }
    }

    /// Check that `value` lies in `[1, p)`.
    pub fn check_element(&self, value: &A::Int) -> Result<(), CryptoError> {
        if self.arith.is_zero(value) || value >= &self.modulus {
            return Err(CryptoError::ElementOutOfRange);
        }
        Ok(())
    }

    /// Canonical fixed-width encoding of a value.
    ///
    /// Values wider than the modulus are rejected, never truncated.
    pub(crate) fn encode(&self, value: &A::Int) -> Result<Vec<u8>, CryptoError> {
        self.arith
            .to_bytes_be_padded(value, self.modulus_len)
            .ok_or(CryptoError::ElementOutOfRange)
    }

    /// Decode a fixed-width element and range-check it.
    pub(crate) fn decode(&self, bytes: &[u8]) -> Result<A::Int, CryptoError> {
        if bytes.len() != self.modulus_len {
            return Err(CryptoError::InvalidEncoding {
                expected: self.modulus_len,
                got: bytes.len(),
            });
        }
        let value = self.arith.from_bytes_be(bytes);
        self.check_element(&value)?;
        Ok(value)
    }
}

fn compute_fingerprint(modulus: &[u8], generator: &[u8], exponent_len: usize) -> ParamsFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"RINGKEY_GROUP_PARAMS_V1:");
    hasher.update((modulus.len() as u32).to_be_bytes());
    hasher.update(modulus);
    hasher.update(generator);
    hasher.update((exponent_len as u32).to_be_bytes());
    ParamsFingerprint(hasher.finalize().into())
}

/// Subtract one from a non-zero big-endian number.
fn decrement_be(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    for byte in out.iter_mut().rev() {
        if *byte == 0 {
            *byte = 0xff;
        } else {
            *byte -= 1;
            break;
        }
    }
    out
}
