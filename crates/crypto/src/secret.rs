//! Ephemeral secret exponents.
//!
//! One exponent r_i is drawn per participant per session. It never leaves
//! the process and is wiped when dropped, whatever path drops it.

use std::fmt;

use rand::{CryptoRng, RngCore};
use zeroize::Zeroizing;

use crate::arith::{Arithmetic, BigUintArithmetic};
use crate::error::CryptoError;
use crate::params::GroupParameters;

/// A participant's secret exponent r_i in `[1, 2^(8 * exponent_len))`.
pub struct SecretExponent<A: Arithmetic = BigUintArithmetic> {
    value: A::Int,
}

impl<A: Arithmetic> SecretExponent<A> {
    /// Build an exponent from big-endian bytes.
    ///
    /// Used to inject fixed exponents; fresh ones come from
    /// [`generate_secret_exponent`].
    pub fn from_bytes_be(params: &GroupParameters<A>, bytes: &[u8]) -> Result<Self, CryptoError> {
        let value = params.arith().from_bytes_be(bytes);
        Self::checked(params, value)
    }

    /// Build an exponent from a decimal string.
    pub fn from_decimal(params: &GroupParameters<A>, digits: &str) -> Result<Self, CryptoError> {
        let value = params
            .arith()
            .from_str_radix(digits, 10)
            .ok_or(CryptoError::InvalidSecretExponent)?;
        Self::checked(params, value)
    }

    fn checked(params: &GroupParameters<A>, mut value: A::Int) -> Result<Self, CryptoError> {
        let arith = params.arith();
        let max_bits = 8 * params.exponent_len() as u64;
        if arith.is_zero(&value) || arith.bits(&value) > max_bits {
            A::wipe(&mut value);
            return Err(CryptoError::InvalidSecretExponent);
        }
        Ok(Self { value })
    }

    pub(crate) fn value(&self) -> &A::Int {
        &self.value
    }
}

impl<A: Arithmetic> Drop for SecretExponent<A> {
    fn drop(&mut self) {
        A::wipe(&mut self.value);
    }
}

impl<A: Arithmetic> fmt::Debug for SecretExponent<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretExponent(<redacted>)")
    }
}

/// Draw a fresh secret exponent from `rng`.
///
/// Reads `exponent_len` bytes and interprets them as a big-endian integer.
/// A failing random source is reported as [`CryptoError::EntropyUnavailable`]
/// and is not retried.
pub fn generate_secret_exponent<A, R>(
    params: &GroupParameters<A>,
    rng: &mut R,
) -> Result<SecretExponent<A>, CryptoError>
where
    A: Arithmetic,
    R: RngCore + CryptoRng,
{
    let mut bytes = Zeroizing::new(vec![0u8; params.exponent_len()]);
    loop {
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))?;

        // Zero is outside the exponent range; redraw.
        if bytes.iter().any(|b| *b != 0) {
            return SecretExponent::from_bytes_be(params, &bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::{OsRng, StdRng};
    use rand::SeedableRng;

    /// Random source that always fails.
    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source offline"))
        }
    }

    impl CryptoRng for BrokenRng {}

    #[test]
    fn test_generated_exponents_differ() {
        let params = GroupParameters::default();
        let r1 = generate_secret_exponent(&params, &mut OsRng).unwrap();
        let r2 = generate_secret_exponent(&params, &mut OsRng).unwrap();

        assert_ne!(r1.value(), r2.value());
        assert!(params.arith().bits(r1.value()) <= 512);
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let params = GroupParameters::default();
        let r1 = generate_secret_exponent(&params, &mut StdRng::seed_from_u64(7)).unwrap();
        let r2 = generate_secret_exponent(&params, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(r1.value(), r2.value());
    }

    #[test]
    fn test_broken_rng_is_fatal() {
        let params = GroupParameters::default();
        let result = generate_secret_exponent(&params, &mut BrokenRng);
        assert!(matches!(result, Err(CryptoError::EntropyUnavailable(_))));
    }

    #[test]
    fn test_exponent_bounds() {
        let params = GroupParameters::default();

        assert!(SecretExponent::from_decimal(&params, "12345").is_ok());
        assert!(matches!(
            SecretExponent::from_decimal(&params, "0"),
            Err(CryptoError::InvalidSecretExponent)
        ));
        assert!(matches!(
            SecretExponent::from_bytes_be(&params, &[0xff; 65]),
            Err(CryptoError::InvalidSecretExponent)
        ));
        assert!(SecretExponent::from_bytes_be(&params, &[0xff; 64]).is_ok());
        assert!(SecretExponent::from_decimal(&params, "12a").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let params = GroupParameters::default();
        let r = SecretExponent::from_decimal(&params, "424242").unwrap();
        assert_eq!(format!("{:?}", r), "SecretExponent(<redacted>)");
    }
}
