//! Arbitrary-precision arithmetic capability.
//!
//! The key agreement only needs a handful of operations on big integers.
//! They are collected in [`Arithmetic`] so the protocol code does not depend
//! on a particular big-integer library. [`BigUintArithmetic`] is the
//! provider used by default, backed by `num-bigint`.

use std::fmt::Debug;

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Big-integer operations consumed by the key agreement core.
///
/// All modular operations assume an odd prime modulus.
pub trait Arithmetic: Clone + Debug + Default + PartialEq + Eq + Send + Sync + 'static {
    /// Non-negative integer type.
    type Int: Clone + Debug + Eq + Ord + Send + Sync;

    /// Interpret big-endian bytes as a non-negative integer.
    fn from_bytes_be(&self, bytes: &[u8]) -> Self::Int;

    /// Big-endian encoding left-padded to exactly `width` bytes.
    ///
    /// Returns `None` if the value needs more than `width` bytes.
    fn to_bytes_be_padded(&self, value: &Self::Int, width: usize) -> Option<Vec<u8>>;

    /// Parse digits in the given radix. Returns `None` on malformed input.
    fn from_str_radix(&self, digits: &str, radix: u32) -> Option<Self::Int>;

    fn from_u64(&self, value: u64) -> Self::Int;

    /// base^exponent mod modulus, logarithmic in the exponent's bit length.
    fn mod_pow(&self, base: &Self::Int, exponent: &Self::Int, modulus: &Self::Int) -> Self::Int;

    /// a * b mod modulus
    fn mod_mul(&self, a: &Self::Int, b: &Self::Int, modulus: &Self::Int) -> Self::Int;

    /// Multiplicative inverse modulo a prime, `None` when `value ≡ 0`.
    fn mod_inverse(&self, value: &Self::Int, modulus: &Self::Int) -> Option<Self::Int>;

    fn is_zero(&self, value: &Self::Int) -> bool;

    /// Number of significant bits.
    fn bits(&self, value: &Self::Int) -> u64;

    /// Overwrite the integer's storage with zeros, best effort.
    fn wipe(value: &mut Self::Int);
}

/// [`Arithmetic`] over `num_bigint::BigUint`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BigUintArithmetic;

impl Arithmetic for BigUintArithmetic {
    type Int = BigUint;

    fn from_bytes_be(&self, bytes: &[u8]) -> BigUint {
        BigUint::from_bytes_be(bytes)
    }

    fn to_bytes_be_padded(&self, value: &BigUint, width: usize) -> Option<Vec<u8>> {
        if value.is_zero() {
            return Some(vec![0u8; width]);
        }
        let raw = value.to_bytes_be();
        if raw.len() > width {
            return None;
        }
        let mut out = vec![0u8; width];
        out[width - raw.len()..].copy_from_slice(&raw);
        Some(out)
    }

    fn from_str_radix(&self, digits: &str, radix: u32) -> Option<BigUint> {
        BigUint::parse_bytes(digits.trim().as_bytes(), radix)
    }

    fn from_u64(&self, value: u64) -> BigUint {
        BigUint::from(value)
    }

    fn mod_pow(&self, base: &BigUint, exponent: &BigUint, modulus: &BigUint) -> BigUint {
        base.modpow(exponent, modulus)
    }

    fn mod_mul(&self, a: &BigUint, b: &BigUint, modulus: &BigUint) -> BigUint {
        (a * b) % modulus
    }

    fn mod_inverse(&self, value: &BigUint, modulus: &BigUint) -> Option<BigUint> {
        let reduced = value % modulus;
        if reduced.is_zero() {
            return None;
        }
        // Fermat: a^(p-2) = a^-1 mod p for prime p
        let exponent = modulus - BigUint::from(2u32);
        let inverse = reduced.modpow(&exponent, modulus);
        if (&inverse * &reduced) % modulus == BigUint::one() {
            Some(inverse)
        } else {
            None
        }
    }

    fn is_zero(&self, value: &BigUint) -> bool {
        value.is_zero()
    }

    fn bits(&self, value: &BigUint) -> u64 {
        value.bits()
    }

    fn wipe(value: &mut BigUint) {
        // assign_from_slice reuses the existing digit buffer, so writing
        // as many zero digits as the value holds overwrites it in place.
        let digits = value.bits().div_ceil(32) as usize;
        value.assign_from_slice(&vec![0u32; digits]);
        value.set_zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_encoding() {
        let arith = BigUintArithmetic;
        let value = arith.from_u64(0x0102);

        assert_eq!(arith.to_bytes_be_padded(&value, 4), Some(vec![0, 0, 1, 2]));
        assert_eq!(arith.to_bytes_be_padded(&value, 2), Some(vec![1, 2]));
        assert_eq!(arith.to_bytes_be_padded(&value, 1), None);
        assert_eq!(
            arith.to_bytes_be_padded(&arith.from_u64(0), 3),
            Some(vec![0, 0, 0])
        );
    }

    #[test]
    fn test_mod_inverse() {
        let arith = BigUintArithmetic;
        let p = arith.from_u64(1_000_000_007);
        let a = arith.from_u64(123_456_789);

        let inv = arith.mod_inverse(&a, &p).unwrap();
        assert_eq!(arith.mod_mul(&a, &inv, &p), arith.from_u64(1));

        assert!(arith.mod_inverse(&arith.from_u64(0), &p).is_none());
        assert!(arith.mod_inverse(&p, &p).is_none());
    }

    #[test]
    fn test_mod_pow_small() {
        let arith = BigUintArithmetic;
        let p = arith.from_u64(23);
        // 5^6 = 15625 = 8 mod 23
        let r = arith.mod_pow(&arith.from_u64(5), &arith.from_u64(6), &p);
        assert_eq!(r, arith.from_u64(8));
    }

    #[test]
    fn test_from_str_radix() {
        let arith = BigUintArithmetic;
        assert_eq!(arith.from_str_radix("ff", 16), Some(arith.from_u64(255)));
        assert_eq!(
            arith.from_str_radix(" 1000 ", 10),
            Some(arith.from_u64(1000))
        );
        assert_eq!(arith.from_str_radix("12z", 10), None);
    }

    #[test]
    fn test_wipe_clears_value() {
        let arith = BigUintArithmetic;
        let mut value = arith
            .from_str_radix("deadbeefdeadbeefdeadbeefdeadbeef", 16)
            .unwrap();
        BigUintArithmetic::wipe(&mut value);
        assert!(arith.is_zero(&value));
    }
}
