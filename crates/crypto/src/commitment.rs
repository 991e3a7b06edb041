//! Round 1: per-participant commitments z_i = g^{r_i} mod p.

use ringkey_types::GroupElement;

use crate::arith::{Arithmetic, BigUintArithmetic};
use crate::error::CryptoError;
use crate::params::GroupParameters;
use crate::secret::SecretExponent;

/// A participant's public commitment z_i.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commitment<A: Arithmetic = BigUintArithmetic> {
    pub(crate) value: A::Int,
}

impl<A: Arithmetic> Commitment<A> {
    /// Decode a received commitment, rejecting values outside `[1, p)`.
    pub fn from_element(
        params: &GroupParameters<A>,
        element: &GroupElement,
    ) -> Result<Self, CryptoError> {
        let value = params.decode(element.as_bytes())?;
        Ok(Self { value })
    }

    pub fn to_element(&self, params: &GroupParameters<A>) -> Result<GroupElement, CryptoError> {
        Ok(GroupElement(params.encode(&self.value)?))
    }

    pub fn value(&self) -> &A::Int {
        &self.value
    }
}

/// Compute z = g^r mod p.
pub fn compute_commitment<A: Arithmetic>(
    r: &SecretExponent<A>,
    params: &GroupParameters<A>,
) -> Commitment<A> {
    let value = params
        .arith()
        .mod_pow(params.generator(), r.value(), params.modulus());
    Commitment { value }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commitment_is_deterministic() {
        let params = GroupParameters::default();
        let r = SecretExponent::from_decimal(&params, "987654321987654321").unwrap();

        let z1 = compute_commitment(&r, &params);
        let z2 = compute_commitment(&r, &params);
        assert_eq!(z1, z2);
    }

    #[test]
    fn test_small_exponent() {
        let params = GroupParameters::default();
        let r = SecretExponent::from_decimal(&params, "10").unwrap();

        // 2^10, well below the modulus
        let z = compute_commitment(&r, &params);
        assert_eq!(z.value(), &params.arith().from_u64(1024));
    }

    #[test]
    fn test_element_round_trip_is_fixed_width() {
        let params = GroupParameters::default();
        let r = SecretExponent::from_decimal(&params, "3").unwrap();
        let z = compute_commitment(&r, &params);

        let element = z.to_element(&params).unwrap();
        assert_eq!(element.len(), 384);
        assert_eq!(element.as_bytes()[383], 8);
        assert_eq!(Commitment::from_element(&params, &element).unwrap(), z);
    }

    #[test]
    fn test_rejects_zero_and_oversized() {
        let params = GroupParameters::default();

        let zero = GroupElement(vec![0u8; 384]);
        assert!(matches!(
            Commitment::from_element(&params, &zero),
            Err(CryptoError::ElementOutOfRange)
        ));

        let max = GroupElement(vec![0xff; 384]);
        assert!(matches!(
            Commitment::from_element(&params, &max),
            Err(CryptoError::ElementOutOfRange)
        ));

        let short = GroupElement(vec![1u8; 12]);
        assert!(matches!(
            Commitment::from_element(&params, &short),
            Err(CryptoError::InvalidEncoding { .. })
        ));
    }
}
