//! Round 2: ring-combined broadcast values.
//!
//! Participant i combines its secret with the commitments of its two ring
//! neighbours:
//!
//! x_i = (z_{i+1} · z_{i-1}^{-1})^{r_i} mod p
//!
//! With two participants both neighbours are the same peer and every x_i
//! is 1. That is expected; the shared secret then reduces to plain
//! Diffie-Hellman.

use ringkey_types::GroupElement;

use crate::arith::{Arithmetic, BigUintArithmetic};
use crate::commitment::Commitment;
use crate::error::CryptoError;
use crate::params::GroupParameters;
use crate::secret::SecretExponent;

/// Position of a participant in the agreed ring ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RingPosition {
    index: usize,
    size: usize,
}

impl RingPosition {
    /// A ring needs at least two members and `index < size`.
    pub fn new(index: usize, size: usize) -> Result<Self, CryptoError> {
        if size < 2 || index >= size {
            return Err(CryptoError::InvalidRingPosition { index, size });
        }
        Ok(Self { index, size })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the participant before this one, (i - 1) mod n.
    pub fn previous(&self) -> usize {
        (self.index + self.size - 1) % self.size
    }

    /// Index of the participant after this one, (i + 1) mod n.
    pub fn next(&self) -> usize {
        (self.index + 1) % self.size
    }
}

/// A participant's public broadcast value x_i.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastValue<A: Arithmetic = BigUintArithmetic> {
    pub(crate) value: A::Int,
}

impl<A: Arithmetic> BroadcastValue<A> {
    /// Decode a received broadcast value, rejecting values outside `[1, p)`.
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

    /// Whether this is the multiplicative identity.
    pub fn is_identity(&self, params: &GroupParameters<A>) -> bool {
        self.value == params.arith().from_u64(1)
    }
}

/// Compute x = (z_next · z_prev^{-1})^r mod p.
///
/// `z_prev` belongs to the participant at (i - 1) mod n and `z_next` to the
/// one at (i + 1) mod n. A `z_prev` congruent to zero has no inverse and is
/// reported as [`CryptoError::NonInvertibleElement`].
pub fn compute_broadcast_value<A: Arithmetic>(
    r: &SecretExponent<A>,
    z_prev: &Commitment<A>,
    z_next: &Commitment<A>,
    params: &GroupParameters<A>,
) -> Result<BroadcastValue<A>, CryptoError> {
    let arith = params.arith();
    let p = params.modulus();

    let prev_inverse = arith
        .mod_inverse(&z_prev.value, p)
        .ok_or(CryptoError::NonInvertibleElement)?;
    params.check_element(&z_next.value)?;

    let ratio = arith.mod_mul(&z_next.value, &prev_inverse, p);
    let value = arith.mod_pow(&ratio, r.value(), p);

    Ok(BroadcastValue { value })
}
