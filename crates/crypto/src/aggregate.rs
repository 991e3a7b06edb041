//! Round 3: local Burmester-Desmedt combination.
//!
//! For the participant at ring index i of n:
//!
//! K = z_{i-1}^{n·r_i} · Π_{j=1}^{n-1} x_{(i+j-1) mod n}^{n-j}  (mod p)
//!
//! Every honest participant that saw the same commitments and broadcast
//! values arrives at the same K, which equals g^{r_0 r_1 + r_1 r_2 + ... + r_{n-1} r_0}.

use std::fmt;

use zeroize::Zeroizing;

use crate::arith::{Arithmetic, BigUintArithmetic};
use crate::commitment::Commitment;
use crate::error::CryptoError;
use crate::params::GroupParameters;
use crate::ring::{BroadcastValue, RingPosition};
use crate::secret::SecretExponent;
use crate::symmetric::SymmetricCapability;

/// The agreed group secret K, with its canonical fixed-width encoding.
pub struct SharedSecret<A: Arithmetic = BigUintArithmetic> {
    value: A::Int,
    bytes: Zeroizing<Vec<u8>>,
}

impl<A: Arithmetic> SharedSecret<A> {
    pub fn value(&self) -> &A::Int {
        &self.value
    }

    /// Big-endian encoding, as wide as the modulus.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Derive the session key from this secret.
    pub fn derive_session_key<C: SymmetricCapability>(
        &self,
        capability: &C,
    ) -> Result<C::Key, CryptoError> {
        crate::kdf::derive_session_key(capability, &self.bytes)
    }
}

impl<A: Arithmetic> Drop for SharedSecret<A> {
    fn drop(&mut self) {
        A::wipe(&mut self.value);
    }
}

impl<A: Arithmetic> fmt::Debug for SharedSecret<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<redacted>, {} bytes)", self.bytes.len())
    }
}

/// Combine the caller's secret with the round 2 outputs into K.
///
/// `broadcast_values` must hold exactly one value per ring position, in
/// ring order, and `x_self` must sit at the caller's own position. Any other
/// shape is rejected rather than padded or truncated.
pub fn compute_shared_secret<A: Arithmetic>(
    r: &SecretExponent<A>,
    x_self: &BroadcastValue<A>,
    z_prev: &Commitment<A>,
    broadcast_values: &[BroadcastValue<A>],
    position: RingPosition,
    params: &GroupParameters<A>,
) -> Result<SharedSecret<A>, CryptoError> {
    let n = position.size();
    let i = position.index();

    if broadcast_values.len() != n {
        return Err(CryptoError::LengthMismatch {
            expected: n,
            got: broadcast_values.len(),
        });
    }
    if &broadcast_values[i] != x_self {
        return Err(CryptoError::BroadcastValueMismatch(i));
    }
    params.check_element(&z_prev.value)?;
    for x in broadcast_values {
        params.check_element(&x.value)?;
    }

    let arith = params.arith();
    let p = params.modulus();

    // z_{i-1}^{r_i} is the pairwise secret with the previous neighbour.
    let mut pairwise = arith.mod_pow(&z_prev.value, r.value(), p);
    let mut acc = arith.mod_pow(&pairwise, &arith.from_u64(n as u64), p);
    A::wipe(&mut pairwise);

    for j in 1..n {
        let x = &broadcast_values[(i + j - 1) % n];
        let term = arith.mod_pow(&x.value, &arith.from_u64((n - j) as u64), p);
        let mut previous = std::mem::replace(&mut acc, arith.from_u64(0));
        acc = arith.mod_mul(&previous, &term, p);
        A::wipe(&mut previous);
    }

    let mut secret = SharedSecret {
        value: acc,
        bytes: Zeroizing::new(Vec::new()),
    };
    secret.bytes = Zeroizing::new(params.encode(&secret.value)?);
    Ok(secret)
}
