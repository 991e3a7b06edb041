//! Burmester-Desmedt group key agreement over a MODP group.
//!
//! n participants arranged in a fixed ring agree on one secret without
//! ever sending it. All values that cross the wire are public.
//!
//! # Overview
//!
//! 1. **Secret**: each participant draws a fresh exponent r_i
//!    ([`generate_secret_exponent`]).
//!
//! 2. **Round 1**: each participant publishes z_i = g^{r_i} mod p
//!    ([`compute_commitment`]).
//!
//! 3. **Round 2**: with every z in hand, each participant publishes
//!    x_i = (z_{i+1} / z_{i-1})^{r_i} mod p ([`compute_broadcast_value`]).
//!
//! 4. **Combination**: with every x in hand, each participant locally
//!    computes K = z_{i-1}^{n·r_i} · x_i^{n-1} · x_{i+1}^{n-2} ··· x_{i+n-2}
//!    ([`compute_shared_secret`]). All honest participants get the same K.
//!
//! 5. **Session key**: K's fixed-width encoding goes through PBKDF2 into an
//!    AES-128-CTR key ([`derive_session_key`]).
//!
//! # Security
//!
//! The protocol is secure against passive eavesdroppers only. Nothing here
//! authenticates which participant produced which value; a transport that
//! lets an active attacker substitute commitments or broadcast values
//! breaks the agreement. That is a property of the base protocol.

pub mod aggregate;
pub mod arith;
pub mod commitment;
pub mod error;
pub mod kdf;
pub mod params;
pub mod ring;
pub mod secret;
pub mod symmetric;

pub use aggregate::{compute_shared_secret, SharedSecret};
pub use arith::{Arithmetic, BigUintArithmetic};
pub use commitment::{compute_commitment, Commitment};
pub use error::CryptoError;
pub use kdf::derive_session_key;
pub use params::GroupParameters;
pub use ring::{compute_broadcast_value, BroadcastValue, RingPosition};
pub use secret::{generate_secret_exponent, SecretExponent};
pub use symmetric::{AesCtrCipher, KdfParams, SessionKey, SymmetricCapability};
