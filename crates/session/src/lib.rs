//! Participant state machine for a Burmester-Desmedt session.
//!
//! A [`Participant`] owns one secret exponent and walks through the
//! protocol in order:
//!
//! 1. `round1` draws the secret and emits a commitment message
//! 2. `process_commitment` collects every peer's commitment
//! 3. `round2` emits the broadcast value once all commitments are in
//! 4. `process_broadcast` collects every peer's broadcast value
//! 5. `finalize` computes the shared secret and derives the session key
//!
//! The secret exponent and the shared secret are dropped, and wiped, when
//! the session finishes or is aborted.

pub mod participant;
pub mod types;

pub use participant::{Participant, SessionError};
pub use types::{Phase, SessionConfig, SessionOutput};
