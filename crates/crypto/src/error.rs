//! Error types for key agreement operations.

use thiserror::Error;

/// Errors that can occur during key agreement and session key operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    // Parameter errors: the session cannot proceed.
    #[error("Invalid group parameters: {0}")]
    InvalidParameters(String),

    #[error("Group parameter mismatch between participants")]
    ParameterMismatch,

    // Integrity errors: reject the session.
    #[error("Group element is not invertible modulo the group prime")]
    NonInvertibleElement,

    #[error("Group element outside [1, p)")]
    ElementOutOfRange,

    #[error("Invalid element encoding: expected {expected} bytes, got {got}")]
    InvalidEncoding { expected: usize, got: usize },

    #[error("Length mismatch: expected {expected} values, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Own broadcast value not found at ring position {0}")]
    BroadcastValueMismatch(usize),

    #[error("Invalid ring position {index} in a ring of {size}")]
    InvalidRingPosition { index: usize, size: usize },

    #[error("Invalid secret exponent")]
    InvalidSecretExponent,

    // Entropy errors: fatal, no retry.
    #[error("Random source unavailable: {0}")]
    EntropyUnavailable(String),

    // External capability errors, passed through unchanged.
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key is not extractable")]
    KeyNotExtractable,
}

impl CryptoError {
    /// Whether the error means the group parameters themselves are unusable.
    pub fn is_parameter_error(&self) -> bool {
        matches!(self, Self::InvalidParameters(_) | Self::ParameterMismatch)
    }

    /// Whether the error points at a malformed or forged value from a peer.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            Self::NonInvertibleElement
                | Self::ElementOutOfRange
                | Self::InvalidEncoding { .. }
                | Self::LengthMismatch { .. }
                | Self::BroadcastValueMismatch(_)
        )
    }
}
