//! Core type definitions for ringkey group key agreement.
//!
//! This crate provides the public data structures exchanged between
//! participants of a Burmester-Desmedt session: encoded group elements,
//! session identifiers and the two round messages. Nothing in here is
//! secret; secret exponents and shared secrets never leave `ringkey-crypto`.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};

// =========================
// ENCODED VALUES
// =========================

/// Group element modulo the session prime, fixed-width big-endian.
///
/// The width is the byte length of the modulus, so the same integer always
/// has the same encoding on every participant.
#[serde_as]
#[derive(Clone, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct GroupElement(#[serde_as(as = "Hex")] pub Vec<u8>);

impl GroupElement {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for GroupElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 bytes only
        let shown = &self.0[..self.0.len().min(8)];
        write!(
            f,
            "GroupElement({}.., {} bytes)",
            hex::encode(shown),
            self.0.len()
        )
    }
}

/// Identifier of one key agreement session (32 bytes).
#[serde_as]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize,
    Deserialize,
)]
pub struct SessionId(#[serde_as(as = "Hex")] pub [u8; 32]);

impl SessionId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// SHA-256 fingerprint of the group parameters a message was produced under.
#[serde_as]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize,
    Deserialize,
)]
pub struct ParamsFingerprint(#[serde_as(as = "Hex")] pub [u8; 32]);

// =========================
// ROUND MESSAGES
// =========================

/// Round 1 message: a participant's commitment z_i = g^{r_i} mod p.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CommitmentMessage {
    pub session_id: SessionId,
    /// Sender's position in the ring (0-based)
    pub sender: u32,
    /// Parameters the commitment was computed under
    pub params_fingerprint: ParamsFingerprint,
    pub commitment: GroupElement,
}

/// Round 2 message: a participant's broadcast value x_i = (z_{i+1} / z_{i-1})^{r_i} mod p.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub session_id: SessionId,
    /// Sender's position in the ring (0-based)
    pub sender: u32,
    pub value: GroupElement,
}

/// Either round message, as carried by a transport.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum RoundMessage {
    Commitment(CommitmentMessage),
    Broadcast(BroadcastMessage),
}

impl RoundMessage {
    pub fn session_id(&self) -> SessionId {
        match self {
            RoundMessage::Commitment(m) => m.session_id,
            RoundMessage::Broadcast(m) => m.session_id,
        }
    }

    pub fn sender(&self) -> u32 {
        match self {
            RoundMessage::Commitment(m) => m.sender,
            RoundMessage::Broadcast(m) => m.sender,
        }
    }
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Derive a session identifier from a caller-chosen label and the ring size.
pub fn compute_session_id(label: &[u8], participants: u32) -> SessionId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"RINGKEY_SESSION_V1:");
    hasher.update(participants.to_be_bytes());
    hasher.update((label.len() as u64).to_be_bytes());
    hasher.update(label);
    SessionId(hasher.finalize().into())
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_session_id() {
        let id1 = compute_session_id(b"standup", 3);
        let id2 = compute_session_id(b"standup", 4);
        let id3 = compute_session_id(b"retro", 3);

        assert_ne!(id1, id2);
        assert_ne!(id1, id3);
        assert_eq!(id1, compute_session_id(b"standup", 3));
    }

    #[test]
    fn test_commitment_message_borsh() {
        let msg = CommitmentMessage {
            session_id: compute_session_id(b"borsh", 2),
            sender: 1,
            params_fingerprint: ParamsFingerprint([7u8; 32]),
            commitment: GroupElement(vec![42u8; 384]),
        };
        let encoded = borsh::to_vec(&msg).unwrap();
        let decoded: CommitmentMessage = borsh::from_slice(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_group_element_json_is_hex() {
        let element = GroupElement(vec![0x00, 0xab, 0xff]);
        let json = serde_json::to_string(&element).unwrap();
        assert_eq!(json, "\"00abff\"");

        let back: GroupElement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, element);
    }

    #[test]
    fn test_group_element_debug_is_truncated() {
        let element = GroupElement((1..=10).collect());
        assert_eq!(
            format!("{:?}", element),
            "GroupElement(0102030405060708.., 10 bytes)"
        );
    }

    #[test]
    fn test_round_message_accessors() {
        let session_id = compute_session_id(b"accessors", 3);
        let msg = RoundMessage::Broadcast(BroadcastMessage {
            session_id,
            sender: 2,
            value: GroupElement(vec![1]),
        });
        assert_eq!(msg.session_id(), session_id);
        assert_eq!(msg.sender(), 2);
    }
}
