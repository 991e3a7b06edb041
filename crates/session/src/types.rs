//! Session type definitions.

use ringkey_crypto::RingPosition;
use ringkey_types::SessionId;

use crate::participant::SessionError;

/// Session configuration for one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Session this participant takes part in
    pub session_id: SessionId,
    /// Total number of participants in the ring
    pub participants: u32,
    /// This participant's ring position (0-based)
    pub index: u32,
}

impl SessionConfig {
    pub fn new(session_id: SessionId, participants: u32, index: u32) -> Result<Self, SessionError> {
        if participants < 2 {
            return Err(SessionError::InvalidConfig(format!(
                "a ring needs at least 2 participants, got {}",
                participants
            )));
        }
        if index >= participants {
            return Err(SessionError::InvalidParticipantIndex(index));
        }
        Ok(Self {
            session_id,
            participants,
            index,
        })
    }

    pub fn position(&self) -> Result<RingPosition, SessionError> {
        Ok(RingPosition::new(self.index as usize, self.participants as usize)?)
    }
}

/// Where a participant stands in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No secret drawn yet
    Created,
    /// Commitment published, waiting for the full commitment set
    Committed,
    /// Broadcast value published, waiting for the full broadcast set
    Broadcast,
    /// Session key derived, secret material discarded
    Finished,
    /// Session abandoned, secret material discarded
    Aborted,
}

/// Output of a completed session.
#[derive(Debug, Clone)]
pub struct SessionOutput<K> {
    pub session_id: SessionId,
    /// Key derived from the shared secret
    pub session_key: K,
    /// SHA-256 over the session id, parameters and every public value, in
    /// ring order. Equal on every participant that saw the same messages.
    pub transcript_hash: [u8; 32],
}
