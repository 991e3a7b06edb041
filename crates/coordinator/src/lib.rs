//! Round message coordinator
//!
//! This module sits on the transport side of a key agreement. It:
//! 1. Collects round 1 commitments from every participant of a session
//! 2. Hands out the ring-ordered commitment set once it is complete
//! 3. Does the same for round 2 broadcast values
//!
//! The coordinator only ever sees public values and performs no networking.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use ringkey_types::{
    BroadcastMessage, CommitmentMessage, ParamsFingerprint, RoundMessage, SessionId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during round coordination.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Unknown session {0}")]
    UnknownSession(SessionId),

    #[error("Session {0} already open")]
    SessionExists(SessionId),

    #[error("Invalid session size {0}, need at least 2 participants")]
    InvalidSize(u32),

    #[error("Invalid sender {sender} for a session of {participants}")]
    InvalidSender { sender: u32, participants: u32 },

    #[error("Duplicate {round} message from participant {sender}")]
    DuplicateMessage { round: Round, sender: u32 },

    #[error("Participant {0} used different group parameters")]
    ParameterMismatch(u32),

    #[error("{round} round incomplete: have {have}, need {need}")]
    RoundIncomplete {
        round: Round,
        have: usize,
        need: usize,
    },
}

/// The two message rounds of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    Commitment,
    Broadcast,
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Round::Commitment => f.write_str("commitment"),
            Round::Broadcast => f.write_str("broadcast"),
        }
    }
}

/// Progress of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    /// Still waiting for messages
    Collecting { have: usize, need: usize },
    /// One message from every participant
    Complete,
}

/// A single session being coordinated.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: SessionId,
    /// Number of participants in the ring
    pub participants: u32,
    /// Fingerprint of the first commitment, all others must match it
    pub params_fingerprint: Option<ParamsFingerprint>,
    /// Collected commitments (sender -> message)
    pub commitments: BTreeMap<u32, CommitmentMessage>,
    /// Collected broadcast values (sender -> message)
    pub broadcasts: BTreeMap<u32, BroadcastMessage>,
}

impl SessionRecord {
    fn new(session_id: SessionId, participants: u32) -> Self {
        Self {
            session_id,
            participants,
            params_fingerprint: None,
            commitments: BTreeMap::new(),
            broadcasts: BTreeMap::new(),
        }
    }

    /// State of the given round.
    pub fn round_state(&self, round: Round) -> RoundState {
        let have = match round {
            Round::Commitment => self.commitments.len(),
            Round::Broadcast => self.broadcasts.len(),
        };
        let need = self.participants as usize;
        if have >= need {
            RoundState::Complete
        } else {
            RoundState::Collecting { have, need }
        }
    }

    fn check_sender(&self, sender: u32) -> Result<(), CoordinatorError> {
        if sender >= self.participants {
            return Err(CoordinatorError::InvalidSender {
                sender,
                participants: self.participants,
            });
        }
        Ok(())
    }
}

/// Collector of round messages for many concurrent sessions.
#[derive(Debug, Default)]
pub struct SessionCoordinator {
    sessions: HashMap<SessionId, SessionRecord>,
}

impl SessionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting messages for a session of `participants` members.
    pub fn open_session(
        &mut self,
        session_id: SessionId,
        participants: u32,
    ) -> Result<(), CoordinatorError> {
        if participants < 2 {
            return Err(CoordinatorError::InvalidSize(participants));
        }
        if self.sessions.contains_key(&session_id) {
            return Err(CoordinatorError::SessionExists(session_id));
        }

        info!(session_id = %session_id, participants, "Opened session");
        let record = SessionRecord::new(session_id, participants);
        self.sessions.insert(session_id, record);
        Ok(())
    }

    /// Submit a round 1 commitment.
    pub fn submit_commitment(
        &mut self,
        msg: CommitmentMessage,
    ) -> Result<RoundState, CoordinatorError> {
        let session_id = msg.session_id;
        let sender = msg.sender;
        let record = self.record_mut(&session_id)?;
        record.check_sender(sender)?;

        if record.commitments.contains_key(&sender) {
            warn!(session_id = %session_id, sender, "Duplicate commitment");
            return Err(CoordinatorError::DuplicateMessage {
                round: Round::Commitment,
                sender,
            });
        }

        match record.params_fingerprint {
            Some(expected) if expected != msg.params_fingerprint => {
                warn!(
                    session_id = %session_id,
                    sender,
                    "Commitment under different group parameters"
                );
                return Err(CoordinatorError::ParameterMismatch(sender));
            }
            Some(_) => {}
            None => record.params_fingerprint = Some(msg.params_fingerprint),
        }

        record.commitments.insert(sender, msg);
        let state = record.round_state(Round::Commitment);

        debug!(
            session_id = %session_id,
            sender,
            collected = record.commitments.len(),
            needed = record.participants,
            "Accepted commitment"
        );
        if state == RoundState::Complete {
            info!(session_id = %session_id, "Commitment set complete");
        }

        Ok(state)
    }

    /// Submit a round 2 broadcast value.
    ///
    /// Only accepted once the commitment set of the session is complete.
    pub fn submit_broadcast(
        &mut self,
        msg: BroadcastMessage,
    ) -> Result<RoundState, CoordinatorError> {
        let session_id = msg.session_id;
        let sender = msg.sender;
        let record = self.record_mut(&session_id)?;
        record.check_sender(sender)?;

        if let RoundState::Collecting { have, need } = record.round_state(Round::Commitment) {
            warn!(session_id = %session_id, sender, "Broadcast value before commitment set");
            return Err(CoordinatorError::RoundIncomplete {
                round: Round::Commitment,
                have,
                need,
            });
        }

        if record.broadcasts.contains_key(&sender) {
            warn!(session_id = %session_id, sender, "Duplicate broadcast value");
            return Err(CoordinatorError::DuplicateMessage {
                round: Round::Broadcast,
                sender,
            });
        }

        record.broadcasts.insert(sender, msg);
        let state = record.round_state(Round::Broadcast);

        debug!(
            session_id = %session_id,
            sender,
            collected = record.broadcasts.len(),
            needed = record.participants,
            "Accepted broadcast value"
        );
        if state == RoundState::Complete {
            info!(session_id = %session_id, "Broadcast set complete");
        }

        Ok(state)
    }

    /// Submit either round's message.
    pub fn submit(&mut self, msg: RoundMessage) -> Result<RoundState, CoordinatorError> {
        match msg {
            RoundMessage::Commitment(m) => self.submit_commitment(m),
            RoundMessage::Broadcast(m) => self.submit_broadcast(m),
        }
    }

    /// The full commitment set in ring order.
    pub fn commitment_set(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<CommitmentMessage>, CoordinatorError> {
        let record = self.record(session_id)?;
        complete_set(record, Round::Commitment, &record.commitments)
    }

    /// The full broadcast set in ring order.
    pub fn broadcast_set(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<BroadcastMessage>, CoordinatorError> {
        let record = self.record(session_id)?;
        complete_set(record, Round::Broadcast, &record.broadcasts)
    }

    /// Get the state of one round of a session.
    pub fn round_state(&self, session_id: &SessionId, round: Round) -> Option<RoundState> {
        self.sessions.get(session_id).map(|r| r.round_state(round))
    }

    /// Sessions whose broadcast round is not yet complete.
    pub fn pending_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|r| r.round_state(Round::Broadcast) != RoundState::Complete)
            .map(|r| r.session_id)
            .collect()
    }

    /// Stop tracking a session.
    pub fn close_session(&mut self, session_id: &SessionId) -> Option<SessionRecord> {
        let record = self.sessions.remove(session_id);
        if record.is_some() {
            info!(session_id = %session_id, "Closed session");
        }
        record
    }

    fn record(&self, session_id: &SessionId) -> Result<&SessionRecord, CoordinatorError> {
        self.sessions
            .get(session_id)
            .ok_or(CoordinatorError::UnknownSession(*session_id))
    }

    fn record_mut(
        &mut self,
        session_id: &SessionId,
    ) -> Result<&mut SessionRecord, CoordinatorError> {
        self.sessions
            .get_mut(session_id)
            .ok_or(CoordinatorError::UnknownSession(*session_id))
    }
}

fn complete_set<T: Clone>(
    record: &SessionRecord,
    round: Round,
    messages: &BTreeMap<u32, T>,
) -> Result<Vec<T>, CoordinatorError> {
    match record.round_state(round) {
        // BTreeMap iterates in sender order, which is ring order
        RoundState::Complete => Ok(messages.values().cloned().collect()),
        RoundState::Collecting { have, need } => {
            Err(CoordinatorError::RoundIncomplete { round, have, need })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringkey_types::{compute_session_id, GroupElement};

    fn commitment(session_id: SessionId, sender: u32) -> CommitmentMessage {
        CommitmentMessage {
            session_id,
            sender,
            params_fingerprint: ParamsFingerprint([7u8; 32]),
            commitment: GroupElement(vec![sender as u8 + 1; 4]),
        }
    }

    fn broadcast(session_id: SessionId, sender: u32) -> BroadcastMessage {
        BroadcastMessage {
            session_id,
            sender,
            value: GroupElement(vec![sender as u8 + 10; 4]),
        }
    }

    #[test]
    fn test_coordinator_creation() {
        let coordinator = SessionCoordinator::new();
        assert!(coordinator.pending_sessions().is_empty());
    }

    #[test]
    fn test_open_session() {
        let mut coordinator = SessionCoordinator::new();
        let id = compute_session_id(b"open", 3);

        coordinator.open_session(id, 3).unwrap();
        assert_eq!(coordinator.pending_sessions(), vec![id]);
        assert_eq!(
            coordinator.round_state(&id, Round::Commitment),
            Some(RoundState::Collecting { have: 0, need: 3 })
        );

        assert_eq!(
            coordinator.open_session(id, 3),
            Err(CoordinatorError::SessionExists(id))
        );
        assert_eq!(
            coordinator.open_session(compute_session_id(b"solo", 1), 1),
            Err(CoordinatorError::InvalidSize(1))
        );
    }

    #[test]
    fn test_commitment_round_completes() {
        let mut coordinator = SessionCoordinator::new();
        let id = compute_session_id(b"rounds", 3);
        coordinator.open_session(id, 3).unwrap();

        // Out of order arrival
        assert_eq!(
            coordinator.submit_commitment(commitment(id, 2)).unwrap(),
            RoundState::Collecting { have: 1, need: 3 }
        );
        assert_eq!(
            coordinator.submit_commitment(commitment(id, 0)).unwrap(),
            RoundState::Collecting { have: 2, need: 3 }
        );
        assert!(matches!(
            coordinator.commitment_set(&id),
            Err(CoordinatorError::RoundIncomplete { have: 2, need: 3, .. })
        ));
        assert_eq!(
            coordinator.submit_commitment(commitment(id, 1)).unwrap(),
            RoundState::Complete
        );

        let set = coordinator.commitment_set(&id).unwrap();
        let senders: Vec<u32> = set.iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![0, 1, 2]);
    }

    #[test]
    fn test_broadcast_round_and_close() {
        let mut coordinator = SessionCoordinator::new();
        let id = compute_session_id(b"close", 2);
        coordinator.open_session(id, 2).unwrap();
        coordinator.submit_commitment(commitment(id, 0)).unwrap();
        coordinator.submit_commitment(commitment(id, 1)).unwrap();

        coordinator
            .submit(RoundMessage::Broadcast(broadcast(id, 1)))
            .unwrap();
        assert_eq!(
            coordinator
                .submit(RoundMessage::Broadcast(broadcast(id, 0)))
                .unwrap(),
            RoundState::Complete
        );
        assert!(coordinator.pending_sessions().is_empty());
        assert_eq!(coordinator.broadcast_set(&id).unwrap()[0].sender, 0);

        assert!(coordinator.close_session(&id).is_some());
        assert!(coordinator.close_session(&id).is_none());
        assert_eq!(
            coordinator.broadcast_set(&id),
            Err(CoordinatorError::UnknownSession(id))
        );
    }

    #[test]
    fn test_broadcast_waits_for_commitment_set() {
        let mut coordinator = SessionCoordinator::new();
        let id = compute_session_id(b"early", 3);
        coordinator.open_session(id, 3).unwrap();

        assert_eq!(
            coordinator.submit_broadcast(broadcast(id, 0)),
            Err(CoordinatorError::RoundIncomplete {
                round: Round::Commitment,
                have: 0,
                need: 3
            })
        );

        coordinator.submit_commitment(commitment(id, 0)).unwrap();
        coordinator.submit_commitment(commitment(id, 1)).unwrap();
        assert_eq!(
            coordinator.submit_broadcast(broadcast(id, 0)),
            Err(CoordinatorError::RoundIncomplete {
                round: Round::Commitment,
                have: 2,
                need: 3
            })
        );
        assert_eq!(
            coordinator.round_state(&id, Round::Broadcast),
            Some(RoundState::Collecting { have: 0, need: 3 })
        );

        coordinator.submit_commitment(commitment(id, 2)).unwrap();
        assert_eq!(
            coordinator.submit_broadcast(broadcast(id, 0)).unwrap(),
            RoundState::Collecting { have: 1, need: 3 }
        );
    }

    #[test]
    fn test_rejects_bad_messages() {
        let mut coordinator = SessionCoordinator::new();
        let id = compute_session_id(b"reject", 2);
        coordinator.open_session(id, 2).unwrap();

        let unknown = compute_session_id(b"nobody", 2);
        assert_eq!(
            coordinator.submit_commitment(commitment(unknown, 0)),
            Err(CoordinatorError::UnknownSession(unknown))
        );

        assert_eq!(
            coordinator.submit_commitment(commitment(id, 5)),
            Err(CoordinatorError::InvalidSender {
                sender: 5,
                participants: 2
            })
        );

        coordinator.submit_commitment(commitment(id, 0)).unwrap();
        assert_eq!(
            coordinator.submit_commitment(commitment(id, 0)),
            Err(CoordinatorError::DuplicateMessage {
                round: Round::Commitment,
                sender: 0
            })
        );

        let mut other_params = commitment(id, 1);
        other_params.params_fingerprint = ParamsFingerprint([8u8; 32]);
        assert_eq!(
            coordinator.submit_commitment(other_params),
            Err(CoordinatorError::ParameterMismatch(1))
        );
    }
}
