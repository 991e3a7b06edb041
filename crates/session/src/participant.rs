//! Key agreement participant implementation.

use std::sync::Arc;

use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use ringkey_crypto::{
    compute_broadcast_value, compute_commitment, compute_shared_secret, generate_secret_exponent,
    Arithmetic, BigUintArithmetic, BroadcastValue, Commitment, CryptoError, GroupParameters,
    RingPosition, SecretExponent, SymmetricCapability,
};
use ringkey_types::{BroadcastMessage, CommitmentMessage, SessionId};

use crate::types::{Phase, SessionConfig, SessionOutput};

/// Errors during a key agreement session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Message for session {got}, expected {expected}")]
    WrongSession { expected: SessionId, got: SessionId },

    #[error("Invalid participant index {0}")]
    InvalidParticipantIndex(u32),

    #[error("Invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("Duplicate message from participant {0}")]
    DuplicateMessage(u32),

    #[error("Protocol not complete, missing participants {missing:?}")]
    ProtocolIncomplete { missing: Vec<u32> },

    #[error("Operation not allowed in phase {0:?}")]
    OutOfOrder(Phase),

    #[error("Session aborted")]
    Aborted,

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// State of one participant in one session.
pub struct Participant<A: Arithmetic = BigUintArithmetic> {
    config: SessionConfig,
    position: RingPosition,
    params: Arc<GroupParameters<A>>,
    /// Our secret exponent, present between round 1 and finalization
    secret: Option<SecretExponent<A>>,
    /// Commitments by ring position, ours included
    commitments: Vec<Option<Commitment<A>>>,
    /// Broadcast values by ring position, ours included
    broadcasts: Vec<Option<BroadcastValue<A>>>,
    phase: Phase,
}

impl<A: Arithmetic> Participant<A> {
    /// Create a new participant.
    pub fn new(
        config: SessionConfig,
        params: Arc<GroupParameters<A>>,
    ) -> Result<Self, SessionError> {
        let position = config.position()?;
        let n = position.size();
        Ok(Self {
            config,
            position,
            params,
            secret: None,
            commitments: vec![None; n],
            broadcasts: vec![None; n],
            phase: Phase::Created,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn params(&self) -> &GroupParameters<A> {
        &self.params
    }

    /// Generate round 1 message (commitment) from a fresh secret.
    pub fn round1<R: RngCore + CryptoRng>(
        &mut self,
        rng: &mut R,
    ) -> Result<CommitmentMessage, SessionError> {
        self.expect_phase(Phase::Created)?;
        let secret = generate_secret_exponent(&self.params, rng)?;
        self.round1_with_secret(secret)
    }

    /// Generate round 1 message from an injected secret.
    pub fn round1_with_secret(
        &mut self,
        secret: SecretExponent<A>,
    ) -> Result<CommitmentMessage, SessionError> {
        self.expect_phase(Phase::Created)?;

        let commitment = compute_commitment(&secret, &self.params);
        let msg = CommitmentMessage {
            session_id: self.config.session_id,
            sender: self.config.index,
            params_fingerprint: self.params.fingerprint(),
            commitment: commitment.to_element(&self.params)?,
        };

        self.commitments[self.position.index()] = Some(commitment);
        self.secret = Some(secret);
        self.phase = Phase::Committed;

        info!(
            session_id = %self.config.session_id,
            index = self.config.index,
            "Round 1 commitment ready"
        );
        Ok(msg)
    }

    /// Process a round 1 message from another participant.
    pub fn process_commitment(&mut self, msg: CommitmentMessage) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.check_envelope(msg.session_id, msg.sender)?;

        self.params
            .ensure_fingerprint(&msg.params_fingerprint)
            .map_err(|e| self.rejected(msg.sender, e))?;
        let commitment = Commitment::from_element(&self.params, &msg.commitment)
            .map_err(|e| self.rejected(msg.sender, e))?;

        let slot = &mut self.commitments[msg.sender as usize];
        match slot {
            // Redelivery, including our own message echoed back by the transport
            Some(existing) if *existing == commitment => return Ok(()),
            Some(_) => return Err(SessionError::DuplicateMessage(msg.sender)),
            None => *slot = Some(commitment),
        }

        debug!(
            session_id = %self.config.session_id,
            sender = msg.sender,
            collected = self.count(&self.commitments),
            needed = self.position.size(),
            "Accepted commitment"
        );
        Ok(())
    }

    /// Whether every participant's commitment has been received.
    pub fn commitments_complete(&self) -> bool {
        self.commitments.iter().all(Option::is_some)
    }

    /// Generate round 2 message (broadcast value).
    pub fn round2(&mut self) -> Result<BroadcastMessage, SessionError> {
        self.expect_phase(Phase::Committed)?;
        let missing = missing(&self.commitments);
        if !missing.is_empty() {
            return Err(SessionError::ProtocolIncomplete { missing });
        }

        let secret = self.secret.as_ref().ok_or(SessionError::Aborted)?;
        let z_prev = present(&self.commitments, self.position.previous())?;
        let z_next = present(&self.commitments, self.position.next())?;

        let value = compute_broadcast_value(secret, z_prev, z_next, &self.params)?;
        let msg = BroadcastMessage {
            session_id: self.config.session_id,
            sender: self.config.index,
            value: value.to_element(&self.params)?,
        };

        self.broadcasts[self.position.index()] = Some(value);
        self.phase = Phase::Broadcast;

        info!(
            session_id = %self.config.session_id,
            index = self.config.index,
            "Round 2 broadcast value ready"
        );
        Ok(msg)
    }

    /// Process a round 2 message from another participant.
    pub fn process_broadcast(&mut self, msg: BroadcastMessage) -> Result<(), SessionError> {
        self.ensure_active()?;
        self.check_envelope(msg.session_id, msg.sender)?;

        let value = BroadcastValue::from_element(&self.params, &msg.value)
            .map_err(|e| self.rejected(msg.sender, e))?;

        let slot = &mut self.broadcasts[msg.sender as usize];
        match slot {
            Some(existing) if *existing == value => return Ok(()),
            Some(_) => return Err(SessionError::DuplicateMessage(msg.sender)),
            None => *slot = Some(value),
        }

        debug!(
            session_id = %self.config.session_id,
            sender = msg.sender,
            collected = self.count(&self.broadcasts),
            needed = self.position.size(),
            "Accepted broadcast value"
        );
        Ok(())
    }

    /// Whether every participant's broadcast value has been received.
    pub fn broadcasts_complete(&self) -> bool {
        self.broadcasts.iter().all(Option::is_some)
    }

    /// Compute the shared secret and derive the session key.
    ///
    /// The secret exponent and the raw shared secret are discarded whether
    /// this succeeds or not; a failed finalization leaves the participant
    /// aborted.
    pub fn finalize<C: SymmetricCapability>(
        &mut self,
        capability: &C,
    ) -> Result<SessionOutput<C::Key>, SessionError> {
        self.expect_phase(Phase::Broadcast)?;
        let missing = missing(&self.broadcasts);
        if !missing.is_empty() {
            return Err(SessionError::ProtocolIncomplete { missing });
        }

        let secret = self.secret.take().ok_or(SessionError::Aborted)?;
        match self.combine(&secret, capability) {
            Ok(output) => {
                self.clear();
                self.phase = Phase::Finished;
                info!(
                    session_id = %self.config.session_id,
                    index = self.config.index,
                    transcript = %hex::encode(output.transcript_hash),
                    "Session key derived"
                );
                Ok(output)
            }
            Err(e) => {
                warn!(
                    session_id = %self.config.session_id,
                    index = self.config.index,
                    error = %e,
                    "Finalization failed, aborting session"
                );
                self.abort();
                Err(e)
            }
        }
    }

    /// Abandon the session and discard all secret and collected material.
    pub fn abort(&mut self) {
        if self.phase != Phase::Aborted {
            info!(
                session_id = %self.config.session_id,
                index = self.config.index,
                phase = ?self.phase,
                "Session aborted"
            );
        }
        self.secret = None;
        self.clear();
        self.phase = Phase::Aborted;
    }

    fn combine<C: SymmetricCapability>(
        &self,
        secret: &SecretExponent<A>,
        capability: &C,
    ) -> Result<SessionOutput<C::Key>, SessionError> {
        let values: Vec<BroadcastValue<A>> = self.broadcasts.iter().flatten().cloned().collect();
        let x_self = present(&self.broadcasts, self.position.index())?;
        let z_prev = present(&self.commitments, self.position.previous())?;

        let shared = compute_shared_secret(
            secret,
            x_self,
            z_prev,
            &values,
            self.position,
            &self.params,
        )?;
        let session_key = shared.derive_session_key(capability)?;

        Ok(SessionOutput {
            session_id: self.config.session_id,
            session_key,
            transcript_hash: self.transcript_hash()?,
        })
    }

    /// SHA-256 over the session id, parameter fingerprint and all public values.
    fn transcript_hash(&self) -> Result<[u8; 32], CryptoError> {
        let mut hasher = Sha256::new();
        hasher.update(b"RINGKEY_TRANSCRIPT_V1:");
        hasher.update(self.config.session_id.0);
        hasher.update(self.params.fingerprint().0);
        hasher.update(self.config.participants.to_be_bytes());
        for z in self.commitments.iter().flatten() {
            hasher.update(z.to_element(&self.params)?.as_bytes());
        }
        for x in self.broadcasts.iter().flatten() {
            hasher.update(x.to_element(&self.params)?.as_bytes());
        }
        Ok(hasher.finalize().into())
    }

    fn rejected(&self, sender: u32, error: CryptoError) -> SessionError {
        warn!(
            session_id = %self.config.session_id,
            sender,
            parameters = error.is_parameter_error(),
            integrity = error.is_integrity_error(),
            error = %error,
            "Rejected message"
        );
        error.into()
    }

    fn clear(&mut self) {
        self.commitments.iter_mut().for_each(|slot| *slot = None);
        self.broadcasts.iter_mut().for_each(|slot| *slot = None);
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), SessionError> {
        match self.phase {
            Phase::Aborted => Err(SessionError::Aborted),
            phase if phase == expected => Ok(()),
            phase => Err(SessionError::OutOfOrder(phase)),
        }
    }

    /// Messages may arrive before we reach their round, but not after the end.
    fn ensure_active(&self) -> Result<(), SessionError> {
        match self.phase {
            Phase::Aborted => Err(SessionError::Aborted),
            Phase::Finished => Err(SessionError::OutOfOrder(Phase::Finished)),
            _ => Ok(()),
        }
    }

    fn check_envelope(&self, session_id: SessionId, sender: u32) -> Result<(), SessionError> {
        if session_id != self.config.session_id {
            return Err(SessionError::WrongSession {
                expected: self.config.session_id,
                got: session_id,
            });
        }
        if sender >= self.config.participants {
            return Err(SessionError::InvalidParticipantIndex(sender));
        }
        Ok(())
    }

    fn count<T>(&self, slots: &[Option<T>]) -> usize {
        slots.iter().filter(|s| s.is_some()).count()
    }
}

fn missing<T>(slots: &[Option<T>]) -> Vec<u32> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_none())
        .map(|(i, _)| i as u32)
        .collect()
}

fn present<T>(slots: &[Option<T>], index: usize) -> Result<&T, SessionError> {
    slots[index]
        .as_ref()
        .ok_or(SessionError::ProtocolIncomplete {
            missing: vec![index as u32],
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use ringkey_crypto::AesCtrCipher;
    use ringkey_types::{compute_session_id, GroupElement};

    fn setup(n: u32) -> Vec<Participant> {
        let params = Arc::new(GroupParameters::default());
        let session_id = compute_session_id(b"unit", n);
        (0..n)
            .map(|i| {
                let config = SessionConfig::new(session_id, n, i).unwrap();
                Participant::new(config, params.clone()).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_round1() {
        let mut participants = setup(3);
        let msg = participants[1].round1(&mut OsRng).unwrap();

        assert_eq!(msg.sender, 1);
        assert_eq!(msg.commitment.len(), 384);
        assert_eq!(participants[1].phase(), Phase::Committed);
        assert!(matches!(
            participants[1].round1(&mut OsRng),
            Err(SessionError::OutOfOrder(Phase::Committed))
        ));
    }

    #[test]
    fn test_round2_requires_all_commitments() {
        let mut participants = setup(3);
        let msg0 = participants[0].round1(&mut OsRng).unwrap();
        let _ = participants[1].round1(&mut OsRng).unwrap();
        participants[1].process_commitment(msg0).unwrap();

        match participants[1].round2() {
            Err(SessionError::ProtocolIncomplete { missing }) => assert_eq!(missing, vec![2]),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_full_session() {
        let mut participants = setup(3);
        let r1: Vec<_> = participants
            .iter_mut()
            .map(|p| p.round1(&mut OsRng).unwrap())
            .collect();
        for p in participants.iter_mut() {
            for msg in &r1 {
                p.process_commitment(msg.clone()).unwrap();
            }
        }
        assert!(participants.iter().all(|p| p.commitments_complete()));

        let r2: Vec<_> = participants
            .iter_mut()
            .map(|p| p.round2().unwrap())
            .collect();
        for p in participants.iter_mut() {
            for msg in &r2 {
                p.process_broadcast(msg.clone()).unwrap();
            }
        }

        let outputs: Vec<_> = participants
            .iter_mut()
            .map(|p| p.finalize(&AesCtrCipher).unwrap())
            .collect();
        assert_eq!(outputs[0].session_key, outputs[1].session_key);
        assert_eq!(outputs[1].session_key, outputs[2].session_key);
        assert_eq!(outputs[0].transcript_hash, outputs[2].transcript_hash);
        assert!(participants.iter().all(|p| p.phase() == Phase::Finished));
    }

    #[test]
    fn test_duplicate_commitment_rejected() {
        let mut participants = setup(3);
        let msg0 = participants[0].round1(&mut OsRng).unwrap();
        participants[1].process_commitment(msg0.clone()).unwrap();

        let mut forged = msg0;
        forged.commitment = GroupElement({
            let mut bytes = vec![0u8; 384];
            bytes[383] = 5;
            bytes
        });
        assert!(matches!(
            participants[1].process_commitment(forged),
            Err(SessionError::DuplicateMessage(0))
        ));
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut participants = setup(2);
        let msg = participants[0].round1(&mut OsRng).unwrap();
        assert!(participants[0].process_commitment(msg).is_ok());
    }

    #[test]
    fn test_wrong_session_and_sender_rejected() {
        let mut participants = setup(3);
        let mut msg = participants[0].round1(&mut OsRng).unwrap();

        let mut other_session = msg.clone();
        other_session.session_id = compute_session_id(b"elsewhere", 3);
        assert!(matches!(
            participants[1].process_commitment(other_session),
            Err(SessionError::WrongSession { .. })
        ));

        msg.sender = 7;
        assert!(matches!(
            participants[1].process_commitment(msg),
            Err(SessionError::InvalidParticipantIndex(7))
        ));
    }

    #[test]
    fn test_parameter_mismatch_rejected() {
        let mut participants = setup(2);
        let mut msg = participants[0].round1(&mut OsRng).unwrap();
        msg.params_fingerprint = GroupParameters::rfc3526_2048().fingerprint();

        let err = participants[1].process_commitment(msg).unwrap_err();
        assert!(matches!(err, SessionError::Crypto(CryptoError::ParameterMismatch)));
    }

    #[test]
    fn test_zero_commitment_rejected() {
        let mut participants = setup(2);
        let mut msg = participants[0].round1(&mut OsRng).unwrap();
        msg.commitment = GroupElement(vec![0u8; 384]);

        let err = participants[1].process_commitment(msg).unwrap_err();
        assert!(matches!(err, SessionError::Crypto(CryptoError::ElementOutOfRange)));
    }

    #[test]
    fn test_abort_discards_state() {
        let mut participants = setup(2);
        let msg0 = participants[0].round1(&mut OsRng).unwrap();
        let _ = participants[1].round1(&mut OsRng).unwrap();
        participants[1].process_commitment(msg0.clone()).unwrap();

        participants[1].abort();
        assert_eq!(participants[1].phase(), Phase::Aborted);
        assert!(!participants[1].commitments_complete());
        assert!(matches!(participants[1].round2(), Err(SessionError::Aborted)));
        assert!(matches!(
            participants[1].process_commitment(msg0),
            Err(SessionError::Aborted)
        ));
        assert!(matches!(
            participants[1].finalize(&AesCtrCipher),
            Err(SessionError::Aborted)
        ));
    }

    #[test]
    fn test_invalid_config() {
        let session_id = compute_session_id(b"cfg", 1);
        assert!(matches!(
            SessionConfig::new(session_id, 1, 0),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::new(session_id, 3, 3),
            Err(SessionError::InvalidParticipantIndex(3))
        ));
    }
}
