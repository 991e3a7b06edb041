//! In-process key agreement between N participants.
//!
//! Each participant runs in its own task and talks only to a transport
//! task. The transport feeds every round message into a
//! [`SessionCoordinator`] and, once a round is complete, publishes the
//! ring-ordered set to all participants over a broadcast channel.

use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use rand::rngs::{OsRng, StdRng};
use rand::{CryptoRng, RngCore, SeedableRng};
use ringkey_coordinator::{Round, RoundState, SessionCoordinator};
use ringkey_crypto::{AesCtrCipher, GroupParameters, SessionKey, SymmetricCapability};
use ringkey_session::{Participant, SessionConfig, SessionOutput};
use ringkey_types::{
    compute_session_id, BroadcastMessage, CommitmentMessage, RoundMessage, SessionId,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info};

/// Inputs of one simulated session.
#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub participants: u32,
    pub label: String,
    /// Encrypted by the first participant and decrypted by the last
    pub message: String,
    pub params: GroupParameters,
    /// Seed for reproducible secret exponents, fresh entropy when unset
    pub seed: Option<u64>,
}

/// Public outcome of a simulated session.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub session_id: SessionId,
    pub participants: u32,
    /// Fingerprint of the agreed key, never the key itself
    pub key_id: String,
    pub transcript_hash: [u8; 32],
    /// `nonce || ciphertext` of the message under the agreed key
    pub ciphertext: Vec<u8>,
    /// The message as decrypted by the last participant
    pub recovered: String,
    pub elapsed_ms: u128,
}

/// A complete round, as delivered to every participant.
#[derive(Debug, Clone)]
enum Delivery {
    Commitments(Vec<CommitmentMessage>),
    Broadcasts(Vec<BroadcastMessage>),
}

/// Outcome of one session task. Participants report their ring index and
/// output, the transport reports `None`.
type TaskResult = Result<Option<(u32, SessionOutput<SessionKey>)>>;

/// Run a full session and check that every participant derived the same key.
pub async fn run_simulation(options: SimulationOptions) -> Result<SimulationReport> {
    let started = Instant::now();
    let n = options.participants;
    let session_id = compute_session_id(options.label.as_bytes(), n);
    let params = Arc::new(options.params);

    info!(
        session_id = %session_id,
        participants = n,
        modulus_bits = params.modulus_bits(),
        "Starting simulated session"
    );

    let rngs = participant_rngs(options.seed, n)?;
    let outputs = run_session(session_id, params, rngs).await?;

    let first = &outputs[0];
    for (index, output) in outputs.iter().enumerate().skip(1) {
        if output.session_key != first.session_key {
            bail!("participant {} derived a different key", index);
        }
        if output.transcript_hash != first.transcript_hash {
            bail!("participant {} saw a different transcript", index);
        }
    }

    let last = &outputs[outputs.len() - 1];
    let message = options.message.as_bytes();
    let ciphertext = AesCtrCipher.encrypt(&first.session_key, message, &mut OsRng)?;
    let plaintext = AesCtrCipher.decrypt(&last.session_key, &ciphertext)?;
    let recovered =
        String::from_utf8(plaintext).map_err(|_| anyhow!("decrypted message is not UTF-8"))?;
    if recovered != options.message {
        bail!("message did not survive the round trip");
    }

    let report = SimulationReport {
        session_id,
        participants: n,
        key_id: first.session_key.key_id(),
        transcript_hash: first.transcript_hash,
        ciphertext,
        recovered,
        elapsed_ms: started.elapsed().as_millis(),
    };

    info!(
        session_id = %session_id,
        key_id = %report.key_id,
        elapsed_ms = report.elapsed_ms,
        "All participants agreed"
    );
    Ok(report)
}

/// One generator per participant, each drawn in turn from a single source.
///
/// The source is seeded from `seed` when set and from the OS otherwise.
fn participant_rngs(seed: Option<u64>, participants: u32) -> Result<Vec<StdRng>> {
    let mut source = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(OsRng)?,
    };

    let mut rngs = Vec::with_capacity(participants as usize);
    for _ in 0..participants {
        rngs.push(StdRng::from_rng(&mut source)?);
    }
    Ok(rngs)
}

/// Run one participant task per generator plus the transport task.
///
/// Returns the outputs in ring order. The first task to fail ends the
/// session and its error is returned.
async fn run_session<R>(
    session_id: SessionId,
    params: Arc<GroupParameters>,
    rngs: Vec<R>,
) -> Result<Vec<SessionOutput<SessionKey>>>
where
    R: RngCore + CryptoRng + Send + 'static,
{
    let n = rngs.len() as u32;
    let mut coordinator = SessionCoordinator::new();
    coordinator.open_session(session_id, n)?;

    let (outbox, inbound) = mpsc::channel::<RoundMessage>(n as usize * 2);
    let (deliveries, _) = broadcast::channel::<Delivery>(4);

    let mut tasks: JoinSet<TaskResult> = JoinSet::new();
    for (index, rng) in (0..n).zip(rngs) {
        let config = SessionConfig::new(session_id, n, index)?;
        let participant = Participant::new(config, params.clone())?;
        let outbox = outbox.clone();
        // Subscribe before anything is published
        let inbox = deliveries.subscribe();
        tasks.spawn(async move {
            let output = run_participant(participant, rng, outbox, inbox).await?;
            TaskResult::Ok(Some((index, output)))
        });
    }
    drop(outbox);

    tasks.spawn(async move {
        run_transport(coordinator, session_id, inbound, deliveries).await?;
        TaskResult::Ok(None)
    });

    let mut outputs = Vec::with_capacity(n as usize);
    // Returning early drops the set, which aborts every task still running
    while let Some(joined) = tasks.join_next().await {
        if let Some(output) = joined?? {
            outputs.push(output);
        }
    }

    outputs.sort_by_key(|(index, _)| *index);
    Ok(outputs.into_iter().map(|(_, output)| output).collect())
}

async fn run_participant<R: RngCore + CryptoRng>(
    mut participant: Participant,
    mut rng: R,
    outbox: mpsc::Sender<RoundMessage>,
    mut inbox: broadcast::Receiver<Delivery>,
) -> Result<SessionOutput<SessionKey>> {
    let index = participant.config().index;

    let commitment = participant.round1(&mut rng)?;
    outbox
        .send(RoundMessage::Commitment(commitment))
        .await
        .map_err(|_| anyhow!("transport closed"))?;

    let commitments = match inbox.recv().await? {
        Delivery::Commitments(set) => set,
        other => bail!(
            "participant {} expected commitments, got {:?}",
            index,
            other
        ),
    };
    for msg in commitments {
        participant.process_commitment(msg)?;
    }

    let value = participant.round2()?;
    outbox
        .send(RoundMessage::Broadcast(value))
        .await
        .map_err(|_| anyhow!("transport closed"))?;

    let broadcasts = match inbox.recv().await? {
        Delivery::Broadcasts(set) => set,
        other => bail!(
            "participant {} expected broadcast values, got {:?}",
            index,
            other
        ),
    };
    for msg in broadcasts {
        participant.process_broadcast(msg)?;
    }

    let output = participant.finalize(&AesCtrCipher)?;
    debug!(index, key_id = %output.session_key.key_id(), "Participant finished");
    Ok(output)
}

async fn run_transport(
    mut coordinator: SessionCoordinator,
    session_id: SessionId,
    mut inbound: mpsc::Receiver<RoundMessage>,
    deliveries: broadcast::Sender<Delivery>,
) -> Result<()> {
    while let Some(msg) = inbound.recv().await {
        let round = match msg {
            RoundMessage::Commitment(_) => Round::Commitment,
            RoundMessage::Broadcast(_) => Round::Broadcast,
        };
        if coordinator.submit(msg)? != RoundState::Complete {
            continue;
        }

        let delivery = match round {
            Round::Commitment => Delivery::Commitments(coordinator.commitment_set(&session_id)?),
            Round::Broadcast => Delivery::Broadcasts(coordinator.broadcast_set(&session_id)?),
        };
        deliveries
            .send(delivery)
            .map_err(|_| anyhow!("no participants listening"))?;

        if round == Round::Broadcast {
            coordinator.close_session(&session_id);
            return Ok(());
        }
    }
    bail!(
        "participants disconnected before session {} completed",
        session_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    /// Generator whose entropy source can be switched off.
    struct FlakyRng {
        inner: StdRng,
        offline: bool,
    }

    impl RngCore for FlakyRng {
        fn next_u32(&mut self) -> u32 {
            self.inner.next_u32()
        }

        fn next_u64(&mut self) -> u64 {
            self.inner.next_u64()
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            self.inner.fill_bytes(dest)
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            if self.offline {
                return Err(rand::Error::new("entropy source offline"));
            }
            self.inner.try_fill_bytes(dest)
        }
    }

    impl CryptoRng for FlakyRng {}

    fn options(participants: u32, seed: Option<u64>) -> SimulationOptions {
        SimulationOptions {
            participants,
            label: "test".into(),
            message: "Hello, world".into(),
            params: GroupParameters::rfc3526_2048(),
            seed,
        }
    }

    #[tokio::test]
    async fn test_simulation_agrees() {
        let report = run_simulation(options(4, None)).await.unwrap();
        assert_eq!(report.participants, 4);
        assert_eq!(report.recovered, "Hello, world");
        assert_eq!(report.ciphertext.len(), 16 + 12);
        assert_eq!(report.key_id.len(), 16);
    }

    #[tokio::test]
    async fn test_two_party_simulation() {
        let report = run_simulation(options(2, Some(1))).await.unwrap();
        assert_eq!(report.recovered, "Hello, world");
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let a = run_simulation(options(3, Some(42))).await.unwrap();
        let b = run_simulation(options(3, Some(42))).await.unwrap();
        let c = run_simulation(options(3, Some(43))).await.unwrap();

        assert_eq!(a.session_id, b.session_id);
        assert_eq!(a.key_id, b.key_id);
        assert_eq!(a.transcript_hash, b.transcript_hash);
        assert_ne!(a.key_id, c.key_id);
    }

    #[tokio::test]
    async fn test_single_participant_rejected() {
        assert!(run_simulation(options(1, None)).await.is_err());
    }

    #[test]
    fn test_seeded_participants_get_distinct_streams() {
        let draws = |seed: u64| -> Vec<u64> {
            participant_rngs(Some(seed), 3)
                .unwrap()
                .iter_mut()
                .map(|rng| rng.next_u64())
                .collect()
        };

        let a = draws(42);
        assert_eq!(a, draws(42));
        assert_ne!(a[0], a[1]);
        assert_ne!(a[1], a[2]);

        // Neighbouring seeds must not shift onto each other's streams
        let b = draws(43);
        for value in &a {
            assert!(!b.contains(value));
        }
    }

    #[tokio::test]
    async fn test_failing_participant_ends_session() {
        let params = Arc::new(GroupParameters::rfc3526_2048());
        let session_id = compute_session_id(b"flaky", 3);
        // The last participant cannot draw its secret; the others wait on it
        let rngs: Vec<FlakyRng> = (0..3)
            .map(|index| FlakyRng {
                inner: StdRng::seed_from_u64(index),
                offline: index == 2,
            })
            .collect();

        let session = run_session(session_id, params, rngs);
        let result = timeout(Duration::from_secs(60), session)
            .await
            .expect("session kept waiting after a participant failed");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("entropy"), "{}", err);
    }
}
