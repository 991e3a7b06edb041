//! End-to-end integration tests for ringkey group key agreement.
//!
//! These tests exercise the full protocol:
//! 1. Secret exponents and commitments
//! 2. Ring-combined broadcast values
//! 3. Shared secret combination against known answers
//! 4. Session key derivation and symmetric encryption
//! 5. Participant state machines driven through the coordinator

use std::sync::Arc;

use rand::rngs::{OsRng, StdRng};
use rand::SeedableRng;
use ringkey_coordinator::{CoordinatorError, Round, RoundState, SessionCoordinator};
use ringkey_crypto::{
    compute_broadcast_value, compute_commitment, compute_shared_secret, derive_session_key,
    generate_secret_exponent, AesCtrCipher, Arithmetic, BroadcastValue, Commitment, CryptoError,
    GroupParameters, RingPosition, SecretExponent, SessionKey, SharedSecret, SymmetricCapability,
};
use ringkey_session::{Participant, Phase, SessionConfig, SessionError, SessionOutput};
use ringkey_types::{
    compute_session_id, BroadcastMessage, CommitmentMessage, GroupElement, SessionId,
};

// ========================================
// Fixed exponents and expected shared secrets (decimal)
// ========================================

const R1: &str = concat!(
    "154982638053615672502562189620416833853040577702240213289974866926411810154752432497427388",
    "9296364158412220450257094156311870595440187728867828269655907174",
);
const R2: &str = concat!(
    "104023616296609713354236075893436396082557114799249756319993277188240280755040734229038978",
    "64827214190353257065637567981266782510302048707687978273918694039",
);
const R3: &str = concat!(
    "129408827096092140458400886409918489711045112936969432149903284551002078168671463762386436",
    "96107426119211217160144523698841978246083955315791575371595884774",
);
const R4: &str = concat!(
    "120931044041764901309326787201545178835631206235221735719906662065727606301468940963405106",
    "15261683578689163726068604651029963895467797849341982787766490471",
);
const SHARED_SECRET_2: &str = concat!(
    "623431257361301410553399281824969136793981446974408966805885660585081681411436511386685430",
    "211580037153817165531883201309635326699989320635132654247498596486115309809003673146175821",
    "998736070287988023633936935470852228466808712290739349067257843916276039215987752324110976",
    "631451967982101378590265957073021876938704439314584392120997506782398374595297404922333410",
    "159584712096302301857475612949506389479719928702904454408412380153053940065270813867541744",
    "562796654011653032017137716472140718902941536073511338021082413526933059618208666334350913",
    "217609432137333907640889209028694319833066240144234065489032250927343444194141622827808744",
    "702789462514259165310381171795843549340191781196684222118305703808966541300850740426890955",
    "129413348671538499433523992137146645962180886956193245247601706480121073710137406224896841",
    "253282497531107183948804708249756557845329058403033218363418047583942233012195379741685158",
    "256378785538648470034330",
);
const SHARED_SECRET_3: &str = concat!(
    "556231624596374084900120103443478522214816892439415044213204253838076056873144663285429517",
    "606599802048008704270347995994548673669284566059589558598818495945383035427883898115052791",
    "500373557924813073514355313518894281554318297338885148343042584262557758747253407099777775",
    "587211908189132281121041771754325553593679123351214136642508002961580746122155627026737709",
    "909799813497869063140451363322235978006121155816925821870448045066355288506604164042028003",
    "810375258740823904988504069497691521733399393417152083091713449368879575233420893656433393",
    "898329049159441870730760748158625295161838573678731213765034277675010883910423747222842251",
    "914226977745709817726143332327157365160596515250361303503914933489667974505724038937270420",
    "644683089395973295770793582865379750761848943131881436136295961025306471676057709423657453",
    "201148706366181974153190106922710617225773060337621250428937586510868134517689499856384070",
    "9787548639882127557668691",
);
const SHARED_SECRET_4: &str = concat!(
    "478642950038637449781932200380247049322025702291268060123366576903839005336887784524199284",
    "047193248369596863881804830052942595301618608615207631588772458432022020638499441578266199",
    "803400542948857066317914797285588802637657150966338694080092794667117201580882966521293039",
    "989662603779744759301390965457162489703282641372566923482398380898502171918354970865334847",
    "631690916832245285686331361252376411264218468340589246882824422296514006449685063845923884",
    "407463548843833039029931684582768736011919163249566969335501405114616719773095477408017277",
    "715623865790549301348248106930789058547489772286857625095886793990574374412412781225282455",
    "057219983715122712486334453199465333548146230232186705420271097864563119608964673481576960",
    "691304281196088364072268558550846940315198561833590127390391235732991743656078530891094009",
    "858086271577205223415717583753899211372731365495057042370050882713252530858531474102358458",
    "4788324842197700030701777",
);

/// PBKDF2-HMAC-SHA256 keys of the shared secrets above.
const SESSION_KEY_2: &str = "499f2c566b9c4538e1fa33a8b9bd64d4";
const SESSION_KEY_3: &str = "c09bc51cbb18aa1386f33152cd04998f";
const SESSION_KEY_4: &str = "8119e37459b90d51291e0752a6104789";

/// Run the core functions for one ring of fixed or random exponents.
fn run_ring(
    params: &GroupParameters,
    secrets: &[SecretExponent],
) -> (Vec<BroadcastValue>, Vec<SharedSecret>) {
    let n = secrets.len();
    let commitments: Vec<Commitment> = secrets
        .iter()
        .map(|r| compute_commitment(r, params))
        .collect();

    let broadcasts: Vec<BroadcastValue> = (0..n)
        .map(|i| {
            let pos = RingPosition::new(i, n).unwrap();
            compute_broadcast_value(
                &secrets[i],
                &commitments[pos.previous()],
                &commitments[pos.next()],
                params,
            )
            .unwrap()
        })
        .collect();

    let shared = (0..n)
        .map(|i| {
            let pos = RingPosition::new(i, n).unwrap();
            compute_shared_secret(
                &secrets[i],
                &broadcasts[i],
                &commitments[pos.previous()],
                &broadcasts,
                pos,
                params,
            )
            .unwrap()
        })
        .collect();

    (broadcasts, shared)
}

fn fixed_secrets(params: &GroupParameters, exponents: &[&str]) -> Vec<SecretExponent> {
    exponents
        .iter()
        .map(|r| SecretExponent::from_decimal(params, r).unwrap())
        .collect()
}

fn assert_known_answer(exponents: &[&str], expected_secret: &str, expected_key: &str) {
    let params = GroupParameters::default();
    let expected = params.arith().from_str_radix(expected_secret, 10).unwrap();

    let (_, shared) = run_ring(&params, &fixed_secrets(&params, exponents));

    for (i, k) in shared.iter().enumerate() {
        assert_eq!(k.value(), &expected, "participant {} disagrees", i);
        assert_eq!(k.as_bytes().len(), 384);

        let key = k.derive_session_key(&AesCtrCipher).unwrap();
        assert_eq!(key.to_hex().unwrap(), expected_key);
    }
}

fn new_participant(
    params: &Arc<GroupParameters>,
    session_id: SessionId,
    n: u32,
    index: u32,
) -> Participant {
    let config = SessionConfig::new(session_id, n, index).unwrap();
    Participant::new(config, params.clone()).unwrap()
}

/// Drive participants through the coordinator, as a transport would.
fn run_session(exponents: &[&str], label: &[u8]) -> Vec<SessionOutput<SessionKey>> {
    let params = Arc::new(GroupParameters::default());
    let n = exponents.len() as u32;
    let session_id = compute_session_id(label, n);

    let mut coordinator = SessionCoordinator::new();
    coordinator.open_session(session_id, n).unwrap();

    let mut participants: Vec<Participant> = (0..n)
        .map(|i| new_participant(&params, session_id, n, i))
        .collect();

    // Round 1
    for (participant, r) in participants.iter_mut().zip(exponents) {
        let secret = SecretExponent::from_decimal(&*params, r).unwrap();
        let msg = participant.round1_with_secret(secret).unwrap();
        coordinator.submit_commitment(msg).unwrap();
    }
    let commitments = coordinator.commitment_set(&session_id).unwrap();
    for participant in participants.iter_mut() {
        for msg in &commitments {
            participant.process_commitment(msg.clone()).unwrap();
        }
    }

    // Round 2
    for participant in participants.iter_mut() {
        let msg = participant.round2().unwrap();
        coordinator.submit_broadcast(msg).unwrap();
    }
    let broadcasts = coordinator.broadcast_set(&session_id).unwrap();
    for participant in participants.iter_mut() {
        for msg in &broadcasts {
            participant.process_broadcast(msg.clone()).unwrap();
        }
    }

    let outputs = participants
        .iter_mut()
        .map(|p| p.finalize(&AesCtrCipher).unwrap())
        .collect();
    assert!(coordinator.close_session(&session_id).is_some());
    outputs
}

// ========================================
// Known answers
// ========================================

#[test]
fn test_two_party_known_answer() {
    assert_known_answer(&[R1, R2], SHARED_SECRET_2, SESSION_KEY_2);
}

#[test]
fn test_three_party_known_answer() {
    assert_known_answer(&[R1, R2, R3], SHARED_SECRET_3, SESSION_KEY_3);
}

#[test]
fn test_four_party_known_answer() {
    assert_known_answer(&[R1, R2, R3, R4], SHARED_SECRET_4, SESSION_KEY_4);
}

#[test]
fn test_two_party_broadcast_values_are_one() {
    let params = GroupParameters::default();
    let (broadcasts, _) = run_ring(&params, &fixed_secrets(&params, &[R1, R2]));

    assert!(broadcasts.iter().all(|x| x.is_identity(&params)));
    assert_eq!(broadcasts[0], broadcasts[1]);
}

#[test]
fn test_kdf_known_answer() {
    let key = derive_session_key(&AesCtrCipher, b"ringkey").unwrap();
    assert_eq!(key.to_hex().unwrap(), "6272d1daa5ca742834b3de3349d7e122");
}

// ========================================
// Random rings
// ========================================

#[test]
fn test_random_rings_agree() {
    let params = GroupParameters::default();
    let mut rng = StdRng::seed_from_u64(2024);

    for n in 2..=6 {
        let secrets: Vec<SecretExponent> = (0..n)
            .map(|_| generate_secret_exponent(&params, &mut rng).unwrap())
            .collect();
        let (_, shared) = run_ring(&params, &secrets);

        let keys: Vec<SessionKey> = shared
            .iter()
            .map(|k| k.derive_session_key(&AesCtrCipher).unwrap())
            .collect();
        assert!(
            shared.iter().all(|k| k.as_bytes() == shared[0].as_bytes()),
            "ring of {} disagreed",
            n
        );
        assert!(keys.iter().all(|k| k == &keys[0]));
    }
}

#[test]
fn test_fresh_secrets_give_fresh_keys() {
    let params = GroupParameters::default();
    let run = || {
        let secrets: Vec<SecretExponent> = (0..3)
            .map(|_| generate_secret_exponent(&params, &mut OsRng).unwrap())
            .collect();
        let (_, shared) = run_ring(&params, &secrets);
        shared[0].derive_session_key(&AesCtrCipher).unwrap()
    };

    assert_ne!(run(), run());
}

#[test]
fn test_key_derivation_is_deterministic() {
    let params = GroupParameters::default();
    let (_, shared) = run_ring(&params, &fixed_secrets(&params, &[R1, R2, R3]));

    let k1 = derive_session_key(&AesCtrCipher, shared[0].as_bytes()).unwrap();
    let k2 = derive_session_key(&AesCtrCipher, shared[0].as_bytes()).unwrap();
    assert_eq!(k1, k2);
}

#[test]
fn test_cross_participant_encryption() {
    let params = GroupParameters::default();
    let (_, shared) = run_ring(&params, &fixed_secrets(&params, &[R1, R2, R3]));
    let first = shared[0].derive_session_key(&AesCtrCipher).unwrap();
    let last = shared[2].derive_session_key(&AesCtrCipher).unwrap();

    let ciphertext = AesCtrCipher
        .encrypt(&first, b"Hello, world", &mut OsRng)
        .unwrap();
    let plaintext = AesCtrCipher.decrypt(&last, &ciphertext).unwrap();
    assert_eq!(plaintext, b"Hello, world");
}

// ========================================
// Boundaries
// ========================================

#[test]
fn test_broadcast_list_length_must_match_ring() {
    let params = GroupParameters::default();
    let secrets = fixed_secrets(&params, &[R1, R2, R3]);
    let commitments: Vec<Commitment> = secrets
        .iter()
        .map(|r| compute_commitment(r, &params))
        .collect();
    let (broadcasts, _) = run_ring(&params, &secrets);
    let pos = RingPosition::new(0, 3).unwrap();

    let err = compute_shared_secret(
        &secrets[0],
        &broadcasts[0],
        &commitments[2],
        &broadcasts[..2],
        pos,
        &params,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CryptoError::LengthMismatch {
            expected: 3,
            got: 2
        }
    ));
    assert!(err.is_integrity_error());
}

#[test]
fn test_modulus_mismatch_detected() {
    let session_id = compute_session_id(b"mismatch", 2);
    let big = Arc::new(GroupParameters::rfc3526_3072());
    let small = Arc::new(GroupParameters::rfc3526_2048());

    let mut alice = new_participant(&big, session_id, 2, 0);
    let mut bob = new_participant(&small, session_id, 2, 1);

    let msg = alice.round1(&mut OsRng).unwrap();
    let _ = bob.round1(&mut OsRng).unwrap();

    let err = bob.process_commitment(msg).unwrap_err();
    assert!(matches!(err, SessionError::Crypto(CryptoError::ParameterMismatch)));
    assert!(err.to_string().contains("parameter mismatch"));
    if let SessionError::Crypto(e) = err {
        assert!(e.is_parameter_error());
        assert!(!e.is_integrity_error());
    }
}

#[test]
fn test_out_of_range_values_rejected() {
    let params = Arc::new(GroupParameters::default());
    let session_id = compute_session_id(b"range", 2);
    let mut participant = new_participant(&params, session_id, 2, 1);

    let zero = CommitmentMessage {
        session_id,
        sender: 0,
        params_fingerprint: params.fingerprint(),
        commitment: GroupElement(vec![0u8; 384]),
    };
    assert!(matches!(
        participant.process_commitment(zero),
        Err(SessionError::Crypto(CryptoError::ElementOutOfRange))
    ));

    let modulus_bytes = params
        .arith()
        .to_bytes_be_padded(params.modulus(), 384)
        .unwrap();
    let modulus = BroadcastMessage {
        session_id,
        sender: 0,
        value: GroupElement(modulus_bytes),
    };
    assert!(matches!(
        participant.process_broadcast(modulus),
        Err(SessionError::Crypto(CryptoError::ElementOutOfRange))
    ));
}

// ========================================
// Session flow
// ========================================

#[test]
fn test_session_flow_matches_known_answer() {
    let outputs = run_session(&[R1, R2, R3], b"known-answer");

    for output in &outputs {
        assert_eq!(output.session_key.to_hex().unwrap(), SESSION_KEY_3);
        assert_eq!(output.transcript_hash, outputs[0].transcript_hash);
    }
}

#[test]
fn test_transcript_depends_on_session() {
    let a = run_session(&[R1, R2], b"first");
    let b = run_session(&[R1, R2], b"second");

    assert_eq!(a[0].session_key, b[0].session_key);
    assert_ne!(a[0].transcript_hash, b[0].transcript_hash);
}

#[test]
fn test_messages_survive_json_transport() {
    let params = Arc::new(GroupParameters::default());
    let session_id = compute_session_id(b"json", 2);
    let mut participants: Vec<Participant> = (0..2)
        .map(|i| new_participant(&params, session_id, 2, i))
        .collect();

    let wire: Vec<String> = participants
        .iter_mut()
        .map(|p| serde_json::to_string(&p.round1(&mut OsRng).unwrap()).unwrap())
        .collect();
    for participant in participants.iter_mut() {
        for json in &wire {
            let msg: CommitmentMessage = serde_json::from_str(json).unwrap();
            participant.process_commitment(msg).unwrap();
        }
    }

    let wire: Vec<String> = participants
        .iter_mut()
        .map(|p| serde_json::to_string(&p.round2().unwrap()).unwrap())
        .collect();
    for participant in participants.iter_mut() {
        for json in &wire {
            let msg: BroadcastMessage = serde_json::from_str(json).unwrap();
            participant.process_broadcast(msg).unwrap();
        }
    }

    let k0 = participants[0].finalize(&AesCtrCipher).unwrap();
    let k1 = participants[1].finalize(&AesCtrCipher).unwrap();
    assert_eq!(k0.session_key, k1.session_key);
}

#[test]
fn test_coordinator_holds_incomplete_rounds() {
    let params = Arc::new(GroupParameters::default());
    let session_id = compute_session_id(b"partial", 3);
    let mut coordinator = SessionCoordinator::new();
    coordinator.open_session(session_id, 3).unwrap();

    let mut participant = new_participant(&params, session_id, 3, 0);
    let msg = participant.round1(&mut OsRng).unwrap();

    assert_eq!(
        coordinator.submit_commitment(msg.clone()).unwrap(),
        RoundState::Collecting { have: 1, need: 3 }
    );
    assert!(matches!(
        coordinator.submit_commitment(msg),
        Err(CoordinatorError::DuplicateMessage {
            round: Round::Commitment,
            sender: 0
        })
    ));
    assert!(matches!(
        coordinator.commitment_set(&session_id),
        Err(CoordinatorError::RoundIncomplete { have: 1, need: 3, .. })
    ));
    assert!(matches!(
        participant.round2(),
        Err(SessionError::ProtocolIncomplete { .. })
    ));
}

#[test]
fn test_aborted_session_cannot_finish() {
    let params = Arc::new(GroupParameters::default());
    let session_id = compute_session_id(b"abort", 2);
    let mut participant = new_participant(&params, session_id, 2, 0);
    let _ = participant.round1(&mut OsRng).unwrap();

    participant.abort();
    assert_eq!(participant.phase(), Phase::Aborted);
    assert!(matches!(
        participant.finalize(&AesCtrCipher),
        Err(SessionError::Aborted)
    ));
}
