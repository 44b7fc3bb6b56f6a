//! End-to-end funding handshake between two coordinators backed by real
//! wallets, with messages passed through an in-memory queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::{tempdir, TempDir};

use chanfund::core::{funding_output, FeeEstimator, FeeRate, OutPoint, Transaction, Txid};
use chanfund::crypto::PeerIdentity;
use chanfund::funding::{
    FundingConfig, FundingCoordinator, FundingError, InitiatorState, Transport,
};
use chanfund::network::message::{MSGID_MULTIACK, MSGID_MULTIDESC, MSGID_PUBREQ, MSGID_PUBRESP};
use chanfund::wallet::{FundingRole, LocalWallet, StoreConfig};

/// Frames in flight: (from, to, bytes)
type Wire = Arc<Mutex<VecDeque<(PeerIdentity, PeerIdentity, Vec<u8>)>>>;

struct QueueTransport {
    me: PeerIdentity,
    wire: Wire,
    /// Writes still allowed before the link drops; `None` is unlimited
    sends_left: Mutex<Option<usize>>,
}

impl Transport for QueueTransport {
    fn send_bytes(&self, peer: &PeerIdentity, bytes: Vec<u8>) -> Result<(), FundingError> {
        let mut sends_left = self.sends_left.lock();
        match sends_left.as_mut() {
            Some(0) => return Err(FundingError::IoError("link down".into())),
            Some(n) => *n -= 1,
            None => {}
        }
        self.wire.lock().push_back((self.me, *peer, bytes));
        Ok(())
    }
}

struct FixedFee(u64);

impl FeeEstimator for FixedFee {
    fn estimate_fee(&self, _tx: &Transaction, _rate: FeeRate) -> u64 {
        self.0
    }
}

struct Side {
    _dir: TempDir,
    id: PeerIdentity,
    wallet: Arc<LocalWallet>,
    transport: Arc<QueueTransport>,
    coordinator: FundingCoordinator,
}

fn side(wire: &Wire, coins: &[u64]) -> Side {
    let dir = tempdir().unwrap();
    let wallet = Arc::new(LocalWallet::create(StoreConfig::in_dir(dir.path())).unwrap());
    for (i, value) in coins.iter().enumerate() {
        wallet
            .import_utxo(OutPoint::new(Txid([0x10 + i as u8; 32]), i as u32), *value, 0)
            .unwrap();
    }

    let id = wallet.node_identity().unwrap();
    let transport = Arc::new(QueueTransport {
        me: id,
        wire: wire.clone(),
        sends_left: Mutex::new(None),
    });
    let coordinator = FundingCoordinator::new(
        wallet.clone(),
        transport.clone(),
        Arc::new(FixedFee(1_500)),
        FundingConfig::default(),
    );

    Side {
        _dir: dir,
        id,
        wallet,
        transport,
        coordinator,
    }
}

/// Deliver queued frames until the wire is quiet; returns every frame seen
fn pump(wire: &Wire, sides: &[&Side]) -> Vec<Vec<u8>> {
    let mut seen = Vec::new();
    loop {
        let next = wire.lock().pop_front();
        let Some((from, to, bytes)) = next else {
            return seen;
        };
        seen.push(bytes.clone());
        if let Some(target) = sides.iter().find(|s| s.id == to) {
            let _ = target.coordinator.handle_frame(&from, &bytes);
        }
    }
}

#[test]
fn test_two_million_sat_channel() {
    let wire: Wire = Arc::default();
    let alice = side(&wire, &[1_200_000, 810_000]);
    let bob = side(&wire, &[]);

    alice
        .coordinator
        .request_funding(&bob.id, 2_000_000, FeeRate(80))
        .unwrap();
    let frames = pump(&wire, &[&alice, &bob]);

    let ids: Vec<u8> = frames.iter().map(|f| f[0]).collect();
    assert_eq!(ids, vec![MSGID_PUBREQ, MSGID_PUBRESP, MSGID_MULTIDESC, MSGID_MULTIACK]);
    let lengths: Vec<usize> = frames.iter().map(|f| f.len()).collect();
    assert_eq!(lengths, vec![1, 34, 78, 37]);

    let (outpoint, txid) = match alice.coordinator.state(&bob.id) {
        InitiatorState::Done { outpoint, txid } => (outpoint, txid),
        other => panic!("alice ended in {:?}", other),
    };
    assert_eq!(outpoint.txid, txid);

    // inputs 2,010,000 = funding 2,000,000 + change 8,500 + fee 1,500
    let outbox = alice.wallet.outbox();
    assert_eq!(outbox.len(), 1);
    let funder = alice.wallet.funding(&outpoint).unwrap();
    let tx = funder.tx.unwrap();
    assert_eq!(tx.inputs.len(), 2);
    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(tx.outputs[0].value, 8_500);
    assert_eq!(tx.outputs[1].value, 2_000_000);
    assert_eq!(tx.total_output_value(), 2_010_000 - 1_500);
    assert_eq!(outbox[0], hex::encode(tx.serialize()));
    assert!(tx.inputs.iter().all(|i| i.witness.len() == 2));

    // both sides describe the same 2-of-2 output
    let fundee = bob.wallet.funding(&outpoint).unwrap();
    assert_eq!(fundee.role, FundingRole::Responder);
    assert_eq!(fundee.capacity, 2_000_000);
    assert_eq!(fundee.counterparty, funder.own_pubkey);
    assert_eq!(funder.counterparty, fundee.own_pubkey);
    assert_eq!(
        tx.outputs[outpoint.index as usize],
        funding_output(&fundee.own_pubkey, &fundee.counterparty, 2_000_000)
    );
    assert!(bob
        .wallet
        .scan_filter()
        .contains(&tx.outputs[1].script_pubkey));
}

#[test]
fn test_repeated_pub_req_returns_same_key() {
    let wire: Wire = Arc::default();
    let alice = side(&wire, &[]);
    let bob = side(&wire, &[]);

    for _ in 0..3 {
        bob.coordinator.handle_frame(&alice.id, &[MSGID_PUBREQ]).unwrap();
    }
    let replies: Vec<Vec<u8>> = wire.lock().drain(..).map(|(_, _, b)| b).collect();

    assert_eq!(replies.len(), 3);
    assert!(replies.iter().all(|r| *r == replies[0]));
    assert!(bob.wallet.fundings().is_empty());
}

#[test]
fn test_insufficient_funds_leaves_nothing_behind() {
    let wire: Wire = Arc::default();
    let alice = side(&wire, &[2_001_000]);
    let bob = side(&wire, &[]);

    alice
        .coordinator
        .request_funding(&bob.id, 2_000_000, FeeRate(80))
        .unwrap();
    let frames = pump(&wire, &[&alice, &bob]);

    // PUBREQ and PUBRESP only; the fee does not fit in the 1,000 sat overshoot
    assert_eq!(frames.len(), 2);
    assert!(alice.wallet.fundings().is_empty());
    assert!(bob.wallet.fundings().is_empty());
    assert_eq!(alice.wallet.balance(), 2_001_000);
    assert_eq!(alice.coordinator.state(&bob.id), InitiatorState::Idle);
}

#[test]
fn test_truncated_descriptor_is_dropped() {
    let wire: Wire = Arc::default();
    let alice = side(&wire, &[]);
    let bob = side(&wire, &[]);

    let mut frame = vec![MSGID_MULTIDESC];
    frame.extend_from_slice(&[0u8; 76]);
    let err = bob.coordinator.handle_frame(&alice.id, &frame).unwrap_err();

    assert!(matches!(err, FundingError::MalformedMessage(_)));
    assert!(bob.wallet.fundings().is_empty());
    assert!(wire.lock().is_empty());
}

#[test]
fn test_stray_ack_is_unknown() {
    let wire: Wire = Arc::default();
    let alice = side(&wire, &[3_000_000]);
    let bob = side(&wire, &[]);

    let stray = OutPoint::new(Txid([0x77; 32]), 1);
    let mut frame = vec![MSGID_MULTIACK];
    frame.extend_from_slice(&stray.to_bytes());

    assert_eq!(
        alice.coordinator.handle_frame(&bob.id, &frame),
        Err(FundingError::UnknownFundingRequest {
            outpoint: stray,
            peer: bob.id
        })
    );
    assert!(alice.wallet.outbox().is_empty());
}

#[test]
fn test_dropped_descriptor_can_be_resent() {
    let wire: Wire = Arc::default();
    let alice = side(&wire, &[2_010_000]);
    let bob = side(&wire, &[]);

    // the link drops right after PUBREQ goes out
    *alice.transport.sends_left.lock() = Some(1);
    alice
        .coordinator
        .request_funding(&bob.id, 2_000_000, FeeRate(80))
        .unwrap();
    let frames = pump(&wire, &[&alice, &bob]);
    assert_eq!(frames.len(), 2);

    let pending = match alice.coordinator.state(&bob.id) {
        InitiatorState::AwaitingAck(pending) => pending,
        other => panic!("alice ended in {:?}", other),
    };
    assert_eq!(alice.wallet.balance(), 0);
    assert_eq!(alice.wallet.fundings().len(), 1);
    assert!(bob.wallet.fundings().is_empty());
    assert_eq!(
        alice.coordinator.request_funding(&bob.id, 2_000_000, FeeRate(80)),
        Err(FundingError::FundingInProgress(bob.id))
    );

    *alice.transport.sends_left.lock() = None;
    let desc = alice.coordinator.resend_descriptor(&bob.id).unwrap();
    assert_eq!(desc.outpoint, pending.outpoint);
    let frames = pump(&wire, &[&alice, &bob]);

    let ids: Vec<u8> = frames.iter().map(|f| f[0]).collect();
    assert_eq!(ids, vec![MSGID_MULTIDESC, MSGID_MULTIACK]);
    assert!(matches!(
        alice.coordinator.state(&bob.id),
        InitiatorState::Done { .. }
    ));
    assert_eq!(alice.wallet.outbox().len(), 1);
    assert_eq!(bob.wallet.funding(&pending.outpoint).unwrap().capacity, 2_000_000);
}
