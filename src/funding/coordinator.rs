//! Funding coordinator
//!
//! Drives the four-message handshake for both roles. The initiator side is a
//! per-peer state machine (`Idle -> AwaitingPubkey -> AwaitingAck -> Done`);
//! the responder side keeps no session state and leans on the wallet's
//! persisted records instead.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::core::{is_funding_output, FeeEstimator, FeeRate, OutPoint, Transaction, Txid};
use crate::crypto::PeerIdentity;
use crate::funding::assembler::{validate_amounts, TransactionAssembler};
use crate::funding::contracts::{FundingWallet, Transport};
use crate::funding::error::FundingError;
use crate::network::message::{ChannelDescriptor, Message, MessageKind, WireError};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundingConfig {
    /// Check the signed funding output against the negotiated keys and
    /// capacity before broadcasting
    pub revalidate_before_sign: bool,
}

// =============================================================================
// Session State
// =============================================================================

/// Initiator bookkeeping between `MULTIDESC` and `MULTIACK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFunding {
    pub outpoint: OutPoint,
    pub capacity: u64,
    pub own_pubkey: PublicKey,
    pub counterparty: PublicKey,
    pub fee: u64,
    pub change: u64,
}

impl PendingFunding {
    /// What goes on the wire: our key is the counterparty from the peer's view
    pub fn descriptor(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            outpoint: self.outpoint,
            counterparty: self.own_pubkey,
            capacity: self.capacity as i64,
        }
    }
}

/// Initiator progress for one peer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitiatorState {
    #[default]
    Idle,
    AwaitingPubkey {
        capacity: u64,
        fee_rate: FeeRate,
    },
    AwaitingAck(PendingFunding),
    Done {
        outpoint: OutPoint,
        txid: Txid,
    },
}

impl InitiatorState {
    pub fn name(&self) -> &'static str {
        match self {
            InitiatorState::Idle => "idle",
            InitiatorState::AwaitingPubkey { .. } => "awaiting pubkey",
            InitiatorState::AwaitingAck(_) => "awaiting ack",
            InitiatorState::Done { .. } => "done",
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct FundingCoordinator {
    wallet: Arc<dyn FundingWallet>,
    transport: Arc<dyn Transport>,
    fee_estimator: Arc<dyn FeeEstimator>,
    config: FundingConfig,
    sessions: Mutex<HashMap<PeerIdentity, Arc<Mutex<InitiatorState>>>>,
}

impl FundingCoordinator {
    pub fn new(
        wallet: Arc<dyn FundingWallet>,
        transport: Arc<dyn Transport>,
        fee_estimator: Arc<dyn FeeEstimator>,
        config: FundingConfig,
    ) -> Self {
        Self {
            wallet,
            transport,
            fee_estimator,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn session(&self, peer: &PeerIdentity) -> Arc<Mutex<InitiatorState>> {
        self.sessions
            .lock()
            .entry(*peer)
            .or_insert_with(|| Arc::new(Mutex::new(InitiatorState::Idle)))
            .clone()
    }

    /// Snapshot of the initiator state for `peer`
    pub fn state(&self, peer: &PeerIdentity) -> InitiatorState {
        match self.sessions.lock().get(peer) {
            Some(session) => session.lock().clone(),
            None => InitiatorState::Idle,
        }
    }

    fn send(&self, peer: &PeerIdentity, msg: &Message) -> Result<(), FundingError> {
        log::debug!("Sending {} to {}", msg.kind(), peer);
        self.transport.send_bytes(peer, msg.encode())
    }

    // ========== Inbound Dispatch ==========

    /// Decode one complete message and run its handler.
    ///
    /// Failures are logged here with the peer and message kind, then returned.
    pub fn handle_frame(&self, peer: &PeerIdentity, bytes: &[u8]) -> Result<(), FundingError> {
        let msg = match Message::decode(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                let kind = match &e {
                    WireError::MalformedMessage { kind, .. } => kind.name(),
                    _ => "message",
                };
                log::warn!("Dropping {} from {}: {}", kind, peer, e);
                return Err(e.into());
            }
        };
        self.handle_message(peer, msg)
    }

    pub fn handle_message(&self, peer: &PeerIdentity, msg: Message) -> Result<(), FundingError> {
        let kind = msg.kind();
        let result = match msg {
            Message::PubReq => self.handle_pub_req(peer).map(|_| ()),
            Message::PubResp(key) => self.handle_pub_resp(peer, key).map(|_| ()),
            Message::MultiDesc(desc) => self.handle_multi_desc(peer, &desc),
            Message::MultiAck(outpoint) => self.handle_multi_ack(peer, &outpoint).map(|_| ()),
        };
        if let Err(e) = &result {
            log::warn!("{} from {} failed: {}", kind, peer, e);
        }
        result
    }

    // ========== Initiator ==========

    /// Open a funding attempt by asking `peer` for a channel key.
    ///
    /// A failed send leaves the session where it was.
    pub fn request_funding(
        &self,
        peer: &PeerIdentity,
        capacity: u64,
        fee_rate: FeeRate,
    ) -> Result<(), FundingError> {
        validate_amounts(capacity, fee_rate)?;

        let session = self.session(peer);
        let mut state = session.lock();
        if matches!(
            *state,
            InitiatorState::AwaitingPubkey { .. } | InitiatorState::AwaitingAck(_)
        ) {
            return Err(FundingError::FundingInProgress(*peer));
        }

        self.send(peer, &Message::PubReq)?;
        *state = InitiatorState::AwaitingPubkey { capacity, fee_rate };

        log::info!(
            "Requested {} sat channel from {} at {} sat/byte",
            capacity,
            peer,
            fee_rate.as_sat_per_byte()
        );
        Ok(())
    }

    /// Build, persist and describe the funding transaction once the peer's
    /// key arrives.
    ///
    /// Once the funding is persisted the session moves to `AwaitingAck`,
    /// even when the `MULTIDESC` write then fails. The stored funding and
    /// its locked coins stay reachable through `resend_descriptor` and
    /// `handle_multi_ack`.
    pub fn handle_pub_resp(
        &self,
        peer: &PeerIdentity,
        counterparty: PublicKey,
    ) -> Result<ChannelDescriptor, FundingError> {
        let session = self.session(peer);
        let mut state = session.lock();
        let (capacity, fee_rate) = match &*state {
            InitiatorState::AwaitingPubkey { capacity, fee_rate } => (*capacity, *fee_rate),
            other => {
                return Err(FundingError::UnexpectedMessage {
                    kind: MessageKind::PubResp,
                    state: other.name(),
                })
            }
        };

        let pending = match self.propose(peer, counterparty, capacity, fee_rate) {
            Ok(pending) => pending,
            Err(e) => {
                *state = InitiatorState::Idle;
                return Err(e);
            }
        };
        log::info!(
            "Funding {} persisted for {}, fee {} change {}",
            pending.outpoint,
            peer,
            pending.fee,
            pending.change
        );

        let descriptor = pending.descriptor();
        *state = InitiatorState::AwaitingAck(pending);
        self.send(peer, &Message::MultiDesc(descriptor))?;
        Ok(descriptor)
    }

    /// Assemble and persist; nothing is sent.
    fn propose(
        &self,
        peer: &PeerIdentity,
        counterparty: PublicKey,
        capacity: u64,
        fee_rate: FeeRate,
    ) -> Result<PendingFunding, FundingError> {
        let wallet = self.wallet.as_ref();
        let proposal = TransactionAssembler::new(wallet, wallet, self.fee_estimator.as_ref())
            .assemble(capacity, fee_rate)?;
        log::debug!(
            "Spending {} sat in {} inputs for {} sat to {}",
            proposal.input_value(),
            proposal.inputs.len(),
            capacity,
            peer
        );
        let (fee, change) = (proposal.fee, proposal.change);

        let (outpoint, own_pubkey) =
            wallet.persist_unsigned_funding(proposal.tx, capacity, peer, &counterparty)?;

        Ok(PendingFunding {
            outpoint,
            capacity,
            own_pubkey,
            counterparty,
            fee,
            change,
        })
    }

    /// Write the pending `MULTIDESC` to `peer` again, e.g. after the first
    /// write failed or the peer went quiet.
    pub fn resend_descriptor(&self, peer: &PeerIdentity) -> Result<ChannelDescriptor, FundingError> {
        let session = self.session(peer);
        let state = session.lock();
        let descriptor = match &*state {
            InitiatorState::AwaitingAck(pending) => pending.descriptor(),
            other => {
                return Err(FundingError::UnexpectedMessage {
                    kind: MessageKind::MultiDesc,
                    state: other.name(),
                })
            }
        };

        self.send(peer, &Message::MultiDesc(descriptor))?;
        log::info!("Resent funding {} to {}", descriptor.outpoint, peer);
        Ok(descriptor)
    }

    /// Sign and broadcast the funding transaction the peer acknowledged.
    pub fn handle_multi_ack(
        &self,
        peer: &PeerIdentity,
        outpoint: &OutPoint,
    ) -> Result<Transaction, FundingError> {
        let session = self.session(peer);
        let mut state = session.lock();
        let pending = match &*state {
            InitiatorState::AwaitingAck(pending) if pending.outpoint == *outpoint => {
                pending.clone()
            }
            _ => {
                return Err(FundingError::UnknownFundingRequest {
                    outpoint: *outpoint,
                    peer: *peer,
                })
            }
        };

        match self.finalize(peer, &pending) {
            Ok(tx) => {
                let txid = tx.txid();
                log::info!("Broadcast funding tx {} for {}", txid, peer);
                *state = InitiatorState::Done {
                    outpoint: *outpoint,
                    txid,
                };
                Ok(tx)
            }
            Err(e) => {
                *state = InitiatorState::Idle;
                Err(e)
            }
        }
    }

    fn finalize(&self, peer: &PeerIdentity, pending: &PendingFunding) -> Result<Transaction, FundingError> {
        let tx = self.wallet.sign_funding(&pending.outpoint, peer)?;

        if self.config.revalidate_before_sign {
            let pays = tx
                .outputs
                .get(pending.outpoint.index as usize)
                .map(|out| {
                    is_funding_output(out, &pending.own_pubkey, &pending.counterparty, pending.capacity)
                })
                .unwrap_or(false);
            if !pays || tx.txid() != pending.outpoint.txid {
                return Err(FundingError::OutputMismatch(pending.outpoint));
            }
        }

        self.wallet.submit_transaction(&tx)?;
        Ok(tx)
    }

    // ========== Responder ==========

    /// Hand out the next unused channel key for `peer`.
    ///
    /// Repeats return the same key until a descriptor from `peer` is saved.
    pub fn handle_pub_req(&self, peer: &PeerIdentity) -> Result<PublicKey, FundingError> {
        let key = self.wallet.next_channel_pubkey(peer)?;
        self.send(peer, &Message::PubResp(key))?;
        log::info!("Sent channel pubkey to {}", peer);
        Ok(key)
    }

    /// Save the initiator's descriptor, start watching for it and acknowledge.
    pub fn handle_multi_desc(
        &self,
        peer: &PeerIdentity,
        descriptor: &ChannelDescriptor,
    ) -> Result<(), FundingError> {
        self.wallet.persist_remote_funding(descriptor, peer)?;
        self.wallet.refresh_scan_filter()?;
        self.send(peer, &Message::MultiAck(descriptor.outpoint))?;
        log::info!(
            "Saved {} sat funding {} from {}",
            descriptor.capacity,
            descriptor.outpoint,
            peer
        );
        Ok(())
    }
}
