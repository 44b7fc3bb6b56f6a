//! Collaborator contracts
//!
//! The coordinator never touches keys, coins or sockets directly. It drives
//! these narrow interfaces, implemented by the local wallet and the peer
//! manager in production and by in-memory fakes in tests.

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::core::{OutPoint, Transaction, TxOut};
use crate::crypto::PeerIdentity;
use crate::funding::error::FundingError;
use crate::network::message::ChannelDescriptor;

/// A coin chosen to fund a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedUtxo {
    pub outpoint: OutPoint,
    pub value: u64,
}

/// Result of coin selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    /// Inputs in the order the selector wants them spent
    pub inputs: Vec<SelectedUtxo>,
    /// Input value above the requested amount; negative when short
    pub overshoot: i64,
}

/// Per-peer channel key derivation.
pub trait KeyDerivation: Send + Sync {
    /// The next unused channel key for `peer`. Does not advance the index.
    fn next_channel_pubkey(&self, peer: &PeerIdentity) -> Result<PublicKey, FundingError>;
}

pub trait UtxoSelector: Send + Sync {
    /// Select coins covering `amount`. Coins already locked to a funding are skipped.
    fn select_utxos(
        &self,
        amount: u64,
        require_witness: bool,
    ) -> Result<UtxoSelection, FundingError>;
}

pub trait ChangeMaker: Send + Sync {
    /// An output paying `amount` back to the wallet. Fails with `InvalidAmount`.
    fn make_change_output(&self, amount: i64) -> Result<TxOut, FundingError>;
}

/// Funding record persistence for both roles.
pub trait FundingStore: Send + Sync {
    /// Initiator: append the multisig output to `tx`, store it unsigned and
    /// return its outpoint together with our own channel key.
    fn persist_unsigned_funding(
        &self,
        tx: Transaction,
        capacity: u64,
        peer: &PeerIdentity,
        counterparty: &PublicKey,
    ) -> Result<(OutPoint, PublicKey), FundingError>;

    /// Responder: store the descriptor the initiator sent.
    fn persist_remote_funding(
        &self,
        descriptor: &ChannelDescriptor,
        peer: &PeerIdentity,
    ) -> Result<(), FundingError>;

    /// Rebuild the chain scan filter so new funding outputs are observed.
    fn refresh_scan_filter(&self) -> Result<(), FundingError>;
}

pub trait FundingSigner: Send + Sync {
    /// Sign the stored funding transaction for `(outpoint, peer)`.
    fn sign_funding(
        &self,
        outpoint: &OutPoint,
        peer: &PeerIdentity,
    ) -> Result<Transaction, FundingError>;
}

pub trait Broadcaster: Send + Sync {
    fn submit_transaction(&self, tx: &Transaction) -> Result<(), FundingError>;
}

/// Outbound side of the peer transport.
pub trait Transport: Send + Sync {
    /// One non-retrying write of a complete message to `peer`.
    fn send_bytes(&self, peer: &PeerIdentity, bytes: Vec<u8>) -> Result<(), FundingError>;
}

/// Everything the coordinator needs from the wallet side.
pub trait FundingWallet:
    KeyDerivation + UtxoSelector + ChangeMaker + FundingStore + FundingSigner + Broadcaster
{
}

impl<T> FundingWallet for T where
    T: KeyDerivation + UtxoSelector + ChangeMaker + FundingStore + FundingSigner + Broadcaster
{
}
