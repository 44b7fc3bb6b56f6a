//! Funding handshake errors

use thiserror::Error;

use crate::core::OutPoint;
use crate::crypto::PeerIdentity;
use crate::network::message::{MessageKind, WireError};

/// Every way a funding handler can fail.
///
/// Collaborator failures carry their cause as an opaque string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("Not connected to peer {0}")]
    NotConnected(PeerIdentity),
    #[error(transparent)]
    MalformedMessage(#[from] WireError),
    #[error("Insufficient funds: short by {shortfall} sat")]
    InsufficientFunds { shortfall: u64 },
    #[error("Unknown funding request {outpoint} for peer {peer}")]
    UnknownFundingRequest { outpoint: OutPoint, peer: PeerIdentity },
    #[error("Unexpected {kind} while {state}")]
    UnexpectedMessage {
        kind: MessageKind,
        state: &'static str,
    },
    #[error("Funding already in progress with peer {0}")]
    FundingInProgress(PeerIdentity),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Funding output {0} does not pay the negotiated 2-of-2 and capacity")]
    OutputMismatch(OutPoint),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Key derivation error: {0}")]
    DerivationError(String),
    #[error("Signing error: {0}")]
    SigningError(String),
    #[error("Broadcast error: {0}")]
    BroadcastError(String),
    #[error("IO error: {0}")]
    IoError(String),
}
