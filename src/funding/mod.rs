//! Channel funding handshake
//!
//! - `contracts`: collaborator interfaces the coordinator drives
//! - `assembler`: unsigned funding transaction construction
//! - `coordinator`: per-peer handshake state machine

pub mod assembler;
pub mod contracts;
pub mod coordinator;
pub mod error;

pub use assembler::{FundingProposal, TransactionAssembler};
pub use contracts::{
    Broadcaster, ChangeMaker, FundingSigner, FundingStore, FundingWallet, KeyDerivation,
    SelectedUtxo, Transport, UtxoSelection, UtxoSelector,
};
pub use coordinator::{FundingConfig, FundingCoordinator, InitiatorState, PendingFunding};
pub use error::FundingError;
