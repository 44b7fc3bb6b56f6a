//! Core transaction components
//!
//! This module contains the building blocks the funding flow works with:
//! - Transactions (segwit serialization, txid, BIP-143 sighash)
//! - Output scripts (2-of-2 multisig P2WSH, P2WPKH)
//! - Fee estimation
//! - Bloom scan filter

pub mod bloom;
pub mod fee;
pub mod script;
pub mod transaction;

pub use bloom::{BloomFilter, DEFAULT_FP_RATE};
pub use fee::{FeeEstimator, FeeRate, VsizeFeeEstimator};
pub use script::{
    funding_output, is_funding_output, multisig_2of2_script, p2wpkh_script_code,
    p2wpkh_script_pubkey, p2wsh_script_pubkey, ScriptType, P2WSH_OUTPUT_SIZE,
};
pub use transaction::{
    OutPoint, Transaction, TransactionError, TxIn, TxOut, Txid, OUTPOINT_SIZE, SEQUENCE_FINAL,
    SIGHASH_ALL, TX_VERSION,
};
