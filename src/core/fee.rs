//! Fee Estimation
//!
//! Fee rates and the size-based fee estimate used when assembling a
//! funding transaction.

use serde::{Deserialize, Serialize};

use crate::core::transaction::Transaction;

// =============================================================================
// Constants
// =============================================================================

/// Placeholder DER signature plus sighash byte, the largest a low-S signature gets
pub const ESTIMATED_SIGNATURE_SIZE: usize = 72;

/// Compressed public key pushed in a P2WPKH witness
pub const ESTIMATED_PUBKEY_SIZE: usize = 33;

// =============================================================================
// Fee Rate
// =============================================================================

/// Fee rate in satoshis per virtual byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(pub u64);

impl FeeRate {
    /// Create from satoshis per byte
    pub fn from_sat_per_byte(rate: u64) -> Self {
        Self(rate)
    }

    /// Calculate fee for a given size
    pub fn fee_for_size(&self, size_bytes: usize) -> u64 {
        self.0.saturating_mul(size_bytes as u64)
    }

    /// Get rate as satoshis per byte
    pub fn as_sat_per_byte(&self) -> u64 {
        self.0
    }
}

// =============================================================================
// Fee Estimator
// =============================================================================

/// Estimates the fee a transaction will need once it is fully signed.
pub trait FeeEstimator: Send + Sync {
    fn estimate_fee(&self, tx: &Transaction, rate: FeeRate) -> u64;
}

/// Estimates from virtual size, assuming every unsigned input will be spent
/// with a P2WPKH witness.
#[derive(Debug, Default, Clone, Copy)]
pub struct VsizeFeeEstimator;

impl VsizeFeeEstimator {
    /// Virtual size of `tx` after placeholder witnesses are filled in
    pub fn estimated_vsize(tx: &Transaction) -> usize {
        let mut sized = tx.clone();
        for input in &mut sized.inputs {
            if input.witness.is_empty() && input.script_sig.is_empty() {
                input.witness = vec![
                    vec![0u8; ESTIMATED_SIGNATURE_SIZE],
                    vec![0u8; ESTIMATED_PUBKEY_SIZE],
                ];
            }
        }
        sized.vsize()
    }
}

impl FeeEstimator for VsizeFeeEstimator {
    fn estimate_fee(&self, tx: &Transaction, rate: FeeRate) -> u64 {
        let vsize = Self::estimated_vsize(tx);
        let fee = rate.fee_for_size(vsize);
        log::debug!(
            "{} sat/byte, est vsize {}, fee {}",
            rate.as_sat_per_byte(),
            vsize,
            fee
        );
        fee
    }
}
