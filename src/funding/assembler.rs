//! Funding transaction assembly
//!
//! Turns a capacity and fee rate into an unsigned transaction skeleton:
//! selected inputs (in selector order) plus an optional change output. The
//! multisig output itself is appended later by the funding store.

use crate::core::{FeeEstimator, FeeRate, Transaction, TxIn, TxOut, P2WSH_OUTPUT_SIZE};
use crate::funding::contracts::{ChangeMaker, SelectedUtxo, UtxoSelector};
use crate::funding::error::FundingError;

/// The initiator's unsigned funding transaction and how it was sized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingProposal {
    pub capacity: u64,
    pub fee_rate: FeeRate,
    pub inputs: Vec<SelectedUtxo>,
    /// Zero when no change output was added
    pub change: u64,
    pub fee: u64,
    /// Inputs and change; no multisig output yet
    pub tx: Transaction,
}

impl FundingProposal {
    pub fn input_value(&self) -> u64 {
        self.inputs.iter().map(|u| u.value).sum()
    }
}

pub struct TransactionAssembler<'a, S: ?Sized, C: ?Sized> {
    selector: &'a S,
    change_maker: &'a C,
    estimator: &'a dyn FeeEstimator,
}

impl<'a, S, C> TransactionAssembler<'a, S, C>
where
    S: UtxoSelector + ?Sized,
    C: ChangeMaker + ?Sized,
{
    pub fn new(selector: &'a S, change_maker: &'a C, estimator: &'a dyn FeeEstimator) -> Self {
        Self {
            selector,
            change_maker,
            estimator,
        }
    }

    /// Select coins and size the change output.
    ///
    /// The fee is estimated with a placeholder for the funding output, then
    /// re-estimated once with the tentative change output included. A fee
    /// above the overshoot fails with `InsufficientFunds`. When only the
    /// change output's own bytes push the fee past the overshoot, change is
    /// dropped and the whole overshoot goes to the fee.
    pub fn assemble(&self, capacity: u64, fee_rate: FeeRate) -> Result<FundingProposal, FundingError> {
        validate_amounts(capacity, fee_rate)?;

        let selection = self.selector.select_utxos(capacity, true)?;
        if selection.overshoot < 0 {
            log::warn!("witness utxos undershoot by {}", -selection.overshoot);
            return Err(FundingError::InsufficientFunds {
                shortfall: selection.overshoot.unsigned_abs(),
            });
        }
        let overshoot = selection.overshoot as u64;

        let mut tx = Transaction::new();
        for utxo in &selection.inputs {
            tx.add_input(TxIn::new(utxo.outpoint));
        }

        let mut sizing = tx.clone();
        sizing.add_output(funding_placeholder(capacity));

        let mut fee = self.estimator.estimate_fee(&sizing, fee_rate);
        ensure_covered(fee, overshoot)?;

        let mut change = overshoot - fee;
        if change > 0 {
            let mut change_out = self.change_maker.make_change_output(change as i64)?;
            sizing.add_output(change_out.clone());

            let with_change = self.estimator.estimate_fee(&sizing, fee_rate);
            if with_change < overshoot {
                fee = with_change;
                change = overshoot - fee;
                change_out.value = change;
                tx.add_output(change_out);
            } else {
                log::debug!(
                    "change output not worth its fee ({} >= {}), dropping it",
                    with_change,
                    overshoot
                );
                fee = overshoot;
                change = 0;
            }
        }

        Ok(FundingProposal {
            capacity,
            fee_rate,
            inputs: selection.inputs,
            change,
            fee,
            tx,
        })
    }
}

pub(crate) fn validate_amounts(capacity: u64, fee_rate: FeeRate) -> Result<(), FundingError> {
    if capacity == 0 || capacity > i64::MAX as u64 {
        return Err(FundingError::InvalidAmount(format!(
            "capacity {} out of range",
            capacity
        )));
    }
    if fee_rate.as_sat_per_byte() == 0 {
        return Err(FundingError::InvalidAmount("fee rate must be positive".into()));
    }
    Ok(())
}

fn ensure_covered(fee: u64, overshoot: u64) -> Result<(), FundingError> {
    if fee > overshoot {
        return Err(FundingError::InsufficientFunds {
            shortfall: fee - overshoot,
        });
    }
    Ok(())
}

/// Same serialized size as the P2WSH funding output
fn funding_placeholder(capacity: u64) -> TxOut {
    TxOut::new(capacity, vec![0u8; P2WSH_OUTPUT_SIZE - 9])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutPoint, Txid, VsizeFeeEstimator};
    use crate::funding::contracts::UtxoSelection;
    use parking_lot::Mutex;

    struct FixedSelector {
        values: Vec<u64>,
    }

    impl UtxoSelector for FixedSelector {
        fn select_utxos(&self, amount: u64, _require_witness: bool) -> Result<UtxoSelection, FundingError> {
            let inputs: Vec<SelectedUtxo> = self
                .values
                .iter()
                .enumerate()
                .map(|(i, v)| SelectedUtxo {
                    outpoint: OutPoint::new(Txid([i as u8 + 1; 32]), i as u32),
                    value: *v,
                })
                .collect();
            let total: u64 = self.values.iter().sum();
            Ok(UtxoSelection {
                inputs,
                overshoot: total as i64 - amount as i64,
            })
        }
    }

    #[derive(Default)]
    struct RecordingChange {
        requested: Mutex<Vec<i64>>,
    }

    impl ChangeMaker for RecordingChange {
        fn make_change_output(&self, amount: i64) -> Result<TxOut, FundingError> {
            self.requested.lock().push(amount);
            if amount <= 0 {
                return Err(FundingError::InvalidAmount(amount.to_string()));
            }
            Ok(TxOut::new(amount as u64, vec![0x00, 0x14].into_iter().chain([7u8; 20]).collect()))
        }
    }

    struct FixedFee(u64);

    impl FeeEstimator for FixedFee {
        fn estimate_fee(&self, _tx: &Transaction, _rate: FeeRate) -> u64 {
            self.0
        }
    }

    #[test]
    fn test_change_is_overshoot_minus_fee() {
        let selector = FixedSelector {
            values: vec![1_500_000, 510_000],
        };
        let change = RecordingChange::default();
        let fee = FixedFee(1_500);
        let proposal = TransactionAssembler::new(&selector, &change, &fee)
            .assemble(2_000_000, FeeRate(80))
            .unwrap();

        assert_eq!(proposal.fee, 1_500);
        assert_eq!(proposal.change, 8_500);
        assert_eq!(proposal.tx.outputs.len(), 1);
        assert_eq!(proposal.tx.outputs[0].value, 8_500);
        assert_eq!(
            proposal.capacity + proposal.tx.total_output_value(),
            proposal.input_value() - proposal.fee
        );
    }

    #[test]
    fn test_inputs_keep_selector_order() {
        let selector = FixedSelector {
            values: vec![10, 2_000_000, 30_000],
        };
        let change = RecordingChange::default();
        let proposal = TransactionAssembler::new(&selector, &change, &FixedFee(100))
            .assemble(2_000_000, FeeRate(1))
            .unwrap();

        let order: Vec<u32> = proposal
            .tx
            .inputs
            .iter()
            .map(|i| i.previous_output.index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_fee_above_overshoot_fails() {
        let selector = FixedSelector {
            values: vec![2_001_000],
        };
        let change = RecordingChange::default();
        let err = TransactionAssembler::new(&selector, &change, &FixedFee(1_500))
            .assemble(2_000_000, FeeRate(80))
            .unwrap_err();

        assert_eq!(err, FundingError::InsufficientFunds { shortfall: 500 });
        assert!(change.requested.lock().is_empty());
    }

    #[test]
    fn test_negative_overshoot_fails() {
        let selector = FixedSelector {
            values: vec![1_000],
        };
        let change = RecordingChange::default();
        let err = TransactionAssembler::new(&selector, &change, &FixedFee(0))
            .assemble(2_000, FeeRate(1))
            .unwrap_err();
        assert_eq!(err, FundingError::InsufficientFunds { shortfall: 1_000 });
    }

    #[test]
    fn test_exact_fee_omits_change() {
        let selector = FixedSelector {
            values: vec![2_001_500],
        };
        let change = RecordingChange::default();
        let proposal = TransactionAssembler::new(&selector, &change, &FixedFee(1_500))
            .assemble(2_000_000, FeeRate(80))
            .unwrap();

        assert_eq!(proposal.change, 0);
        assert!(proposal.tx.outputs.is_empty());
        assert!(change.requested.lock().is_empty());
    }

    #[test]
    fn test_fee_recomputed_once_with_change() {
        let selector = FixedSelector {
            values: vec![2_100_000],
        };
        let change = RecordingChange::default();
        let proposal = TransactionAssembler::new(&selector, &change, &VsizeFeeEstimator)
            .assemble(2_000_000, FeeRate(10))
            .unwrap();

        // tentative change was sized before the change output's own bytes were counted
        let requested = change.requested.lock().clone();
        assert_eq!(requested.len(), 1);
        assert!(requested[0] as u64 > proposal.change);
        assert_eq!(proposal.change, 100_000 - proposal.fee);
    }

    /// 1,000 sat plus 500 per output beyond the funding placeholder
    struct PerOutputFee;

    impl FeeEstimator for PerOutputFee {
        fn estimate_fee(&self, tx: &Transaction, _rate: FeeRate) -> u64 {
            1_000 + 500 * (tx.outputs.len() as u64 - 1)
        }
    }

    #[test]
    fn test_change_dropped_when_it_cannot_pay_for_itself() {
        let selector = FixedSelector {
            values: vec![2_001_200],
        };
        let change = RecordingChange::default();
        let proposal = TransactionAssembler::new(&selector, &change, &PerOutputFee)
            .assemble(2_000_000, FeeRate(1))
            .unwrap();

        assert_eq!(*change.requested.lock(), vec![200]);
        assert_eq!(proposal.change, 0);
        assert_eq!(proposal.fee, 1_200);
        assert!(proposal.tx.outputs.is_empty());
        assert_eq!(proposal.capacity, proposal.input_value() - proposal.fee);
    }

    #[test]
    fn test_change_kept_one_sat_above_its_fee() {
        let selector = FixedSelector {
            values: vec![2_001_501],
        };
        let change = RecordingChange::default();
        let proposal = TransactionAssembler::new(&selector, &change, &PerOutputFee)
            .assemble(2_000_000, FeeRate(1))
            .unwrap();

        assert_eq!(proposal.fee, 1_500);
        assert_eq!(proposal.change, 1);
        assert_eq!(proposal.tx.outputs[0].value, 1);
    }

    #[test]
    fn test_rejects_zero_amounts() {
        let selector = FixedSelector { values: vec![] };
        let change = RecordingChange::default();
        let fee = FixedFee(0);
        let assembler = TransactionAssembler::new(&selector, &change, &fee);
        assert!(matches!(
            assembler.assemble(0, FeeRate(1)),
            Err(FundingError::InvalidAmount(_))
        ));
        assert!(matches!(
            assembler.assemble(1_000, FeeRate(0)),
            Err(FundingError::InvalidAmount(_))
        ));
    }
}
