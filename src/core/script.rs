//! Output scripts
//!
//! Only the handful of script templates the funding flow needs:
//! the 2-of-2 multisig witness script wrapped in P2WSH, and P2WPKH for
//! wallet coins and change.

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::core::transaction::TxOut;
use crate::crypto::{hash160, sha256};

pub const OP_0: u8 = 0x00;
pub const OP_2: u8 = 0x52;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Size of a serialized P2WSH output: value (8) + length (1) + script (34)
pub const P2WSH_OUTPUT_SIZE: usize = 43;

/// Classification of an output script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptType {
    /// Pay to Witness Public Key Hash: `OP_0 <20 bytes>`
    P2WPKH,
    /// Pay to Witness Script Hash: `OP_0 <32 bytes>`
    P2WSH,
    /// Pay to Public Key Hash (legacy, not spendable by this wallet's segwit signer)
    P2PKH,
    /// Anything else
    NonStandard,
}

impl ScriptType {
    /// Classify a script by its template
    pub fn classify(script: &[u8]) -> Self {
        match script {
            [OP_0, 0x14, rest @ ..] if rest.len() == 20 => ScriptType::P2WPKH,
            [OP_0, 0x20, rest @ ..] if rest.len() == 32 => ScriptType::P2WSH,
            [OP_DUP, OP_HASH160, 0x14, .., OP_EQUALVERIFY, OP_CHECKSIG] if script.len() == 25 => {
                ScriptType::P2PKH
            }
            _ => ScriptType::NonStandard,
        }
    }

    /// Whether coins locked by this script are spent with witness data
    pub fn is_witness(&self) -> bool {
        matches!(self, ScriptType::P2WPKH | ScriptType::P2WSH)
    }
}

/// `OP_2 <key_a> <key_b> OP_2 OP_CHECKMULTISIG`, keys in lexicographic order
/// so both peers derive the same script regardless of role.
pub fn multisig_2of2_script(a: &PublicKey, b: &PublicKey) -> Vec<u8> {
    let mut keys = [a.serialize(), b.serialize()];
    keys.sort();

    let mut script = Vec::with_capacity(71);
    script.push(OP_2);
    for key in &keys {
        script.push(key.len() as u8);
        script.extend_from_slice(key);
    }
    script.push(OP_2);
    script.push(OP_CHECKMULTISIG);
    script
}

/// `OP_0 <sha256(witness_script)>`
pub fn p2wsh_script_pubkey(witness_script: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(34);
    script.push(OP_0);
    script.push(0x20);
    script.extend_from_slice(&sha256(witness_script));
    script
}

/// `OP_0 <hash160(pubkey)>`
pub fn p2wpkh_script_pubkey(key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.push(OP_0);
    script.push(0x14);
    script.extend_from_slice(&hash160(&key.serialize()));
    script
}

/// BIP-143 script code for spending a P2WPKH output
pub fn p2wpkh_script_code(key: &PublicKey) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
    script.extend_from_slice(&hash160(&key.serialize()));
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// The channel funding output: P2WSH of the 2-of-2 between both keys
pub fn funding_output(a: &PublicKey, b: &PublicKey, capacity: u64) -> TxOut {
    TxOut::new(capacity, p2wsh_script_pubkey(&multisig_2of2_script(a, b)))
}

/// Whether `output` is exactly the funding output for these keys and capacity
pub fn is_funding_output(output: &TxOut, a: &PublicKey, b: &PublicKey, capacity: u64) -> bool {
    *output == funding_output(a, b, capacity)
}
