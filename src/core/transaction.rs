//! Transaction model
//!
//! Bitcoin-style transactions with segregated witness serialization:
//! - Consensus encoding with and without witness data
//! - Transaction id, weight and virtual size
//! - BIP-143 signature hashes for version 0 witness inputs
//! - The fixed 36-byte outpoint encoding used on the funding wire protocol

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::double_sha256;

// =============================================================================
// Constants
// =============================================================================

/// Current transaction version
pub const TX_VERSION: i32 = 2;

/// Sequence number that disables locktime and RBF
pub const SEQUENCE_FINAL: u32 = 0xFFFFFFFF;

/// Size of an encoded outpoint: 32-byte txid + 4-byte index
pub const OUTPOINT_SIZE: usize = 36;

/// Sign all inputs and all outputs
pub const SIGHASH_ALL: u32 = 0x01;

/// Witness scale factor between weight units and virtual bytes
pub const WITNESS_SCALE_FACTOR: usize = 4;

// =============================================================================
// Error Types
// =============================================================================

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Invalid transaction id: {0}")]
    InvalidTxid(String),
    #[error("Invalid outpoint: expected {} bytes, got {0}", OUTPOINT_SIZE)]
    InvalidOutPoint(usize),
    #[error("Input index {index} out of range ({count} inputs)")]
    InputOutOfRange { index: usize, count: usize },
}

// =============================================================================
// Txid
// =============================================================================

/// Transaction id in internal byte order (double SHA-256 of the
/// non-witness serialization). Displayed byte-reversed, as block explorers do.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Txid(pub [u8; 32]);

impl Txid {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from the byte-reversed display form
    pub fn from_hex(s: &str) -> Result<Self, TransactionError> {
        let mut bytes = hex::decode(s).map_err(|_| TransactionError::InvalidTxid(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(TransactionError::InvalidTxid(s.to_string()));
        }
        bytes.reverse();
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self)
    }
}

impl TryFrom<String> for Txid {
    type Error = TransactionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Txid> for String {
    fn from(txid: Txid) -> Self {
        txid.to_string()
    }
}

// =============================================================================
// OutPoint
// =============================================================================

/// Reference to a specific output of a specific transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, index: u32) -> Self {
        Self { txid, index }
    }

    /// Wire encoding: txid (internal order) followed by a big-endian index
    pub fn to_bytes(&self) -> [u8; OUTPOINT_SIZE] {
        let mut out = [0u8; OUTPOINT_SIZE];
        out[..32].copy_from_slice(&self.txid.0);
        out[32..].copy_from_slice(&self.index.to_be_bytes());
        out
    }

    /// Decode the wire encoding produced by [`OutPoint::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransactionError> {
        if bytes.len() != OUTPOINT_SIZE {
            return Err(TransactionError::InvalidOutPoint(bytes.len()));
        }
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&bytes[..32]);
        let index = u32::from_be_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]);
        Ok(Self {
            txid: Txid(txid),
            index,
        })
    }

    /// Consensus encoding (little-endian index), used inside transactions
    fn consensus_encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.txid.0);
        buf.extend_from_slice(&self.index.to_le_bytes());
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Transaction input (reference to a previous output)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    #[serde(with = "hex_bytes")]
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    #[serde(with = "hex_stack")]
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    /// An unsigned input spending `previous_output`
    pub fn new(previous_output: OutPoint) -> Self {
        Self {
            previous_output,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    /// Value in satoshis
    pub value: u64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    fn consensus_encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_bytes(buf, &self.script_pubkey);
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A transaction: ordered inputs and outputs plus version and locktime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Create an empty transaction
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn add_input(&mut self, input: TxIn) {
        self.inputs.push(input);
    }

    pub fn add_output(&mut self, output: TxOut) {
        self.outputs.push(output);
    }

    /// Whether any input carries witness data
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// Sum of all output values
    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Transaction id: double SHA-256 of the non-witness serialization
    pub fn txid(&self) -> Txid {
        Txid(double_sha256(&self.serialize_without_witness()))
    }

    /// Full serialization, including witness data when present (BIP-144)
    pub fn serialize(&self) -> Vec<u8> {
        self.encode(self.has_witness())
    }

    /// Legacy serialization, used for txid and base size
    pub fn serialize_without_witness(&self) -> Vec<u8> {
        self.encode(false)
    }

    /// Weight units: base size * 3 + total size
    pub fn weight(&self) -> usize {
        let base = self.serialize_without_witness().len();
        let total = self.serialize().len();
        base * (WITNESS_SCALE_FACTOR - 1) + total
    }

    /// Virtual size in bytes, rounded up
    pub fn vsize(&self) -> usize {
        (self.weight() + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
    }

    /// BIP-143 signature hash for a version 0 witness input
    pub fn segwit_v0_sighash(
        &self,
        input_index: usize,
        script_code: &[u8],
        value: u64,
        sighash_type: u32,
    ) -> Result<[u8; 32], TransactionError> {
        let input = self
            .inputs
            .get(input_index)
            .ok_or(TransactionError::InputOutOfRange {
                index: input_index,
                count: self.inputs.len(),
            })?;

        let mut prevouts = Vec::with_capacity(self.inputs.len() * OUTPOINT_SIZE);
        let mut sequences = Vec::with_capacity(self.inputs.len() * 4);
        for txin in &self.inputs {
            txin.previous_output.consensus_encode(&mut prevouts);
            sequences.extend_from_slice(&txin.sequence.to_le_bytes());
        }
        let mut outputs = Vec::new();
        for txout in &self.outputs {
            txout.consensus_encode(&mut outputs);
        }

        let mut preimage = Vec::with_capacity(160 + script_code.len());
        preimage.extend_from_slice(&self.version.to_le_bytes());
        preimage.extend_from_slice(&double_sha256(&prevouts));
        preimage.extend_from_slice(&double_sha256(&sequences));
        input.previous_output.consensus_encode(&mut preimage);
        write_bytes(&mut preimage, script_code);
        preimage.extend_from_slice(&value.to_le_bytes());
        preimage.extend_from_slice(&input.sequence.to_le_bytes());
        preimage.extend_from_slice(&double_sha256(&outputs));
        preimage.extend_from_slice(&self.lock_time.to_le_bytes());
        preimage.extend_from_slice(&sighash_type.to_le_bytes());

        Ok(double_sha256(&preimage))
    }

    fn encode(&self, with_witness: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        if with_witness {
            // segwit marker and flag
            buf.extend_from_slice(&[0x00, 0x01]);
        }
        write_compact_size(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.previous_output.consensus_encode(&mut buf);
            write_bytes(&mut buf, &input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_compact_size(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.consensus_encode(&mut buf);
        }
        if with_witness {
            for input in &self.inputs {
                write_compact_size(&mut buf, input.witness.len() as u64);
                for item in &input.witness {
                    write_bytes(&mut buf, item);
                }
            }
        }
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tx {} ({} vbytes)", self.txid(), self.vsize())?;
        for (i, input) in self.inputs.iter().enumerate() {
            writeln!(f, "  in {}: {}", i, input.previous_output)?;
        }
        for (i, output) in self.outputs.iter().enumerate() {
            writeln!(
                f,
                "  out {}: {} sat -> {}",
                i,
                output.value,
                hex::encode(&output.script_pubkey)
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Encoding helpers
// =============================================================================

/// Bitcoin CompactSize unsigned integer
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xFC => buf.push(n as u8),
        0xFD..=0xFFFF => {
            buf.push(0xFD);
            buf.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x10000..=0xFFFF_FFFF => {
            buf.push(0xFE);
            buf.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            buf.push(0xFF);
            buf.extend_from_slice(&n.to_le_bytes());
        }
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

mod hex_stack {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(stack: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(stack.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let items = Vec::<String>::deserialize(d)?;
        items
            .into_iter()
            .map(|item| hex::decode(item).map_err(serde::de::Error::custom))
            .collect()
    }
}
