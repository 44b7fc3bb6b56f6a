//! Wallet persistence layer
//!
//! The whole wallet state lives in one JSON document, rewritten atomically
//! on every mutation.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{OutPoint, Transaction};
use crate::crypto::PeerIdentity;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub wallet_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".chanfund_data"),
            wallet_file: "wallet.json".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Persisted Records
// =============================================================================

/// A coin the wallet can spend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletUtxo {
    pub outpoint: OutPoint,
    pub value: u64,
    /// Index of the wallet key that controls this coin
    pub key_index: u32,
    #[serde(with = "hex::serde")]
    pub script_pubkey: Vec<u8>,
    /// Set once a persisted funding transaction spends this coin
    pub locked_by: Option<OutPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingRole {
    /// We built and pay for the funding transaction
    Initiator,
    /// The peer funds; we only hold one of the two keys
    Responder,
}

/// One channel funding output, from either side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub peer: PeerIdentity,
    pub role: FundingRole,
    pub outpoint: OutPoint,
    pub capacity: u64,
    /// Per-peer channel key index used for `own_pubkey`
    pub channel_index: u32,
    pub own_pubkey: PublicKey,
    pub counterparty: PublicKey,
    /// Initiator only: the funding transaction, unsigned until broadcast
    pub tx: Option<Transaction>,
    pub created_at: DateTime<Utc>,
    pub broadcast_at: Option<DateTime<Utc>>,
}

/// Everything the local wallet persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletState {
    #[serde(with = "hex::serde")]
    pub seed: Vec<u8>,
    /// Next unused wallet (receive/change) key index
    pub next_key_index: u32,
    /// Next unused channel key index handed out to each peer as responder
    pub channel_indices: BTreeMap<PeerIdentity, u32>,
    /// Next unused channel key index for fundings we initiate, per peer
    #[serde(default)]
    pub funder_indices: BTreeMap<PeerIdentity, u32>,
    pub utxos: Vec<WalletUtxo>,
    pub fundings: Vec<FundingRecord>,
    /// Raw hex of every submitted transaction, oldest first
    pub outbox: Vec<String>,
}

impl WalletState {
    pub fn new(seed: Vec<u8>) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }

    pub fn funding(&self, outpoint: &OutPoint) -> Option<&FundingRecord> {
        self.fundings.iter().find(|f| f.outpoint == *outpoint)
    }

    fn indices(&self, role: FundingRole) -> &BTreeMap<PeerIdentity, u32> {
        match role {
            FundingRole::Initiator => &self.funder_indices,
            FundingRole::Responder => &self.channel_indices,
        }
    }

    pub fn channel_index(&self, role: FundingRole, peer: &PeerIdentity) -> u32 {
        self.indices(role).get(peer).copied().unwrap_or(0)
    }

    pub fn advance_channel_index(&mut self, role: FundingRole, peer: &PeerIdentity) {
        let indices = match role {
            FundingRole::Initiator => &mut self.funder_indices,
            FundingRole::Responder => &mut self.channel_indices,
        };
        *indices.entry(*peer).or_insert(0) += 1;
    }
}

// =============================================================================
// Store
// =============================================================================

/// Wallet storage manager
pub struct WalletStore {
    config: StoreConfig,
}

impl WalletStore {
    pub fn new(config: StoreConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self { config })
    }

    fn wallet_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.wallet_file)
    }

    pub fn exists(&self) -> bool {
        self.wallet_path().exists()
    }

    /// Write the state to a temp file, then rename over the wallet file
    pub fn save(&self, state: &WalletState) -> Result<(), StorageError> {
        let path = self.wallet_path();
        let temp_path = self
            .config
            .data_dir
            .join(format!("{}.tmp", self.config.wallet_file));

        let file = fs::File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, state)?;
        writer.flush()?;

        fs::rename(&temp_path, &path)?;
        log::debug!("Saved wallet to {}", path.display());
        Ok(())
    }

    pub fn load(&self) -> Result<WalletState, StorageError> {
        let path = self.wallet_path();
        if !path.exists() {
            return Err(StorageError::InvalidData(format!(
                "Wallet file not found: {}",
                path.display()
            )));
        }

        let file = fs::File::open(&path)?;
        let state: WalletState = serde_json::from_reader(BufReader::new(file))?;
        if state.seed.len() != 32 {
            return Err(StorageError::InvalidData(format!(
                "seed must be 32 bytes, found {}",
                state.seed.len()
            )));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Txid;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = WalletStore::new(StoreConfig::in_dir(dir.path())).unwrap();
        assert!(!store.exists());

        let mut state = WalletState::new(vec![7u8; 32]);
        state.next_key_index = 3;
        state.utxos.push(WalletUtxo {
            outpoint: OutPoint::new(Txid([1; 32]), 2),
            value: 50_000,
            key_index: 0,
            script_pubkey: vec![0x00, 0x14],
            locked_by: None,
        });
        state.outbox.push("00ff".into());
        store.save(&state).unwrap();

        assert!(store.exists());
        let loaded = store.load().unwrap();
        assert_eq!(loaded.seed, state.seed);
        assert_eq!(loaded.next_key_index, 3);
        assert_eq!(loaded.utxos, state.utxos);
        assert_eq!(loaded.outbox, state.outbox);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let store = WalletStore::new(StoreConfig::in_dir(dir.path())).unwrap();
        assert!(matches!(store.load(), Err(StorageError::InvalidData(_))));
    }

    #[test]
    fn test_rejects_short_seed() {
        let dir = tempdir().unwrap();
        let store = WalletStore::new(StoreConfig::in_dir(dir.path())).unwrap();
        store.save(&WalletState::new(vec![1, 2, 3])).unwrap();
        assert!(store.load().is_err());
    }

    #[test]
    fn test_channel_indices_per_role() {
        let peer = PeerIdentity::from_public_key(&crate::crypto::KeyPair::generate().public_key);
        let mut state = WalletState::new(vec![7u8; 32]);

        state.advance_channel_index(FundingRole::Initiator, &peer);
        state.advance_channel_index(FundingRole::Initiator, &peer);
        assert_eq!(state.channel_index(FundingRole::Initiator, &peer), 2);
        assert_eq!(state.channel_index(FundingRole::Responder, &peer), 0);

        // files written before the funder counter existed still load
        let mut json = serde_json::to_value(&state).unwrap();
        json.as_object_mut().unwrap().remove("funder_indices");
        let old: WalletState = serde_json::from_value(json).unwrap();
        assert_eq!(old.channel_index(FundingRole::Initiator, &peer), 0);
    }
}
