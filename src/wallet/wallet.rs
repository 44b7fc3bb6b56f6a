//! Local wallet
//!
//! Seed-derived keys, witness coins and channel funding records, kept in a
//! single JSON store. Implements every collaborator contract the funding
//! coordinator drives.

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rand::RngCore;
use secp256k1::PublicKey;
use thiserror::Error;

use crate::core::{
    funding_output, p2wpkh_script_code, p2wpkh_script_pubkey, BloomFilter, OutPoint, ScriptType,
    Transaction, TransactionError, TxOut, DEFAULT_FP_RATE, SIGHASH_ALL,
};
use crate::crypto::{derive_secret_key, KeyError, KeyPair, PeerIdentity};
use crate::funding::{
    Broadcaster, ChangeMaker, FundingError, FundingSigner, FundingStore, KeyDerivation,
    SelectedUtxo, UtxoSelection, UtxoSelector,
};
use crate::network::message::ChannelDescriptor;
use crate::wallet::store::{
    FundingRecord, FundingRole, StorageError, StoreConfig, WalletState, WalletStore, WalletUtxo,
};

const WALLET_KEY_TAG: &str = "wallet";
const CHANNEL_KEY_TAG: &str = "channel";
const FUNDER_KEY_TAG: &str = "funder";
const NODE_KEY_TAG: &str = "node";

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Crypto error: {0}")]
    CryptoError(#[from] KeyError),
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),
    #[error("Wallet already exists in {0}")]
    AlreadyExists(String),
    #[error("Unknown funding {outpoint} for peer {peer}")]
    UnknownFunding {
        outpoint: OutPoint,
        peer: PeerIdentity,
    },
    #[error("Funding {0} already recorded")]
    DuplicateFunding(OutPoint),
    #[error("Coin {0} already in wallet")]
    DuplicateUtxo(OutPoint),
    #[error("Coin {0} is already spent by another funding transaction")]
    CoinLocked(OutPoint),
    #[error("No wallet coin for input {0}")]
    MissingInput(OutPoint),
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),
}

impl WalletError {
    /// Map onto the coordinator's taxonomy, wrapping anything untyped with `wrap`
    fn into_funding(self, wrap: fn(String) -> FundingError) -> FundingError {
        match self {
            WalletError::UnknownFunding { outpoint, peer } => {
                FundingError::UnknownFundingRequest { outpoint, peer }
            }
            WalletError::InvalidAmount(amount) => FundingError::InvalidAmount(amount.to_string()),
            other => wrap(other.to_string()),
        }
    }
}

struct Inner {
    state: WalletState,
    filter: BloomFilter,
}

/// A seed-backed wallet persisted to a JSON file
pub struct LocalWallet {
    store: WalletStore,
    inner: Mutex<Inner>,
}

impl LocalWallet {
    /// Create a fresh wallet with a random seed
    pub fn create(config: StoreConfig) -> Result<Self, WalletError> {
        let store = WalletStore::new(config.clone())?;
        if store.exists() {
            return Err(WalletError::AlreadyExists(
                config.data_dir.display().to_string(),
            ));
        }

        let mut seed = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let state = WalletState::new(seed);
        store.save(&state)?;

        log::info!("Created wallet in {}", config.data_dir.display());
        Self::from_parts(store, state)
    }

    /// Open an existing wallet
    pub fn open(config: StoreConfig) -> Result<Self, WalletError> {
        let store = WalletStore::new(config)?;
        let state = store.load()?;
        Self::from_parts(store, state)
    }

    pub fn open_or_create(config: StoreConfig) -> Result<Self, WalletError> {
        let store = WalletStore::new(config.clone())?;
        if store.exists() {
            Self::open(config)
        } else {
            Self::create(config)
        }
    }

    /// Open the wallet stored in `data_dir` with the default file name
    pub fn open_dir(data_dir: &Path) -> Result<Self, WalletError> {
        Self::open(StoreConfig::in_dir(data_dir))
    }

    fn from_parts(store: WalletStore, state: WalletState) -> Result<Self, WalletError> {
        let wallet = Self {
            store,
            inner: Mutex::new(Inner {
                state,
                filter: BloomFilter::new(8, 1, 0),
            }),
        };
        wallet.rebuild_filter()?;
        Ok(wallet)
    }

    // ========== Keys ==========

    fn wallet_key(seed: &[u8], index: u32) -> Result<KeyPair, KeyError> {
        let secret = derive_secret_key(seed, WALLET_KEY_TAG, &index.to_be_bytes())?;
        Ok(KeyPair::from_secret_key(secret))
    }

    /// Channel keys live in separate spaces per role, so a key handed out in
    /// `PUBRESP` never collides with one we fund with ourselves.
    fn channel_key(
        seed: &[u8],
        role: FundingRole,
        peer: &PeerIdentity,
        index: u32,
    ) -> Result<KeyPair, KeyError> {
        let tag = match role {
            FundingRole::Initiator => FUNDER_KEY_TAG,
            FundingRole::Responder => CHANNEL_KEY_TAG,
        };
        let mut data = peer.as_bytes().to_vec();
        data.extend_from_slice(&index.to_be_bytes());
        Ok(KeyPair::from_secret_key(derive_secret_key(seed, tag, &data)?))
    }

    fn wallet_pubkey(seed: &[u8], index: u32) -> Result<PublicKey, KeyError> {
        Ok(Self::wallet_key(seed, index)?.public_key)
    }

    fn channel_pubkey(
        seed: &[u8],
        role: FundingRole,
        peer: &PeerIdentity,
        index: u32,
    ) -> Result<PublicKey, KeyError> {
        Ok(Self::channel_key(seed, role, peer, index)?.public_key)
    }

    /// The key this wallet's node announces in its hello
    pub fn node_identity(&self) -> Result<PeerIdentity, WalletError> {
        let inner = self.inner.lock();
        let secret = derive_secret_key(&inner.state.seed, NODE_KEY_TAG, &[])?;
        let node_key = KeyPair::from_secret_key(secret);
        Ok(PeerIdentity::from_public_key(&node_key.public_key))
    }

    /// Allocate the next wallet key and return its index and P2WPKH script
    pub fn new_receive_script(&self) -> Result<(u32, Vec<u8>), WalletError> {
        let mut inner = self.inner.lock();
        let mut next = inner.state.clone();
        let index = next.next_key_index;
        let key = Self::wallet_pubkey(&next.seed, index)?;
        next.next_key_index += 1;

        self.store.save(&next)?;
        inner.state = next;
        Ok((index, p2wpkh_script_pubkey(&key)))
    }

    // ========== Coins ==========

    /// Record a P2WPKH coin paying wallet key `key_index`
    pub fn import_utxo(&self, outpoint: OutPoint, value: u64, key_index: u32) -> Result<(), WalletError> {
        let mut inner = self.inner.lock();
        if inner.state.utxos.iter().any(|u| u.outpoint == outpoint) {
            return Err(WalletError::DuplicateUtxo(outpoint));
        }

        let mut next = inner.state.clone();
        let key = Self::wallet_pubkey(&next.seed, key_index)?;
        next.utxos.push(WalletUtxo {
            outpoint,
            value,
            key_index,
            script_pubkey: p2wpkh_script_pubkey(&key),
            locked_by: None,
        });
        next.next_key_index = next.next_key_index.max(key_index + 1);

        self.store.save(&next)?;
        inner.state = next;
        log::info!("Imported {} sat coin {}", value, outpoint);
        Ok(())
    }

    /// Value of coins not yet committed to a funding transaction
    pub fn balance(&self) -> u64 {
        self.inner
            .lock()
            .state
            .utxos
            .iter()
            .filter(|u| u.locked_by.is_none())
            .map(|u| u.value)
            .sum()
    }

    pub fn utxos(&self) -> Vec<WalletUtxo> {
        self.inner.lock().state.utxos.clone()
    }

    pub fn fundings(&self) -> Vec<FundingRecord> {
        self.inner.lock().state.fundings.clone()
    }

    pub fn funding(&self, outpoint: &OutPoint) -> Option<FundingRecord> {
        self.inner.lock().state.funding(outpoint).cloned()
    }

    pub fn outbox(&self) -> Vec<String> {
        self.inner.lock().state.outbox.clone()
    }

    pub fn scan_filter(&self) -> BloomFilter {
        self.inner.lock().filter.clone()
    }

    // ========== Scan Filter ==========

    fn rebuild_filter(&self) -> Result<(), WalletError> {
        let mut inner = self.inner.lock();
        let state = &inner.state;

        let mut scripts = Vec::new();
        for index in 0..state.next_key_index {
            scripts.push(p2wpkh_script_pubkey(&Self::wallet_pubkey(&state.seed, index)?));
        }
        scripts.extend(state.utxos.iter().map(|u| u.script_pubkey.clone()));
        for record in &state.fundings {
            let out = funding_output(&record.own_pubkey, &record.counterparty, record.capacity);
            scripts.push(out.script_pubkey);
        }

        let elements = scripts.len() + state.fundings.len();
        let mut filter = BloomFilter::for_elements(elements, DEFAULT_FP_RATE, rand::random());
        for script in &scripts {
            filter.insert(script);
        }
        for record in &state.fundings {
            filter.insert_outpoint(&record.outpoint);
        }

        log::debug!("Rebuilt scan filter over {} elements", elements);
        inner.filter = filter;
        Ok(())
    }

    // ========== Funding Records ==========

    fn persist_unsigned(
        &self,
        mut tx: Transaction,
        capacity: u64,
        peer: &PeerIdentity,
        counterparty: &PublicKey,
    ) -> Result<(OutPoint, PublicKey), WalletError> {
        let mut inner = self.inner.lock();
        let mut next = inner.state.clone();

        let channel_index = next.channel_index(FundingRole::Initiator, peer);
        let own_pubkey =
            Self::channel_pubkey(&next.seed, FundingRole::Initiator, peer, channel_index)?;

        tx.add_output(funding_output(&own_pubkey, counterparty, capacity));
        let outpoint = OutPoint::new(tx.txid(), (tx.outputs.len() - 1) as u32);
        if next.funding(&outpoint).is_some() {
            return Err(WalletError::DuplicateFunding(outpoint));
        }

        for input in &tx.inputs {
            let prev = input.previous_output;
            let utxo = next
                .utxos
                .iter_mut()
                .find(|u| u.outpoint == prev)
                .ok_or(WalletError::MissingInput(prev))?;
            if utxo.locked_by.is_some() {
                return Err(WalletError::CoinLocked(prev));
            }
            utxo.locked_by = Some(outpoint);
        }

        next.fundings.push(FundingRecord {
            peer: *peer,
            role: FundingRole::Initiator,
            outpoint,
            capacity,
            channel_index,
            own_pubkey,
            counterparty: *counterparty,
            tx: Some(tx),
            created_at: Utc::now(),
            broadcast_at: None,
        });
        next.advance_channel_index(FundingRole::Initiator, peer);

        self.store.save(&next)?;
        inner.state = next;
        Ok((outpoint, own_pubkey))
    }

    fn persist_remote(&self, descriptor: &ChannelDescriptor, peer: &PeerIdentity) -> Result<(), WalletError> {
        if descriptor.capacity <= 0 {
            return Err(WalletError::InvalidAmount(descriptor.capacity));
        }

        let mut inner = self.inner.lock();
        if inner.state.funding(&descriptor.outpoint).is_some() {
            return Err(WalletError::DuplicateFunding(descriptor.outpoint));
        }

        let mut next = inner.state.clone();
        let channel_index = next.channel_index(FundingRole::Responder, peer);
        let own_pubkey =
            Self::channel_pubkey(&next.seed, FundingRole::Responder, peer, channel_index)?;

        next.fundings.push(FundingRecord {
            peer: *peer,
            role: FundingRole::Responder,
            outpoint: descriptor.outpoint,
            capacity: descriptor.capacity as u64,
            channel_index,
            own_pubkey,
            counterparty: descriptor.counterparty,
            tx: None,
            created_at: Utc::now(),
            broadcast_at: None,
        });
        next.advance_channel_index(FundingRole::Responder, peer);

        self.store.save(&next)?;
        inner.state = next;
        Ok(())
    }

    fn sign(&self, outpoint: &OutPoint, peer: &PeerIdentity) -> Result<Transaction, WalletError> {
        let inner = self.inner.lock();
        let state = &inner.state;

        let unknown = || WalletError::UnknownFunding {
            outpoint: *outpoint,
            peer: *peer,
        };
        let record = state
            .fundings
            .iter()
            .find(|f| f.outpoint == *outpoint && f.peer == *peer && f.role == FundingRole::Initiator)
            .ok_or_else(unknown)?;
        let mut tx = record.tx.clone().ok_or_else(unknown)?;

        for i in 0..tx.inputs.len() {
            let prev = tx.inputs[i].previous_output;
            let utxo = state
                .utxos
                .iter()
                .find(|u| u.outpoint == prev)
                .ok_or(WalletError::MissingInput(prev))?;

            let key = Self::wallet_key(&state.seed, utxo.key_index)?;
            let sighash = tx.segwit_v0_sighash(
                i,
                &p2wpkh_script_code(&key.public_key),
                utxo.value,
                SIGHASH_ALL,
            )?;

            let mut sig = key.sign_digest(&sighash)?;
            sig.push(SIGHASH_ALL as u8);
            tx.inputs[i].witness = vec![sig, key.public_key.serialize().to_vec()];
        }

        Ok(tx)
    }

    fn submit(&self, tx: &Transaction) -> Result<(), WalletError> {
        let mut inner = self.inner.lock();
        let mut next = inner.state.clone();
        let txid = tx.txid();

        next.outbox.push(hex::encode(tx.serialize()));
        next.utxos
            .retain(|u| !tx.inputs.iter().any(|i| i.previous_output == u.outpoint));
        for record in next.fundings.iter_mut().filter(|f| f.outpoint.txid == txid) {
            record.tx = Some(tx.clone());
            record.broadcast_at = Some(Utc::now());
        }

        self.store.save(&next)?;
        inner.state = next;
        log::info!(
            "Queued tx {} for broadcast ({} sat out)",
            txid,
            tx.total_output_value()
        );
        Ok(())
    }
}

// =============================================================================
// Funding Contracts
// =============================================================================

impl KeyDerivation for LocalWallet {
    fn next_channel_pubkey(&self, peer: &PeerIdentity) -> Result<PublicKey, FundingError> {
        let inner = self.inner.lock();
        let index = inner.state.channel_index(FundingRole::Responder, peer);
        Self::channel_pubkey(&inner.state.seed, FundingRole::Responder, peer, index)
            .map_err(|e| FundingError::DerivationError(e.to_string()))
    }
}

impl UtxoSelector for LocalWallet {
    /// Largest coins first until `amount` is covered.
    ///
    /// Coins already spent by a persisted funding transaction are skipped.
    fn select_utxos(&self, amount: u64, require_witness: bool) -> Result<UtxoSelection, FundingError> {
        let inner = self.inner.lock();
        let mut candidates: Vec<&WalletUtxo> = inner
            .state
            .utxos
            .iter()
            .filter(|u| u.locked_by.is_none())
            .filter(|u| !require_witness || ScriptType::classify(&u.script_pubkey).is_witness())
            .collect();
        candidates.sort_by(|a, b| b.value.cmp(&a.value));

        let mut inputs = Vec::new();
        let mut total = 0u64;
        for utxo in candidates {
            if total >= amount {
                break;
            }
            inputs.push(SelectedUtxo {
                outpoint: utxo.outpoint,
                value: utxo.value,
            });
            total += utxo.value;
        }

        let overshoot = total as i64 - amount as i64;
        log::debug!(
            "Selected {} coins totalling {} for {}, overshoot {}",
            inputs.len(),
            total,
            amount,
            overshoot
        );
        Ok(UtxoSelection { inputs, overshoot })
    }
}

impl ChangeMaker for LocalWallet {
    fn make_change_output(&self, amount: i64) -> Result<TxOut, FundingError> {
        if amount <= 0 {
            return Err(FundingError::InvalidAmount(format!(
                "change amount {} must be positive",
                amount
            )));
        }
        let (_, script) = self
            .new_receive_script()
            .map_err(|e| e.into_funding(FundingError::DerivationError))?;
        Ok(TxOut::new(amount as u64, script))
    }
}

impl FundingStore for LocalWallet {
    fn persist_unsigned_funding(
        &self,
        tx: Transaction,
        capacity: u64,
        peer: &PeerIdentity,
        counterparty: &PublicKey,
    ) -> Result<(OutPoint, PublicKey), FundingError> {
        self.persist_unsigned(tx, capacity, peer, counterparty)
            .map_err(|e| e.into_funding(FundingError::StorageError))
    }

    fn persist_remote_funding(
        &self,
        descriptor: &ChannelDescriptor,
        peer: &PeerIdentity,
    ) -> Result<(), FundingError> {
        self.persist_remote(descriptor, peer)
            .map_err(|e| e.into_funding(FundingError::StorageError))
    }

    fn refresh_scan_filter(&self) -> Result<(), FundingError> {
        self.rebuild_filter()
            .map_err(|e| e.into_funding(FundingError::StorageError))
    }
}

impl FundingSigner for LocalWallet {
    fn sign_funding(&self, outpoint: &OutPoint, peer: &PeerIdentity) -> Result<Transaction, FundingError> {
        self.sign(outpoint, peer)
            .map_err(|e| e.into_funding(FundingError::SigningError))
    }
}

impl Broadcaster for LocalWallet {
    fn submit_transaction(&self, tx: &Transaction) -> Result<(), FundingError> {
        self.submit(tx)
            .map_err(|e| e.into_funding(FundingError::BroadcastError))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FeeRate, Txid, VsizeFeeEstimator};
    use crate::crypto::{verify_digest, KeyPair};
    use crate::funding::TransactionAssembler;
    use tempfile::tempdir;

    fn peer() -> PeerIdentity {
        PeerIdentity::from_public_key(&KeyPair::generate().public_key)
    }

    fn funded_wallet(dir: &Path, values: &[u64]) -> LocalWallet {
        let wallet = LocalWallet::create(StoreConfig::in_dir(dir)).unwrap();
        for (i, value) in values.iter().enumerate() {
            wallet
                .import_utxo(OutPoint::new(Txid([i as u8 + 1; 32]), 0), *value, i as u32)
                .unwrap();
        }
        wallet
    }

    #[test]
    fn test_create_then_open_keeps_keys() {
        let dir = tempdir().unwrap();
        let p = peer();
        let key = {
            let wallet = LocalWallet::create(StoreConfig::in_dir(dir.path())).unwrap();
            wallet.next_channel_pubkey(&p).unwrap()
        };

        assert!(LocalWallet::create(StoreConfig::in_dir(dir.path())).is_err());
        let reopened = LocalWallet::open_dir(dir.path()).unwrap();
        assert_eq!(reopened.next_channel_pubkey(&p).unwrap(), key);
    }

    #[test]
    fn test_channel_key_advances_only_on_persist() {
        let dir = tempdir().unwrap();
        let wallet = LocalWallet::create(StoreConfig::in_dir(dir.path())).unwrap();
        let (a, b) = (peer(), peer());

        let first = wallet.next_channel_pubkey(&a).unwrap();
        assert_eq!(wallet.next_channel_pubkey(&a).unwrap(), first);
        assert_ne!(wallet.next_channel_pubkey(&b).unwrap(), first);

        let desc = ChannelDescriptor {
            outpoint: OutPoint::new(Txid([9; 32]), 1),
            counterparty: KeyPair::generate().public_key,
            capacity: 100_000,
        };
        wallet.persist_remote_funding(&desc, &a).unwrap();

        assert_ne!(wallet.next_channel_pubkey(&a).unwrap(), first);
        let record = wallet.funding(&desc.outpoint).unwrap();
        assert_eq!(record.own_pubkey, first);
        assert_eq!(record.role, FundingRole::Responder);

        let err = wallet.persist_remote_funding(&desc, &a).unwrap_err();
        assert!(matches!(err, FundingError::StorageError(_)));
    }

    #[test]
    fn test_funding_a_peer_keeps_advertised_key() {
        let dir = tempdir().unwrap();
        let wallet = funded_wallet(dir.path(), &[3_000_000]);
        let p = peer();

        // key advertised to p while we also open a channel to p
        let advertised = wallet.next_channel_pubkey(&p).unwrap();
        let proposal = TransactionAssembler::new(&wallet, &wallet, &VsizeFeeEstimator)
            .assemble(1_000_000, FeeRate(10))
            .unwrap();
        let (_, funder_key) = wallet
            .persist_unsigned_funding(proposal.tx, 1_000_000, &p, &KeyPair::generate().public_key)
            .unwrap();

        assert_ne!(funder_key, advertised);
        assert_eq!(wallet.next_channel_pubkey(&p).unwrap(), advertised);

        let desc = ChannelDescriptor {
            outpoint: OutPoint::new(Txid([9; 32]), 0),
            counterparty: KeyPair::generate().public_key,
            capacity: 500_000,
        };
        wallet.persist_remote_funding(&desc, &p).unwrap();
        assert_eq!(wallet.funding(&desc.outpoint).unwrap().own_pubkey, advertised);
    }

    #[test]
    fn test_select_largest_first() {
        let dir = tempdir().unwrap();
        let wallet = funded_wallet(dir.path(), &[10_000, 500_000, 200_000]);

        let selection = wallet.select_utxos(600_000, true).unwrap();
        let values: Vec<u64> = selection.inputs.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![500_000, 200_000]);
        assert_eq!(selection.overshoot, 100_000);

        let short = wallet.select_utxos(1_000_000, true).unwrap();
        assert_eq!(short.overshoot, 710_000 - 1_000_000);
    }

    #[test]
    fn test_select_skips_non_witness_coins() {
        let dir = tempdir().unwrap();
        let wallet = funded_wallet(dir.path(), &[50_000]);
        {
            let mut inner = wallet.inner.lock();
            let key = KeyPair::generate().public_key;
            inner.state.utxos.push(WalletUtxo {
                outpoint: OutPoint::new(Txid([0xEE; 32]), 0),
                value: 900_000,
                key_index: 0,
                script_pubkey: p2wpkh_script_code(&key),
                locked_by: None,
            });
        }

        let witness_only = wallet.select_utxos(40_000, true).unwrap();
        assert_eq!(witness_only.inputs.len(), 1);
        assert_eq!(witness_only.inputs[0].value, 50_000);

        let any = wallet.select_utxos(40_000, false).unwrap();
        assert_eq!(any.inputs[0].value, 900_000);
    }

    #[test]
    fn test_change_output_rejects_non_positive() {
        let dir = tempdir().unwrap();
        let wallet = LocalWallet::create(StoreConfig::in_dir(dir.path())).unwrap();

        assert!(matches!(
            wallet.make_change_output(0),
            Err(FundingError::InvalidAmount(_))
        ));
        assert!(matches!(
            wallet.make_change_output(-5),
            Err(FundingError::InvalidAmount(_))
        ));

        let out = wallet.make_change_output(8_500).unwrap();
        assert_eq!(out.value, 8_500);
        assert_eq!(ScriptType::classify(&out.script_pubkey), ScriptType::P2WPKH);
    }

    #[test]
    fn test_fund_sign_and_submit() {
        let dir = tempdir().unwrap();
        let wallet = funded_wallet(dir.path(), &[1_500_000, 800_000]);
        let p = peer();
        let counterparty = KeyPair::generate().public_key;

        let proposal = TransactionAssembler::new(&wallet, &wallet, &VsizeFeeEstimator)
            .assemble(2_000_000, FeeRate(10))
            .unwrap();
        let (outpoint, own) = wallet
            .persist_unsigned_funding(proposal.tx.clone(), 2_000_000, &p, &counterparty)
            .unwrap();

        // multisig output goes after change
        assert_eq!(outpoint.index, 1);
        let record = wallet.funding(&outpoint).unwrap();
        let stored = record.tx.unwrap();
        assert_eq!(stored.outputs[1], funding_output(&own, &counterparty, 2_000_000));
        assert_eq!(stored.txid(), outpoint.txid);

        // coins are committed to this funding
        assert_eq!(wallet.balance(), 0);
        assert!(wallet.select_utxos(1, true).unwrap().inputs.is_empty());

        let signed = wallet.sign_funding(&outpoint, &p).unwrap();
        assert_eq!(signed.txid(), outpoint.txid);
        for (i, input) in signed.inputs.iter().enumerate() {
            let pubkey = secp256k1::PublicKey::from_slice(&input.witness[1]).unwrap();
            let value = proposal.inputs[i].value;
            let digest = signed
                .segwit_v0_sighash(i, &p2wpkh_script_code(&pubkey), value, SIGHASH_ALL)
                .unwrap();
            let sig = &input.witness[0];
            assert_eq!(*sig.last().unwrap(), SIGHASH_ALL as u8);
            assert!(verify_digest(&pubkey, &digest, &sig[..sig.len() - 1]).unwrap());
        }

        wallet.submit_transaction(&signed).unwrap();
        assert_eq!(wallet.outbox(), vec![hex::encode(signed.serialize())]);
        assert!(wallet.utxos().is_empty());
        assert!(wallet.funding(&outpoint).unwrap().broadcast_at.is_some());
    }

    #[test]
    fn test_sign_unknown_funding() {
        let dir = tempdir().unwrap();
        let wallet = LocalWallet::create(StoreConfig::in_dir(dir.path())).unwrap();
        let p = peer();
        let outpoint = OutPoint::new(Txid([4; 32]), 0);

        let err = wallet.sign_funding(&outpoint, &p).unwrap_err();
        assert_eq!(err, FundingError::UnknownFundingRequest { outpoint, peer: p });
    }

    #[test]
    fn test_scan_filter_watches_funding() {
        let dir = tempdir().unwrap();
        let wallet = LocalWallet::create(StoreConfig::in_dir(dir.path())).unwrap();
        let desc = ChannelDescriptor {
            outpoint: OutPoint::new(Txid([9; 32]), 3),
            counterparty: KeyPair::generate().public_key,
            capacity: 75_000,
        };
        wallet.persist_remote_funding(&desc, &peer()).unwrap();

        wallet.refresh_scan_filter().unwrap();
        let filter = wallet.scan_filter();
        let record = wallet.funding(&desc.outpoint).unwrap();
        let script = funding_output(&record.own_pubkey, &desc.counterparty, 75_000).script_pubkey;
        assert!(filter.contains(&script));
    }
}
