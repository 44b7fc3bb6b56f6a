//! Wallet module for keys, coins and funding records

pub mod store;
pub mod wallet;

pub use store::{
    FundingRecord, FundingRole, StorageError, StoreConfig, WalletState, WalletStore, WalletUtxo,
};
pub use wallet::{LocalWallet, WalletError};
