//! chanfund: two-party 2-of-2 multisig channel funding
//!
//! Two nodes agree on a funding output over a four-message handshake:
//!
//! 1. the initiator asks for a channel key (`PUBREQ`),
//! 2. the responder answers with one (`PUBRESP`),
//! 3. the initiator builds and persists the funding transaction and describes
//!    its multisig output (`MULTIDESC`),
//! 4. the responder saves the description and acknowledges (`MULTIACK`),
//!    after which the initiator signs and broadcasts.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chanfund::core::{FeeRate, VsizeFeeEstimator};
//! use chanfund::network::{Node, NodeConfig};
//! use chanfund::wallet::{LocalWallet, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let wallet = Arc::new(LocalWallet::open_or_create(StoreConfig::default())?);
//! let identity = wallet.node_identity()?;
//! let node = Node::new(NodeConfig::default(), identity, wallet, Arc::new(VsizeFeeEstimator));
//!
//! let peer = node.connect_to("127.0.0.1:9735").await?;
//! node.request_funding(&peer, 2_000_000, FeeRate(80))?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod funding;
pub mod network;
pub mod wallet;

// Re-export commonly used types
pub use crate::core::{FeeEstimator, FeeRate, OutPoint, Transaction, VsizeFeeEstimator};
pub use crate::crypto::{KeyPair, PeerIdentity};
pub use crate::funding::{FundingConfig, FundingCoordinator, FundingError};
pub use crate::network::{Node, NodeConfig};
pub use crate::wallet::{LocalWallet, StoreConfig};
