//! Peer management
//!
//! Tracks live peer sessions by identity and routes outbound funding
//! messages to their writer tasks.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::crypto::PeerIdentity;
use crate::funding::{FundingError, Transport};

/// Maximum number of connected peers
pub const MAX_PEERS: usize = 8;

/// Outbound frames buffered per peer before sends start failing
pub const PEER_QUEUE_SIZE: usize = 32;

/// Peer connection errors
#[derive(Error, Debug)]
pub enum PeerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Peer disconnected")]
    Disconnected,
    #[error("Max peers reached")]
    MaxPeersReached,
    #[error("Invalid hello: {0}")]
    InvalidHello(String),
    #[error("Hello timed out")]
    Timeout,
    #[error("Peer {0} already connected")]
    AlreadyConnected(PeerIdentity),
    #[error("Refusing connection to self")]
    SelfConnection,
}

/// Information about a connected peer
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub identity: PeerIdentity,
    pub addr: SocketAddr,
    /// Whether we dialed this peer
    pub outbound: bool,
    pub connected_at: DateTime<Utc>,
}

/// Handle for sending frames to a peer's writer task
#[derive(Clone)]
pub struct PeerHandle {
    pub info: PeerInfo,
    pub tx: mpsc::Sender<Vec<u8>>,
}

impl PeerHandle {
    pub fn new(identity: PeerIdentity, addr: SocketAddr, outbound: bool, tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            info: PeerInfo {
                identity,
                addr,
                outbound,
                connected_at: Utc::now(),
            },
            tx,
        }
    }
}

/// Manages all peer connections
pub struct PeerManager {
    handles: RwLock<HashMap<PeerIdentity, PeerHandle>>,
    max_peers: usize,
}

impl Default for PeerManager {
    fn default() -> Self {
        Self::new(MAX_PEERS)
    }
}

impl PeerManager {
    pub fn new(max_peers: usize) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            max_peers,
        }
    }

    /// Register a peer whose hello has been received
    pub fn add_peer(&self, handle: PeerHandle) -> Result<(), PeerError> {
        let mut handles = self.handles.write();
        let identity = handle.info.identity;

        if handles.contains_key(&identity) {
            return Err(PeerError::AlreadyConnected(identity));
        }
        if handles.len() >= self.max_peers {
            return Err(PeerError::MaxPeersReached);
        }

        log::info!(
            "Added peer {} at {} (outbound: {})",
            identity,
            handle.info.addr,
            handle.info.outbound
        );
        handles.insert(identity, handle);
        Ok(())
    }

    pub fn remove_peer(&self, identity: &PeerIdentity) {
        if self.handles.write().remove(identity).is_some() {
            log::info!("Removed peer {}", identity);
        }
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.handles.read().values().map(|h| h.info.clone()).collect()
    }
}

impl Transport for PeerManager {
    /// Queue one frame for `peer` without waiting; a full queue is an error.
    fn send_bytes(&self, peer: &PeerIdentity, bytes: Vec<u8>) -> Result<(), FundingError> {
        let handles = self.handles.read();
        let handle = handles.get(peer).ok_or(FundingError::NotConnected(*peer))?;

        handle.tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => FundingError::IoError(format!("send queue to {} is full", peer)),
            TrySendError::Closed(_) => FundingError::NotConnected(*peer),
        })
    }
}
