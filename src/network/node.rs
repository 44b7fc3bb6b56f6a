//! Funding node
//!
//! Owns the listener, outbound connections and the single dispatch loop that
//! feeds inbound funding messages to the coordinator one at a time.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::core::{FeeEstimator, FeeRate};
use crate::crypto::PeerIdentity;
use crate::funding::{FundingConfig, FundingCoordinator, FundingError, FundingWallet};
use crate::network::peer::{PeerError, PeerInfo, PeerManager, MAX_PEERS};
use crate::network::server::{connect_to_peer, start_session, InboundFrame, Server};

/// Inbound frames buffered between connections and the dispatcher
const INBOUND_QUEUE_SIZE: usize = 1000;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Port to listen on
    pub listen_port: u16,
    /// Peers to dial on start
    pub connect: Vec<String>,
    /// Directory holding the wallet file
    pub data_dir: PathBuf,
    pub max_peers: usize,
    pub funding: FundingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_port: 9735,
            connect: Vec::new(),
            data_dir: PathBuf::from(".chanfund_data"),
            max_peers: MAX_PEERS,
            funding: FundingConfig::default(),
        }
    }
}

/// Node status information
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub identity: PeerIdentity,
    pub listen_port: u16,
    pub peers: Vec<PeerInfo>,
}

pub struct Node {
    pub config: NodeConfig,
    identity: PeerIdentity,
    peer_manager: Arc<PeerManager>,
    coordinator: Arc<FundingCoordinator>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundFrame>>>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Node {
    pub fn new(
        config: NodeConfig,
        identity: PeerIdentity,
        wallet: Arc<dyn FundingWallet>,
        fee_estimator: Arc<dyn FeeEstimator>,
    ) -> Self {
        let peer_manager = Arc::new(PeerManager::new(config.max_peers));
        let coordinator = Arc::new(FundingCoordinator::new(
            wallet,
            peer_manager.clone(),
            fee_estimator,
            config.funding.clone(),
        ));
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Self {
            config,
            identity,
            peer_manager,
            coordinator,
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        }
    }

    pub fn identity(&self) -> PeerIdentity {
        self.identity
    }

    pub fn peer_manager(&self) -> Arc<PeerManager> {
        self.peer_manager.clone()
    }

    pub fn coordinator(&self) -> Arc<FundingCoordinator> {
        self.coordinator.clone()
    }

    /// Bind the configured port and run until shutdown
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let server = Server::bind(self.config.listen_port).await?;
        self.run(server).await
    }

    /// Accept on `server`, dial configured peers and dispatch until shutdown
    pub async fn run(&self, server: Server) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inbound_rx = self
            .inbound_rx
            .lock()
            .take()
            .ok_or("node is already running")?;
        let mut shutdown_rx = self
            .shutdown_rx
            .lock()
            .take()
            .ok_or("node is already running")?;

        log::info!("Node {} listening on {}", self.identity, server.local_addr()?);

        let accept_pm = self.peer_manager.clone();
        let accept_tx = self.inbound_tx.clone();
        let identity = self.identity;
        let acceptor = tokio::spawn(async move {
            loop {
                match server.accept().await {
                    Ok((stream, addr)) => {
                        log::info!("Incoming connection from {}", addr);
                        let pm = accept_pm.clone();
                        let tx = accept_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = start_session(stream, addr, pm, identity, tx, false).await {
                                log::warn!("Connection error with {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("Accept error: {}", e);
                    }
                }
            }
        });

        for addr in &self.config.connect {
            if let Err(e) = self.connect_to(addr).await {
                log::warn!("Failed to connect to {}: {}", addr, e);
            }
        }

        loop {
            tokio::select! {
                Some((peer, frame)) = inbound_rx.recv() => {
                    self.dispatch(peer, frame).await;
                }
                _ = shutdown_rx.recv() => {
                    log::info!("Node shutting down...");
                    break;
                }
            }
        }

        acceptor.abort();
        Ok(())
    }

    /// Dial `addr` and return the identity it announced
    pub async fn connect_to(&self, addr: &str) -> Result<PeerIdentity, PeerError> {
        log::info!("Connecting to peer: {}", addr);
        let (stream, peer_addr) = connect_to_peer(addr).await?;
        start_session(
            stream,
            peer_addr,
            self.peer_manager.clone(),
            self.identity,
            self.inbound_tx.clone(),
            true,
        )
        .await
    }

    async fn dispatch(&self, peer: PeerIdentity, frame: Vec<u8>) {
        let coordinator = self.coordinator.clone();
        let handled = tokio::task::spawn_blocking(move || coordinator.handle_frame(&peer, &frame)).await;
        // handler failures are already logged by the coordinator
        if let Err(e) = handled {
            log::error!("Handler for {} aborted: {}", peer, e);
        }
    }

    pub fn request_funding(
        &self,
        peer: &PeerIdentity,
        capacity: u64,
        fee_rate: FeeRate,
    ) -> Result<(), FundingError> {
        self.coordinator.request_funding(peer, capacity, fee_rate)
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus {
            identity: self.identity,
            listen_port: self.config.listen_port,
            peers: self.peer_manager.peers(),
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}
