//! CLI commands
//!
//! Implements the wallet and node command handlers.

use std::path::Path;
use std::sync::Arc;

use crate::core::{FeeRate, OutPoint, Txid, VsizeFeeEstimator};
use crate::network::{Node, NodeConfig, Server};
use crate::wallet::{FundingRole, LocalWallet, StoreConfig};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Channel to open once the first peer is connected
#[derive(Debug, Clone, Copy)]
pub struct FundRequest {
    pub capacity: u64,
    pub fee_rate: FeeRate,
}

/// Create a new wallet
pub fn cmd_wallet_init(data_dir: &Path) -> CliResult<()> {
    let wallet = LocalWallet::create(StoreConfig::in_dir(data_dir))?;

    println!("✅ Wallet created!");
    println!("   📁 Data directory: {:?}", data_dir);
    println!("   🔑 Node identity: {}", wallet.node_identity()?);
    Ok(())
}

/// Show keys, coins and funding records
pub fn cmd_wallet_info(data_dir: &Path) -> CliResult<()> {
    let wallet = LocalWallet::open_dir(data_dir)?;

    println!("👛 Wallet");
    println!("   🔑 Node identity: {}", wallet.node_identity()?);
    println!("   💰 Spendable: {} sat", wallet.balance());
    println!("   🔍 Scan filter: {} bytes", wallet.scan_filter().size());

    let utxos = wallet.utxos();
    println!("\n   Coins ({}):", utxos.len());
    for utxo in &utxos {
        let status = match utxo.locked_by {
            Some(funding) => format!("funding {}", funding),
            None => "available".to_string(),
        };
        println!(
            "   ├─ {} {} sat (key {}, {})",
            utxo.outpoint, utxo.value, utxo.key_index, status
        );
    }

    let fundings = wallet.fundings();
    println!("\n   Channels ({}):", fundings.len());
    for record in &fundings {
        let role = match record.role {
            FundingRole::Initiator => "funder",
            FundingRole::Responder => "fundee",
        };
        let state = if record.broadcast_at.is_some() {
            "broadcast"
        } else {
            "pending"
        };
        println!(
            "   ├─ {} {} sat with {} ({}, {})",
            record.outpoint, record.capacity, record.peer, role, state
        );
    }
    Ok(())
}

/// Allocate a fresh receive script
pub fn cmd_wallet_receive(data_dir: &Path) -> CliResult<()> {
    let wallet = LocalWallet::open_dir(data_dir)?;
    let (index, script) = wallet.new_receive_script()?;

    println!("📥 Receive key {}", index);
    println!("   Script: {}", hex::encode(script));
    Ok(())
}

/// Record a coin paying one of the wallet's keys
pub fn cmd_wallet_import_utxo(
    data_dir: &Path,
    txid: &str,
    vout: u32,
    value: u64,
    key_index: u32,
) -> CliResult<()> {
    let wallet = LocalWallet::open_dir(data_dir)?;
    let outpoint = OutPoint::new(Txid::from_hex(txid)?, vout);
    wallet.import_utxo(outpoint, value, key_index)?;

    println!("✅ Imported {} ({} sat)", outpoint, value);
    println!("   💰 Spendable: {} sat", wallet.balance());
    Ok(())
}

/// Print raw transactions queued for broadcast
pub fn cmd_wallet_outbox(data_dir: &Path) -> CliResult<()> {
    let wallet = LocalWallet::open_dir(data_dir)?;
    let outbox = wallet.outbox();

    if outbox.is_empty() {
        println!("📭 Outbox is empty");
    }
    for raw in outbox {
        println!("{}", raw);
    }
    Ok(())
}

/// Run a funding node until Ctrl+C
pub async fn cmd_node(
    mut config: NodeConfig,
    fund: Option<FundRequest>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let wallet = Arc::new(LocalWallet::open_or_create(StoreConfig::in_dir(
        &config.data_dir,
    ))?);
    let identity = wallet.node_identity()?;
    let targets = std::mem::take(&mut config.connect);

    println!("🌐 Starting node {} on port {}...", identity, config.listen_port);
    let server = Server::bind(config.listen_port).await?;
    let node = Arc::new(Node::new(
        config,
        identity,
        wallet,
        Arc::new(VsizeFeeEstimator),
    ));

    let runner = node.clone();
    let run_handle = tokio::spawn(async move { runner.run(server).await });

    for addr in &targets {
        let peer = match node.connect_to(addr).await {
            Ok(peer) => peer,
            Err(e) => {
                log::warn!("Failed to connect to {}: {}", addr, e);
                continue;
            }
        };
        println!("🤝 Connected to {} at {}", peer, addr);

        if let Some(req) = fund {
            node.request_funding(&peer, req.capacity, req.fee_rate)?;
            println!(
                "💸 Requested {} sat channel at {} sat/byte",
                req.capacity,
                req.fee_rate.as_sat_per_byte()
            );
        }
    }

    let status = node.status();
    println!(
        "📡 Listening on {} with {} peer(s)",
        status.listen_port,
        status.peers.len()
    );
    for peer in &status.peers {
        println!("   ├─ {} at {}", peer.identity, peer.addr);
    }

    tokio::signal::ctrl_c().await?;
    println!("\n📴 Shutting down node...");
    node.shutdown().await;
    run_handle.await??;
    Ok(())
}
