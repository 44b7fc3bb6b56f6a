//! chanfund CLI Application
//!
//! Wallet management and a funding node that opens 2-of-2 channels.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use chanfund::cli::{self, FundRequest};
use chanfund::core::FeeRate;
use chanfund::funding::FundingConfig;
use chanfund::network::{NodeConfig, MAX_PEERS};

#[derive(Parser)]
#[command(name = "chanfund")]
#[command(version = "0.1.0")]
#[command(about = "Two-party multisig channel funding node", long_about = None)]
struct Cli {
    /// Data directory for wallet storage
    #[arg(short, long, default_value = ".chanfund_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Run a funding node
    Node {
        /// Port to listen on
        #[arg(short, long, default_value = "9735")]
        port: u16,

        /// Peers to connect to (comma-separated host:port)
        #[arg(long)]
        connect: Option<String>,

        /// Open a channel of this many satoshis with each connected peer
        #[arg(long)]
        fund: Option<u64>,

        /// Fee rate for funding transactions, sat/byte
        #[arg(long, default_value = "80")]
        fee_rate: u64,

        /// Check the signed funding output before broadcasting
        #[arg(long)]
        revalidate: bool,

        /// Maximum connected peers
        #[arg(long, default_value_t = MAX_PEERS)]
        max_peers: usize,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a new wallet
    Init,

    /// Show keys, coins and channels
    Info,

    /// Allocate a new receive script
    Receive,

    /// Record a coin paying one of the wallet's keys
    ImportUtxo {
        /// Funding transaction id (hex, display order)
        #[arg(long)]
        txid: String,

        /// Output index
        #[arg(long)]
        vout: u32,

        /// Value in satoshis
        #[arg(long)]
        value: u64,

        /// Wallet key index the output pays
        #[arg(long, default_value = "0")]
        key_index: u32,
    },

    /// Print raw transactions queued for broadcast
    Outbox,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Wallet { action } => match action {
            WalletCommands::Init => cli::cmd_wallet_init(&cli.data_dir)?,
            WalletCommands::Info => cli::cmd_wallet_info(&cli.data_dir)?,
            WalletCommands::Receive => cli::cmd_wallet_receive(&cli.data_dir)?,
            WalletCommands::ImportUtxo {
                txid,
                vout,
                value,
                key_index,
            } => cli::cmd_wallet_import_utxo(&cli.data_dir, &txid, vout, value, key_index)?,
            WalletCommands::Outbox => cli::cmd_wallet_outbox(&cli.data_dir)?,
        },
        Commands::Node {
            port,
            connect,
            fund,
            fee_rate,
            revalidate,
            max_peers,
        } => {
            let config = NodeConfig {
                listen_port: port,
                connect: connect
                    .map(|p| p.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
                data_dir: cli.data_dir.clone(),
                max_peers,
                funding: FundingConfig {
                    revalidate_before_sign: revalidate,
                },
            };
            let fund = fund.map(|capacity| FundRequest {
                capacity,
                fee_rate: FeeRate::from_sat_per_byte(fee_rate),
            });

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_node(config, fund))
                .map_err(|e| -> Box<dyn std::error::Error> { e })?;
        }
    }

    Ok(())
}
