//! Command-line interface

pub mod commands;

pub use commands::{
    cmd_node, cmd_wallet_import_utxo, cmd_wallet_info, cmd_wallet_init, cmd_wallet_outbox,
    cmd_wallet_receive, CliResult, FundRequest,
};
