use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "catena", about = "Permissioned SQL-ledger blockchain node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs a node against a TOML configuration file.
    Run(RunArgs),
    /// Generates a new Ed25519 identity keypair and prints it.
    Keygen,
    /// Mines a genesis block and prints it as a TOML `[genesis]` table.
    Genesis(GenesisArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Path to the node's TOML configuration file.
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Overrides `listen_port` from the configuration file.
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Overrides `data_dir` from the configuration file.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Disables the background miner regardless of the configuration
    /// file's `mining` setting.
    #[arg(long)]
    pub no_mine: bool,

    /// Runs in validate-only mode regardless of the configuration file's
    /// `validate_only` setting (§4.7: only metadata-visible statements are
    /// executed).
    #[arg(long)]
    pub validate_only: bool,
}

#[derive(Debug, Parser)]
pub struct GenesisArgs {
    /// Opaque seed string carried in the genesis block's payload.
    #[arg(long)]
    pub seed: String,

    /// Required leading zero bits of the mined genesis signature.
    #[arg(long, default_value_t = 10)]
    pub difficulty: u32,

    /// Block format version.
    #[arg(long, default_value_t = 1)]
    pub version: u8,

    /// Hex-encoded identity hash of the genesis block's nominal miner.
    /// Defaults to the all-zero hash when no network founder key is given.
    #[arg(long)]
    pub miner: Option<String>,
}
