mod cli;
mod logging;

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use catena_chain_types::Block;
use catena_crypto::{Hash, PrivateKey};
use catena_node::{Config, GenesisConfig, Node};
use clap::Parser;
use cli::{Cli, Command, GenesisArgs, RunArgs};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => run(args).await,
        Command::Keygen => keygen(),
        Command::Genesis(args) => genesis(args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads the TOML configuration file, applies CLI overrides on top of it,
/// and runs the node until `ctrl_c` — the "file base + CLI override" shape
/// `bin/oe/configuration.rs` uses, scaled down to this node's own knobs.
async fn run(args: RunArgs) -> Result<(), String> {
    let text = fs::read_to_string(&args.config)
        .map_err(|e| format!("reading {}: {e}", args.config.display()))?;
    let mut config: Config =
        toml::from_str(&text).map_err(|e| format!("parsing {}: {e}", args.config.display()))?;

    if let Some(port) = args.listen_port {
        config.listen_port = port;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if args.no_mine {
        config.mining = false;
    }
    if args.validate_only {
        config.validate_only = true;
    }

    fs::create_dir_all(&config.data_dir)
        .map_err(|e| format!("creating data dir {}: {e}", config.data_dir.display()))?;

    let handle = tokio::runtime::Handle::current();
    let node = Node::new(config, handle).map_err(|e| e.to_string())?;
    node.serve();

    log::info!(
        "catena node listening on port {}, identity {}",
        node.config().listen_port,
        node.identity()
    );

    let ticker = {
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(2));
            loop {
                interval.tick().await;
                node.tick().await;
            }
        })
    };

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("waiting for shutdown signal: {e}"))?;

    log::info!("shutting down");
    ticker.abort();
    node.shutdown();
    let stats = node.stats();
    log::info!(
        "final stats: {} blocks applied, {} transactions admitted, {} rejected",
        stats.blocks_applied,
        stats.transactions_admitted,
        stats.transactions_rejected
    );
    Ok(())
}

fn keygen() -> Result<(), String> {
    let key = PrivateKey::generate();
    println!("public:  {}", key.public().to_base58check());
    println!("private: {}", key.to_base58check());
    Ok(())
}

#[derive(serde::Serialize)]
struct GenesisTable {
    genesis: GenesisConfig,
}

/// Mines a genesis block from a seed string at the requested difficulty
/// and prints it as a `[genesis]` TOML table ready to paste into a node's
/// configuration file. Every node on the same network must start from an
/// identical genesis, so this is a one-time, out-of-band step rather than
/// something each node computes for itself at startup.
fn genesis(args: GenesisArgs) -> Result<(), String> {
    let miner = match &args.miner {
        Some(hex) => Hash::from_hex(hex).ok_or_else(|| format!("malformed --miner hash: {hex}"))?,
        None => Hash::ZERO,
    };
    let mut block = Block::genesis(args.version, miner, 0, args.seed.clone());
    if !block.mine(args.difficulty, 0, u64::MAX) {
        return Err("exhausted the nonce space without meeting the requested difficulty".to_string());
    }
    let genesis = GenesisConfig {
        version: args.version,
        miner: block.miner.to_hex(),
        timestamp: block.timestamp,
        nonce: block.nonce,
        seed: args.seed,
        signature: block.signature.expect("mine() only returns true once sealed").to_hex(),
    };
    let rendered = toml::to_string_pretty(&GenesisTable { genesis })
        .map_err(|e| format!("rendering genesis TOML: {e}"))?;
    print!("{rendered}");
    Ok(())
}
