//! Node configuration (`SPEC_FULL.md` §B): network id/UUID, listen port,
//! data directory, seed peers, genesis block, mining on/off, database path.
//! Loaded from a TOML file by `bin/catena`; this struct is the `serde`
//! target, with CLI flags applied as an overlay on top of it.

use std::path::PathBuf;

use catena_crypto::Hash;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_true() -> bool {
    true
}

fn default_desired_time_between_blocks() -> u64 {
    30
}

fn default_version() -> u8 {
    1
}

/// A genesis block is identical bit-for-bit across every node in a
/// network, so it is distributed as data rather than mined independently
/// by each node at startup (an independently-mined genesis would pick a
/// random nonce and diverge immediately). This is the on-disk shape of
/// that distributed genesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_version")]
    pub version: u8,
    /// Hex-encoded identity hash of the block's nominal miner.
    pub miner: String,
    pub timestamp: u64,
    pub nonce: u64,
    pub seed: String,
    /// Hex-encoded signature hash; already satisfies the network's
    /// genesis difficulty.
    pub signature: String,
}

impl GenesisConfig {
    pub fn miner_hash(&self) -> Result<Hash, String> {
        Hash::from_hex(&self.miner).ok_or_else(|| format!("malformed genesis miner hash: {}", self.miner))
    }

    pub fn signature_hash(&self) -> Result<Hash, String> {
        Hash::from_hex(&self.signature)
            .ok_or_else(|| format!("malformed genesis signature hash: {}", self.signature))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This node's identity in the gossip overlay (§4.10 handshake).
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,
    pub listen_port: u16,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub seed_peers: Vec<String>,
    pub genesis: GenesisConfig,
    /// Base58Check-encoded Ed25519 private key (version 11) this node
    /// signs mined blocks and submitted transactions with.
    pub identity_key: String,
    #[serde(default = "default_true")]
    pub mining: bool,
    #[serde(default = "default_desired_time_between_blocks")]
    pub desired_time_between_blocks: u64,
    #[serde(default = "default_version")]
    pub version: u8,
    /// When true, the store only executes metadata-visible transactions
    /// (§4.7) rather than the full statement set — a read-replica /
    /// validate-only node.
    #[serde(default)]
    pub validate_only: bool,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("catena.sqlite")
    }
}
