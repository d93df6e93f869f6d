// Copyright 2024-2026 Catena developers.
// This file is part of Catena.

// Catena is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Catena is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Catena.  If not, see <http://www.gnu.org/licenses/>.

//! The miner (C9, §4.9): holds a pool of pending transactions and, while
//! enabled and the pool is non-empty, runs a background proof-of-work loop
//! that builds a candidate block on top of the ledger's current tip and
//! hands any sealed block back to the node via the `on_mined` callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use catena_chain_types::{Block, Transaction};
use catena_crypto::Hash;
use catena_ledger::Ledger;
use parking_lot::Mutex;

/// Nonce attempts per tip snapshot before the mining loop re-reads the
/// ledger's tip and re-checks whether it is still enabled. Bounds how far a
/// disable request or a tip change can lag before the loop notices.
const ATTEMPTS_PER_SWEEP: u64 = 4096;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub struct Miner {
    pool: Mutex<Vec<Transaction>>,
    enabled: AtomicBool,
    mining: AtomicBool,
    version: u8,
    identity: Hash,
    ledger: Arc<Mutex<Ledger>>,
    on_mined: Box<dyn Fn(Block) + Send + Sync>,
}

impl Miner {
    pub fn new(
        ledger: Arc<Mutex<Ledger>>,
        version: u8,
        identity: Hash,
        on_mined: impl Fn(Block) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Miner {
            pool: Mutex::new(Vec::new()),
            enabled: AtomicBool::new(true),
            mining: AtomicBool::new(false),
            version,
            identity,
            ledger,
            on_mined: Box::new(on_mined),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Turning mining off stops the background loop at its next sweep
    /// boundary; it does not interrupt an in-flight attempt burst.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn pool(&self) -> Vec<Transaction> {
        self.pool.lock().clone()
    }

    /// `append(callback)` generalized to a direct transaction push: adds
    /// `tx` to the candidate pool under lock (idempotent on duplicate
    /// signatures), then schedules a mining task if none is currently
    /// running.
    pub fn append(self: &Arc<Self>, tx: Transaction) {
        {
            let mut pool = self.pool.lock();
            if pool.iter().any(|queued| queued.signature == tx.signature) {
                return;
            }
            pool.push(tx);
        }
        self.ensure_mining();
    }

    fn ensure_mining(self: &Arc<Self>) {
        if self.mining.swap(true, Ordering::SeqCst) {
            return;
        }
        let miner = Arc::clone(self);
        thread::spawn(move || miner.mine_loop());
    }

    fn mine_loop(self: Arc<Self>) {
        loop {
            if !self.enabled.load(Ordering::SeqCst) {
                self.mining.store(false, Ordering::SeqCst);
                return;
            }

            let pending = self.pool.lock().clone();
            if pending.is_empty() {
                self.mining.store(false, Ordering::SeqCst);
                return;
            }

            let (tip, required) = {
                let ledger = self.ledger.lock();
                let tip = ledger.highest().clone();
                match ledger.chain().required_difficulty() {
                    Ok(required) => (tip, required),
                    Err(e) => {
                        log::warn!("miner could not read required difficulty: {e}");
                        self.mining.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            };

            let tip_signature = match tip.signature {
                Some(s) => s,
                None => {
                    log::warn!("miner found an unsigned chain tip, stopping");
                    self.mining.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let mut candidate = Block::new(self.version, tip.index + 1, tip_signature, self.identity, now());
            for tx in &pending {
                if candidate.append(tx.clone()).is_err() {
                    break;
                }
            }
            if candidate.transactions().is_empty() {
                self.mining.store(false, Ordering::SeqCst);
                return;
            }

            candidate.begin_mining(now());
            let mut sealed = false;
            for _ in 0..ATTEMPTS_PER_SWEEP {
                if !self.enabled.load(Ordering::SeqCst) {
                    break;
                }
                if candidate.try_seal(required) {
                    sealed = true;
                    break;
                }
            }

            if sealed {
                let mined = candidate.transactions().to_vec();
                {
                    let mut pool = self.pool.lock();
                    pool.retain(|queued| !mined.iter().any(|t| t.signature == queued.signature));
                }
                (self.on_mined)(candidate);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_chain_types::Block as ChainBlock;
    use catena_crypto::PrivateKey;
    use catena_sql_parser::parse;
    use catena_store::{Blockchain, ExecutionMode};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicU64;
    use std::sync::mpsc;
    use std::time::Duration;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_db_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("catena-miner-test-{}-{}.sqlite", std::process::id(), n))
    }

    fn genesis(key: &PrivateKey) -> ChainBlock {
        let mut g = ChainBlock::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        assert!(g.mine(1, 0, 1_000_000));
        g
    }

    #[test]
    fn appending_a_transaction_eventually_mines_a_block() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key);
        let chain = Blockchain::open(path.clone(), g, 10, ExecutionMode::Full).unwrap();
        let ledger = Arc::new(Mutex::new(Ledger::new(chain)));

        let (tx_sender, tx_receiver) = mpsc::channel();
        let identity = key.public().identity_hash();
        let miner = Miner::new(Arc::clone(&ledger), 1, identity, move |block| {
            tx_sender.send(block).unwrap();
        });

        let stmt = parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        let mut tx = Transaction::new_unsigned(key.public(), "db".to_string(), 0, stmt);
        tx.sign(&key);
        miner.append(tx);

        let mined = tx_receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("miner should produce a block");
        assert_eq!(mined.index, 1);
        assert!(mined.work().unwrap() >= 1);

        miner.set_enabled(false);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn disabling_stops_the_loop_without_a_pool() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key);
        let chain = Blockchain::open(path.clone(), g, 10, ExecutionMode::Full).unwrap();
        let ledger = Arc::new(Mutex::new(Ledger::new(chain)));
        let miner = Miner::new(Arc::clone(&ledger), 1, key.public().identity_hash(), |_| {});
        assert!(miner.is_enabled());
        miner.set_enabled(false);
        assert!(!miner.is_enabled());
        std::fs::remove_file(&path).ok();
    }
}
