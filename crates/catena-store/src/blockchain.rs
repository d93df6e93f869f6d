//! The blockchain store (C7): permanent SQL state plus a bounded in-memory
//! queue of recently-accepted blocks not yet folded into it.

use std::collections::VecDeque;
use std::path::PathBuf;

use catena_chain_types::{Block, ChainError};
use catena_crypto::Hash;
use catena_metadata::{info, SQLBlockArchive};
use rusqlite::Connection;

use crate::apply::{self, ExecutionMode};
use crate::error::StoreError;
use crate::retarget::{self, QUEUE_DEPTH};

/// Permanent chain state on disk plus the queue of not-yet-folded-in
/// blocks. Owns its database handle exclusively (§3).
pub struct Blockchain {
    db_path: PathBuf,
    conn: Connection,
    queue: VecDeque<Block>,
    highest: Block,
    genesis: Block,
    genesis_work: u32,
    desired_time_between_blocks: u64,
    mode: ExecutionMode,
}

impl Blockchain {
    /// Opens (or creates) the permanent database at `db_path`. If it is
    /// empty, applies `genesis` as the first permanent block; if it
    /// already carries a head, loads that block as the initial tip and
    /// starts with an empty queue — any blocks accepted but not yet folded
    /// into permanent storage before a previous shutdown are lost, which is
    /// the documented cost of an in-memory-only queue (§3 glossary).
    pub fn open(
        db_path: PathBuf,
        genesis: Block,
        desired_time_between_blocks: u64,
        mode: ExecutionMode,
    ) -> Result<Self, StoreError> {
        genesis.validate().map_err(StoreError::Chain)?;
        let genesis_work = genesis.work().ok_or(ChainError::SignatureInvalid)?;

        let conn = Connection::open(&db_path)?;
        catena_metadata::bootstrap(&conn)?;

        let highest = match info::head(&conn)? {
            Some(_) => {
                let idx = info::head_index(&conn)?.ok_or_else(|| {
                    StoreError::CorruptState("_info carries a head with no index".to_string())
                })?;
                SQLBlockArchive::new(&conn)
                    .get_at(idx)?
                    .ok_or_else(|| StoreError::CorruptState(format!("missing archived head at {idx}")))?
            }
            None => {
                apply::apply(&conn, &genesis, mode)?;
                genesis.clone()
            }
        };

        Ok(Blockchain {
            db_path,
            conn,
            queue: VecDeque::new(),
            highest,
            genesis,
            genesis_work,
            desired_time_between_blocks,
            mode,
        })
    }

    pub fn highest(&self) -> &Block {
        &self.highest
    }

    pub fn genesis(&self) -> &Block {
        &self.genesis
    }

    fn permanent_head_index(&self) -> Result<u64, StoreError> {
        Ok(info::head_index(&self.conn)?.unwrap_or(0))
    }

    /// Looks a block up by index, checking the queue before falling back to
    /// permanent storage.
    pub fn get(&self, index: u64) -> Result<Option<Block>, StoreError> {
        if let Some(permanent_head) = info::head_index(&self.conn)? {
            if index <= permanent_head {
                return Ok(SQLBlockArchive::new(&self.conn).get_at(index)?);
            }
        }
        Ok(self.queue.iter().find(|b| b.index == index).cloned())
    }

    pub fn get_by_hash(&self, hash: Hash) -> Result<Option<Block>, StoreError> {
        if let Some(queued) = self.queue.iter().find(|b| b.signature == Some(hash)) {
            return Ok(Some(queued.clone()));
        }
        Ok(SQLBlockArchive::new(&self.conn).get(hash)?)
    }

    /// The proof-of-work difficulty required of the block that would
    /// follow the current tip.
    pub fn required_difficulty(&self) -> Result<u32, StoreError> {
        self.difficulty_following(self.highest.index)
    }

    /// The proof-of-work difficulty required of the block following
    /// whichever block is currently at `index`.
    pub fn difficulty_following(&self, index: u64) -> Result<u32, StoreError> {
        retarget::required_difficulty(
            |i| self.get(i),
            self.genesis_work,
            index,
            self.desired_time_between_blocks,
        )
    }

    fn can_append(&self, block: &Block) -> Result<(), StoreError> {
        if block.index != self.highest.index + 1 {
            return Err(StoreError::InconsecutiveBlock);
        }
        let highest_sig = self.highest.signature.ok_or(ChainError::SignatureInvalid)?;
        if block.previous != highest_sig {
            return Err(StoreError::InconsecutiveBlock);
        }
        block.validate().map_err(StoreError::Chain)?;
        let required = self.required_difficulty()?;
        if block.work().unwrap_or(0) < required {
            return Err(StoreError::DifficultyTooLow);
        }
        if !self.highest.is_genesis() && block.timestamp <= self.highest.timestamp {
            return Err(StoreError::NonIncreasingTimestamp);
        }
        Ok(())
    }

    /// Appends `block` as the new chain tip (§4.6). Pushes it into the
    /// in-memory queue; once the queue exceeds [`QUEUE_DEPTH`], the oldest
    /// entry is folded into permanent storage.
    pub fn append(&mut self, block: Block) -> Result<(), StoreError> {
        self.can_append(&block)?;
        self.queue.push_back(block.clone());
        self.highest = block;

        if self.queue.len() > QUEUE_DEPTH {
            let oldest = self.queue.pop_front().expect("just checked len > 0");
            let permanent_head = info::head(&self.conn)?;
            if permanent_head != Some(oldest.previous) {
                // The permanent head has drifted from this block's direct
                // predecessor (e.g. after a splice); replay up to the
                // predecessor before folding `oldest` in.
                if let Some(predecessor) = self.get(oldest.index.saturating_sub(1))? {
                    self.replay_permanent_storage(&predecessor)?;
                }
            }
            let tx = self.conn.transaction()?;
            apply::apply(&tx, &oldest, self.mode)?;
            tx.commit()?;
        }
        Ok(())
    }

    /// Unwinds the chain tip to `to` (§4.6). If `to` is at or beyond the
    /// current permanent head it is necessarily still reachable from the
    /// queue, so queued entries past it are simply dropped. Otherwise the
    /// target is older than what is already permanent, so permanent
    /// storage is rebuilt from genesis up to `to`.
    pub fn unwind(&mut self, to: Block) -> Result<(), StoreError> {
        let permanent_head_index = self.permanent_head_index()?;
        if to.index >= permanent_head_index {
            self.queue.retain(|b| b.index <= to.index);
            self.highest = to;
            Ok(())
        } else {
            self.replay_permanent_storage(&to)
        }
    }

    /// Collects the canonical chain from genesis up to `to` (reading
    /// whatever is still in permanent storage and the queue before either
    /// is touched), then closes, deletes and rebuilds the permanent
    /// database from scratch, applying every block oldest-first inside a
    /// single DB transaction (§4.6).
    pub fn replay_permanent_storage(&mut self, to: &Block) -> Result<(), StoreError> {
        let mut chain = Vec::with_capacity(to.index as usize + 1);
        for idx in 0..=to.index {
            let block = self.get(idx)?.ok_or_else(|| {
                StoreError::CorruptState(format!("cannot replay: missing block at index {idx}"))
            })?;
            chain.push(block);
        }

        self.queue.clear();
        // Drop and reopen: rusqlite has no explicit close, dropping the
        // connection releases the file handle.
        let path = self.db_path.clone();
        let placeholder = Connection::open_in_memory()?;
        let old_conn = std::mem::replace(&mut self.conn, placeholder);
        drop(old_conn);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let fresh = Connection::open(&path)?;
        catena_metadata::bootstrap(&fresh)?;

        {
            let tx = fresh.unchecked_transaction()?;
            for block in &chain {
                apply::apply(&tx, block, self.mode)?;
            }
            tx.commit()?;
        }

        self.conn = fresh;
        self.highest = to.clone();
        Ok(())
    }

    /// Opens a savepoint, replays every queued block within it, invokes
    /// `f` against the resulting hypothetical view, then always rolls
    /// back — the observable database state before and after is
    /// byte-identical (§4.6, §8).
    pub fn with_unverified_transactions<T>(
        &self,
        f: impl FnOnce(&Connection) -> T,
    ) -> Result<T, StoreError> {
        self.conn.execute_batch("SAVEPOINT hypothetical")?;
        for block in &self.queue {
            if let Err(e) = apply::apply(&self.conn, block, self.mode) {
                self.conn
                    .execute_batch("ROLLBACK TO SAVEPOINT hypothetical; RELEASE SAVEPOINT hypothetical")?;
                return Err(e);
            }
        }
        let result = f(&self.conn);
        self.conn
            .execute_batch("ROLLBACK TO SAVEPOINT hypothetical; RELEASE SAVEPOINT hypothetical")?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_chain_types::Transaction;
    use catena_crypto::PrivateKey;
    use catena_sql_parser::parse;
    use tempfile_like::temp_db_path;

    mod tempfile_like {
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU64, Ordering};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        pub fn temp_db_path() -> PathBuf {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            std::env::temp_dir().join(format!("catena-store-test-{}-{}.sqlite", std::process::id(), n))
        }
    }

    fn genesis(key: &PrivateKey, difficulty: u32) -> Block {
        let mut g = Block::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        assert!(g.mine(difficulty, 0, 1_000_000));
        g
    }

    fn next_block(prev: &Block, key: &PrivateKey, counter: u64, timestamp: u64, difficulty: u32) -> Block {
        let stmt = parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        let mut tx = Transaction::new_unsigned(key.public(), "db".to_string(), counter, stmt);
        tx.sign(key);
        let mut block = Block::new(1, prev.index + 1, prev.signature.unwrap(), key.public().identity_hash(), timestamp);
        block.append(tx).unwrap();
        assert!(block.mine(difficulty, timestamp, 2_000_000));
        block
    }

    fn create_foo_block(prev: &Block, key: &PrivateKey, counter: u64, timestamp: u64, difficulty: u32) -> Block {
        let stmt = parse("CREATE TABLE foo(x INTEGER)").unwrap();
        let mut tx = Transaction::new_unsigned(key.public(), "db".to_string(), counter, stmt);
        tx.sign(key);
        let mut block = Block::new(1, prev.index + 1, prev.signature.unwrap(), key.public().identity_hash(), timestamp);
        block.append(tx).unwrap();
        assert!(block.mine(difficulty, timestamp, 2_000_000));
        block
    }

    #[test]
    fn opens_fresh_and_applies_genesis() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key, 2);
        let chain = Blockchain::open(path.clone(), g.clone(), 10, ExecutionMode::Full).unwrap();
        assert_eq!(chain.highest(), &g);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn append_rejects_wrong_predecessor() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key, 2);
        let mut chain = Blockchain::open(path.clone(), g.clone(), 10, ExecutionMode::Full).unwrap();

        let mut bogus = Block::new(1, 1, Hash::ZERO, key.public().identity_hash(), 1);
        let stmt = parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        let mut tx = Transaction::new_unsigned(key.public(), "db".to_string(), 0, stmt);
        tx.sign(&key);
        bogus.append(tx).unwrap();
        bogus.mine(2, 1, 1_000_000);

        assert!(matches!(chain.append(bogus), Err(StoreError::InconsecutiveBlock)));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn append_past_queue_depth_folds_into_permanent_storage() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let mut tip = genesis(&key, 2);
        let mut chain = Blockchain::open(path.clone(), tip.clone(), 10, ExecutionMode::Full).unwrap();

        for i in 0..(QUEUE_DEPTH as u64 + 3) {
            let block = next_block(&tip, &key, i, i + 1, 2);
            chain.append(block.clone()).unwrap();
            tip = block;
        }

        assert_eq!(chain.highest().index, tip.index);
        // At least three blocks must have been folded into permanent
        // storage (queue depth exceeded by 3).
        assert!(chain.permanent_head_index().unwrap() >= 3);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn hypothetical_leaves_state_untouched() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key, 2);
        let mut chain = Blockchain::open(path.clone(), g.clone(), 10, ExecutionMode::Full).unwrap();

        // Apply directly into permanent storage (bypassing the queue) so
        // `foo` exists and the queue is empty when the hypothetical view
        // below runs — otherwise `conn` never sees these blocks and
        // `SELECT COUNT(*) FROM foo` fails outright.
        let create = create_foo_block(&g, &key, 0, 1, 2);
        apply::apply(&chain.conn, &create, ExecutionMode::Full).unwrap();
        chain.highest = create.clone();
        let b1 = next_block(&create, &key, 1, 2, 2);
        apply::apply(&chain.conn, &b1, ExecutionMode::Full).unwrap();
        chain.highest = b1;

        let before: i64 = chain
            .conn
            .query_row("SELECT COUNT(*) FROM foo", [], |r| r.get(0))
            .unwrap();
        let seen = chain
            .with_unverified_transactions(|conn| {
                conn.execute("INSERT INTO foo (x) VALUES (99)", []).unwrap();
                conn.query_row::<i64, _, _>("SELECT COUNT(*) FROM foo", [], |r| r.get(0)).unwrap()
            })
            .unwrap();
        assert_eq!(seen, before + 1);
        let after: i64 = chain
            .conn
            .query_row("SELECT COUNT(*) FROM foo", [], |r| r.get(0))
            .unwrap();
        assert_eq!(after, before);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unwind_within_queue_drops_suffix() {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key, 2);
        let mut chain = Blockchain::open(path.clone(), g.clone(), 10, ExecutionMode::Full).unwrap();
        let b1 = next_block(&g, &key, 0, 1, 2);
        let b2 = next_block(&b1, &key, 1, 2, 2);
        chain.append(b1.clone()).unwrap();
        chain.append(b2).unwrap();

        chain.unwind(b1.clone()).unwrap();
        assert_eq!(chain.highest(), &b1);
        std::fs::remove_file(&path).ok();
    }
}
