//! The ledger (C8, §4.8): a single [`Blockchain`] plus an orphan cache,
//! the `receive(block)` splice/fast-forward state machine and transaction
//! admission eligibility.

use catena_chain_types::{Block, Transaction};
use catena_crypto::Hash;
use catena_store::Blockchain;

use crate::error::LedgerError;
use crate::orphans::OrphanCache;

/// Transaction admission verdict (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Now,
    Future,
    Never,
}

pub struct Ledger {
    chain: Blockchain,
    orphans: OrphanCache,
}

impl Ledger {
    pub fn new(chain: Blockchain) -> Self {
        Ledger {
            chain,
            orphans: OrphanCache::new(),
        }
    }

    pub fn chain(&self) -> &Blockchain {
        &self.chain
    }

    pub fn highest(&self) -> &Block {
        self.chain.highest()
    }

    /// `receive(block)` (§4.8): returns `Ok(true)` if the block became
    /// (part of) the new tip, `Ok(false)` if it was invalid or stored as an
    /// orphan. A splice that fails mid fast-forward is a corrupted-state
    /// invariant violation (§7, `SPEC_FULL.md` §D.1) and is fatal.
    pub fn receive(&mut self, block: Block) -> Result<bool, LedgerError> {
        if block.validate().is_err() {
            return Ok(false);
        }

        let signature = match block.signature {
            Some(s) => s,
            None => return Ok(false),
        };

        // Chain forward: collect every orphan that splices directly onto
        // this block, in order, before attempting to append any of them.
        let mut splice = vec![block];
        loop {
            let tip_signature = splice.last().unwrap().signature.unwrap();
            match self.orphans.take_child_of(tip_signature) {
                Some(child) => splice.push(child),
                None => break,
            }
        }

        let lead = splice[0].clone();
        // The height that matters for "is this worth a fork walk" is the
        // tip of the whole splice (lead plus any orphans already chained
        // onto it), not just the lead block's own index — a fork only
        // needs its *furthest known* descendant to outrun the current tip.
        let splice_tip_index = splice.last().unwrap().index;
        match self.chain.append(lead.clone()) {
            Ok(()) => {
                self.accept_splice_tail(&splice[1..])?;
                self.evict_orphans();
                return Ok(true);
            }
            Err(_) if splice_tip_index > self.chain.highest().index => {
                if let Some(fast_forward) = self.find_fast_forward_point(&lead)? {
                    self.apply_fast_forward(fast_forward, splice)?;
                    self.evict_orphans();
                    return Ok(true);
                }
                self.orphans.insert(lead);
                for block in splice.into_iter().skip(1) {
                    self.orphans.insert(block);
                }
                self.evict_orphans();
                Ok(false)
            }
            Err(_) => {
                self.orphans.insert(lead);
                for block in splice.into_iter().skip(1) {
                    self.orphans.insert(block);
                }
                self.evict_orphans();
                Ok(false)
            }
        }
    }

    /// Appends the rest of a forward-splice chain after its lead block was
    /// accepted. Every block here was already pulled straight out of the
    /// orphan cache by `previous` linkage, so a failure here means the
    /// cache held an internally inconsistent chain.
    fn accept_splice_tail(&mut self, tail: &[Block]) -> Result<(), LedgerError> {
        for block in tail {
            self.chain.append(block.clone()).map_err(|e| {
                LedgerError::FastForwardInvariantViolated(format!(
                    "splice continuation failed at index {}: {e}",
                    block.index
                ))
            })?;
        }
        Ok(())
    }

    /// Walks back from `block` through the orphan cache looking for an
    /// ancestor already known to the chain. Returns that ancestor if one is
    /// found whose signature differs from the current tip, together with
    /// the chain of orphans collected along the way (oldest-last, i.e.
    /// closest to `block` first, excluding `block` itself).
    fn find_fast_forward_point(&self, block: &Block) -> Result<Option<(Block, Vec<Block>)>, LedgerError> {
        let highest_signature = self.chain.highest().signature;
        let mut ancestors = Vec::new();
        let mut cursor = block.previous;
        loop {
            if let Some(known) = self.chain.get_by_hash(cursor)? {
                if Some(known.signature.unwrap_or(Hash::ZERO)) == highest_signature
                    && ancestors.is_empty()
                {
                    // Same tip we already have: not a fork, just a
                    // duplicate/late arrival, nothing to fast-forward.
                    return Ok(None);
                }
                return Ok(Some((known, ancestors)));
            }
            match self.orphans.get_by_signature(cursor) {
                Some(parent) => {
                    ancestors.push(parent.clone());
                    cursor = parent.previous;
                }
                None => return Ok(None),
            }
        }
    }

    /// Unwinds to `ancestor` and fast-forwards through `ancestors`
    /// (oldest-last as collected by [`Self::find_fast_forward_point`],
    /// reversed here to oldest-first) followed by the splice chain rooted
    /// at the originally received block.
    fn apply_fast_forward(
        &mut self,
        (ancestor, mut ancestors): (Block, Vec<Block>),
        splice: Vec<Block>,
    ) -> Result<(), LedgerError> {
        self.chain.unwind(ancestor)?;
        ancestors.reverse();
        for block in ancestors {
            let signature = block.signature.unwrap();
            self.orphans.remove(signature);
            self.chain.append(block).map_err(|e| {
                LedgerError::FastForwardInvariantViolated(format!(
                    "fast-forward ancestor replay failed: {e}"
                ))
            })?;
        }
        for block in splice {
            self.chain.append(block).map_err(|e| {
                LedgerError::FastForwardInvariantViolated(format!(
                    "fast-forward splice replay failed: {e}"
                ))
            })?;
        }
        Ok(())
    }

    fn evict_orphans(&mut self) {
        self.orphans.evict_below(self.chain.highest().index);
    }

    /// `canAccept(transaction, pool)` (§4.8). `pool` is the set of
    /// transactions already accepted into the miner's candidate block.
    pub fn can_accept(&self, tx: &Transaction, pool: &[Transaction]) -> Result<Eligibility, LedgerError> {
        if !tx.signature_valid() {
            return Ok(Eligibility::Never);
        }

        let invoker = tx.invoker.identity_hash();
        let stored = self
            .chain
            .with_unverified_transactions(|conn| {
                catena_metadata::SQLUsersTable::new(conn).counter(invoker)
            })?
            .map_err(catena_store::StoreError::from)?;
        let last_accepted = stored.map(|c| c as i64).unwrap_or(-1);

        if tx.counter as i64 <= last_accepted {
            return Ok(Eligibility::Never);
        }
        if tx.counter as i64 == last_accepted + 1 {
            return Ok(Eligibility::Now);
        }
        let directly_follows_pool = pool.iter().any(|queued| {
            queued.invoker == tx.invoker && queued.counter + 1 == tx.counter
        });
        if directly_follows_pool {
            return Ok(Eligibility::Now);
        }
        Ok(Eligibility::Future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_chain_types::Transaction;
    use catena_crypto::PrivateKey;
    use catena_sql_parser::parse;
    use catena_store::ExecutionMode;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_db_path() -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("catena-ledger-test-{}-{}.sqlite", std::process::id(), n))
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

    fn ledger() -> (Ledger, PathBuf, PrivateKey, Block) {
        let path = temp_db_path();
        let key = PrivateKey::generate();
        let g = genesis(&key, 2);
        let chain = Blockchain::open(path.clone(), g.clone(), 10, ExecutionMode::Full).unwrap();
        (Ledger::new(chain), path, key, g)
    }

    #[test]
    fn in_order_block_extends_tip_directly() {
        let (mut l, path, key, g) = ledger();
        let b1 = next_block(&g, &key, 0, 1, 2);
        assert_eq!(l.receive(b1.clone()).unwrap(), true);
        assert_eq!(l.highest(), &b1);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn out_of_order_block_is_orphaned_then_splices_forward() {
        let (mut l, path, key, g) = ledger();
        let b1 = next_block(&g, &key, 0, 1, 2);
        let b2 = next_block(&b1, &key, 1, 2, 2);
        let b3 = next_block(&b2, &key, 2, 3, 2);

        // Feed b3 first: orphaned.
        assert_eq!(l.receive(b3.clone()).unwrap(), false);
        assert_eq!(l.highest(), &g);

        // Feed b2: also orphaned (no known predecessor yet), but b3 now
        // splices onto it in the cache.
        assert_eq!(l.receive(b2.clone()).unwrap(), false);
        assert_eq!(l.highest(), &g);

        // Feed b1: connects to genesis, and the forward splice picks up
        // b2 then b3 automatically.
        assert_eq!(l.receive(b1).unwrap(), true);
        assert_eq!(l.highest(), &b3);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn fork_resolution_fast_forwards_through_a_longer_branch() {
        let (mut l, path, key, g) = ledger();
        let b1 = next_block(&g, &key, 0, 1, 2);
        assert!(l.receive(b1.clone()).unwrap());

        // A competing branch from genesis, longer than the current tip.
        let c1 = next_block(&g, &key, 0, 5, 2);
        let c2 = next_block(&c1, &key, 1, 6, 2);

        // c2 arrives first: index 2 > highest.index (1), but its
        // predecessor c1 is unknown, so it is orphaned.
        assert_eq!(l.receive(c2.clone()).unwrap(), false);
        assert_eq!(l.highest(), &b1);

        // c1 arrives: predecessor is genesis, which is known to the
        // chain and differs from the current tip (b1) -> fast-forward.
        assert_eq!(l.receive(c1).unwrap(), true);
        assert_eq!(l.highest(), &c2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn can_accept_enforces_counter_rules() {
        let (l, path, key, g) = ledger();
        let stmt = parse("INSERT INTO foo (x) VALUES (1)").unwrap();

        let mut now_tx = Transaction::new_unsigned(key.public(), "db".to_string(), 0, stmt.clone());
        now_tx.sign(&key);
        assert_eq!(l.can_accept(&now_tx, &[]).unwrap(), Eligibility::Now);

        let mut future_tx = Transaction::new_unsigned(key.public(), "db".to_string(), 2, stmt.clone());
        future_tx.sign(&key);
        assert_eq!(l.can_accept(&future_tx, &[]).unwrap(), Eligibility::Future);

        let mut chained_tx = Transaction::new_unsigned(key.public(), "db".to_string(), 1, stmt);
        chained_tx.sign(&key);
        assert_eq!(l.can_accept(&chained_tx, &[now_tx]).unwrap(), Eligibility::Now);

        let _ = g;
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn can_accept_rejects_invalid_signature() {
        let (l, path, key, _g) = ledger();
        let stmt = parse("SELECT 1").unwrap();
        let mut tx = Transaction::new_unsigned(key.public(), "db".to_string(), 0, stmt);
        tx.sign(&key);
        tx.counter = 7; // invalidates the signature without re-signing
        assert_eq!(l.can_accept(&tx, &[]).unwrap(), Eligibility::Never);
        std::fs::remove_file(&path).ok();
    }
}
