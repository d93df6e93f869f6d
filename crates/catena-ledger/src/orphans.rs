//! The orphan cache (§3, §4.8): blocks with a valid signature and payload
//! whose predecessor is not (yet) known to the chain, keyed by both their
//! own signature and their `previous` pointer so the ledger can splice
//! forward and walk backward efficiently.

use std::collections::HashMap;

use catena_chain_types::Block;
use catena_crypto::Hash;

/// How far below the current tip an orphan may sit before it is evicted
/// (§3 glossary, `SPEC_FULL.md` §D.3): `4 * QUEUE_DEPTH`.
pub const EVICTION_DEPTH: u64 = 4 * catena_store::QUEUE_DEPTH as u64;

#[derive(Default)]
pub struct OrphanCache {
    by_signature: HashMap<Hash, Block>,
    /// `previous` -> signatures of orphans directly following it. Usually
    /// one entry; more than one means competing orphan forks.
    by_previous: HashMap<Hash, Vec<Hash>>,
}

impl OrphanCache {
    pub fn new() -> Self {
        OrphanCache::default()
    }

    pub fn insert(&mut self, block: Block) {
        let signature = match block.signature {
            Some(s) => s,
            None => return,
        };
        if self.by_signature.contains_key(&signature) {
            return;
        }
        self.by_previous.entry(block.previous).or_default().push(signature);
        self.by_signature.insert(signature, block);
    }

    pub fn get_by_signature(&self, hash: Hash) -> Option<&Block> {
        self.by_signature.get(&hash)
    }

    /// Removes and returns one orphan directly following `previous`, if any.
    pub fn take_child_of(&mut self, previous: Hash) -> Option<Block> {
        let children = self.by_previous.get_mut(&previous)?;
        let signature = children.pop()?;
        if children.is_empty() {
            self.by_previous.remove(&previous);
        }
        self.remove(signature)
    }

    pub fn remove(&mut self, signature: Hash) -> Option<Block> {
        let block = self.by_signature.remove(&signature)?;
        if let Some(children) = self.by_previous.get_mut(&block.previous) {
            children.retain(|s| *s != signature);
            if children.is_empty() {
                self.by_previous.remove(&block.previous);
            }
        }
        Some(block)
    }

    /// Evicts every orphan whose height is more than [`EVICTION_DEPTH`]
    /// below `highest_index` (§3: "implementation may evict more
    /// aggressively" — this evicts at exactly that bound).
    pub fn evict_below(&mut self, highest_index: u64) {
        let floor = highest_index.saturating_sub(EVICTION_DEPTH);
        let stale: Vec<Hash> = self
            .by_signature
            .values()
            .filter(|b| b.index < floor)
            .filter_map(|b| b.signature)
            .collect();
        for signature in stale {
            self.remove(signature);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.by_signature.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::PrivateKey;

    fn block(index: u64, previous: Hash, key: &PrivateKey) -> Block {
        let mut b = Block::new(1, index, previous, key.public().identity_hash(), index);
        let stmt = catena_sql_parser::parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        let mut tx = catena_chain_types::Transaction::new_unsigned(
            key.public(),
            "db".to_string(),
            0,
            stmt,
        );
        tx.sign(key);
        b.append(tx).unwrap();
        assert!(b.mine(1, index, 2_000_000));
        b
    }

    #[test]
    fn take_child_of_links_by_previous() {
        let key = PrivateKey::generate();
        let mut cache = OrphanCache::new();
        let parent_sig = catena_crypto::sha256(b"parent");
        let child = block(5, parent_sig, &key);
        let child_sig = child.signature.unwrap();
        cache.insert(child);
        let found = cache.take_child_of(parent_sig).unwrap();
        assert_eq!(found.signature, Some(child_sig));
        assert!(cache.take_child_of(parent_sig).is_none());
    }

    #[test]
    fn eviction_drops_entries_far_below_tip() {
        let key = PrivateKey::generate();
        let mut cache = OrphanCache::new();
        let low = block(1, Hash::ZERO, &key);
        cache.insert(low);
        assert_eq!(cache.len(), 1);
        cache.evict_below(1 + EVICTION_DEPTH + 10);
        assert_eq!(cache.len(), 0);
    }
}
