//! Dynamic difficulty retarget (§4.6): every [`RETARGET_INTERVAL`] blocks a
//! new target is computed for the block following a retarget boundary,
//! clamped to `[MIN_WORK, MAX_WORK]`. Below the first interval, difficulty
//! equals the genesis block's own work.

use catena_chain_types::Block;

use crate::error::StoreError;

/// `R` — blocks per retarget window.
pub const RETARGET_INTERVAL: u64 = 10;
/// `Q` — the bounded in-memory queue depth ahead of permanent storage.
pub const QUEUE_DEPTH: usize = 7;
pub const MIN_WORK: u32 = 10;
pub const MAX_WORK: u32 = 200;

/// The proof-of-work difficulty required of the block at `highest_index + 1`.
///
/// `get_block` resolves a block by index from wherever the caller keeps it
/// (permanent archive, in-memory queue, or both) — the retarget window may
/// straddle both, since `QUEUE_DEPTH < RETARGET_INTERVAL`.
///
/// For `highest_index + 1 <= RETARGET_INTERVAL`, returns `genesis_work`
/// unconditionally (blocks 1 through `RETARGET_INTERVAL` all precede the
/// first retarget boundary). Otherwise, finds the retarget boundary preceding the
/// target block (the largest multiple of `RETARGET_INTERVAL` less than the
/// target index), averages the work of the `RETARGET_INTERVAL` blocks ending
/// there, and nudges the average up or down by one depending on whether that
/// window ran slower or faster than `desired_time_between_blocks * R`.
pub fn required_difficulty<F>(
    mut get_block: F,
    genesis_work: u32,
    highest_index: u64,
    desired_time_between_blocks: u64,
) -> Result<u32, StoreError>
where
    F: FnMut(u64) -> Result<Option<Block>, StoreError>,
{
    let target_index = highest_index + 1;
    if target_index <= RETARGET_INTERVAL {
        return Ok(genesis_work);
    }

    let hi = RETARGET_INTERVAL * ((target_index - 1) / RETARGET_INTERVAL);
    let lo = hi - RETARGET_INTERVAL + 1;

    let mut total_work: u64 = 0;
    for idx in lo..=hi {
        let block = get_block(idx)?
            .ok_or_else(|| StoreError::CorruptState(format!("missing block at index {idx} for retarget")))?;
        total_work += block.work().unwrap_or(0) as u64;
    }
    let avg = (total_work / RETARGET_INTERVAL) as u32;

    let block_lo = get_block(lo)?
        .ok_or_else(|| StoreError::CorruptState(format!("missing block at index {lo}")))?;
    let block_hi = get_block(hi)?
        .ok_or_else(|| StoreError::CorruptState(format!("missing block at index {hi}")))?;

    let actual_time = block_hi.timestamp.saturating_sub(block_lo.timestamp);
    let desired_time = desired_time_between_blocks * RETARGET_INTERVAL;

    let target = if actual_time > desired_time {
        avg.saturating_sub(1)
    } else {
        avg.saturating_add(1)
    };
    Ok(target.clamp(MIN_WORK, MAX_WORK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::PrivateKey;
    use std::collections::HashMap;

    fn mined_block(prev: &Block, key: &PrivateKey, timestamp: u64, difficulty: u32) -> Block {
        let miner = key.public().identity_hash();
        let mut block = Block::new(1, prev.index + 1, prev.signature.unwrap(), miner, timestamp);
        let stmt = catena_sql_parser::parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        let mut tx = catena_chain_types::Transaction::new_unsigned(
            key.public(),
            "db".to_string(),
            prev.index,
            stmt,
        );
        tx.sign(key);
        block.append(tx).unwrap();
        assert!(block.mine(difficulty, timestamp, 5_000_000));
        block
    }

    fn lookup(blocks: &HashMap<u64, Block>, idx: u64) -> Result<Option<Block>, StoreError> {
        Ok(blocks.get(&idx).cloned())
    }

    #[test]
    fn below_first_window_uses_genesis_work() {
        let key = PrivateKey::generate();
        let mut genesis = Block::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        assert!(genesis.mine(6, 0, 1_000_000));
        let genesis_work = genesis.work().unwrap();
        let blocks: HashMap<u64, Block> = [(0, genesis)].into_iter().collect();

        for idx in 0..5u64 {
            let difficulty =
                required_difficulty(|i| lookup(&blocks, i), genesis_work, idx, 10).unwrap();
            assert_eq!(difficulty, genesis_work);
        }
    }

    #[test]
    fn slow_window_lowers_difficulty_by_one() {
        let key = PrivateKey::generate();
        let difficulty = 6u32;
        let desired = 10u64;

        let mut tip = Block::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        assert!(tip.mine(difficulty, 0, 1_000_000));
        let genesis_work = tip.work().unwrap();
        let mut blocks: HashMap<u64, Block> = [(0, tip.clone())].into_iter().collect();

        // 10 blocks each spaced 2x the desired interval: the window runs
        // slow, so block 11 must retarget one bit below the observed
        // average.
        for i in 1..=10u64 {
            let block = mined_block(&tip, &key, i * desired * 2, difficulty);
            blocks.insert(block.index, block.clone());
            tip = block;
        }

        let observed_total: u64 = (1..=10u64).map(|i| blocks[&i].work().unwrap() as u64).sum();
        let observed_avg = (observed_total / RETARGET_INTERVAL) as u32;
        let next_difficulty =
            required_difficulty(|i| lookup(&blocks, i), genesis_work, tip.index, desired).unwrap();
        assert_eq!(next_difficulty, observed_avg.saturating_sub(1).clamp(MIN_WORK, MAX_WORK));
    }

    #[test]
    fn clamps_to_bounds() {
        let key = PrivateKey::generate();
        let mut tip = Block::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        assert!(tip.mine(MIN_WORK, 0, 1_000_000));
        let mut blocks: HashMap<u64, Block> = [(0, tip.clone())].into_iter().collect();

        for i in 1..=10u64 {
            // Fast window: difficulty should climb, but never past MAX_WORK.
            let block = mined_block(&tip, &key, i, MIN_WORK);
            blocks.insert(block.index, block.clone());
            tip = block;
        }
        let observed_total: u64 = (1..=10u64).map(|i| blocks[&i].work().unwrap() as u64).sum();
        let observed_avg = (observed_total / RETARGET_INTERVAL) as u32;
        let next = required_difficulty(|i| lookup(&blocks, i), MIN_WORK, tip.index, 1_000_000).unwrap();
        assert_eq!(next, observed_avg.saturating_add(1).clamp(MIN_WORK, MAX_WORK));
    }
}
