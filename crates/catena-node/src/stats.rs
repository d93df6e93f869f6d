//! In-process counters (`SPEC_FULL.md` §C.4): no external exporter, just
//! the numbers the orchestrator itself needs, mirrored the way
//! `bin/oe/informant.rs` keeps its own report independent of the RPC
//! layer that surfaces it.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub blocks_applied: AtomicU64,
    pub blocks_rejected: AtomicU64,
    pub transactions_admitted: AtomicU64,
    pub transactions_rejected: AtomicU64,
    pub peers_ignored: AtomicU64,
    pub peers_failed: AtomicU64,
}

/// A point-in-time copy of [`Stats`], cheap to clone and log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocks_applied: u64,
    pub blocks_rejected: u64,
    pub transactions_admitted: u64,
    pub transactions_rejected: u64,
    pub peers_ignored: u64,
    pub peers_failed: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks_applied: self.blocks_applied.load(Ordering::Relaxed),
            blocks_rejected: self.blocks_rejected.load(Ordering::Relaxed),
            transactions_admitted: self.transactions_admitted.load(Ordering::Relaxed),
            transactions_rejected: self.transactions_rejected.load(Ordering::Relaxed),
            peers_ignored: self.peers_ignored.load(Ordering::Relaxed),
            peers_failed: self.peers_failed.load(Ordering::Relaxed),
        }
    }
}
