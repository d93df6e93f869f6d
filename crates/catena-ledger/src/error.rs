use std::{error, fmt};

use catena_chain_types::ChainError;
use catena_store::StoreError;

#[derive(Debug)]
pub enum LedgerError {
    Store(StoreError),
    /// A block the splice-fast-forward path tried to replay failed to
    /// append even though it was only ever accepted into the orphan cache
    /// after a signature/payload check — this can only mean corrupted
    /// in-memory state, which is fatal (§7, §9 resolved open question #1).
    FastForwardInvariantViolated(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LedgerError::Store(e) => write!(f, "{e}"),
            LedgerError::FastForwardInvariantViolated(m) => {
                write!(f, "fast-forward invariant violated: {m}")
            }
        }
    }
}

impl error::Error for LedgerError {}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::Store(e)
    }
}

impl From<LedgerError> for ChainError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Store(e) => e.into(),
            LedgerError::FastForwardInvariantViolated(m) => ChainError::ReplayMismatch(m),
        }
    }
}
