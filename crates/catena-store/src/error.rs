use std::{error, fmt};

use catena_chain_types::ChainError;
use catena_metadata::MetadataError;

/// Failures local to the blockchain store, converted to [`ChainError`] at
/// the crate boundary.
#[derive(Debug)]
pub enum StoreError {
    Chain(ChainError),
    Metadata(MetadataError),
    Sql(rusqlite::Error),
    Io(std::io::Error),
    /// `block.index`/`block.previous` do not follow the chain's current tip.
    InconsecutiveBlock,
    /// Work of the candidate block is below the required difficulty.
    DifficultyTooLow,
    /// Non-genesis predecessor but `block.timestamp <= previous.timestamp`.
    NonIncreasingTimestamp,
    /// Persistent state contradicts an invariant the store relies on
    /// (§7: "corrupted persistent state is fatal"). Callers that see this
    /// should abort the process rather than proceed.
    CorruptState(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Chain(e) => write!(f, "{e}"),
            StoreError::Metadata(e) => write!(f, "{e}"),
            StoreError::Sql(e) => write!(f, "store sql error: {e}"),
            StoreError::Io(e) => write!(f, "store io error: {e}"),
            StoreError::InconsecutiveBlock => write!(f, "block is not consecutive with the chain tip"),
            StoreError::DifficultyTooLow => write!(f, "block work is below the required difficulty"),
            StoreError::NonIncreasingTimestamp => {
                write!(f, "block timestamp does not increase over its predecessor")
            }
            StoreError::CorruptState(m) => write!(f, "corrupt persistent state: {m}"),
        }
    }
}

impl error::Error for StoreError {}

impl From<ChainError> for StoreError {
    fn from(e: ChainError) -> Self {
        StoreError::Chain(e)
    }
}

impl From<MetadataError> for StoreError {
    fn from(e: MetadataError) -> Self {
        StoreError::Metadata(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sql(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<StoreError> for ChainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Chain(e) => e,
            StoreError::Metadata(e) => ChainError::MetadataError(e.to_string()),
            StoreError::Sql(e) => ChainError::MetadataError(e.to_string()),
            StoreError::Io(e) => ChainError::MetadataError(e.to_string()),
            StoreError::InconsecutiveBlock => ChainError::InconsecutiveBlock,
            StoreError::DifficultyTooLow => ChainError::PayloadInvalid("insufficient work".into()),
            StoreError::NonIncreasingTimestamp => {
                ChainError::PayloadInvalid("non-increasing timestamp".into())
            }
            StoreError::CorruptState(m) => ChainError::ReplayMismatch(m),
        }
    }
}
