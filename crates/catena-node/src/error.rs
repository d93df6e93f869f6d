use std::{error, fmt};

use catena_chain_types::ChainError;
use catena_ledger::LedgerError;
use catena_store::StoreError;

#[derive(Debug)]
pub enum NodeError {
    Chain(ChainError),
    Store(StoreError),
    Ledger(LedgerError),
    Config(String),
    Io(std::io::Error),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeError::Chain(e) => write!(f, "{e}"),
            NodeError::Store(e) => write!(f, "{e}"),
            NodeError::Ledger(e) => write!(f, "{e}"),
            NodeError::Config(m) => write!(f, "invalid configuration: {m}"),
            NodeError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl error::Error for NodeError {}

impl From<ChainError> for NodeError {
    fn from(e: ChainError) -> Self {
        NodeError::Chain(e)
    }
}

impl From<StoreError> for NodeError {
    fn from(e: StoreError) -> Self {
        NodeError::Store(e)
    }
}

impl From<LedgerError> for NodeError {
    fn from(e: LedgerError) -> Self {
        NodeError::Ledger(e)
    }
}

impl From<std::io::Error> for NodeError {
    fn from(e: std::io::Error) -> Self {
        NodeError::Io(e)
    }
}
