use std::{error, fmt};

/// The full error taxonomy used across the chain engine, SQL backend and
/// gossip protocol (§7 of the node's design). Individual crates may raise
/// a narrower local error and convert it into this one at their boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    FormatError(String),
    ParseError(String),
    SyntaxError(String),
    SignatureInvalid,
    InconsecutiveBlock,
    PayloadInvalid(String),
    TooManyTransactions,
    PrivilegeRequired,
    TableDoesNotExist(String),
    TableAlreadyExists(String),
    ColumnDoesNotExist(String),
    NotInTableContext,
    DuplicateColumns(String),
    UnboundParameter(String),
    InconsistentParameterValue(String),
    UnknownVariable(String),
    UnknownFunction(String),
    InvalidParameterCount,
    ExecutionFailed,
    PeerProtocolVersion,
    PeerNotConnected,
    MetadataError(String),
    ReplayMismatch(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::FormatError(m) => write!(f, "format error: {m}"),
            ChainError::ParseError(m) => write!(f, "parse error: {m}"),
            ChainError::SyntaxError(m) => write!(f, "syntax error: {m}"),
            ChainError::SignatureInvalid => write!(f, "signature invalid"),
            ChainError::InconsecutiveBlock => write!(f, "block is not consecutive with the chain tip"),
            ChainError::PayloadInvalid(m) => write!(f, "payload invalid: {m}"),
            ChainError::TooManyTransactions => write!(f, "too many transactions in block"),
            ChainError::PrivilegeRequired => write!(f, "privilege required"),
            ChainError::TableDoesNotExist(t) => write!(f, "table does not exist: {t}"),
            ChainError::TableAlreadyExists(t) => write!(f, "table already exists: {t}"),
            ChainError::ColumnDoesNotExist(c) => write!(f, "column does not exist: {c}"),
            ChainError::NotInTableContext => write!(f, "not in table context"),
            ChainError::DuplicateColumns(c) => write!(f, "duplicate columns: {c}"),
            ChainError::UnboundParameter(p) => write!(f, "unbound parameter: {p}"),
            ChainError::InconsistentParameterValue(p) => {
                write!(f, "inconsistent value for parameter: {p}")
            }
            ChainError::UnknownVariable(v) => write!(f, "unknown variable: {v}"),
            ChainError::UnknownFunction(fun) => write!(f, "unknown function: {fun}"),
            ChainError::InvalidParameterCount => write!(f, "invalid parameter count"),
            ChainError::ExecutionFailed => write!(f, "execution failed"),
            ChainError::PeerProtocolVersion => write!(f, "peer protocol version mismatch"),
            ChainError::PeerNotConnected => write!(f, "peer not connected"),
            ChainError::MetadataError(m) => write!(f, "metadata error: {m}"),
            ChainError::ReplayMismatch(m) => write!(f, "replay mismatch: {m}"),
        }
    }
}

impl error::Error for ChainError {}

impl From<catena_sql_parser::ParseError> for ChainError {
    fn from(e: catena_sql_parser::ParseError) -> Self {
        ChainError::ParseError(e.to_string())
    }
}
