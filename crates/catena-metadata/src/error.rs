use std::{error, fmt};

/// Failures local to metadata-table access, converted to `ChainError` at the
/// crate boundary.
#[derive(Debug)]
pub enum MetadataError {
    Sql(rusqlite::Error),
    MalformedHash,
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetadataError::Sql(e) => write!(f, "metadata sql error: {e}"),
            MetadataError::MalformedHash => write!(f, "malformed hash stored in metadata table"),
        }
    }
}

impl error::Error for MetadataError {}

impl From<rusqlite::Error> for MetadataError {
    fn from(e: rusqlite::Error) -> Self {
        MetadataError::Sql(e)
    }
}

impl From<MetadataError> for catena_chain_types::ChainError {
    fn from(e: MetadataError) -> Self {
        catena_chain_types::ChainError::MetadataError(e.to_string())
    }
}
