use catena_crypto::{PrivateKey, PublicKey, Signature};
use catena_sql_parser::Statement;
use serde::{Deserialize, Serialize};

use crate::error::ChainError;

/// Maximum size, in bytes, of a transaction's canonical signing bytes.
pub const MAX_TRANSACTION_SIZE: usize = 10 * 1024;

/// A signed SQL statement: `(invoker, database, counter, statement,
/// signature)`. Canonical signing bytes are, in order: the invoker's raw
/// public key bytes, the UTF-8 database name, the little-endian counter,
/// then the UTF-8 canonical SQL of the statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub invoker: PublicKey,
    pub database: String,
    pub counter: u64,
    pub statement: Statement,
    pub signature: Option<Signature>,
}

impl Transaction {
    pub fn new_unsigned(
        invoker: PublicKey,
        database: String,
        counter: u64,
        statement: Statement,
    ) -> Self {
        Transaction {
            invoker,
            database,
            counter,
            statement,
            signature: None,
        }
    }

    /// The exact bytes that are signed (and whose length is bounded to
    /// 10 KiB).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.invoker.raw());
        out.extend_from_slice(self.database.as_bytes());
        out.extend_from_slice(&self.counter.to_le_bytes());
        out.extend_from_slice(self.statement.canonical_sql().as_bytes());
        out
    }

    /// Signs in place with `key`. The caller is responsible for ensuring
    /// `key.public() == self.invoker`.
    pub fn sign(&mut self, key: &PrivateKey) {
        let bytes = self.canonical_bytes();
        self.signature = Some(key.sign(&bytes));
    }

    /// True iff a signature is present and verifies over the canonical
    /// bytes under `self.invoker`.
    pub fn signature_valid(&self) -> bool {
        match &self.signature {
            None => false,
            Some(sig) => self.invoker.verify(&self.canonical_bytes(), sig),
        }
    }

    /// Validates size and signature invariants (§3). Does not check
    /// counter monotonicity — that is a chain-state concern (C7/C8).
    pub fn validate(&self) -> Result<(), ChainError> {
        if !self.signature_valid() {
            return Err(ChainError::SignatureInvalid);
        }
        if self.canonical_bytes().len() > MAX_TRANSACTION_SIZE {
            return Err(ChainError::PayloadInvalid(
                "transaction exceeds 10 KiB".to_string(),
            ));
        }
        Ok(())
    }

    /// True iff any required privilege names a metadata-visible table
    /// (`grants`) — such transactions are replayed even in validate-only
    /// mode.
    pub fn should_always_be_replayed(&self) -> bool {
        self.statement
            .required_privileges()
            .iter()
            .any(|p| p.table_name() == Some("grants"))
    }

    pub fn to_wire(&self) -> Result<TransactionWire, ChainError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| ChainError::SignatureInvalid)?;
        Ok(TransactionWire {
            tx: TxBody {
                sql: self.statement.canonical_sql(),
                database: self.database.clone(),
                counter: self.counter,
                invoker: self.invoker.to_base58check(),
            },
            signature: signature.to_base64(),
        })
    }

    pub fn from_wire(wire: &TransactionWire) -> Result<Self, ChainError> {
        let invoker = PublicKey::from_base58check(&wire.tx.invoker)
            .map_err(|e| ChainError::FormatError(e.to_string()))?;
        let statement = catena_sql_parser::parse(&wire.tx.sql)?;
        let signature = Signature::from_base64(&wire.signature)
            .map_err(|e| ChainError::FormatError(e.to_string()))?;
        Ok(Transaction {
            invoker,
            database: wire.tx.database.clone(),
            counter: wire.tx.counter,
            statement,
            signature: Some(signature),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxBody {
    pub sql: String,
    pub database: String,
    pub counter: u64,
    pub invoker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWire {
    pub tx: TxBody,
    pub signature: String,
}
