use catena_crypto::{sha256, Hash};
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::transaction::{Transaction, TransactionWire};

/// Maximum number of transactions in one block.
pub const MAX_TRANSACTIONS: usize = 100;
/// Maximum size, in bytes, of a block's payload signing bytes.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Either a genesis seed string or an ordered transaction list.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Seed(String),
    Transactions(Vec<Transaction>),
}

impl Payload {
    pub fn is_genesis(&self) -> bool {
        matches!(self, Payload::Seed(_))
    }

    pub fn transactions(&self) -> &[Transaction] {
        match self {
            Payload::Seed(_) => &[],
            Payload::Transactions(txs) => txs,
        }
    }

    /// The bytes that feed into the block's canonical signing bytes: the
    /// seed's UTF-8 for a genesis block, or the concatenation of raw
    /// transaction signatures in payload order otherwise.
    pub fn signing_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Seed(seed) => seed.as_bytes().to_vec(),
            Payload::Transactions(txs) => {
                let mut out = Vec::with_capacity(txs.len() * 64);
                for tx in txs {
                    if let Some(sig) = &tx.signature {
                        out.extend_from_slice(sig.raw());
                    }
                }
                out
            }
        }
    }
}

/// A block: header plus payload. See §3/§6 of the design for the exact
/// canonical-signing-bytes layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub version: u8,
    pub index: u64,
    pub previous: Hash,
    pub miner: Hash,
    pub timestamp: u64,
    pub nonce: u64,
    pub signature: Option<Hash>,
    pub payload: Payload,
}

impl Block {
    pub fn genesis(version: u8, miner: Hash, timestamp: u64, seed: String) -> Self {
        Block {
            version,
            index: 0,
            previous: Hash::ZERO,
            miner,
            timestamp,
            nonce: 0,
            signature: None,
            payload: Payload::Seed(seed),
        }
    }

    pub fn new(version: u8, index: u64, previous: Hash, miner: Hash, timestamp: u64) -> Self {
        Block {
            version,
            index,
            previous,
            miner,
            timestamp,
            nonce: 0,
            signature: None,
            payload: Payload::Transactions(Vec::new()),
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.previous.is_zero()
    }

    pub fn transactions(&self) -> &[Transaction] {
        self.payload.transactions()
    }

    /// `work` of this block: leading zero bits of its signature. `None`
    /// if unsigned.
    pub fn work(&self) -> Option<u32> {
        self.signature.map(|s| s.leading_zero_bits())
    }

    /// Exactly: `le64(index) || le64(nonce) || previous[32] ||
    /// u8(version) || miner[32] || le64(timestamp) || payloadSigningBytes`.
    pub fn canonical_signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.index.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(self.previous.as_bytes());
        out.push(self.version);
        out.extend_from_slice(self.miner.as_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.payload.signing_bytes());
        out
    }

    pub fn compute_hash(&self) -> Hash {
        sha256(&self.canonical_signing_bytes())
    }

    /// Appends `tx` to a non-genesis block's transaction list.
    ///
    /// Returns `Ok(false)` (idempotent no-op) if a transaction with the
    /// same signature is already present. Returns `Err` if the block is
    /// already at the transaction-count limit or appending would push the
    /// payload signing bytes over 1 MiB.
    pub fn append(&mut self, tx: Transaction) -> Result<bool, ChainError> {
        let txs = match &mut self.payload {
            Payload::Seed(_) => {
                return Err(ChainError::PayloadInvalid(
                    "cannot append a transaction to a genesis block".to_string(),
                ))
            }
            Payload::Transactions(txs) => txs,
        };

        if let Some(sig) = &tx.signature {
            if txs.iter().any(|existing| existing.signature.as_ref() == Some(sig)) {
                return Ok(false);
            }
        }

        if txs.len() >= MAX_TRANSACTIONS {
            return Err(ChainError::TooManyTransactions);
        }

        let added_bytes = tx.signature.as_ref().map(|s| s.raw().len()).unwrap_or(0);
        let current_len = self.payload.signing_bytes().len();
        if current_len + added_bytes > MAX_PAYLOAD_BYTES {
            return Err(ChainError::PayloadInvalid(
                "appending transaction would exceed 1 MiB payload".to_string(),
            ));
        }

        txs.push(tx);
        Ok(true)
    }

    /// Resets nonce/timestamp ahead of a mining attempt series.
    pub fn begin_mining(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
        self.nonce = rand::random::<u64>();
        self.signature = None;
    }

    /// One proof-of-work attempt: increments the nonce, recomputes the
    /// canonical hash, and seals the block if it meets `difficulty`.
    /// Returns `true` if sealed.
    pub fn try_seal(&mut self, difficulty: u32) -> bool {
        self.nonce = self.nonce.wrapping_add(1);
        let hash = self.compute_hash();
        if hash.leading_zero_bits() >= difficulty {
            self.signature = Some(hash);
            true
        } else {
            false
        }
    }

    /// Convenience for tests: mines up to `max_attempts` nonces.
    pub fn mine(&mut self, difficulty: u32, timestamp: u64, max_attempts: u64) -> bool {
        self.begin_mining(timestamp);
        for _ in 0..max_attempts {
            if self.try_seal(difficulty) {
                return true;
            }
        }
        false
    }

    /// Validates the structural invariants of §3/§4.4: signature matches
    /// the canonical hash, payload size/count limits, genesis/non-genesis
    /// transaction-count shape, and every contained transaction's own
    /// signature. Does *not* check proof-of-work difficulty against a
    /// predecessor (a chain-level concern, see `catena-store`) or
    /// per-invoker counter monotonicity (a ledger-level concern).
    pub fn validate(&self) -> Result<(), ChainError> {
        let signature = self.signature.ok_or(ChainError::SignatureInvalid)?;
        if signature != self.compute_hash() {
            return Err(ChainError::SignatureInvalid);
        }
        if self.payload.signing_bytes().len() > MAX_PAYLOAD_BYTES {
            return Err(ChainError::PayloadInvalid("payload exceeds 1 MiB".to_string()));
        }
        match &self.payload {
            Payload::Seed(_) => {
                if !self.is_genesis() {
                    return Err(ChainError::PayloadInvalid(
                        "non-genesis block carries a seed payload".to_string(),
                    ));
                }
            }
            Payload::Transactions(txs) => {
                if self.is_genesis() {
                    return Err(ChainError::PayloadInvalid(
                        "genesis block must have an empty transaction list".to_string(),
                    ));
                }
                if txs.is_empty() {
                    return Err(ChainError::PayloadInvalid(
                        "non-genesis block must carry at least one transaction".to_string(),
                    ));
                }
                if txs.len() > MAX_TRANSACTIONS {
                    return Err(ChainError::TooManyTransactions);
                }
                for tx in txs {
                    tx.validate()?;
                }
            }
        }
        Ok(())
    }

    pub fn to_wire(&self) -> Result<BlockWire, ChainError> {
        let hash = self.signature.ok_or(ChainError::SignatureInvalid)?;
        let payload = match &self.payload {
            Payload::Seed(seed) => seed.as_bytes().to_vec(),
            Payload::Transactions(txs) => {
                let wires: Result<Vec<TransactionWire>, ChainError> =
                    txs.iter().map(|tx| tx.to_wire()).collect();
                serde_json::to_vec(&wires?).map_err(|e| ChainError::FormatError(e.to_string()))?
            }
        };
        use base64::Engine;
        Ok(BlockWire {
            hash: hash.to_hex(),
            index: self.index,
            nonce: self.nonce,
            previous: self.previous.to_hex(),
            version: self.version,
            miner: self.miner.to_hex(),
            timestamp: self.timestamp,
            payload: base64::engine::general_purpose::STANDARD.encode(payload),
        })
    }

    pub fn from_wire(wire: &BlockWire) -> Result<Self, ChainError> {
        use base64::Engine;
        let previous =
            Hash::from_hex(&wire.previous).ok_or_else(|| ChainError::FormatError("previous".into()))?;
        let miner =
            Hash::from_hex(&wire.miner).ok_or_else(|| ChainError::FormatError("miner".into()))?;
        let signature =
            Hash::from_hex(&wire.hash).ok_or_else(|| ChainError::FormatError("hash".into()))?;
        let raw_payload = base64::engine::general_purpose::STANDARD
            .decode(&wire.payload)
            .map_err(|e| ChainError::FormatError(e.to_string()))?;
        let payload = if previous.is_zero() {
            Payload::Seed(
                String::from_utf8(raw_payload).map_err(|e| ChainError::FormatError(e.to_string()))?,
            )
        } else {
            let wires: Vec<TransactionWire> = serde_json::from_slice(&raw_payload)
                .map_err(|e| ChainError::FormatError(e.to_string()))?;
            let txs: Result<Vec<Transaction>, ChainError> =
                wires.iter().map(Transaction::from_wire).collect();
            Payload::Transactions(txs?)
        };
        Ok(Block {
            version: wire.version,
            index: wire.index,
            previous,
            miner,
            timestamp: wire.timestamp,
            nonce: wire.nonce,
            signature: Some(signature),
            payload,
        })
    }
}

/// Wire form of a block (§6), extended with `version`/`miner`/`timestamp`
/// — see `SPEC_FULL.md` §D.6a for why those three are necessary beyond the
/// five fields named in the base spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockWire {
    pub hash: String,
    pub index: u64,
    pub nonce: u64,
    pub previous: String,
    pub version: u8,
    pub miner: String,
    pub timestamp: u64,
    pub payload: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::{sha256, PrivateKey};
    use catena_sql_parser::parse;

    fn signed_tx(key: &PrivateKey, counter: u64) -> Transaction {
        let stmt = parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        let mut tx = Transaction::new_unsigned(key.public(), "db".to_string(), counter, stmt);
        tx.sign(key);
        tx
    }

    #[test]
    fn genesis_mines_and_validates() {
        let miner_key = PrivateKey::generate();
        let mut block = Block::genesis(1, miner_key.public().identity_hash(), 0, "foo".to_string());
        assert!(block.mine(4, 0, 1_000_000));
        assert!(block.validate().is_ok());
        assert!(block.work().unwrap() >= 4);
    }

    #[test]
    fn append_rejects_duplicate_idempotently() {
        let key = PrivateKey::generate();
        let miner = key.public().identity_hash();
        let mut block = Block::new(1, 1, Hash::ZERO, miner, 0);
        let tx = signed_tx(&key, 0);
        assert_eq!(block.append(tx.clone()).unwrap(), true);
        assert_eq!(block.append(tx).unwrap(), false);
        assert_eq!(block.transactions().len(), 1);
    }

    #[test]
    fn non_genesis_requires_at_least_one_transaction() {
        let key = PrivateKey::generate();
        let miner = key.public().identity_hash();
        let mut block = Block::new(1, 1, sha256(b"previous block"), miner, 0);
        block.mine(2, 1, 1_000_000);
        assert_eq!(
            block.validate(),
            Err(ChainError::PayloadInvalid(
                "non-genesis block must carry at least one transaction".to_string()
            ))
        );
    }

    #[test]
    fn wire_roundtrip_for_non_genesis_block() {
        let key = PrivateKey::generate();
        let miner = key.public().identity_hash();
        let mut block = Block::new(1, 1, sha256(b"previous block"), miner, 10);
        block.append(signed_tx(&key, 0)).unwrap();
        block.mine(2, 10, 1_000_000);
        let wire = block.to_wire().unwrap();
        let back = Block::from_wire(&wire).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn tampered_signature_fails_validation() {
        let miner_key = PrivateKey::generate();
        let mut block = Block::genesis(1, miner_key.public().identity_hash(), 0, "foo".to_string());
        block.mine(2, 0, 1_000_000);
        block.nonce = block.nonce.wrapping_add(1);
        assert_eq!(block.validate(), Err(ChainError::SignatureInvalid));
    }
}
