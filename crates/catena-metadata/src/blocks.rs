use catena_chain_types::{Block, BlockWire};
use catena_crypto::Hash;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::MetadataError;

/// `_blocks`: one archived row per accepted block, keyed by signature.
pub struct SQLBlockArchive<'a> {
    conn: &'a Connection,
}

impl<'a> SQLBlockArchive<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SQLBlockArchive { conn }
    }

    pub fn insert(&self, block: &Block) -> Result<(), MetadataError> {
        let wire = block
            .to_wire()
            .map_err(|_| MetadataError::MalformedHash)?;
        let signature = block.signature.ok_or(MetadataError::MalformedHash)?;
        let work = signature.leading_zero_bits();
        self.conn.execute(
            "INSERT INTO _blocks (signature, idx, nonce, previous, timestamp, miner, version, payload, work)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                signature.as_bytes().to_vec(),
                block.index as i64,
                block.nonce as i64,
                block.previous.as_bytes().to_vec(),
                block.timestamp as i64,
                block.miner.as_bytes().to_vec(),
                block.version as i64,
                wire.payload,
                work as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, hash: Hash) -> Result<Option<Block>, MetadataError> {
        let row = self
            .conn
            .query_row(
                "SELECT signature, idx, nonce, previous, timestamp, miner, version, payload
                 FROM _blocks WHERE signature = ?1",
                params![hash.as_bytes().to_vec()],
                row_to_wire,
            )
            .optional()?;
        row.map(|wire| {
            Block::from_wire(&wire).map_err(|_| MetadataError::MalformedHash)
        })
        .transpose()
    }

    pub fn get_at(&self, index: u64) -> Result<Option<Block>, MetadataError> {
        let row = self
            .conn
            .query_row(
                "SELECT signature, idx, nonce, previous, timestamp, miner, version, payload
                 FROM _blocks WHERE idx = ?1",
                params![index as i64],
                row_to_wire,
            )
            .optional()?;
        row.map(|wire| {
            Block::from_wire(&wire).map_err(|_| MetadataError::MalformedHash)
        })
        .transpose()
    }

    /// `SUM(work) WHERE index BETWEEN a AND b`.
    pub fn total_work(&self, from_index: u64, to_index: u64) -> Result<u64, MetadataError> {
        let total: Option<i64> = self.conn.query_row(
            "SELECT SUM(work) FROM _blocks WHERE idx BETWEEN ?1 AND ?2",
            params![from_index as i64, to_index as i64],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0) as u64)
    }

    pub fn remove(&self, hash: Hash) -> Result<(), MetadataError> {
        self.conn.execute(
            "DELETE FROM _blocks WHERE signature = ?1",
            params![hash.as_bytes().to_vec()],
        )?;
        Ok(())
    }
}

fn row_to_wire(row: &rusqlite::Row) -> rusqlite::Result<BlockWire> {
    let signature: Vec<u8> = row.get(0)?;
    let previous: Vec<u8> = row.get(3)?;
    let miner: Vec<u8> = row.get(5)?;
    let payload: Vec<u8> = row.get(7)?;
    Ok(BlockWire {
        hash: hex::encode(signature),
        index: row.get::<_, i64>(1)? as u64,
        nonce: row.get::<_, i64>(2)? as u64,
        previous: hex::encode(previous),
        version: row.get::<_, i64>(6)? as u8,
        miner: hex::encode(miner),
        timestamp: row.get::<_, i64>(4)? as u64,
        payload: {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(payload)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::PrivateKey;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::bootstrap(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let conn = conn();
        let archive = SQLBlockArchive::new(&conn);
        let key = PrivateKey::generate();
        let mut block = Block::genesis(1, key.public().identity_hash(), 10, "seed".to_string());
        block.mine(2, 10, 1_000_000);
        archive.insert(&block).unwrap();

        let by_hash = archive.get(block.signature.unwrap()).unwrap().unwrap();
        assert_eq!(by_hash, block);
        let by_index = archive.get_at(0).unwrap().unwrap();
        assert_eq!(by_index, block);
    }

    #[test]
    fn total_work_sums_inclusive_range() {
        let conn = conn();
        let archive = SQLBlockArchive::new(&conn);
        let key = PrivateKey::generate();

        let mut genesis = Block::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        genesis.mine(2, 0, 1_000_000);
        archive.insert(&genesis).unwrap();

        let mut next = Block::new(1, 1, genesis.signature.unwrap(), key.public().identity_hash(), 1);
        next.mine(2, 1, 1_000_000);
        // genesis block's payload is empty here only for the work-sum test;
        // `validate()` would reject it, but the archive does not re-validate.
        archive.insert(&next).unwrap();

        let total = archive.total_work(0, 1).unwrap();
        assert_eq!(
            total as u32,
            genesis.work().unwrap() + next.work().unwrap()
        );
    }

    #[test]
    fn remove_deletes_row() {
        let conn = conn();
        let archive = SQLBlockArchive::new(&conn);
        let key = PrivateKey::generate();
        let mut block = Block::genesis(1, key.public().identity_hash(), 0, "seed".to_string());
        block.mine(2, 0, 1_000_000);
        archive.insert(&block).unwrap();
        archive.remove(block.signature.unwrap()).unwrap();
        assert_eq!(archive.get(block.signature.unwrap()).unwrap(), None);
    }
}
