use rusqlite::Connection;

use crate::error::MetadataError;

/// Tables that are invisible to user-submitted SQL: referencing any of them
/// in a statement's required privileges is always rejected by the backend.
pub const INVISIBLE_TABLES: [&str; 3] = ["_info", "_blocks", "_users"];

/// All four metadata tables, including `grants` — `SHOW TABLES` excludes
/// every one of these, not just the three invisible to direct reference.
pub const ALL_METADATA_TABLES: [&str; 4] = ["_info", "_blocks", "_users", "grants"];

/// Bootstraps the three internal metadata tables. `grants` is deliberately
/// not created here: it comes into existence the same way any other user
/// table does, via a `CREATE TABLE` transaction in the genesis block.
pub fn bootstrap(conn: &Connection) -> Result<(), MetadataError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS _info (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS _blocks (
            signature BLOB PRIMARY KEY,
            idx       INTEGER NOT NULL,
            nonce     INTEGER NOT NULL,
            previous  BLOB NOT NULL,
            timestamp INTEGER NOT NULL,
            miner     BLOB NOT NULL,
            version   INTEGER NOT NULL,
            payload   BLOB NOT NULL,
            work      INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS _blocks_idx ON _blocks(idx);

        CREATE TABLE IF NOT EXISTS _users (
            user    BLOB PRIMARY KEY,
            counter INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
