use catena_crypto::Hash;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::MetadataError;

const KEY_HEAD: &str = "head";
const KEY_INDEX: &str = "index";
const KEY_REPLAYING: &str = "replaying";
const KEY_ENFORCING_GRANTS: &str = "enforcingGrants";

fn get(conn: &Connection, key: &str) -> Result<Option<String>, MetadataError> {
    Ok(conn
        .query_row("SELECT value FROM _info WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

fn set(conn: &Connection, key: &str, value: &str) -> Result<(), MetadataError> {
    conn.execute(
        "INSERT INTO _info (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn get_bool(conn: &Connection, key: &str) -> Result<bool, MetadataError> {
    Ok(get(conn, key)?.as_deref() == Some("true"))
}

fn set_bool(conn: &Connection, key: &str, value: bool) -> Result<(), MetadataError> {
    set(conn, key, if value { "true" } else { "false" })
}

pub fn head(conn: &Connection) -> Result<Option<Hash>, MetadataError> {
    match get(conn, KEY_HEAD)? {
        None => Ok(None),
        Some(hex) => Hash::from_hex(&hex).ok_or(MetadataError::MalformedHash).map(Some),
    }
}

pub fn set_head(conn: &Connection, head: Hash, index: u64) -> Result<(), MetadataError> {
    set(conn, KEY_HEAD, &head.to_hex())?;
    set(conn, KEY_INDEX, &index.to_string())
}

pub fn head_index(conn: &Connection) -> Result<Option<u64>, MetadataError> {
    Ok(get(conn, KEY_INDEX)?.and_then(|s| s.parse().ok()))
}

pub fn is_replaying(conn: &Connection) -> Result<bool, MetadataError> {
    get_bool(conn, KEY_REPLAYING)
}

pub fn set_replaying(conn: &Connection, value: bool) -> Result<(), MetadataError> {
    set_bool(conn, KEY_REPLAYING, value)
}

pub fn is_enforcing_grants(conn: &Connection) -> Result<bool, MetadataError> {
    get_bool(conn, KEY_ENFORCING_GRANTS)
}

pub fn set_enforcing_grants(conn: &Connection, value: bool) -> Result<(), MetadataError> {
    set_bool(conn, KEY_ENFORCING_GRANTS, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::bootstrap(&conn).unwrap();
        conn
    }

    #[test]
    fn head_roundtrips() {
        let conn = conn();
        assert_eq!(head(&conn).unwrap(), None);
        let h = catena_crypto::sha256(b"genesis");
        set_head(&conn, h, 0).unwrap();
        assert_eq!(head(&conn).unwrap(), Some(h));
        assert_eq!(head_index(&conn).unwrap(), Some(0));
    }

    #[test]
    fn flags_default_false_and_toggle() {
        let conn = conn();
        assert!(!is_replaying(&conn).unwrap());
        assert!(!is_enforcing_grants(&conn).unwrap());
        set_enforcing_grants(&conn, true).unwrap();
        assert!(is_enforcing_grants(&conn).unwrap());
    }
}
