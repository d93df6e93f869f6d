use std::collections::HashMap;

use catena_crypto::Hash;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::MetadataError;

/// `_users(user BLOB PK, counter INT)` — the highest transaction counter
/// ever applied per invoker identity hash.
pub struct SQLUsersTable<'a> {
    conn: &'a Connection,
}

impl<'a> SQLUsersTable<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SQLUsersTable { conn }
    }

    pub fn counter(&self, user: Hash) -> Result<Option<u64>, MetadataError> {
        let counter: Option<i64> = self
            .conn
            .query_row(
                "SELECT counter FROM _users WHERE user = ?1",
                params![user.as_bytes().to_vec()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(counter.map(|c| c as u64))
    }

    pub fn set_counter(&self, user: Hash, counter: u64) -> Result<(), MetadataError> {
        self.conn.execute(
            "INSERT INTO _users (user, counter) VALUES (?1, ?2)
             ON CONFLICT(user) DO UPDATE SET counter = excluded.counter",
            params![user.as_bytes().to_vec(), counter as i64],
        )?;
        Ok(())
    }

    pub fn counters(&self) -> Result<HashMap<Hash, u64>, MetadataError> {
        let mut stmt = self.conn.prepare("SELECT user, counter FROM _users")?;
        let rows = stmt.query_map([], |row| {
            let user: Vec<u8> = row.get(0)?;
            let counter: i64 = row.get(1)?;
            Ok((user, counter as u64))
        })?;
        let mut out = HashMap::new();
        for row in rows {
            let (user, counter) = row?;
            let user: [u8; 32] = user.try_into().map_err(|_| MetadataError::MalformedHash)?;
            out.insert(Hash::from_bytes(user), counter);
        }
        Ok(out)
    }
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
    fn counter_absent_until_set() {
        let conn = conn();
        let table = SQLUsersTable::new(&conn);
        let user = catena_crypto::sha256(b"alice");
        assert_eq!(table.counter(user).unwrap(), None);
        table.set_counter(user, 0).unwrap();
        assert_eq!(table.counter(user).unwrap(), Some(0));
        table.set_counter(user, 5).unwrap();
        assert_eq!(table.counter(user).unwrap(), Some(5));
    }

    #[test]
    fn counters_enumerates_all_users() {
        let conn = conn();
        let table = SQLUsersTable::new(&conn);
        let alice = catena_crypto::sha256(b"alice");
        let bob = catena_crypto::sha256(b"bob");
        table.set_counter(alice, 1).unwrap();
        table.set_counter(bob, 2).unwrap();
        let counters = table.counters().unwrap();
        assert_eq!(counters.get(&alice), Some(&1));
        assert_eq!(counters.get(&bob), Some(&2));
    }
}
