use catena_crypto::Hash;
use catena_sql_parser::Privilege;
use rusqlite::{params, Connection};

use crate::error::MetadataError;

/// `grants(database TEXT, kind TEXT, user BLOB NULL, table BLOB NULL)` —
/// access-control rows. Created by the genesis transaction like any other
/// user table, not by [`crate::schema::bootstrap`].
pub struct SQLGrants<'a> {
    conn: &'a Connection,
}

impl<'a> SQLGrants<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        SQLGrants { conn }
    }

    /// True iff every privilege in `privileges` is satisfied by some row in
    /// `grants`. `Privilege::Never` is satisfied by nothing — it marks
    /// statements that must never execute via a transaction.
    pub fn check(
        &self,
        privileges: &[Privilege],
        for_user: Hash,
        database: &str,
    ) -> Result<bool, MetadataError> {
        for privilege in privileges {
            if !self.satisfied(privilege, for_user, database)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn satisfied(
        &self,
        privilege: &Privilege,
        for_user: Hash,
        database: &str,
    ) -> Result<bool, MetadataError> {
        if matches!(privilege, Privilege::Never) {
            return Ok(false);
        }

        let subject: Option<Vec<u8>> = match privilege {
            Privilege::Template(hash) => Some(hash.as_bytes().to_vec()),
            _ => privilege.table_name().map(|t| t.as_bytes().to_vec()),
        };
        let is_template = matches!(privilege, Privilege::Template(_));

        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM grants
             WHERE (user IS NULL OR user = ?1)
               AND kind = ?2
               AND database = ?3
               AND (
                     (?4 AND \"table\" = ?5)
                  OR (NOT ?4 AND (\"table\" IS NULL OR \"table\" = ?5))
               )",
            params![
                for_user.as_bytes().to_vec(),
                privilege.kind_name(),
                database,
                is_template,
                subject,
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_crypto::sha256;
    use catena_sql_parser::parse;

    fn conn_with_grants() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::bootstrap(&conn).unwrap();
        conn.execute_batch(
            "CREATE TABLE grants (database TEXT, kind TEXT, user BLOB, \"table\" BLOB);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn wildcard_user_and_table_grant_satisfies() {
        let conn = conn_with_grants();
        conn.execute(
            "INSERT INTO grants (database, kind, user, \"table\") VALUES ('db', 'insert', NULL, NULL)",
            [],
        )
        .unwrap();
        let grants = SQLGrants::new(&conn);
        let user = sha256(b"alice");
        let stmt = parse("INSERT INTO foo (x) VALUES (1)").unwrap();
        assert!(grants
            .check(&stmt.required_privileges(), user, "db")
            .unwrap());
    }

    #[test]
    fn table_scoped_grant_does_not_cover_other_tables() {
        let conn = conn_with_grants();
        conn.execute(
            "INSERT INTO grants (database, kind, user, \"table\") VALUES ('db', 'insert', NULL, ?1)",
            params!["foo".as_bytes()],
        )
        .unwrap();
        let grants = SQLGrants::new(&conn);
        let user = sha256(b"alice");
        let bar = parse("INSERT INTO bar (x) VALUES (1)").unwrap();
        assert!(!grants
            .check(&bar.required_privileges(), user, "db")
            .unwrap());
    }

    #[test]
    fn never_privilege_is_never_satisfied() {
        let conn = conn_with_grants();
        let grants = SQLGrants::new(&conn);
        let user = sha256(b"alice");
        assert!(!grants.check(&[Privilege::Never], user, "db").unwrap());
    }

    #[test]
    fn template_grant_requires_exact_hash_match() {
        let conn = conn_with_grants();
        let hash = sha256(b"some template");
        conn.execute(
            "INSERT INTO grants (database, kind, user, \"table\") VALUES ('db', 'template', NULL, ?1)",
            params![hash.as_bytes().to_vec()],
        )
        .unwrap();
        let grants = SQLGrants::new(&conn);
        let user = sha256(b"alice");
        assert!(grants
            .check(&[Privilege::Template(hash)], user, "db")
            .unwrap());
        let other = sha256(b"different template");
        assert!(!grants
            .check(&[Privilege::Template(other)], user, "db")
            .unwrap());
    }
}
