//! Schema verification pass (§4.2): referenced tables/columns must exist
//! before a statement executes, independent of whatever the engine itself
//! would raise.

use catena_chain_types::ChainError;
use catena_sql_parser::Statement;
use rusqlite::Connection;

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, ChainError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            rusqlite::params![table],
            |row| row.get(0),
        )
        .map_err(|e| {
            log::warn!("schema lookup failed: {e}");
            ChainError::ExecutionFailed
        })?;
    Ok(count > 0)
}

pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, ChainError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", catena_sql_parser::quote_ident(table)))
        .map_err(|_| ChainError::TableDoesNotExist(table.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|_| ChainError::TableDoesNotExist(table.to_string()))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|_| ChainError::TableDoesNotExist(table.to_string()))?);
    }
    Ok(columns)
}

fn require_table(conn: &Connection, table: &str) -> Result<(), ChainError> {
    if table_exists(conn, table)? {
        Ok(())
    } else {
        Err(ChainError::TableDoesNotExist(table.to_string()))
    }
}

fn require_columns(conn: &Connection, table: &str, columns: &[String]) -> Result<(), ChainError> {
    let schema = table_columns(conn, table)?;
    for col in columns {
        if !schema.iter().any(|c| c == col) {
            return Err(ChainError::ColumnDoesNotExist(col.clone()));
        }
    }
    Ok(())
}

pub fn verify(conn: &Connection, stmt: &Statement) -> Result<(), ChainError> {
    match stmt {
        Statement::Select(s) => {
            if let Some(table) = &s.from {
                require_table(conn, table)?;
                for join in &s.joins {
                    require_table(conn, &join.table)?;
                }
            }
            Ok(())
        }
        Statement::CreateTable(s) => {
            if table_exists(conn, &s.table)? {
                Err(ChainError::TableAlreadyExists(s.table.clone()))
            } else {
                Ok(())
            }
        }
        Statement::DropTable(table) => require_table(conn, table),
        Statement::Insert(s) => {
            require_table(conn, &s.table)?;
            require_columns(conn, &s.table, &s.columns)
        }
        Statement::Update(s) => {
            require_table(conn, &s.table)?;
            let columns: Vec<String> = s.assignments.iter().map(|(c, _)| c.clone()).collect();
            require_columns(conn, &s.table, &columns)
        }
        Statement::Delete(s) => require_table(conn, &s.table),
        Statement::If(s) => {
            for (_, body) in &s.branches {
                verify(conn, body)?;
            }
            if let Some(else_branch) = &s.else_branch {
                verify(conn, else_branch)?;
            }
            Ok(())
        }
        Statement::Fail
        | Statement::ShowTables
        | Statement::Grant { .. }
        | Statement::Revoke { .. }
        | Statement::CreateIndex { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE foo (x INTEGER, y TEXT)").unwrap();
        conn
    }

    #[test]
    fn missing_table_rejected() {
        let conn = conn();
        let stmt = catena_sql_parser::parse("SELECT * FROM bar").unwrap();
        assert!(matches!(
            verify(&conn, &stmt),
            Err(ChainError::TableDoesNotExist(_))
        ));
    }

    #[test]
    fn create_existing_table_rejected() {
        let conn = conn();
        let stmt = catena_sql_parser::parse("CREATE TABLE foo(x INTEGER)").unwrap();
        assert!(matches!(
            verify(&conn, &stmt),
            Err(ChainError::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn unknown_insert_column_rejected() {
        let conn = conn();
        let stmt = catena_sql_parser::parse("INSERT INTO foo (z) VALUES (1)").unwrap();
        assert!(matches!(
            verify(&conn, &stmt),
            Err(ChainError::ColumnDoesNotExist(_))
        ));
    }

    #[test]
    fn valid_statement_passes() {
        let conn = conn();
        let stmt = catena_sql_parser::parse("INSERT INTO foo (x, y) VALUES (1, 'a')").unwrap();
        assert!(verify(&conn, &stmt).is_ok());
    }
}
