//! Statement execution (§4.2): control flow, privilege regime, and the
//! translation of `GRANT`/`REVOKE`/`SHOW TABLES` into real table operations.

use catena_chain_types::ChainError;
use catena_metadata::ALL_METADATA_TABLES;
use catena_sql_parser::{Expr, Literal, Privilege, SelectStmt, Statement};
use rusqlite::{params, Connection};

use crate::context::{check_parameters, substitute_variables, Context};
use crate::identifiers;
use crate::value::{literal_from_row, truthy};
use crate::verify;

/// Called once per executed (sub)statement with that statement's required
/// privileges; returning `false` raises [`ChainError::PrivilegeRequired`].
/// Block application and read-only previews pass different regimes.
pub type Regime<'a> = dyn FnMut(&[Privilege]) -> bool + 'a;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Done,
    Rows(Vec<Vec<Literal>>),
    Tables(Vec<String>),
}

fn sql_err(e: rusqlite::Error) -> ChainError {
    log::warn!("sql execution error: {e}");
    ChainError::ExecutionFailed
}

fn eval_scalar(conn: &Connection, expr: &Expr) -> Result<Literal, ChainError> {
    let select = Statement::Select(SelectStmt {
        distinct: false,
        columns: vec![expr.clone()],
        from: None,
        joins: Vec::new(),
        where_clause: None,
        order_by: Vec::new(),
        limit: None,
    });
    conn.query_row(&select.canonical_sql(), [], |row| literal_from_row(row, 0))
        .map_err(sql_err)
}

fn eval_condition(conn: &Connection, expr: &Expr) -> Result<bool, ChainError> {
    eval_scalar(conn, expr).map(|lit| truthy(&lit))
}

fn literal_as_blob(lit: &Literal) -> Option<Vec<u8>> {
    match lit {
        Literal::Blob(b) => Some(b.clone()),
        Literal::Text(s) => Some(s.clone().into_bytes()),
        _ => None,
    }
}

fn run_select(conn: &Connection, stmt: &Statement) -> Result<ExecutionOutcome, ChainError> {
    let sql = stmt.canonical_sql();
    let mut prepared = conn.prepare(&sql).map_err(sql_err)?;
    let column_count = prepared.column_count();
    let rows = prepared
        .query_map([], |row| {
            (0..column_count)
                .map(|i| literal_from_row(row, i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(sql_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(sql_err)?);
    }
    Ok(ExecutionOutcome::Rows(out))
}

fn run_mutation(conn: &Connection, stmt: &Statement) -> Result<ExecutionOutcome, ChainError> {
    conn.execute_batch(&stmt.canonical_sql()).map_err(sql_err)?;
    Ok(ExecutionOutcome::Done)
}

fn show_tables(conn: &Connection) -> Result<ExecutionOutcome, ChainError> {
    let mut prepared = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .map_err(sql_err)?;
    let rows = prepared
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(sql_err)?;
    let mut tables = Vec::new();
    for row in rows {
        let name = row.map_err(sql_err)?;
        if name.starts_with("sqlite_") || ALL_METADATA_TABLES.contains(&name.as_str()) {
            continue;
        }
        tables.push(identifiers::unrewrite_column_name(&name));
    }
    Ok(ExecutionOutcome::Tables(tables))
}

fn subject_bytes(privilege: &Privilege) -> Result<Option<Vec<u8>>, ChainError> {
    match privilege {
        Privilege::Never => Err(ChainError::PrivilegeRequired),
        Privilege::Template(hash) => Ok(Some(hash.as_bytes().to_vec())),
        other => Ok(other.table_name().map(|t| t.as_bytes().to_vec())),
    }
}

fn run_grant(
    conn: &Connection,
    ctx: &Context,
    privilege: &Privilege,
    user: &Expr,
) -> Result<ExecutionOutcome, ChainError> {
    let user_lit = eval_scalar(conn, user)?;
    let user_bytes = literal_as_blob(&user_lit)
        .ok_or_else(|| ChainError::SyntaxError("GRANT user must be a blob or text value".into()))?;
    let subject = subject_bytes(privilege)?;
    conn.execute(
        "INSERT INTO grants (database, kind, user, \"table\") VALUES (?1, ?2, ?3, ?4)",
        params![ctx.database, privilege.kind_name(), user_bytes, subject],
    )
    .map_err(sql_err)?;
    Ok(ExecutionOutcome::Done)
}

fn run_revoke(
    conn: &Connection,
    ctx: &Context,
    privilege: &Privilege,
    user: &Expr,
) -> Result<ExecutionOutcome, ChainError> {
    let user_lit = eval_scalar(conn, user)?;
    let user_bytes = literal_as_blob(&user_lit)
        .ok_or_else(|| ChainError::SyntaxError("REVOKE user must be a blob or text value".into()))?;
    let subject = subject_bytes(privilege)?;
    conn.execute(
        "DELETE FROM grants WHERE database = ?1 AND kind = ?2 AND user IS ?3 AND \"table\" IS ?4",
        params![ctx.database, privilege.kind_name(), user_bytes, subject],
    )
    .map_err(sql_err)?;
    Ok(ExecutionOutcome::Done)
}

fn execute_inner(
    conn: &Connection,
    stmt: &Statement,
    ctx: &Context,
    regime: &mut Regime,
) -> Result<ExecutionOutcome, ChainError> {
    match stmt {
        Statement::If(s) => {
            for (cond, body) in &s.branches {
                if eval_condition(conn, cond)? {
                    return execute_inner(conn, body, ctx, regime);
                }
            }
            match &s.else_branch {
                Some(else_branch) => execute_inner(conn, else_branch, ctx, regime),
                None => Ok(ExecutionOutcome::Done),
            }
        }
        Statement::Fail => Err(ChainError::ExecutionFailed),
        Statement::ShowTables => show_tables(conn),
        // Index creation is reserved and may never execute via a transaction,
        // regardless of what the active regime would otherwise allow.
        Statement::CreateIndex { .. } => Err(ChainError::PrivilegeRequired),
        other => {
            if !regime(&other.required_privileges()) {
                return Err(ChainError::PrivilegeRequired);
            }
            match other {
                Statement::Select(_) => run_select(conn, other),
                Statement::Grant { privilege, user } => run_grant(conn, ctx, privilege, user),
                Statement::Revoke { privilege, user } => run_revoke(conn, ctx, privilege, user),
                _ => run_mutation(conn, other),
            }
        }
    }
}

/// Verifies, rewrites and executes `stmt` against `conn` under `ctx` and
/// `regime`. This is the single entry point external callers should use.
pub fn execute(
    conn: &Connection,
    stmt: &Statement,
    ctx: &Context,
    regime: &mut Regime,
) -> Result<ExecutionOutcome, ChainError> {
    verify::verify(conn, stmt)?;
    let rewritten = identifiers::rewrite(stmt.clone());
    let substituted = substitute_variables(rewritten, ctx)?;
    check_parameters(&substituted)?;
    execute_inner(conn, &substituted, ctx, regime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_sql_parser::parse;

    fn ctx() -> Context {
        Context {
            invoker: catena_crypto::sha256(b"alice"),
            database: "db".to_string(),
            block_miner: catena_crypto::sha256(b"miner"),
            block_timestamp: 1,
            block_height: 1,
            block_signature: catena_crypto::Hash::ZERO,
            previous_block_signature: catena_crypto::Hash::ZERO,
        }
    }

    fn allow_all(_: &[Privilege]) -> bool {
        true
    }

    fn deny_all(_: &[Privilege]) -> bool {
        false
    }

    #[test]
    fn create_and_select_roundtrip() {
        let conn = Connection::open_in_memory().unwrap();
        let create = parse("CREATE TABLE foo(x INTEGER, y TEXT)").unwrap();
        execute(&conn, &create, &ctx(), &mut allow_all).unwrap();

        let insert = parse("INSERT INTO foo (x, y) VALUES (1, 'a')").unwrap();
        execute(&conn, &insert, &ctx(), &mut allow_all).unwrap();

        let select = parse("SELECT x, y FROM foo").unwrap();
        let outcome = execute(&conn, &select, &ctx(), &mut allow_all).unwrap();
        assert_eq!(
            outcome,
            ExecutionOutcome::Rows(vec![vec![Literal::Unsigned(1), Literal::Text("a".into())]])
        );
    }

    #[test]
    fn privilege_denied_by_regime() {
        let conn = Connection::open_in_memory().unwrap();
        let create = parse("CREATE TABLE foo(x INTEGER)").unwrap();
        let err = execute(&conn, &create, &ctx(), &mut deny_all).unwrap_err();
        assert_eq!(err, ChainError::PrivilegeRequired);
    }

    #[test]
    fn fail_statement_always_errors() {
        let conn = Connection::open_in_memory().unwrap();
        let stmt = parse("FAIL").unwrap();
        assert_eq!(
            execute(&conn, &stmt, &ctx(), &mut allow_all).unwrap_err(),
            ChainError::ExecutionFailed
        );
    }

    #[test]
    fn if_executes_matching_branch() {
        let conn = Connection::open_in_memory().unwrap();
        execute(
            &conn,
            &parse("CREATE TABLE foo(x INTEGER)").unwrap(),
            &ctx(),
            &mut allow_all,
        )
        .unwrap();
        let stmt = parse("IF 1 = 2 THEN FAIL ELSE IF 1 = 1 THEN INSERT INTO foo (x) VALUES (9) ELSE FAIL END").unwrap();
        execute(&conn, &stmt, &ctx(), &mut allow_all).unwrap();
        let select = parse("SELECT x FROM foo").unwrap();
        let outcome = execute(&conn, &select, &ctx(), &mut allow_all).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Rows(vec![vec![Literal::Unsigned(9)]]));
    }

    #[test]
    fn create_index_is_never_permitted() {
        let conn = Connection::open_in_memory().unwrap();
        execute(
            &conn,
            &parse("CREATE TABLE foo(x INTEGER)").unwrap(),
            &ctx(),
            &mut allow_all,
        )
        .unwrap();
        let stmt = parse("CREATE INDEX idx_foo ON foo(x)").unwrap();
        assert_eq!(
            execute(&conn, &stmt, &ctx(), &mut allow_all).unwrap_err(),
            ChainError::PrivilegeRequired
        );
    }

    #[test]
    fn show_tables_excludes_metadata() {
        let conn = Connection::open_in_memory().unwrap();
        catena_metadata::bootstrap(&conn).unwrap();
        execute(
            &conn,
            &parse("CREATE TABLE foo(x INTEGER)").unwrap(),
            &ctx(),
            &mut allow_all,
        )
        .unwrap();
        let outcome = execute(&conn, &parse("SHOW TABLES").unwrap(), &ctx(), &mut allow_all).unwrap();
        assert_eq!(outcome, ExecutionOutcome::Tables(vec!["foo".to_string()]));
    }

    #[test]
    fn grant_then_revoke_round_trips_through_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE grants (database TEXT, kind TEXT, user BLOB, \"table\" BLOB);",
        )
        .unwrap();
        let grant = parse("GRANT INSERT ON foo TO $invoker").unwrap();
        execute(&conn, &grant, &ctx(), &mut allow_all).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM grants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let revoke = parse("REVOKE INSERT ON foo TO $invoker").unwrap();
        execute(&conn, &revoke, &ctx(), &mut allow_all).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM grants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
