//! Reserved-identifier rewriting (§4.2): table names beginning with
//! `sqlite_` are remapped so user statements can never reach the engine's
//! own catalog tables, and the two implicit rowid aliases are remapped so
//! a user column named `rowid`/`oid` cannot be confused with them.

use catena_sql_parser::visitor::Visitor;
use catena_sql_parser::Statement;

const RESERVED_TABLE_PREFIX: &str = "sqlite_";
const REWRITTEN_TABLE_PREFIX: &str = "sqlite#";

fn rewrite_table(name: &str) -> String {
    match name.strip_prefix(RESERVED_TABLE_PREFIX) {
        Some(rest) => format!("{REWRITTEN_TABLE_PREFIX}{rest}"),
        None => name.to_string(),
    }
}

fn unrewrite_table(name: &str) -> String {
    match name.strip_prefix(REWRITTEN_TABLE_PREFIX) {
        Some(rest) => format!("{RESERVED_TABLE_PREFIX}{rest}"),
        None => name.to_string(),
    }
}

fn rewrite_column(name: &str) -> String {
    match name {
        "rowid" => "$rowid".to_string(),
        "oid" => "$oid".to_string(),
        other => other.to_string(),
    }
}

fn unrewrite_column(name: &str) -> String {
    match name {
        "$rowid" => "rowid".to_string(),
        "$oid" => "oid".to_string(),
        other => other.to_string(),
    }
}

struct RewriteIdentifiers;

impl Visitor for RewriteIdentifiers {
    fn visit_table(&mut self, name: String) -> String {
        rewrite_table(&name)
    }

    fn visit_column(&mut self, name: String) -> String {
        rewrite_column(&name)
    }
}

struct UnrewriteIdentifiers;

impl Visitor for UnrewriteIdentifiers {
    fn visit_table(&mut self, name: String) -> String {
        unrewrite_table(&name)
    }

    fn visit_column(&mut self, name: String) -> String {
        unrewrite_column(&name)
    }
}

/// Rewrites every table/column identifier of `stmt` ahead of execution.
pub fn rewrite(stmt: Statement) -> Statement {
    catena_sql_parser::visitor::walk_statement(stmt, &mut RewriteIdentifiers)
}

/// A result column name as it should be reported back to the caller.
pub fn unrewrite_column_name(name: &str) -> String {
    unrewrite_column(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use catena_sql_parser::parse;

    #[test]
    fn sqlite_prefixed_table_is_rewritten_and_back() {
        let stmt = parse("SELECT * FROM sqlite_master").unwrap();
        let rewritten = rewrite(stmt);
        match &rewritten {
            Statement::Select(s) => assert_eq!(s.from.as_deref(), Some("sqlite#master")),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn ordinary_table_untouched() {
        let stmt = parse("SELECT * FROM foo").unwrap();
        let rewritten = rewrite(stmt);
        match &rewritten {
            Statement::Select(s) => assert_eq!(s.from.as_deref(), Some("foo")),
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn rowid_column_is_rewritten() {
        assert_eq!(rewrite_column("rowid"), "$rowid");
        assert_eq!(unrewrite_column("$rowid"), "rowid");
        assert_eq!(rewrite_column("normal"), "normal");
    }
}
