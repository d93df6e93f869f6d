use std::collections::HashMap;

use catena_chain_types::ChainError;
use catena_crypto::Hash;
use catena_sql_parser::visitor::{walk_statement, Visitor};
use catena_sql_parser::{Expr, Literal, ParamValue, Statement};

/// The execution-time values `$ident` variables resolve to (§4.2).
#[derive(Debug, Clone)]
pub struct Context {
    pub invoker: Hash,
    pub database: String,
    pub block_miner: Hash,
    pub block_timestamp: u64,
    pub block_height: u64,
    pub block_signature: Hash,
    pub previous_block_signature: Hash,
}

impl Context {
    fn variable(&self, name: &str) -> Option<Literal> {
        match name {
            "invoker" => Some(Literal::Blob(self.invoker.as_bytes().to_vec())),
            "blockMiner" => Some(Literal::Blob(self.block_miner.as_bytes().to_vec())),
            "blockTimestamp" => Some(Literal::Unsigned(self.block_timestamp)),
            "blockHeight" => Some(Literal::Unsigned(self.block_height)),
            "blockSignature" => Some(Literal::Blob(self.block_signature.as_bytes().to_vec())),
            "previousBlockSignature" => {
                Some(Literal::Blob(self.previous_block_signature.as_bytes().to_vec()))
            }
            _ => None,
        }
    }
}

struct SubstituteVariables<'a> {
    ctx: &'a Context,
    error: Option<ChainError>,
}

impl<'a> Visitor for SubstituteVariables<'a> {
    fn visit_expression(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::Variable(name) => match self.ctx.variable(&name) {
                Some(lit) => Expr::Literal(lit),
                None => {
                    self.error
                        .get_or_insert(ChainError::UnknownVariable(name));
                    Expr::Literal(Literal::Null)
                }
            },
            other => other,
        }
    }
}

/// Replaces every `$ident` variable reference with its literal value.
pub fn substitute_variables(stmt: Statement, ctx: &Context) -> Result<Statement, ChainError> {
    let mut visitor = SubstituteVariables { ctx, error: None };
    let rewritten = walk_statement(stmt, &mut visitor);
    match visitor.error {
        Some(e) => Err(e),
        None => Ok(rewritten),
    }
}

struct CollectParams {
    seen: HashMap<String, ParamValue>,
    error: Option<ChainError>,
}

impl Visitor for CollectParams {
    fn visit_expression(&mut self, expr: Expr) -> Expr {
        match &expr {
            Expr::UnboundParam(name) => {
                self.error
                    .get_or_insert(ChainError::UnboundParameter(name.clone()));
            }
            Expr::BoundParam(name, value) => {
                let value = ParamValue::Bound((**value).clone());
                match self.seen.get(name) {
                    Some(existing) if *existing != value => {
                        self.error.get_or_insert(ChainError::InconsistentParameterValue(
                            name.clone(),
                        ));
                    }
                    _ => {
                        self.seen.insert(name.clone(), value);
                    }
                }
            }
            _ => {}
        }
        expr
    }
}

/// Every bound parameter in an executable statement must be unambiguous
/// (a repeated name must carry the same value everywhere) and no unbound
/// parameter may remain.
pub fn check_parameters(stmt: &Statement) -> Result<(), ChainError> {
    let mut collector = CollectParams {
        seen: HashMap::new(),
        error: None,
    };
    let _ = walk_statement(stmt.clone(), &mut collector);
    match collector.error {
        Some(e) => Err(e),
        None => Ok(()),
    }
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
            block_timestamp: 100,
            block_height: 1,
            block_signature: catena_crypto::Hash::ZERO,
            previous_block_signature: catena_crypto::Hash::ZERO,
        }
    }

    #[test]
    fn substitutes_known_variable() {
        let stmt = parse("INSERT INTO foo (x) VALUES ($invoker)").unwrap();
        let substituted = substitute_variables(stmt, &ctx()).unwrap();
        match substituted {
            Statement::Insert(s) => match &s.rows[0][0] {
                Expr::Literal(Literal::Blob(b)) => assert_eq!(b, ctx().invoker.as_bytes()),
                other => panic!("expected blob literal, got {other:?}"),
            },
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn unknown_variable_errors() {
        let stmt = parse("INSERT INTO foo (x) VALUES ($notAThing)").unwrap();
        assert!(matches!(
            substitute_variables(stmt, &ctx()),
            Err(ChainError::UnknownVariable(_))
        ));
    }

    #[test]
    fn unbound_parameter_rejected() {
        let stmt = parse("INSERT INTO foo (x) VALUES (?v)").unwrap();
        assert!(matches!(
            check_parameters(&stmt),
            Err(ChainError::UnboundParameter(_))
        ));
    }

    #[test]
    fn conflicting_bound_values_rejected() {
        let stmt = parse("UPDATE foo SET x = ?v:1, y = ?v:2").unwrap();
        assert!(matches!(
            check_parameters(&stmt),
            Err(ChainError::InconsistentParameterValue(_))
        ));
    }

    #[test]
    fn repeated_identical_bound_value_is_fine() {
        let stmt = parse("UPDATE foo SET x = ?v:1, y = ?v:1").unwrap();
        assert!(check_parameters(&stmt).is_ok());
    }
}
