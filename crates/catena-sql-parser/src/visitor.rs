//! A visitor over the statement AST. Every method has a no-op default;
//! implementors override only the hooks they care about. Traversal visits
//! children before parents (post-order), so a `visit_expr` override sees
//! an already-rewritten subtree.

use crate::ast::*;

pub trait Visitor {
    fn visit_column(&mut self, name: String) -> String {
        name
    }
    fn visit_table(&mut self, name: String) -> String {
        name
    }
    fn visit_expression(&mut self, expr: Expr) -> Expr {
        expr
    }
    fn visit_join(&mut self, join: JoinClause) -> JoinClause {
        join
    }
    fn visit_schema(&mut self, column: ColumnDef) -> ColumnDef {
        column
    }
    fn visit_statement(&mut self, stmt: Statement) -> Statement {
        stmt
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(expr: Expr, v: &mut V) -> Expr {
    let expr = match expr {
        Expr::Column(name) => Expr::Column(v.visit_column(name)),
        Expr::Binary { op, left, right } => Expr::Binary {
            op,
            left: Box::new(walk_expr(*left, v)),
            right: Box::new(walk_expr(*right, v)),
        },
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: Box::new(walk_expr(*expr, v)),
        },
        Expr::IsNull(inner) => Expr::IsNull(Box::new(walk_expr(*inner, v))),
        Expr::Call { name, args } => Expr::Call {
            name,
            args: args.into_iter().map(|a| walk_expr(a, v)).collect(),
        },
        Expr::Case { whens, else_ } => Expr::Case {
            whens: whens
                .into_iter()
                .map(|(c, val)| (walk_expr(c, v), walk_expr(val, v)))
                .collect(),
            else_: else_.map(|e| Box::new(walk_expr(*e, v))),
        },
        leaf @ (Expr::Literal(_)
        | Expr::Star
        | Expr::Variable(_)
        | Expr::UnboundParam(_)
        | Expr::BoundParam(_, _)) => leaf,
    };
    v.visit_expression(expr)
}

fn walk_select<V: Visitor + ?Sized>(s: SelectStmt, v: &mut V) -> SelectStmt {
    SelectStmt {
        distinct: s.distinct,
        columns: s.columns.into_iter().map(|e| walk_expr(e, v)).collect(),
        from: s.from.map(|t| v.visit_table(t)),
        joins: s
            .joins
            .into_iter()
            .map(|j| {
                let j = JoinClause {
                    table: v.visit_table(j.table),
                    on: walk_expr(j.on, v),
                };
                v.visit_join(j)
            })
            .collect(),
        where_clause: s.where_clause.map(|e| walk_expr(e, v)),
        order_by: s
            .order_by
            .into_iter()
            .map(|t| OrderTerm {
                expr: walk_expr(t.expr, v),
                desc: t.desc,
            })
            .collect(),
        limit: s.limit,
    }
}

fn walk_privilege<V: Visitor + ?Sized>(p: Privilege, v: &mut V) -> Privilege {
    match p {
        Privilege::Create(t) => Privilege::Create(t.map(|t| v.visit_table(t))),
        Privilege::Delete(t) => Privilege::Delete(t.map(|t| v.visit_table(t))),
        Privilege::Drop(t) => Privilege::Drop(t.map(|t| v.visit_table(t))),
        Privilege::Insert(t) => Privilege::Insert(t.map(|t| v.visit_table(t))),
        Privilege::Update(t) => Privilege::Update(t.map(|t| v.visit_table(t))),
        Privilege::Grant(t) => Privilege::Grant(t.map(|t| v.visit_table(t))),
        Privilege::Template(h) => Privilege::Template(h),
        Privilege::Never => Privilege::Never,
    }
}

pub fn walk_statement<V: Visitor + ?Sized>(stmt: Statement, v: &mut V) -> Statement {
    let stmt = match stmt {
        Statement::Select(s) => Statement::Select(walk_select(s, v)),
        Statement::CreateTable(s) => Statement::CreateTable(CreateTableStmt {
            table: v.visit_table(s.table),
            columns: s.columns.into_iter().map(|c| v.visit_schema(c)).collect(),
        }),
        Statement::DropTable(t) => Statement::DropTable(v.visit_table(t)),
        Statement::Insert(s) => Statement::Insert(InsertStmt {
            or_replace: s.or_replace,
            table: v.visit_table(s.table),
            columns: s.columns.into_iter().map(|c| v.visit_column(c)).collect(),
            rows: s
                .rows
                .into_iter()
                .map(|row| row.into_iter().map(|e| walk_expr(e, v)).collect())
                .collect(),
        }),
        Statement::Update(s) => Statement::Update(UpdateStmt {
            table: v.visit_table(s.table),
            assignments: s
                .assignments
                .into_iter()
                .map(|(c, e)| (v.visit_column(c), walk_expr(e, v)))
                .collect(),
            where_clause: s.where_clause.map(|e| walk_expr(e, v)),
        }),
        Statement::Delete(s) => Statement::Delete(DeleteStmt {
            table: v.visit_table(s.table),
            where_clause: s.where_clause.map(|e| walk_expr(e, v)),
        }),
        Statement::If(s) => Statement::If(IfStmt {
            branches: s
                .branches
                .into_iter()
                .map(|(c, body)| (walk_expr(c, v), Box::new(walk_statement(*body, v))))
                .collect(),
            else_branch: s.else_branch.map(|b| Box::new(walk_statement(*b, v))),
        }),
        Statement::Fail => Statement::Fail,
        Statement::ShowTables => Statement::ShowTables,
        Statement::Grant { privilege, user } => Statement::Grant {
            privilege: walk_privilege(privilege, v),
            user: Box::new(walk_expr(*user, v)),
        },
        Statement::Revoke { privilege, user } => Statement::Revoke {
            privilege: walk_privilege(privilege, v),
            user: Box::new(walk_expr(*user, v)),
        },
        Statement::CreateIndex {
            name,
            table,
            columns,
        } => Statement::CreateIndex {
            name,
            table: v.visit_table(table),
            columns: columns.into_iter().map(|c| v.visit_column(c)).collect(),
        },
    };
    v.visit_statement(stmt)
}

/// Rewrites every `BoundParam` into an `UnboundParam`, stripping attached
/// values — the basis of `Statement::unbound`/`template_hash`.
pub(crate) struct StripBindings;

impl Visitor for StripBindings {
    fn visit_expression(&mut self, expr: Expr) -> Expr {
        match expr {
            Expr::BoundParam(name, _) => Expr::UnboundParam(name),
            other => other,
        }
    }
}

/// Collects every parameter occurrence (bound or unbound) by name.
pub(crate) struct CollectParameters {
    pub found: std::collections::HashMap<String, ParamValue>,
}

impl Visitor for CollectParameters {
    fn visit_expression(&mut self, expr: Expr) -> Expr {
        match &expr {
            Expr::UnboundParam(name) => {
                self.found
                    .entry(name.clone())
                    .or_insert(ParamValue::Unbound);
            }
            Expr::BoundParam(name, value) => {
                self.found
                    .insert(name.clone(), ParamValue::Bound((**value).clone()));
            }
            _ => {}
        }
        expr
    }
}
