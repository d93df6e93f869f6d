//! Deterministic, dialect-standard rendering of AST nodes back to SQL text.
//!
//! Canonical rendering is the basis of transaction signing bytes and of
//! template-hash computation, so every node here MUST render the same way
//! regardless of how the original text was written (quoting, whitespace,
//! keyword case): two structurally equal statements render to byte-equal
//! strings.

use crate::ast::*;
use std::fmt::Write as _;

pub fn render_statement(stmt: &Statement) -> String {
    let mut out = String::new();
    write_statement(&mut out, stmt);
    out
}

fn write_statement(out: &mut String, stmt: &Statement) {
    match stmt {
        Statement::Select(s) => write_select(out, s),
        Statement::CreateTable(s) => write_create_table(out, s),
        Statement::DropTable(table) => {
            write!(out, "DROP TABLE {}", quote_ident(table)).unwrap();
        }
        Statement::Insert(s) => write_insert(out, s),
        Statement::Update(s) => write_update(out, s),
        Statement::Delete(s) => write_delete(out, s),
        Statement::If(s) => write_if(out, s),
        Statement::Fail => out.push_str("FAIL"),
        Statement::ShowTables => out.push_str("SHOW TABLES"),
        Statement::Grant { privilege, user } => {
            out.push_str("GRANT ");
            write_privilege(out, privilege);
            out.push_str(" TO ");
            write_expr(out, user);
        }
        Statement::Revoke { privilege, user } => {
            out.push_str("REVOKE ");
            write_privilege(out, privilege);
            out.push_str(" TO ");
            write_expr(out, user);
        }
        Statement::CreateIndex {
            name,
            table,
            columns,
        } => {
            write!(
                out,
                "CREATE INDEX {} ON {}({})",
                quote_ident(name),
                quote_ident(table),
                columns
                    .iter()
                    .map(|c| quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
            .unwrap();
        }
    }
}

fn write_select(out: &mut String, s: &SelectStmt) {
    out.push_str("SELECT ");
    if s.distinct {
        out.push_str("DISTINCT ");
    }
    let cols: Vec<String> = s
        .columns
        .iter()
        .map(|c| {
            let mut buf = String::new();
            write_expr(&mut buf, c);
            buf
        })
        .collect();
    out.push_str(&cols.join(", "));
    if let Some(from) = &s.from {
        write!(out, " FROM {}", quote_ident(from)).unwrap();
        for join in &s.joins {
            out.push_str(" LEFT JOIN ");
            out.push_str(&quote_ident(&join.table));
            out.push_str(" ON ");
            write_expr(out, &join.on);
        }
        if let Some(w) = &s.where_clause {
            out.push_str(" WHERE ");
            write_expr(out, w);
        }
        if !s.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            let terms: Vec<String> = s
                .order_by
                .iter()
                .map(|t| {
                    let mut buf = String::new();
                    write_expr(&mut buf, &t.expr);
                    buf.push_str(if t.desc { " DESC" } else { " ASC" });
                    buf
                })
                .collect();
            out.push_str(&terms.join(", "));
        }
        if let Some(limit) = s.limit {
            write!(out, " LIMIT {limit}").unwrap();
        }
    }
}

fn write_create_table(out: &mut String, s: &CreateTableStmt) {
    write!(out, "CREATE TABLE {}(", quote_ident(&s.table)).unwrap();
    let cols: Vec<String> = s
        .columns
        .iter()
        .map(|c| {
            if c.primary_key {
                format!(
                    "{} {} PRIMARY KEY",
                    quote_ident(&c.name),
                    c.type_name.to_uppercase()
                )
            } else {
                format!("{} {}", quote_ident(&c.name), c.type_name.to_uppercase())
            }
        })
        .collect();
    out.push_str(&cols.join(", "));
    out.push(')');
}

fn write_insert(out: &mut String, s: &InsertStmt) {
    out.push_str("INSERT ");
    if s.or_replace {
        out.push_str("OR REPLACE ");
    }
    write!(out, "INTO {}(", quote_ident(&s.table)).unwrap();
    out.push_str(
        &s.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
    );
    out.push_str(") VALUES ");
    let rows: Vec<String> = s
        .rows
        .iter()
        .map(|row| {
            let vals: Vec<String> = row
                .iter()
                .map(|e| {
                    let mut buf = String::new();
                    write_expr(&mut buf, e);
                    buf
                })
                .collect();
            format!("({})", vals.join(", "))
        })
        .collect();
    out.push_str(&rows.join(", "));
}

fn write_update(out: &mut String, s: &UpdateStmt) {
    write!(out, "UPDATE {} SET ", quote_ident(&s.table)).unwrap();
    let assigns: Vec<String> = s
        .assignments
        .iter()
        .map(|(col, expr)| {
            let mut buf = String::new();
            write_expr(&mut buf, expr);
            format!("{} = {}", quote_ident(col), buf)
        })
        .collect();
    out.push_str(&assigns.join(", "));
    if let Some(w) = &s.where_clause {
        out.push_str(" WHERE ");
        write_expr(out, w);
    }
}

fn write_delete(out: &mut String, s: &DeleteStmt) {
    write!(out, "DELETE FROM {}", quote_ident(&s.table)).unwrap();
    if let Some(w) = &s.where_clause {
        out.push_str(" WHERE ");
        write_expr(out, w);
    }
}

fn write_if(out: &mut String, s: &IfStmt) {
    for (i, (cond, body)) in s.branches.iter().enumerate() {
        if i == 0 {
            out.push_str("IF ");
        } else {
            out.push_str(" ELSE IF ");
        }
        write_expr(out, cond);
        out.push_str(" THEN ");
        write_statement(out, body);
    }
    if let Some(else_branch) = &s.else_branch {
        out.push_str(" ELSE ");
        write_statement(out, else_branch);
    }
    out.push_str(" END");
}

fn write_privilege(out: &mut String, privilege: &Privilege) {
    match privilege {
        Privilege::Template(hash) => {
            write!(out, "TEMPLATE OF x'{}'", hash.to_hex()).unwrap();
        }
        Privilege::Never => out.push_str("NEVER"),
        other => {
            out.push_str(&other.kind_name().to_uppercase());
            if let Some(table) = other.table_name() {
                write!(out, " ON {}", quote_ident(table)).unwrap();
            }
        }
    }
}

pub fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Literal(lit) => write_literal(out, lit),
        Expr::Star => out.push('*'),
        Expr::Column(name) => out.push_str(&quote_ident(name)),
        Expr::Variable(name) => {
            out.push('$');
            out.push_str(name);
        }
        Expr::UnboundParam(name) => {
            out.push('?');
            out.push_str(name);
        }
        Expr::BoundParam(name, value) => {
            // Renders with its attached value (`?name:literal`); template
            // hashing strips values first via `Statement::unbound`, which
            // rewrites every `BoundParam` into an `UnboundParam` node, so
            // this arm is never reached when rendering an unbound form.
            out.push('?');
            out.push_str(name);
            out.push(':');
            write_literal(out, value);
        }
        Expr::Binary { op, left, right } => {
            out.push('(');
            write_expr(out, left);
            write!(out, " {} ", bin_op_str(*op)).unwrap();
            write_expr(out, right);
            out.push(')');
        }
        Expr::Unary { op, expr } => match op {
            UnOp::Not => {
                out.push_str("NOT (");
                write_expr(out, expr);
                out.push(')');
            }
            UnOp::Abs => {
                out.push_str("ABS(");
                write_expr(out, expr);
                out.push(')');
            }
            UnOp::Neg => {
                out.push_str("-(");
                write_expr(out, expr);
                out.push(')');
            }
        },
        Expr::IsNull(inner) => {
            out.push('(');
            write_expr(out, inner);
            out.push_str(" IS NULL)");
        }
        Expr::Call { name, args } => {
            write!(out, "{}(", name.to_uppercase()).unwrap();
            let rendered: Vec<String> = args
                .iter()
                .map(|a| {
                    let mut buf = String::new();
                    write_expr(&mut buf, a);
                    buf
                })
                .collect();
            out.push_str(&rendered.join(", "));
            out.push(')');
        }
        Expr::Case { whens, else_ } => {
            out.push_str("CASE");
            for (cond, val) in whens {
                out.push_str(" WHEN ");
                write_expr(out, cond);
                out.push_str(" THEN ");
                write_expr(out, val);
            }
            if let Some(e) = else_ {
                out.push_str(" ELSE ");
                write_expr(out, e);
            }
            out.push_str(" END");
        }
    }
}

fn bin_op_str(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "=",
        BinOp::Ne => "<>",
        BinOp::Lt => "<",
        BinOp::Gt => ">",
        BinOp::Le => "<=",
        BinOp::Ge => ">=",
        BinOp::And => "AND",
        BinOp::Or => "OR",
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Concat => "||",
    }
}

fn write_literal(out: &mut String, lit: &Literal) {
    match lit {
        Literal::Integer(i) => {
            write!(out, "{i}").unwrap();
        }
        Literal::Unsigned(u) => {
            write!(out, "{u}").unwrap();
        }
        Literal::Text(s) => {
            out.push('\'');
            out.push_str(&s.replace('\'', "''"));
            out.push('\'');
        }
        Literal::Blob(b) => {
            out.push_str("x'");
            out.push_str(&hex::encode(b));
            out.push('\'');
        }
        Literal::Null => out.push_str("NULL"),
    }
}

/// Quote an identifier with double quotes, doubling any embedded quote —
/// canonical rendering always quotes, regardless of how the source text
/// wrote it, so that identical statements always render identically.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
