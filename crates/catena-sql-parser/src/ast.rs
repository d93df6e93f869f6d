use catena_crypto::Hash;

/// A literal value appearing in SQL text or bound to a parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Integer(i64),
    Unsigned(u64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Not,
    Abs,
    Neg,
}

/// A value bound (or not) to a `?name` parameter occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Unbound,
    Bound(Literal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Literal(Literal),
    Star,
    Column(String),
    /// `$ident` — replaced with a context value at execution time.
    Variable(String),
    /// `?name` with no attached literal.
    UnboundParam(String),
    /// `?name:literal` — a bound parameter occurrence.
    BoundParam(String, Box<Literal>),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    IsNull(Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Case {
        whens: Vec<(Expr, Expr)>,
        else_: Option<Box<Expr>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub type_name: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStmt {
    pub distinct: bool,
    pub columns: Vec<Expr>,
    pub from: Option<String>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableStmt {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStmt {
    pub or_replace: bool,
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfStmt {
    /// `(condition, body)` pairs: the first is the `IF`, the rest are
    /// `ELSE IF` branches, evaluated in order.
    pub branches: Vec<(Expr, Box<Statement>)>,
    pub else_branch: Option<Box<Statement>>,
}

/// A privilege a statement needs, or that a `GRANT`/`REVOKE` names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    Create(Option<String>),
    Delete(Option<String>),
    Drop(Option<String>),
    Insert(Option<String>),
    Update(Option<String>),
    Grant(Option<String>),
    /// Scoped to the 32-byte template hash of a statement's unbound form.
    Template(Hash),
    /// Reserved for statements that must never execute via a transaction.
    Never,
}

impl Privilege {
    /// The string stored in `grants.kind` for this privilege's variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Privilege::Create(_) => "create",
            Privilege::Delete(_) => "delete",
            Privilege::Drop(_) => "drop",
            Privilege::Insert(_) => "insert",
            Privilege::Update(_) => "update",
            Privilege::Grant(_) => "grant",
            Privilege::Template(_) => "template",
            Privilege::Never => "never",
        }
    }

    pub fn table_name(&self) -> Option<&str> {
        match self {
            Privilege::Create(t)
            | Privilege::Delete(t)
            | Privilege::Drop(t)
            | Privilege::Insert(t)
            | Privilege::Update(t)
            | Privilege::Grant(t) => t.as_deref(),
            Privilege::Template(_) | Privilege::Never => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Select(SelectStmt),
    CreateTable(CreateTableStmt),
    DropTable(String),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    If(IfStmt),
    Fail,
    ShowTables,
    Grant { privilege: Privilege, user: Box<Expr> },
    Revoke { privilege: Privilege, user: Box<Expr> },
    CreateIndex { name: String, table: String, columns: Vec<String> },
}

impl Statement {
    /// Non-`SELECT`/`SHOW TABLES` statements may mutate state; clients use
    /// this to decide whether to submit a signed transaction or issue a
    /// direct read.
    pub fn is_potentially_mutating(&self) -> bool {
        !matches!(self, Statement::Select(_) | Statement::ShowTables)
    }

    /// Privileges this statement needs in order to execute. For `IF`, the
    /// union across every branch (the executor re-checks the privileges of
    /// whichever branch actually runs at execution time).
    pub fn required_privileges(&self) -> Vec<Privilege> {
        match self {
            Statement::Select(_) | Statement::ShowTables => Vec::new(),
            Statement::CreateTable(c) => vec![Privilege::Create(Some(c.table.clone()))],
            Statement::DropTable(t) => vec![Privilege::Drop(Some(t.clone()))],
            Statement::Insert(i) => vec![Privilege::Insert(Some(i.table.clone()))],
            Statement::Update(u) => vec![Privilege::Update(Some(u.table.clone()))],
            Statement::Delete(d) => vec![Privilege::Delete(Some(d.table.clone()))],
            Statement::Fail => Vec::new(),
            Statement::Grant { .. } | Statement::Revoke { .. } => vec![Privilege::Grant(None)],
            Statement::CreateIndex { .. } => vec![Privilege::Never],
            Statement::If(stmt) => {
                let mut privs = Vec::new();
                for (_, body) in &stmt.branches {
                    privs.extend(body.required_privileges());
                }
                if let Some(else_branch) = &stmt.else_branch {
                    privs.extend(else_branch.required_privileges());
                }
                privs
            }
        }
    }
}
