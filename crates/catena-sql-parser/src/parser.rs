use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token};
use crate::render::render_statement;
use crate::visitor::{walk_statement, StripBindings};
use catena_crypto::sha256;

/// Subexpression nesting is bounded to prevent stack exhaustion on
/// adversarial input.
const MAX_EXPR_DEPTH: usize = 12;

pub fn parse(text: &str) -> Result<Statement, ParseError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let stmt = parser.parse_statement()?;
    parser.expect_end_of_input()?;
    Ok(stmt)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect_end_of_input(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Token::Eof => Ok(()),
            _ => Err(ParseError::TrailingInput),
        }
    }

    fn unexpected(&self) -> ParseError {
        ParseError::UnexpectedToken {
            found: format!("{:?}", self.peek()),
            position: self.position(),
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Matches a bare keyword (case-insensitive identifier), consuming it.
    fn eat_keyword(&mut self, kw: &str) -> bool {
        if let Token::Ident(s) = self.peek() {
            if s.eq_ignore_ascii_case(kw) {
                self.bump();
                return true;
            }
        }
        false
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s.eq_ignore_ascii_case(kw))
    }

    fn ident_name(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            Token::QuotedIdent(s) => Ok(s),
            other => Err(ParseError::UnexpectedToken {
                found: format!("{other:?}"),
                position: self.position(),
            }),
        }
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.peek_keyword("SELECT") {
            Ok(Statement::Select(self.parse_select()?))
        } else if self.peek_keyword("CREATE") {
            self.parse_create()
        } else if self.peek_keyword("DROP") {
            self.parse_drop_table()
        } else if self.peek_keyword("INSERT") {
            Ok(Statement::Insert(self.parse_insert()?))
        } else if self.peek_keyword("UPDATE") {
            Ok(Statement::Update(self.parse_update()?))
        } else if self.peek_keyword("DELETE") {
            Ok(Statement::Delete(self.parse_delete()?))
        } else if self.peek_keyword("IF") {
            Ok(Statement::If(self.parse_if()?))
        } else if self.peek_keyword("FAIL") {
            self.bump();
            Ok(Statement::Fail)
        } else if self.peek_keyword("SHOW") {
            self.bump();
            self.expect_keyword("TABLES")?;
            Ok(Statement::ShowTables)
        } else if self.peek_keyword("GRANT") {
            self.bump();
            let privilege = self.parse_privilege()?;
            self.expect_keyword("TO")?;
            let user = self.parse_expr()?;
            Ok(Statement::Grant {
                privilege,
                user: Box::new(user),
            })
        } else if self.peek_keyword("REVOKE") {
            self.bump();
            let privilege = self.parse_privilege()?;
            self.expect_keyword("TO")?;
            let user = self.parse_expr()?;
            Ok(Statement::Revoke {
                privilege,
                user: Box::new(user),
            })
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_create(&mut self) -> Result<Statement, ParseError> {
        self.bump(); // CREATE
        if self.eat_keyword("TABLE") {
            Ok(Statement::CreateTable(self.parse_create_table_body()?))
        } else if self.eat_keyword("INDEX") {
            let name = self.ident_name()?;
            self.expect_keyword("ON")?;
            let table = self.ident_name()?;
            self.expect(&Token::LParen)?;
            let mut columns = vec![self.ident_name()?];
            while self.peek() == &Token::Comma {
                self.bump();
                columns.push(self.ident_name()?);
            }
            self.expect(&Token::RParen)?;
            Ok(Statement::CreateIndex {
                name,
                table,
                columns,
            })
        } else {
            Err(self.unexpected())
        }
    }

    fn parse_create_table_body(&mut self) -> Result<CreateTableStmt, ParseError> {
        let table = self.ident_name()?;
        self.expect(&Token::LParen)?;
        let mut columns = Vec::new();
        loop {
            let name = self.ident_name()?;
            let type_name = self.ident_name()?;
            let primary_key = if self.peek_keyword("PRIMARY") {
                self.bump();
                self.expect_keyword("KEY")?;
                true
            } else {
                false
            };
            columns.push(ColumnDef {
                name,
                type_name,
                primary_key,
            });
            if self.peek() == &Token::Comma {
                self.bump();
                continue;
            }
            break;
        }
        self.expect(&Token::RParen)?;
        Ok(CreateTableStmt { table, columns })
    }

    fn parse_drop_table(&mut self) -> Result<Statement, ParseError> {
        self.bump(); // DROP
        self.expect_keyword("TABLE")?;
        let table = self.ident_name()?;
        Ok(Statement::DropTable(table))
    }

    fn parse_insert(&mut self) -> Result<InsertStmt, ParseError> {
        self.bump(); // INSERT
        let or_replace = if self.peek_keyword("OR") {
            self.bump();
            self.expect_keyword("REPLACE")?;
            true
        } else {
            false
        };
        self.expect_keyword("INTO")?;
        let table = self.ident_name()?;
        self.expect(&Token::LParen)?;
        let mut columns = vec![self.ident_name()?];
        while self.peek() == &Token::Comma {
            self.bump();
            columns.push(self.ident_name()?);
        }
        self.expect(&Token::RParen)?;
        check_no_duplicates(&columns)?;
        self.expect_keyword("VALUES")?;
        let mut rows = vec![self.parse_value_tuple(columns.len())?];
        while self.peek() == &Token::Comma {
            self.bump();
            rows.push(self.parse_value_tuple(columns.len())?);
        }
        Ok(InsertStmt {
            or_replace,
            table,
            columns,
            rows,
        })
    }

    fn parse_value_tuple(&mut self, expected_len: usize) -> Result<Vec<Expr>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut values = vec![self.parse_expr()?];
        while self.peek() == &Token::Comma {
            self.bump();
            values.push(self.parse_expr()?);
        }
        self.expect(&Token::RParen)?;
        if values.len() != expected_len {
            return Err(ParseError::UnexpectedToken {
                found: format!("tuple of {} values, expected {}", values.len(), expected_len),
                position: self.position(),
            });
        }
        Ok(values)
    }

    fn parse_update(&mut self) -> Result<UpdateStmt, ParseError> {
        self.bump(); // UPDATE
        let table = self.ident_name()?;
        self.expect_keyword("SET")?;
        let mut assignments = vec![self.parse_assignment()?];
        while self.peek() == &Token::Comma {
            self.bump();
            assignments.push(self.parse_assignment()?);
        }
        let columns: Vec<String> = assignments.iter().map(|(c, _)| c.clone()).collect();
        check_no_duplicates(&columns)?;
        let where_clause = self.parse_optional_where()?;
        Ok(UpdateStmt {
            table,
            assignments,
            where_clause,
        })
    }

    fn parse_assignment(&mut self) -> Result<(String, Expr), ParseError> {
        let col = self.ident_name()?;
        self.expect(&Token::Eq)?;
        let expr = self.parse_expr()?;
        Ok((col, expr))
    }

    fn parse_delete(&mut self) -> Result<DeleteStmt, ParseError> {
        self.bump(); // DELETE
        self.expect_keyword("FROM")?;
        let table = self.ident_name()?;
        let where_clause = self.parse_optional_where()?;
        Ok(DeleteStmt {
            table,
            where_clause,
        })
    }

    fn parse_optional_where(&mut self) -> Result<Option<Expr>, ParseError> {
        if self.peek_keyword("WHERE") {
            self.bump();
            Ok(Some(self.parse_expr()?))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> Result<IfStmt, ParseError> {
        self.bump(); // IF
        let mut branches = Vec::new();
        loop {
            let cond = self.parse_expr()?;
            self.expect_keyword("THEN")?;
            let body = self.parse_statement()?;
            branches.push((cond, Box::new(body)));
            if self.peek_keyword("ELSE") {
                // lookahead: ELSE IF vs plain ELSE
                let save = self.pos;
                self.bump(); // ELSE
                if self.peek_keyword("IF") {
                    self.bump();
                    continue;
                } else {
                    self.pos = save;
                    break;
                }
            } else {
                break;
            }
        }
        let else_branch = if self.peek_keyword("ELSE") {
            self.bump();
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(IfStmt {
            branches,
            else_branch,
        })
    }

    fn parse_privilege(&mut self) -> Result<Privilege, ParseError> {
        if self.peek_keyword("TEMPLATE") {
            self.bump();
            self.expect_keyword("OF")?;
            match self.bump() {
                Token::StringLit(sql_text) => {
                    let inner = parse(&sql_text)?;
                    let unbound = inner.unbound();
                    let hash = sha256(render_statement(&unbound).as_bytes());
                    Ok(Privilege::Template(hash))
                }
                Token::BlobLit(bytes) => {
                    let bytes: [u8; 32] =
                        bytes.try_into().map_err(|_| ParseError::MalformedBlob(
                            "template hash must be exactly 32 bytes".to_string(),
                        ))?;
                    Ok(Privilege::Template(catena_crypto::Hash::from_bytes(bytes)))
                }
                other => Err(ParseError::UnexpectedToken {
                    found: format!("{other:?}"),
                    position: self.position(),
                }),
            }
        } else if self.peek_keyword("NEVER") {
            self.bump();
            Ok(Privilege::Never)
        } else {
            let kind = self.ident_name()?;
            let table = if self.peek_keyword("ON") {
                self.bump();
                Some(self.ident_name()?)
            } else {
                None
            };
            match kind.to_uppercase().as_str() {
                "CREATE" => Ok(Privilege::Create(table)),
                "DELETE" => Ok(Privilege::Delete(table)),
                "DROP" => Ok(Privilege::Drop(table)),
                "INSERT" => Ok(Privilege::Insert(table)),
                "UPDATE" => Ok(Privilege::Update(table)),
                "GRANT" => Ok(Privilege::Grant(table)),
                _ => Err(ParseError::UnexpectedToken {
                    found: kind,
                    position: self.position(),
                }),
            }
        }
    }

    fn parse_select(&mut self) -> Result<SelectStmt, ParseError> {
        self.bump(); // SELECT
        let distinct = if self.peek_keyword("DISTINCT") {
            self.bump();
            true
        } else {
            false
        };
        let mut columns = vec![self.parse_expr()?];
        while self.peek() == &Token::Comma {
            self.bump();
            columns.push(self.parse_expr()?);
        }
        let mut from = None;
        let mut joins = Vec::new();
        let mut where_clause = None;
        let mut order_by = Vec::new();
        let mut limit = None;
        if self.peek_keyword("FROM") {
            self.bump();
            from = Some(self.ident_name()?);
            while self.peek_keyword("LEFT") {
                self.bump();
                self.expect_keyword("JOIN")?;
                let table = self.ident_name()?;
                self.expect_keyword("ON")?;
                let on = self.parse_expr()?;
                joins.push(JoinClause { table, on });
            }
            where_clause = self.parse_optional_where()?;
            if self.peek_keyword("ORDER") {
                self.bump();
                self.expect_keyword("BY")?;
                loop {
                    let expr = self.parse_expr()?;
                    let desc = if self.peek_keyword("DESC") {
                        self.bump();
                        true
                    } else {
                        if self.peek_keyword("ASC") {
                            self.bump();
                        }
                        false
                    };
                    order_by.push(OrderTerm { expr, desc });
                    if self.peek() == &Token::Comma {
                        self.bump();
                        continue;
                    }
                    break;
                }
            }
            if self.peek_keyword("LIMIT") {
                self.bump();
                match self.bump() {
                    Token::Number(n) => {
                        limit = Some(
                            n.parse::<u64>()
                                .map_err(|_| ParseError::MalformedNumber(n))?,
                        )
                    }
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            found: format!("{other:?}"),
                            position: self.position(),
                        })
                    }
                }
            }
        }
        Ok(SelectStmt {
            distinct,
            columns,
            from,
            joins,
            where_clause,
            order_by,
            limit,
        })
    }

    // --- expressions, precedence climbing, lowest to highest ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            self.depth -= 1;
            return Err(ParseError::NestingTooDeep);
        }
        let result = self.parse_or();
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("OR") {
            self.bump();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        while self.peek_keyword("AND") {
            self.bump();
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Le => BinOp::Le,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                Token::Concat => BinOp::Concat,
                _ => break,
            };
            self.bump();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.bump();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek_keyword("NOT") {
            self.bump();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                expr: Box::new(expr),
            });
        }
        if self.peek_keyword("ABS") && !self.is_function_call_ahead() {
            self.bump();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Abs,
                expr: Box::new(expr),
            });
        }
        if self.peek() == &Token::Minus {
            self.bump();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    /// True if the keyword we're sitting on is immediately followed by `(`
    /// — in that case it is a function call (`ABS(x)`), not the unary
    /// `ABS` operator form.
    fn is_function_call_ahead(&self) -> bool {
        self.tokens
            .get(self.pos + 1)
            .map(|(t, _)| t == &Token::LParen)
            .unwrap_or(false)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.peek_keyword("IS") {
                let save = self.pos;
                self.bump();
                if self.peek_keyword("NULL") {
                    self.bump();
                    expr = Expr::IsNull(Box::new(expr));
                    continue;
                } else {
                    self.pos = save;
                    break;
                }
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Star => {
                self.bump();
                Ok(Expr::Star)
            }
            Token::Number(n) => {
                self.bump();
                let v: u64 = n.parse().map_err(|_| ParseError::MalformedNumber(n))?;
                Ok(Expr::Literal(Literal::Unsigned(v)))
            }
            Token::StringLit(s) => {
                self.bump();
                Ok(Expr::Literal(Literal::Text(s)))
            }
            Token::BlobLit(b) => {
                self.bump();
                Ok(Expr::Literal(Literal::Blob(b)))
            }
            Token::Variable(name) => {
                self.bump();
                Ok(Expr::Variable(name))
            }
            Token::UnboundParam(name) => {
                self.bump();
                if self.peek() == &Token::Colon {
                    self.bump();
                    let literal = self.parse_literal()?;
                    Ok(Expr::BoundParam(name, Box::new(literal)))
                } else {
                    Ok(Expr::UnboundParam(name))
                }
            }
            Token::LParen => {
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::QuotedIdent(name) => {
                self.bump();
                Ok(Expr::Column(name))
            }
            Token::Ident(name) => {
                if name.eq_ignore_ascii_case("NULL") {
                    self.bump();
                    return Ok(Expr::Literal(Literal::Null));
                }
                if name.eq_ignore_ascii_case("CASE") {
                    return self.parse_case();
                }
                // function-call form takes priority when `(` follows.
                if self.is_function_call_ahead() {
                    self.bump();
                    self.expect(&Token::LParen)?;
                    let mut args = Vec::new();
                    if self.peek() != &Token::RParen {
                        args.push(self.parse_expr()?);
                        while self.peek() == &Token::Comma {
                            self.bump();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(Expr::Call { name, args });
                }
                self.bump();
                Ok(Expr::Column(name))
            }
            other => Err(ParseError::UnexpectedToken {
                found: format!("{other:?}"),
                position: self.position(),
            }),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        match self.bump() {
            Token::Number(n) => {
                let v: u64 = n.parse().map_err(|_| ParseError::MalformedNumber(n))?;
                Ok(Literal::Unsigned(v))
            }
            Token::Minus => match self.bump() {
                Token::Number(n) => {
                    let v: i64 = n
                        .parse::<i64>()
                        .map_err(|_| ParseError::MalformedNumber(n))?;
                    Ok(Literal::Integer(-v))
                }
                other => Err(ParseError::UnexpectedToken {
                    found: format!("{other:?}"),
                    position: self.position(),
                }),
            },
            Token::StringLit(s) => Ok(Literal::Text(s)),
            Token::BlobLit(b) => Ok(Literal::Blob(b)),
            Token::Ident(s) if s.eq_ignore_ascii_case("NULL") => Ok(Literal::Null),
            other => Err(ParseError::UnexpectedToken {
                found: format!("{other:?}"),
                position: self.position(),
            }),
        }
    }

    fn parse_case(&mut self) -> Result<Expr, ParseError> {
        self.bump(); // CASE
        let mut whens = Vec::new();
        while self.peek_keyword("WHEN") {
            self.bump();
            let cond = self.parse_expr()?;
            self.expect_keyword("THEN")?;
            let val = self.parse_expr()?;
            whens.push((cond, val));
        }
        let else_ = if self.peek_keyword("ELSE") {
            self.bump();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect_keyword("END")?;
        Ok(Expr::Case { whens, else_ })
    }
}

fn check_no_duplicates(columns: &[String]) -> Result<(), ParseError> {
    let mut seen = std::collections::HashSet::new();
    for col in columns {
        if !seen.insert(col.to_lowercase()) {
            return Err(ParseError::DuplicateColumn(col.clone()));
        }
    }
    Ok(())
}

impl Statement {
    /// Returns this statement with every bound parameter replaced by its
    /// unbound name (values stripped).
    pub fn unbound(&self) -> Statement {
        walk_statement(self.clone(), &mut StripBindings)
    }

    /// `SHA256(unbound.canonicalSQL)`.
    pub fn template_hash(&self) -> catena_crypto::Hash {
        sha256(render_statement(&self.unbound()).as_bytes())
    }

    /// Canonical, deterministic rendering of this statement.
    pub fn canonical_sql(&self) -> String {
        render_statement(self)
    }

    /// Every `{name -> value|unbound}` parameter occurrence.
    pub fn parameters(&self) -> std::collections::HashMap<String, ParamValue> {
        let mut collector = crate::visitor::CollectParameters {
            found: std::collections::HashMap::new(),
        };
        let _ = walk_statement(self.clone(), &mut collector);
        collector.found
    }
}
