// Copyright 2024-2026 Catena developers.
// This file is part of Catena.

// Catena is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Catena is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Catena.  If not, see <http://www.gnu.org/licenses/>.

//! Parser, typed AST and visitor for Catena's restricted SQL dialect.
//!
//! `parse` turns SQL text into a [`Statement`]; every AST node renders
//! back to a deterministic, dialect-standard string via
//! [`Statement::canonical_sql`] — the basis of both transaction signing
//! bytes and template-hash computation. [`visitor::Visitor`] lets callers
//! rewrite any node of an already-parsed statement.

mod ast;
mod error;
mod lexer;
mod parser;
mod render;
pub mod visitor;

pub use ast::{
    BinOp, ColumnDef, CreateTableStmt, DeleteStmt, Expr, IfStmt, InsertStmt, JoinClause, Literal,
    OrderTerm, ParamValue, Privilege, SelectStmt, Statement, UnOp, UpdateStmt,
};
pub use error::ParseError;
pub use parser::parse;
pub use render::quote_ident;
