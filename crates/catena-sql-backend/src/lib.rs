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

//! Executes a parsed [`catena_sql_parser::Statement`] against an embedded
//! `rusqlite` connection: reserved-identifier rewriting, `$variable`/`?param`
//! substitution, schema verification, control flow and the privilege
//! regime callback (§4.2).

mod context;
mod exec;
mod identifiers;
mod value;
mod verify;

pub use context::{check_parameters, substitute_variables, Context};
pub use exec::{execute, ExecutionOutcome, Regime};
pub use identifiers::{rewrite, unrewrite_column_name};
pub use value::{literal_from_row, truthy};
pub use verify::verify;
