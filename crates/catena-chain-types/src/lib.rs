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

//! Shared chain types: signed transactions and mined blocks.

mod block;
mod error;
mod transaction;

pub use block::{Block, BlockWire, Payload, MAX_PAYLOAD_BYTES, MAX_TRANSACTIONS};
pub use error::ChainError;
pub use transaction::{Transaction, TransactionWire, TxBody, MAX_TRANSACTION_SIZE};
