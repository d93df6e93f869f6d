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

//! The node orchestrator (C11, §4.11): owns the ledger, miner and gossip
//! peer table, drives the periodic tick that advances peer connections and
//! fetches, and wires received transactions/blocks into the rest of the
//! system.

mod config;
mod error;
mod node;
mod peer;
mod stats;

pub use config::{Config, GenesisConfig};
pub use error::NodeError;
pub use node::Node;
pub use peer::{AnyConnection, Peer};
pub use stats::{Stats, StatsSnapshot};
