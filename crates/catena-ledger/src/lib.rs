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

//! The ledger (C8): orphan cache, forward-splice and backward fast-forward
//! fork resolution over a [`catena_store::Blockchain`], and transaction
//! admission eligibility.

mod error;
mod ledger;
mod orphans;

pub use error::LedgerError;
pub use ledger::{Eligibility, Ledger};
pub use orphans::{OrphanCache, EVICTION_DEPTH};
