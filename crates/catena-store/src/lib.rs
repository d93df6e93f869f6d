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

//! The blockchain store (C7): permanent SQL chain state plus a bounded
//! in-memory queue of recently-accepted blocks, dynamic difficulty
//! retarget, block application (C6/§4.7), unwind/replay and hypothetical
//! (always-rolled-back) evaluation.

mod apply;
mod blockchain;
mod error;
mod retarget;

pub use apply::ExecutionMode;
pub use blockchain::Blockchain;
pub use error::StoreError;
pub use retarget::{required_difficulty, MAX_WORK, MIN_WORK, QUEUE_DEPTH, RETARGET_INTERVAL};
