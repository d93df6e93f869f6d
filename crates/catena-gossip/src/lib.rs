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

//! The gossip transport (C10, §4.10): a WebSocket envelope carrying a
//! counter-keyed request/response multiplexer, the peer state machine,
//! and the handshake used to establish a session.

mod connection;
mod error;
mod peer;
mod protocol;
mod transport;

pub use connection::{Inbound, PeerConnection, REQUEST_TIMEOUT};
pub use error::GossipError;
pub use peer::PeerState;
pub use protocol::{Envelope, MessageBody};
pub use transport::{accept, connect, connect_url, HandshakeInfo, InboundConnection, OutboundConnection};
