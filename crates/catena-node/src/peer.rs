//! A gossip peer as the node sees it: its advertised URL, its state
//! machine position (§4.10) and, once connected, the session carrying
//! requests and notifications to it.
//!
//! `Peer` does not hold a strong reference back to [`crate::Node`] (§3,
//! §9 design notes: "peers carry a weak handle back") — callers that need
//! to act on the owning node pass it in explicitly instead, since every
//! peer method here is driven by `Node` itself rather than spawning its
//! own independent tasks.

use std::sync::Arc;

use catena_gossip::{GossipError, InboundConnection, MessageBody, OutboundConnection, PeerState};
use parking_lot::Mutex;
use uuid::Uuid;

/// Either side of a gossip session: the same request/reply/notify surface
/// regardless of which party dialed.
#[derive(Clone)]
pub enum AnyConnection {
    Outbound(Arc<OutboundConnection>),
    Inbound(Arc<InboundConnection>),
}

impl AnyConnection {
    pub async fn request(&self, body: MessageBody) -> Result<MessageBody, GossipError> {
        match self {
            AnyConnection::Outbound(c) => c.request(body).await,
            AnyConnection::Inbound(c) => c.request(body).await,
        }
    }

    pub async fn notify(&self, body: MessageBody) -> Result<(), GossipError> {
        match self {
            AnyConnection::Outbound(c) => c.notify(body).await,
            AnyConnection::Inbound(c) => c.notify(body).await,
        }
    }

    pub async fn reply(&self, counter: u64, body: MessageBody) -> Result<(), GossipError> {
        match self {
            AnyConnection::Outbound(c) => c.reply(counter, body).await,
            AnyConnection::Inbound(c) => c.reply(counter, body).await,
        }
    }
}

pub struct Peer {
    /// `ws://host:port/` this peer is reached at. For an inbound-only
    /// peer this is reconstructed from its handshake-advertised port and
    /// the socket's observed address.
    pub url: String,
    pub uuid: Mutex<Option<Uuid>>,
    pub state: Mutex<PeerState>,
    pub connection: Mutex<Option<AnyConnection>>,
}

impl Peer {
    pub fn new(url: String) -> Arc<Self> {
        Arc::new(Peer {
            url,
            uuid: Mutex::new(None),
            state: Mutex::new(PeerState::New),
            connection: Mutex::new(None),
        })
    }

    pub fn state(&self) -> PeerState {
        self.state.lock().clone()
    }

    pub fn set_state(&self, state: PeerState) {
        *self.state.lock() = state;
    }

    pub fn connection(&self) -> Option<AnyConnection> {
        self.connection.lock().clone()
    }

    pub fn set_connection(&self, conn: Option<AnyConnection>) {
        *self.connection.lock() = conn;
    }

    pub fn mark_failed(&self, reason: impl Into<String>) {
        self.set_connection(None);
        self.set_state(PeerState::Failed(reason.into()));
    }
}
