use std::{error, fmt};

#[derive(Debug)]
pub enum GossipError {
    Timeout,
    Closed,
    Io(std::io::Error),
    WebSocket(tokio_tungstenite::tungstenite::Error),
    Json(serde_json::Error),
    Protocol(String),
    Remote(String),
}

impl fmt::Display for GossipError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GossipError::Timeout => write!(f, "gossip request timed out"),
            GossipError::Closed => write!(f, "peer connection closed"),
            GossipError::Io(e) => write!(f, "{e}"),
            GossipError::WebSocket(e) => write!(f, "{e}"),
            GossipError::Json(e) => write!(f, "{e}"),
            GossipError::Protocol(m) => write!(f, "protocol violation: {m}"),
            GossipError::Remote(m) => write!(f, "peer reported error: {m}"),
        }
    }
}

impl error::Error for GossipError {}

impl From<std::io::Error> for GossipError {
    fn from(e: std::io::Error) -> Self {
        GossipError::Io(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GossipError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        GossipError::WebSocket(e)
    }
}

impl From<serde_json::Error> for GossipError {
    fn from(e: serde_json::Error) -> Self {
        GossipError::Json(e)
    }
}
