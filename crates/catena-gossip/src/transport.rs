//! Establishing a gossip session (§4.10): a peer connecting inbound
//! advertises its own UUID and listen port via query-string parameters on
//! the WebSocket upgrade request; an outbound connection does the same in
//! reverse so the accepting side can identify it.

use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;
use uuid::Uuid;

use crate::connection::{Inbound, PeerConnection};
use crate::error::GossipError;

pub type OutboundConnection = PeerConnection<MaybeTlsStream<TcpStream>>;
pub type InboundConnection = PeerConnection<TcpStream>;

/// The UUID/port a peer advertised during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct HandshakeInfo {
    pub uuid: Uuid,
    pub port: u16,
}

/// Appends `uuid`/`port` query parameters to `base`, the way an outbound
/// connection advertises itself to the accepting side.
pub fn connect_url(base: &Url, local_uuid: Uuid, local_port: u16) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut()
        .append_pair("uuid", &local_uuid.to_string())
        .append_pair("port", &local_port.to_string());
    url
}

fn parse_handshake(query: Option<&str>) -> Option<HandshakeInfo> {
    let query = query?;
    let mut uuid = None;
    let mut port = None;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        match key {
            "uuid" => uuid = Uuid::parse_str(value).ok(),
            "port" => port = value.parse::<u16>().ok(),
            _ => {}
        }
    }
    Some(HandshakeInfo {
        uuid: uuid?,
        port: port?,
    })
}

/// Connects outbound to `base`, advertising `local_uuid`/`local_port`, and
/// spawns the connection's request/response multiplexer.
pub async fn connect(
    base: &Url,
    local_uuid: Uuid,
    local_port: u16,
    inbound: tokio::sync::mpsc::UnboundedSender<Inbound>,
) -> Result<Arc<OutboundConnection>, GossipError> {
    let url = connect_url(base, local_uuid, local_port);
    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    Ok(PeerConnection::spawn(stream, true, inbound))
}

/// Accepts an inbound TCP connection as a gossip session, reading the
/// remote UUID/port from the upgrade request's query string and rejecting
/// the handshake if the remote claims our own UUID (§4.10: "if its UUID
/// equals ours... reject").
pub async fn accept(
    tcp: TcpStream,
    local_uuid: Uuid,
    inbound: tokio::sync::mpsc::UnboundedSender<Inbound>,
) -> Result<(Arc<InboundConnection>, HandshakeInfo), GossipError> {
    let captured: Arc<Mutex<Option<HandshakeInfo>>> = Arc::new(Mutex::new(None));
    let captured_for_callback = Arc::clone(&captured);

    let callback = move |request: &Request, response: Response| {
        let info = parse_handshake(request.uri().query());
        *captured_for_callback.lock().unwrap() = info;
        Ok(response)
    };

    let stream: WebSocketStream<TcpStream> =
        tokio_tungstenite::accept_hdr_async(tcp, callback).await?;

    let info = captured
        .lock()
        .unwrap()
        .take()
        .ok_or_else(|| GossipError::Protocol("missing uuid/port handshake parameters".to_string()))?;

    if info.uuid == local_uuid {
        return Err(GossipError::Protocol(
            "peer advertised our own uuid".to_string(),
        ));
    }

    let conn = PeerConnection::spawn(stream, false, inbound);
    Ok((conn, info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uuid_and_port_from_query_string() {
        let uuid = Uuid::new_v4();
        let info = parse_handshake(Some(&format!("uuid={uuid}&port=4000"))).unwrap();
        assert_eq!(info.uuid, uuid);
        assert_eq!(info.port, 4000);
    }

    #[test]
    fn missing_parameter_fails_to_parse() {
        assert!(parse_handshake(Some("uuid=not-a-uuid&port=4000")).is_none());
        assert!(parse_handshake(Some("port=4000")).is_none());
        assert!(parse_handshake(None).is_none());
    }

    #[test]
    fn connect_url_carries_both_parameters() {
        let base = Url::parse("ws://10.0.0.1:9000/").unwrap();
        let uuid = Uuid::new_v4();
        let url = connect_url(&base, uuid, 9001);
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(pairs.get("uuid").unwrap(), &uuid.to_string());
        assert_eq!(pairs.get("port").unwrap(), &"9001".to_string());
    }
}
