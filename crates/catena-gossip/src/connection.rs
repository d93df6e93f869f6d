//! The counter-keyed request/response multiplexer over one WebSocket
//! session (§4.10). Generic over the underlying stream so the same logic
//! serves both outbound (`connect_async`, possibly TLS-wrapped) and inbound
//! (`accept_async`, plain TCP) connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::GossipError;
use crate::protocol::{Envelope, MessageBody};

/// §9 open question, resolved at 20s (`SPEC_FULL.md` §D.2).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// An inbound envelope the read loop could not match to a pending local
/// request: either a genuine unsolicited notification (`counter == 0`) or
/// a request from the peer that this side must itself answer, by sending
/// a reply envelope carrying the same counter back via [`PeerConnection::reply`].
#[derive(Debug, Clone)]
pub struct Inbound {
    pub counter: u64,
    pub body: MessageBody,
}

pub struct PeerConnection<S> {
    sink: tokio::sync::Mutex<SplitSink<WebSocketStream<S>, Message>>,
    next_counter: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<MessageBody>>>,
}

impl<S> PeerConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wraps an already-established WebSocket stream and starts its read
    /// loop. `initiator` selects counter parity: the connecting side uses
    /// even counters, the accepting side odd (§4.10). Messages that do not
    /// match a pending local request (unsolicited notifications, and
    /// requests the peer is making of us) are forwarded on `inbound`.
    pub fn spawn(
        stream: WebSocketStream<S>,
        initiator: bool,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) -> Arc<Self> {
        let (sink, mut source) = stream.split();
        let conn = Arc::new(PeerConnection {
            sink: tokio::sync::Mutex::new(sink),
            next_counter: AtomicU64::new(if initiator { 2 } else { 1 }),
            pending: Mutex::new(HashMap::new()),
        });

        let reader = Arc::clone(&conn);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        log::debug!("gossip connection read error: {e}");
                        break;
                    }
                };
                let text = match frame {
                    Message::Text(t) => t,
                    Message::Close(_) => break,
                    _ => continue,
                };
                let envelope: Envelope = match serde_json::from_str(&text) {
                    Ok(e) => e,
                    Err(e) => {
                        log::debug!("malformed gossip envelope: {e}");
                        continue;
                    }
                };
                let matched = if envelope.is_unsolicited() {
                    None
                } else {
                    reader.pending.lock().remove(&envelope.0)
                };
                match matched {
                    Some(tx) => {
                        let _ = tx.send(envelope.1);
                    }
                    None => {
                        let _ = inbound.send(Inbound {
                            counter: envelope.0,
                            body: envelope.1,
                        });
                    }
                }
            }
            reader.pending.lock().clear();
        });

        conn
    }

    async fn send(&self, envelope: Envelope) -> Result<(), GossipError> {
        let json = serde_json::to_string(&envelope)?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(json)).await?;
        Ok(())
    }

    /// Sends a request and waits up to [`REQUEST_TIMEOUT`] for its reply.
    pub async fn request(&self, body: MessageBody) -> Result<MessageBody, GossipError> {
        let counter = self.next_counter.fetch_add(2, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(counter, tx);
        if let Err(e) = self.send(Envelope(counter, body)).await {
            self.pending.lock().remove(&counter);
            return Err(e);
        }
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(GossipError::Closed),
            Err(_) => {
                self.pending.lock().remove(&counter);
                Err(GossipError::Timeout)
            }
        }
    }

    /// Sends a counter-`0` unsolicited notification; no reply is awaited.
    pub async fn notify(&self, body: MessageBody) -> Result<(), GossipError> {
        self.send(Envelope::unsolicited(body)).await
    }

    /// Answers a request previously delivered as [`Inbound`], echoing its
    /// counter.
    pub async fn reply(&self, counter: u64, body: MessageBody) -> Result<(), GossipError> {
        self.send(Envelope(counter, body)).await
    }

    /// Number of local requests still awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageBody;

    async fn connected_pair() -> (
        Arc<PeerConnection<tokio::io::DuplexStream>>,
        Arc<PeerConnection<tokio::io::DuplexStream>>,
        mpsc::UnboundedReceiver<Inbound>,
        mpsc::UnboundedReceiver<Inbound>,
    ) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client_ws = tokio_tungstenite::client_async("ws://peer/", client_io)
            .await
            .unwrap()
            .0;
        let server_ws = tokio_tungstenite::accept_async(server_io).await.unwrap();

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let client = PeerConnection::spawn(client_ws, true, client_tx);
        let server = PeerConnection::spawn(server_ws, false, server_tx);
        (client, server, client_rx, server_rx)
    }

    #[tokio::test]
    async fn request_reply_round_trips_and_echoes_the_counter() {
        let (client, server, _client_rx, mut server_rx) = connected_pair().await;

        let responder = tokio::spawn(async move {
            let request = server_rx.recv().await.unwrap();
            server
                .reply(
                    request.counter,
                    MessageBody::Index {
                        genesis: "g".to_string(),
                        highest: "h".to_string(),
                        height: 3,
                        peers: vec![],
                    },
                )
                .await
                .unwrap();
        });

        let reply = client.request(MessageBody::Query {}).await.unwrap();
        match reply {
            MessageBody::Index { height, .. } => assert_eq!(height, 3),
            other => panic!("unexpected reply: {other:?}"),
        }
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn unsolicited_notification_is_forwarded_with_counter_zero() {
        let (client, _server, _client_rx, mut server_rx) = connected_pair().await;
        client.notify(MessageBody::Forget {}).await.unwrap();
        let received = server_rx.recv().await.unwrap();
        assert_eq!(received.counter, 0);
        assert!(matches!(received.body, MessageBody::Forget {}));
    }

    #[tokio::test]
    async fn initiator_and_acceptor_use_distinct_counter_parity() {
        let (client, server, mut client_rx, mut server_rx) = connected_pair().await;

        let client_req = Arc::clone(&client);
        tokio::spawn(async move {
            let _ = client_req.request(MessageBody::Query {}).await;
        });
        let from_client = server_rx.recv().await.unwrap();
        assert_eq!(from_client.counter % 2, 0);

        let server_req = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = server_req.request(MessageBody::Query {}).await;
        });
        let from_server = client_rx.recv().await.unwrap();
        assert_eq!(from_server.counter % 2, 1);
    }
}
