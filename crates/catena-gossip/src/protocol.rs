//! Wire protocol (§4.10, §6): a request carries a non-zero counter, the
//! reply echoes it, and unsolicited notifications use counter `0`. Bodies
//! are tagged JSON objects, `{"t": "<tag>", ...}`.

use catena_chain_types::{BlockWire, TransactionWire};
use serde::{Deserialize, Serialize};

/// `[counter, body]` — serialized as a two-element JSON array, not an
/// object, per §4.10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope(pub u64, pub MessageBody);

impl Envelope {
    pub fn unsolicited(body: MessageBody) -> Self {
        Envelope(0, body)
    }

    pub fn is_unsolicited(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum MessageBody {
    #[serde(rename = "query")]
    Query {},
    #[serde(rename = "index")]
    Index {
        genesis: String,
        highest: String,
        height: u64,
        peers: Vec<String>,
    },
    #[serde(rename = "fetch")]
    Fetch { hash: String },
    #[serde(rename = "block")]
    Block { block: BlockWire },
    #[serde(rename = "transaction")]
    Transaction { tx: TransactionWire },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "passive")]
    Passive {},
    #[serde(rename = "forget")]
    Forget {},
}

impl MessageBody {
    pub fn tag(&self) -> &'static str {
        match self {
            MessageBody::Query {} => "query",
            MessageBody::Index { .. } => "index",
            MessageBody::Fetch { .. } => "fetch",
            MessageBody::Block { .. } => "block",
            MessageBody::Transaction { .. } => "transaction",
            MessageBody::Error { .. } => "error",
            MessageBody::Passive {} => "passive",
            MessageBody::Forget {} => "forget",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_is_a_two_element_json_array() {
        let env = Envelope(4, MessageBody::Query {});
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"[4,{"t":"query"}]"#);
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, 4);
    }

    #[test]
    fn unsolicited_uses_counter_zero() {
        let env = Envelope::unsolicited(MessageBody::Forget {});
        assert!(env.is_unsolicited());
    }

    #[test]
    fn index_round_trips_with_peer_list() {
        let body = MessageBody::Index {
            genesis: "ab".to_string(),
            highest: "cd".to_string(),
            height: 12,
            peers: vec!["ws://a".to_string(), "ws://b".to_string()],
        };
        let json = serde_json::to_string(&Envelope(2, body)).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        match back.1 {
            MessageBody::Index { height, peers, .. } => {
                assert_eq!(height, 12);
                assert_eq!(peers.len(), 2);
            }
            _ => panic!("wrong variant"),
        }
    }
}
