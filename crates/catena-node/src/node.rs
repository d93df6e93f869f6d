//! The node orchestrator (C11, §4.11): a periodic tick that drains one
//! fetch candidate and advances one peer's state machine per round, wires
//! received transactions/blocks into the ledger and miner, and rebroadcasts
//! what it admits.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use catena_chain_types::{Block, Payload, Transaction};
use catena_crypto::{Hash, PrivateKey};
use catena_gossip::{Inbound, MessageBody, PeerState};
use catena_ledger::{Eligibility, Ledger};
use catena_miner::Miner;
use catena_store::{Blockchain, ExecutionMode};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::error::NodeError;
use crate::peer::{AnyConnection, Peer};
use crate::stats::{Stats, StatsSnapshot};

/// A block this node would like to fetch from `source`, because it is a
/// peer's reported tip or the unknown predecessor of a block just
/// received from that same peer.
struct FetchCandidate {
    hash: Hash,
    source: String,
}

pub struct Node {
    config: Config,
    local_uuid: Uuid,
    identity: PrivateKey,
    genesis_hash: Hash,
    ledger: Arc<Mutex<Ledger>>,
    miner: Arc<Miner>,
    peers: Mutex<HashMap<String, Arc<Peer>>>,
    query_queue: Mutex<VecDeque<String>>,
    fetch_queue: Mutex<VecDeque<FetchCandidate>>,
    stats: Stats,
    runtime: Handle,
    enabled: AtomicBool,
}

fn build_genesis(config: &Config) -> Result<Block, NodeError> {
    let miner = config.genesis.miner_hash().map_err(NodeError::Config)?;
    let signature = config.genesis.signature_hash().map_err(NodeError::Config)?;
    let block = Block {
        version: config.genesis.version,
        index: 0,
        previous: Hash::ZERO,
        miner,
        timestamp: config.genesis.timestamp,
        nonce: config.genesis.nonce,
        signature: Some(signature),
        payload: Payload::Seed(config.genesis.seed.clone()),
    };
    block.validate()?;
    Ok(block)
}

impl Node {
    /// Opens (or creates) this node's permanent chain state, wires the
    /// ledger, miner and peer bookkeeping together, and registers the
    /// configured seed peers. Does not start the tick loop or the gossip
    /// listener — see [`Node::serve`] and the caller's own tick driver.
    pub fn new(config: Config, runtime: Handle) -> Result<Arc<Node>, NodeError> {
        let genesis = build_genesis(&config)?;
        let genesis_hash = genesis.signature.expect("build_genesis always produces a signed block");
        let identity = PrivateKey::from_base58check(&config.identity_key)
            .map_err(|e| NodeError::Config(format!("identity_key: {e}")))?;
        let identity_hash = identity.public().identity_hash();
        let mode = if config.validate_only {
            ExecutionMode::ValidateOnly
        } else {
            ExecutionMode::Full
        };
        let chain = Blockchain::open(
            config.db_path(),
            genesis,
            config.desired_time_between_blocks,
            mode,
        )?;
        let ledger = Arc::new(Mutex::new(Ledger::new(chain)));
        let version = config.version;
        let local_uuid = config.uuid;
        let mining = config.mining;

        let node = Arc::new_cyclic(|weak: &Weak<Node>| {
            let weak_for_miner = weak.clone();
            let runtime_for_miner = runtime.clone();
            let miner = Miner::new(Arc::clone(&ledger), version, identity_hash, move |block| {
                if let Some(node) = weak_for_miner.upgrade() {
                    runtime_for_miner.spawn(async move {
                        node.receive_block(block, false, None).await;
                    });
                }
            });
            miner.set_enabled(mining);
            Node {
                config,
                local_uuid,
                identity,
                genesis_hash,
                ledger,
                miner,
                peers: Mutex::new(HashMap::new()),
                query_queue: Mutex::new(VecDeque::new()),
                fetch_queue: Mutex::new(VecDeque::new()),
                stats: Stats::default(),
                runtime,
                enabled: AtomicBool::new(true),
            }
        });

        let seed_peers = node.config.seed_peers.clone();
        for url in seed_peers {
            node.register_peer(url);
        }

        Ok(node)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    pub fn miner(&self) -> Arc<Miner> {
        Arc::clone(&self.miner)
    }

    pub fn identity(&self) -> Hash {
        self.identity.public().identity_hash()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    fn register_peer(&self, url: String) {
        let mut peers = self.peers.lock();
        if peers.contains_key(&url) {
            return;
        }
        peers.insert(url.clone(), Peer::new(url.clone()));
        self.query_queue.lock().push_back(url);
    }

    fn enqueue_fetch(&self, hash: Hash, source: String) {
        let mut queue = self.fetch_queue.lock();
        if !queue.iter().any(|candidate| candidate.hash == hash) {
            queue.push_back(FetchCandidate { hash, source });
        }
    }

    /// Starts the gossip listener on `config.listen_port`, accepting
    /// inbound sessions and registering each as a peer once its UUID/port
    /// handshake succeeds (§4.10).
    pub fn serve(self: &Arc<Self>) {
        let addr: SocketAddr = ([0, 0, 0, 0], self.config.listen_port).into();
        let node = Arc::clone(self);
        self.runtime.spawn(async move {
            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    log::error!("gossip listener failed to bind {addr}: {e}");
                    return;
                }
            };
            log::info!("gossip listener bound on {addr}");
            loop {
                match listener.accept().await {
                    Ok((tcp, remote)) => {
                        let node = Arc::clone(&node);
                        tokio::spawn(async move { node.accept_connection(tcp, remote).await });
                    }
                    Err(e) => log::warn!("gossip accept failed: {e}"),
                }
            }
        });
    }

    async fn accept_connection(self: Arc<Self>, tcp: TcpStream, remote: SocketAddr) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        match catena_gossip::accept(tcp, self.local_uuid, inbound_tx).await {
            Ok((conn, info)) => {
                let url = format!("ws://{}:{}/", remote.ip(), info.port);
                let peer = {
                    let mut peers = self.peers.lock();
                    if let Some(existing) = peers.get(&url) {
                        if existing.state().is_live() {
                            log::debug!("rejecting duplicate inbound connection from {url}");
                            return;
                        }
                    }
                    let peer = Peer::new(url.clone());
                    peers.insert(url.clone(), Arc::clone(&peer));
                    peer
                };
                *peer.uuid.lock() = Some(info.uuid);
                peer.set_connection(Some(AnyConnection::Inbound(conn)));
                peer.set_state(PeerState::Connected);
                self.spawn_inbound_reader(peer, inbound_rx);
            }
            Err(e) => log::debug!("inbound gossip handshake from {remote} failed: {e}"),
        }
    }

    fn spawn_inbound_reader(
        self: &Arc<Self>,
        peer: Arc<Peer>,
        mut rx: mpsc::UnboundedReceiver<Inbound>,
    ) {
        let node = Arc::clone(self);
        self.runtime.spawn(async move {
            while let Some(inbound) = rx.recv().await {
                node.handle_inbound(&peer, inbound).await;
            }
            peer.mark_failed("connection closed");
        });
    }

    /// One orchestrator round (§4.11): (a) drain one fetch candidate,
    /// (b) advance one peer's state machine, (c) re-enqueue every known
    /// peer for a future round.
    pub async fn tick(self: &Arc<Self>) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        self.process_one_fetch().await;
        self.advance_one_peer().await;
        self.requeue_peers();
    }

    async fn process_one_fetch(self: &Arc<Self>) {
        let candidate = self.fetch_queue.lock().pop_front();
        let Some(candidate) = candidate else { return };
        let peer = self.peers.lock().get(&candidate.source).cloned();
        let Some(peer) = peer else { return };
        let Some(conn) = peer.connection() else { return };
        match conn
            .request(MessageBody::Fetch {
                hash: candidate.hash.to_hex(),
            })
            .await
        {
            Ok(MessageBody::Block { block }) => match Block::from_wire(&block) {
                Ok(block) => self.receive_block(block, true, Some(candidate.source)).await,
                Err(e) => log::debug!("malformed block from fetch reply: {e}"),
            },
            Ok(MessageBody::Error { message }) => {
                log::debug!(
                    "peer {} could not supply block {}: {message}",
                    candidate.source,
                    candidate.hash
                );
            }
            Ok(other) => log::debug!("unexpected reply to fetch: {}", other.tag()),
            Err(e) => {
                log::debug!("fetch to {} failed: {e}", candidate.source);
                peer.mark_failed(e.to_string());
            }
        }
    }

    async fn advance_one_peer(self: &Arc<Self>) {
        let url = self.query_queue.lock().pop_front();
        let Some(url) = url else { return };
        let peer = self.peers.lock().get(&url).cloned();
        let Some(peer) = peer else { return };
        match peer.state() {
            PeerState::New | PeerState::Disconnected => self.connect_peer(peer).await,
            PeerState::Connected | PeerState::Queried => self.query_peer(peer).await,
            PeerState::Connecting
            | PeerState::Querying
            | PeerState::Passive
            | PeerState::Ignored(_)
            | PeerState::Failed(_) => {}
        }
    }

    async fn connect_peer(self: &Arc<Self>, peer: Arc<Peer>) {
        peer.set_state(PeerState::Connecting);
        let base = match Url::parse(&peer.url) {
            Ok(u) => u,
            Err(e) => {
                peer.mark_failed(format!("bad peer url: {e}"));
                return;
            }
        };
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        match catena_gossip::connect(&base, self.local_uuid, self.config.listen_port, inbound_tx).await {
            Ok(conn) => {
                peer.set_connection(Some(AnyConnection::Outbound(conn)));
                peer.set_state(PeerState::Connected);
                self.spawn_inbound_reader(Arc::clone(&peer), inbound_rx);
            }
            Err(e) => peer.mark_failed(e.to_string()),
        }
    }

    async fn query_peer(self: &Arc<Self>, peer: Arc<Peer>) {
        let Some(conn) = peer.connection() else {
            peer.set_state(PeerState::New);
            return;
        };
        peer.set_state(PeerState::Querying);
        match conn.request(MessageBody::Query {}).await {
            Ok(MessageBody::Index {
                genesis,
                highest,
                height,
                peers,
            }) => {
                let their_genesis = match Hash::from_hex(&genesis) {
                    Some(h) => h,
                    None => {
                        peer.mark_failed("malformed genesis hash");
                        return;
                    }
                };
                if their_genesis != self.genesis_hash {
                    self.stats.peers_ignored.fetch_add(1, Ordering::Relaxed);
                    peer.set_state(PeerState::Ignored("genesis mismatch".to_string()));
                    return;
                }
                for advertised in peers {
                    self.register_peer(advertised);
                }
                peer.set_state(PeerState::Queried);
                let our_height = self.ledger.lock().highest().index;
                if height > our_height {
                    if let Some(hash) = Hash::from_hex(&highest) {
                        self.enqueue_fetch(hash, peer.url.clone());
                    }
                }
            }
            Ok(MessageBody::Passive {}) => peer.set_state(PeerState::Passive),
            Ok(other) => {
                log::debug!("unexpected reply to query from {}: {}", peer.url, other.tag());
                peer.set_state(PeerState::Connected);
            }
            Err(e) => peer.mark_failed(e.to_string()),
        }
    }

    fn requeue_peers(&self) {
        let urls: Vec<String> = self
            .peers
            .lock()
            .iter()
            .filter(|(_, peer)| !matches!(peer.state(), PeerState::Ignored(_)))
            .map(|(url, _)| url.clone())
            .collect();
        let mut queue = self.query_queue.lock();
        for url in urls {
            if !queue.contains(&url) {
                queue.push_back(url);
            }
        }
    }

    async fn handle_inbound(self: &Arc<Self>, peer: &Arc<Peer>, inbound: Inbound) {
        match inbound.body {
            MessageBody::Query {} => {
                if let Some(conn) = peer.connection() {
                    let reply = self.build_index();
                    let _ = conn.reply(inbound.counter, reply).await;
                }
            }
            MessageBody::Fetch { hash } => {
                if let Some(conn) = peer.connection() {
                    let reply = self.build_fetch_reply(&hash);
                    let _ = conn.reply(inbound.counter, reply).await;
                }
            }
            MessageBody::Block { block } => match Block::from_wire(&block) {
                Ok(block) => self.receive_block(block, false, Some(peer.url.clone())).await,
                Err(e) => log::debug!("malformed block from {}: {e}", peer.url),
            },
            MessageBody::Transaction { tx } => match Transaction::from_wire(&tx) {
                Ok(tx) => self.receive_transaction(tx, Some(peer.url.clone())).await,
                Err(e) => log::debug!("malformed transaction from {}: {e}", peer.url),
            },
            MessageBody::Forget {} => {
                self.peers.lock().remove(&peer.url);
            }
            MessageBody::Index { .. } | MessageBody::Error { .. } | MessageBody::Passive {} => {
                log::debug!("unexpected unsolicited {} from {}", inbound.body.tag(), peer.url);
            }
        }
    }

    fn build_index(&self) -> MessageBody {
        let ledger = self.ledger.lock();
        let highest = ledger.highest();
        MessageBody::Index {
            genesis: self.genesis_hash.to_hex(),
            highest: highest
                .signature
                .map(|s| s.to_hex())
                .unwrap_or_else(|| Hash::ZERO.to_hex()),
            height: highest.index,
            peers: self.peers.lock().keys().cloned().collect(),
        }
    }

    fn build_fetch_reply(&self, hash_hex: &str) -> MessageBody {
        let Some(hash) = Hash::from_hex(hash_hex) else {
            return MessageBody::Error {
                message: "malformed hash".to_string(),
            };
        };
        match self.ledger.lock().chain().get_by_hash(hash) {
            Ok(Some(block)) => match block.to_wire() {
                Ok(wire) => MessageBody::Block { block: wire },
                Err(e) => MessageBody::Error { message: e.to_string() },
            },
            Ok(None) => MessageBody::Error {
                message: "unknown block".to_string(),
            },
            Err(e) => MessageBody::Error { message: e.to_string() },
        }
    }

    /// `receive(block)` (§4.11): validates, hands to the ledger, and
    /// rebroadcasts (excluding `from`, if any) when it newly extends the
    /// tip and was not itself the answer to an explicit fetch. A block
    /// whose predecessor is unknown enqueues that predecessor as a fetch
    /// candidate against the same source, when one is known.
    pub async fn receive_block(self: &Arc<Self>, block: Block, was_requested: bool, from: Option<String>) {
        if block.validate().is_err() {
            self.stats.blocks_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let previous = block.previous;
        let index = block.index;
        let outcome = { self.ledger.lock().receive(block.clone()) };
        match outcome {
            Ok(true) => {
                self.stats.blocks_applied.fetch_add(1, Ordering::Relaxed);
                if !was_requested {
                    let wire = block
                        .to_wire()
                        .expect("a block that passed validate() always serializes to wire form");
                    self.broadcast(MessageBody::Block { block: wire }, from.as_deref()).await;
                }
            }
            Ok(false) => {
                if let Some(source) = from {
                    self.enqueue_fetch(previous, source);
                }
            }
            Err(e) => {
                log::error!("ledger invariant violated receiving block at index {index}: {e}");
                std::process::abort();
            }
        }
    }

    /// `receive(transaction, from peer)` (§4.11): admits into the miner's
    /// pool when eligibility is `now`, and rebroadcasts only the
    /// transactions this call newly appended.
    pub async fn receive_transaction(self: &Arc<Self>, tx: Transaction, from: Option<String>) {
        if tx.validate().is_err() {
            self.stats.transactions_rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let pool = self.miner.pool();
        let eligibility = { self.ledger.lock().can_accept(&tx, &pool) };
        match eligibility {
            Ok(Eligibility::Now) => {
                let before = self.miner.pool().len();
                self.miner.append(tx.clone());
                if self.miner.pool().len() > before {
                    self.stats.transactions_admitted.fetch_add(1, Ordering::Relaxed);
                    let wire = tx
                        .to_wire()
                        .expect("a transaction that passed validate() always serializes to wire form");
                    self.broadcast(MessageBody::Transaction { tx: wire }, from.as_deref()).await;
                }
            }
            Ok(Eligibility::Future) => {
                log::debug!(
                    "transaction from {} held as future at counter {}",
                    tx.invoker.to_base58check(),
                    tx.counter
                );
            }
            Ok(Eligibility::Never) => {
                self.stats.transactions_rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log::warn!("could not evaluate transaction admission: {e}"),
        }
    }

    /// A client (CLI/admin surface) submitting a transaction directly to
    /// this node, as opposed to one arriving from a peer.
    pub async fn submit_transaction(self: &Arc<Self>, tx: Transaction) {
        self.receive_transaction(tx, None).await;
    }

    async fn broadcast(self: &Arc<Self>, body: MessageBody, except: Option<&str>) {
        let targets: Vec<Arc<Peer>> = self
            .peers
            .lock()
            .values()
            .filter(|peer| peer.state().is_live() && except != Some(peer.url.as_str()))
            .cloned()
            .collect();
        for peer in targets {
            if let Some(conn) = peer.connection() {
                if let Err(e) = conn.notify(body.clone()).await {
                    log::debug!("broadcast to {} failed: {e}", peer.url);
                    peer.mark_failed(e.to_string());
                }
            }
        }
    }

    /// Graceful shutdown (`SPEC_FULL.md` §C.1): stops mining and drops
    /// every peer connection. Does not send `forget` — that notification
    /// is peer-initiated only (§4.10).
    pub fn shutdown(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.miner.set_enabled(false);
        let mut peers = self.peers.lock();
        for peer in peers.values() {
            peer.set_connection(None);
            peer.set_state(PeerState::Disconnected);
        }
        peers.clear();
    }
}
