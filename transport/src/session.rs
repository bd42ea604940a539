use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dht_logic::value_store::ValueStore;
use dht_logic::{BucketTree, Command, Id, Message, Node};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

use crate::codec::MessageCodec;
use crate::error::SessionError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const TIMEOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub type SharedTree = Arc<Mutex<BucketTree<SessionHandle>>>;
pub type SharedStore = Arc<Mutex<dyn ValueStore + Send>>;

/// The state a [`PeerSession`] needs to answer incoming commands: the local
/// identity and the two collaborators it adds discovered peers to.
#[derive(Clone)]
pub struct SessionContext {
    pub self_key: Id,
    pub listen_port: u16,
    pub tree: SharedTree,
    pub store: SharedStore,
}

enum SessionCommand {
    Request {
        command: Command,
        data: Value,
        respond_to: oneshot::Sender<Result<Value, SessionError>>,
    },
}

/// A cheap, cloneable reference to a live [`PeerSession`]. Routing-table
/// `Node`s hold one of these instead of the session itself, breaking the
/// `Node <-> PeerSession` reference cycle: the logic crate never reaches
/// into the session, it only asks it to issue requests.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl SessionHandle {
    async fn request(&self, command: Command, data: Value) -> Result<Value, SessionError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(SessionCommand::Request { command, data, respond_to })
            .map_err(|_| SessionError::ConnectionLost)?;
        rx.await.map_err(|_| SessionError::ConnectionLost)?
    }

    pub async fn find_node(&self, key: Id) -> Result<Value, SessionError> {
        self.request(Command::FindNode, json!(key.to_hex())).await
    }

    pub async fn find_value(&self, key: Id) -> Result<Value, SessionError> {
        self.request(Command::FindValue, json!(key.to_hex())).await
    }

    pub async fn store(&self, value: Value) -> Result<Value, SessionError> {
        self.request(Command::Store, value).await
    }
}

struct Pending {
    respond_to: oneshot::Sender<Result<Value, SessionError>>,
    deadline: Instant,
    command: Command,
}

/// The RPC state machine bound to one TCP connection. Owns the socket and
/// the outstanding-request table; reached from the outside only through a
/// [`SessionHandle`].
struct PeerSession {
    framed: Framed<TcpStream, MessageCodec>,
    ctx: SessionContext,
    peer_addr: String,
    /// The port we dialed, when we're the initiating side. `None` for
    /// accepted connections, where the remote socket's ephemeral port isn't
    /// the peer's listen port.
    dialed_port: Option<u16>,
    peer_key: Option<Id>,
    next_id: u64,
    pending: HashMap<u64, Pending>,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    handle: SessionHandle,
}

/// Spawn a session over an accepted or dialed TCP stream. `initiate`
/// controls who speaks first: the dialing side always sends `identify`
/// first, the accepting side only ever responds. See
/// `examples/original_source/dht/protocol.py`'s `DHTClientProtocol`.
/// `dialed_port` is `Some` exactly when `initiate` is true.
pub fn spawn(
    stream: TcpStream,
    peer_addr: String,
    dialed_port: Option<u16>,
    ctx: SessionContext,
    initiate: bool,
) -> SessionHandle {
    let (tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = SessionHandle { tx };
    let session = PeerSession {
        framed: Framed::new(stream, MessageCodec::new()),
        ctx,
        peer_addr,
        dialed_port,
        peer_key: None,
        next_id: 0,
        pending: HashMap::new(),
        cmd_rx,
        handle: handle.clone(),
    };
    tokio::spawn(session.run(initiate));
    handle
}

impl PeerSession {
    #[instrument(skip(self), fields(peer = %self.peer_addr))]
    async fn run(mut self, initiate: bool) {
        if initiate {
            if let Err(err) = self.send_identify().await {
                warn!(%err, "failed to send initial identify");
                return;
            }
        }

        let mut sweep = tokio::time::interval(TIMEOUT_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(message)) => self.on_message(message).await,
                        Some(Err(err)) => {
                            warn!(%err, "decode error, dropping frame");
                        }
                        None => {
                            debug!("connection closed by peer");
                            break;
                        }
                    }
                }
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::Request { command, data, respond_to }) => {
                            if let Err(err) = self.send_request(command, data, respond_to).await {
                                warn!(%err, "failed to send outbound request");
                            }
                        }
                        None => break,
                    }
                }
                _ = sweep.tick() => self.sweep_timeouts(),
            }
        }

        self.teardown();
    }

    fn teardown(&mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.respond_to.send(Err(SessionError::ConnectionLost));
        }
        // Clear our own session handle from the Node it belongs to, so the
        // reconnect loop picks this peer back up.
        if let Some(key) = self.peer_key {
            self.ctx.tree.lock().unwrap().set_session(key, None);
        }
    }

    fn sweep_timeouts(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            if let Some(pending) = self.pending.remove(&id) {
                let _ = pending.respond_to.send(Err(SessionError::Timeout));
            }
        }
    }

    async fn send_request(
        &mut self,
        command: Command,
        data: Value,
        respond_to: oneshot::Sender<Result<Value, SessionError>>,
    ) -> Result<(), SessionError> {
        let id = self.next_id;
        self.next_id += 1;
        let message = Message::request(id, command, data);
        self.framed.send(&message).await?;
        self.pending.insert(id, Pending { respond_to, deadline: Instant::now() + REQUEST_TIMEOUT, command });
        Ok(())
    }

    async fn send_identify(&mut self) -> Result<(), SessionError> {
        let (tx, _rx) = oneshot::channel();
        let data = json!({
            "key": self.ctx.self_key.to_hex(),
            "request_key": true,
            "listen_port": self.ctx.listen_port,
        });
        self.send_request(Command::Identify, data, tx).await
    }

    #[instrument(skip(self, message))]
    async fn on_message(&mut self, message: Message) {
        match message.command {
            Some(command) => self.on_request(message.id, command, message.data).await,
            None => self.on_response(message.id, message.data),
        }
    }

    fn on_response(&mut self, id: u64, data: Value) {
        let pending = match self.pending.remove(&id) {
            Some(pending) => pending,
            None => return,
        };

        match pending.command {
            Command::Identify => self.handle_identify_response(&data),
            Command::FindNode | Command::FindValue => self.handle_find_response(&data),
            Command::Store => {}
        }

        let _ = pending.respond_to.send(Ok(data));
    }

    /// Register the peer's key, now that it has responded to our own
    /// `identify`. We already know its address/port: we dialed them.
    fn handle_identify_response(&mut self, data: &Value) {
        let key = match data.get("key").and_then(Value::as_str).and_then(|s| Id::from_hex(s).ok()) {
            Some(key) => key,
            None => return,
        };
        let port = match self.dialed_port {
            Some(port) => port,
            None => return,
        };

        self.peer_key = Some(key);
        let host = self.peer_addr.split(':').next().unwrap_or(&self.peer_addr).to_string();
        let mut node = Node::new_peer(key, host, port);
        node.set_session(Some(self.handle.clone()));
        let mut tree = self.ctx.tree.lock().unwrap();
        if !tree.add_node(node) {
            tree.set_session(key, Some(self.handle.clone()));
        }
    }

    /// Learn about nodes surfaced by a peer's `find_node`/`find_value`
    /// response. Mirrors `handle_find_response` in the original: any
    /// returned node triple is worth adding to the routing table, not only
    /// the specific nodes we end up connecting to.
    fn handle_find_response(&mut self, data: &Value) {
        let entries = match data.as_array() {
            Some(entries) => entries,
            None => return,
        };

        let mut tree = self.ctx.tree.lock().unwrap();
        for entry in entries {
            let triple = match entry.as_array() {
                Some(triple) if triple.len() == 3 => triple,
                _ => continue,
            };
            let key = match triple[0].as_str().and_then(|s| Id::from_hex(s).ok()) {
                Some(key) => key,
                None => continue,
            };
            let address = match triple[1].as_str() {
                Some(address) => address.to_string(),
                None => continue,
            };
            let port = match triple[2].as_u64() {
                Some(port) => port as u16,
                None => continue,
            };
            tree.add_node(Node::new_peer(key, address, port));
        }
    }

    async fn on_request(&mut self, id: u64, command: Command, data: Value) {
        info!(?command, "request received");
        let response = match command {
            Command::Identify => self.handle_identify(data),
            Command::FindNode => self.handle_find_node(data),
            Command::FindValue => self.handle_find_value(data),
            Command::Store => self.handle_store(data),
        };
        let message = Message::response(id, response);
        if let Err(err) = self.framed.send(&message).await {
            warn!(%err, "failed to write response");
        }
    }

    fn handle_identify(&mut self, data: Value) -> Value {
        let key = match data.get("key").and_then(Value::as_str).and_then(|s| Id::from_hex(s).ok()) {
            Some(key) => key,
            None => return json!(false),
        };
        let listen_port = data.get("listen_port").and_then(Value::as_u64).unwrap_or(0) as u16;
        let request_key = data.get("request_key").and_then(Value::as_bool).unwrap_or(false);

        self.peer_key = Some(key);
        let host = self.peer_addr.split(':').next().unwrap_or(&self.peer_addr).to_string();
        let mut node = Node::new_peer(key, host, listen_port);
        node.set_session(Some(self.handle.clone()));
        let mut tree = self.ctx.tree.lock().unwrap();
        if !tree.add_node(node) {
            // Already known (e.g. a reconnect): attach this session to the
            // existing record instead of silently dropping it.
            tree.set_session(key, Some(self.handle.clone()));
        }
        drop(tree);

        if request_key {
            json!({
                "key": self.ctx.self_key.to_hex(),
                "request_key": false,
            })
        } else {
            json!(false)
        }
    }

    fn handle_find_node(&self, data: Value) -> Value {
        let key = match data.as_str().and_then(|s| Id::from_hex(s).ok()) {
            Some(key) => key,
            None => return json!([]),
        };
        let tree = self.ctx.tree.lock().unwrap();
        node_list(tree.find_nodes(key))
    }

    fn handle_find_value(&self, data: Value) -> Value {
        let key = match data.as_str().and_then(|s| Id::from_hex(s).ok()) {
            Some(key) => key,
            None => return json!([]),
        };
        let store = self.ctx.store.lock().unwrap();
        match store.retrieve(key) {
            Ok(value) => json!(value),
            Err(_) => {
                drop(store);
                let tree = self.ctx.tree.lock().unwrap();
                node_list(tree.find_nodes(key))
            }
        }
    }

    fn handle_store(&self, data: Value) -> Value {
        let bytes = match data {
            Value::String(s) => s.into_bytes(),
            other => other.to_string().into_bytes(),
        };
        self.ctx.store.lock().unwrap().store(bytes);
        Value::Null
    }
}

fn node_list<S>(nodes: Vec<&Node<S>>) -> Value {
    let entries: Vec<Value> = nodes
        .iter()
        .filter(|n| !n.is_self())
        .filter_map(|n| {
            let (address, port) = n.address_port()?;
            Some(json!([n.key().to_hex(), address, port]))
        })
        .collect();
    json!(entries)
}
