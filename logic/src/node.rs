use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::id::Id;

/// A fixed point far enough in the future that it outlives any real peer's
/// `last_seen`, computed once and reused — not `Instant::now()` evaluated
/// fresh on every call, which `sort_by_key` may do more than once per
/// element and would make the "same" key compare unequal to itself.
fn self_last_seen() -> Instant {
    static FAR_FUTURE: OnceLock<Instant> = OnceLock::new();
    *FAR_FUTURE.get_or_init(|| Instant::now() + Duration::from_secs(100 * 365 * 24 * 3600))
}

/// A peer (or the local peer) as known to the routing table.
///
/// `SelfNode` is a distinguished variant: it is never dialed, pinged or
/// evicted, and at most one instance of it exists across an entire
/// [`crate::ktree::BucketTree`].
#[derive(Debug, Clone)]
pub enum Node<S> {
    SelfNode(Id),
    Peer(PeerNode<S>),
}

/// Metadata for a remote peer. `session` is `None` until a connection is
/// established and `None` again after disconnect; `S` is the transport
/// crate's cheap, cloneable handle to the live [`PeerSession`]-equivalent —
/// the routing core never calls into it directly, it only tracks presence.
///
/// [`PeerSession`]: (the transport crate's per-connection actor)
#[derive(Debug, Clone)]
pub struct PeerNode<S> {
    pub key: Id,
    pub address: String,
    pub port: u16,
    pub last_seen: Instant,
    pub session: Option<S>,
}

impl<S> Node<S> {
    pub fn new_peer(key: Id, address: String, port: u16) -> Self {
        Node::Peer(PeerNode {
            key,
            address,
            port,
            last_seen: Instant::now(),
            session: None,
        })
    }

    pub fn key(&self) -> Id {
        match self {
            Node::SelfNode(key) => *key,
            Node::Peer(p) => p.key,
        }
    }

    pub fn is_self(&self) -> bool {
        matches!(self, Node::SelfNode(_))
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Node::SelfNode(_) => true,
            Node::Peer(p) => p.session.is_some(),
        }
    }

    pub fn last_seen(&self) -> Instant {
        match self {
            // SelfNode sorts last under bucket.rs's ascending last_seen
            // order: it is always "most recently seen", so it never becomes
            // nodes[0], the eviction head.
            Node::SelfNode(_) => self_last_seen(),
            Node::Peer(p) => p.last_seen,
        }
    }

    /// Record observed activity from this peer.
    pub fn touch(&mut self) {
        if let Node::Peer(p) = self {
            p.last_seen = Instant::now();
        }
    }

    pub fn session(&self) -> Option<&S> {
        match self {
            Node::SelfNode(_) => None,
            Node::Peer(p) => p.session.as_ref(),
        }
    }

    pub fn set_session(&mut self, session: Option<S>) {
        if let Node::Peer(p) = self {
            p.session = session;
        }
    }

    pub fn address_port(&self) -> Option<(&str, u16)> {
        match self {
            Node::SelfNode(_) => None,
            Node::Peer(p) => Some((&p.address, p.port)),
        }
    }
}

impl<S> PartialEq for Node<S> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<S> Eq for Node<S> {}
