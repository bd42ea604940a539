use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use dht_logic::config::SystemConfig;
use dht_logic::value_store::MemoryValueStore;
use dht_logic::{BucketTree, Id};
use dht_transport::{dialer, listener, SessionContext};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Process root: owns the routing tree and value store, and spawns the
/// maintenance tasks that keep them alive. Mirrors
/// `examples/original_source/dht/main.py`'s `DHT` class.
pub struct DhtNode {
    pub ctx: SessionContext,
}

impl DhtNode {
    pub fn new(config: &SystemConfig, listen_port: u16) -> Self {
        let mut rng = rand::thread_rng();
        let self_key = Id::generate_self(&mut rng);
        info!(key = %self_key, "generated self key");

        let tree = Arc::new(Mutex::new(BucketTree::new(self_key, config.routing.clone())));
        let store = Arc::new(Mutex::new(MemoryValueStore::new()));

        Self {
            ctx: SessionContext { self_key, listen_port, tree, store },
        }
    }

    pub async fn bind(&self, addr: SocketAddr) -> std::io::Result<TcpListener> {
        listener::bind(addr).await
    }

    pub fn spawn_listener(&self, tcp: TcpListener) {
        tokio::spawn(listener::serve(tcp, self.ctx.clone()));
    }

    /// Connect to a known node and seed the routing table with whatever it
    /// knows about our own key's neighbourhood.
    pub async fn bootstrap(&self, host: &str, port: u16) -> anyhow::Result<()> {
        let handle = dialer::dial(host, port, self.ctx.clone()).await?;
        let self_key = self.ctx.self_key;
        tokio::spawn(async move {
            if let Err(err) = handle.find_node(self_key).await {
                warn!(%err, "initial find_node against bootstrap node failed");
            }
        });
        Ok(())
    }

    pub fn spawn_maintenance(&self, config: &SystemConfig) {
        tokio::spawn(dialer::reconnect_loop(self.ctx.clone(), config.dial.interval));
        tokio::spawn(refresh_loop(self.ctx.clone(), config.refresh.clone()));
    }
}

/// Periodic bucket refresh, exponentially backing off between rounds (wait
/// starts at `initial_wait` and doubles, capped at `max_wait`, forever). See
/// spec §4.6: drain a work queue of keys to probe, fanning each out as
/// `find_node` to every live session that `find_nodes` turns up locally; once
/// the queue empties, refill it with one random key sampled from each
/// non-self leaf's XOR range, so every bucket's region gets probed in turn
/// rather than only the self key's.
async fn refresh_loop(ctx: SessionContext, refresh: dht_logic::config::RefreshConfig) {
    let mut wait = refresh.initial_wait;
    let mut queue: Vec<Id> = Vec::new();
    loop {
        tokio::time::sleep(wait).await;
        wait = (wait * 2).min(refresh.max_wait);

        if queue.is_empty() {
            queue = {
                let tree = ctx.tree.lock().unwrap();
                let mut rng = rand::thread_rng();
                tree.leaves(false)
                    .into_iter()
                    .map(|leaf| tree.leaf_sample(leaf, &mut rng))
                    .collect()
            };
            info!(count = queue.len(), "refilled refresh queue from leaf ranges");
        }

        for key in queue.drain(..) {
            let sessions: Vec<_> = {
                let tree = ctx.tree.lock().unwrap();
                tree.find_nodes(key)
                    .into_iter()
                    .filter_map(|node| node.session().cloned())
                    .collect()
            };

            for session in sessions {
                tokio::spawn(async move {
                    if let Err(err) = session.find_node(key).await {
                        warn!(%err, "refresh find_node failed");
                    }
                });
            }
        }
    }
}
