use std::time::Duration;

use tokio::net::TcpStream;
use tracing::warn;

use crate::session::{self, SessionContext, SessionHandle};

/// Dial `host:port` and spawn a session that speaks first (sends
/// `identify`). See `examples/original_source/dht/main.py`'s
/// `connect_to_initial_node`.
pub async fn dial(host: &str, port: u16, ctx: SessionContext) -> std::io::Result<SessionHandle> {
    let stream = TcpStream::connect((host, port)).await?;
    let peer_addr = format!("{host}:{port}");
    Ok(session::spawn(stream, peer_addr, Some(port), ctx, true))
}

/// Periodically scan the routing table for known-but-unconnected peers and
/// redial them, recording the new session on success. Grounded in
/// `wdht/src/reconnect.rs`'s bootstrap reconnector, simplified to plain
/// fixed-interval polling since the logic crate exposes
/// `get_unconnected_nodes` directly rather than an event stream.
pub async fn reconnect_loop(ctx: SessionContext, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        let targets: Vec<(dht_logic::Id, String, u16)> = {
            let tree = ctx.tree.lock().unwrap();
            tree.get_unconnected_nodes()
                .into_iter()
                .filter_map(|node| {
                    let (address, port) = node.address_port()?;
                    Some((node.key(), address.to_string(), port))
                })
                .collect()
        };

        for (key, address, port) in targets {
            match dial(&address, port, ctx.clone()).await {
                Ok(handle) => {
                    ctx.tree.lock().unwrap().set_session(key, Some(handle));
                }
                Err(err) => {
                    warn!(%address, port, %err, "reconnect attempt failed");
                }
            }
        }
    }
}
