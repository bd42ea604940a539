use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::session::{self, SessionContext};

/// Bind `addr`, surfacing any bind failure (port in use, permission denied)
/// to the caller before the accept loop starts.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    Ok(listener)
}

/// Spawn a [`crate::session::PeerSession`] for every inbound connection,
/// forever. Accepted sessions never speak first — they wait for the
/// dialer's `identify`.
pub async fn serve(listener: TcpListener, ctx: SessionContext) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        info!(%peer_addr, "accepted connection");
        session::spawn(stream, peer_addr.to_string(), None, ctx.clone(), false);
    }
}
