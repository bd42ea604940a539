mod cli;
mod node;

use clap::Parser;
use cli::Cli;
use dht_logic::config::SystemConfig;
use node::DhtNode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = SystemConfig::default();
    let dht = DhtNode::new(&config, cli.listen_port);

    let listener = dht.bind(([0, 0, 0, 0], cli.listen_port).into()).await?;
    dht.spawn_listener(listener);

    if let Some(parts) = cli.initial_node_parts() {
        let (host, port) = parts?;
        dht.bootstrap(&host, port).await?;
    }

    dht.spawn_maintenance(&config);

    tracing::info!(port = cli.listen_port, "dht node running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    Ok(())
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
