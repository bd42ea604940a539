use clap::Parser;

/// A Rust DHT node.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
pub struct Cli {
    /// The initial node to connect to (1.2.3.4:5678).
    #[clap(long = "initial-node", short = 'n')]
    pub initial_node: Option<String>,

    /// The port to listen on.
    #[clap(long = "listen-port", short = 'p', default_value_t = 9999)]
    pub listen_port: u16,

    /// Increase log verbosity (-v for info, -vv for debug).
    #[clap(short, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn initial_node_parts(&self) -> Option<anyhow::Result<(String, u16)>> {
        self.initial_node.as_ref().map(|raw| {
            let (host, port) = raw
                .rsplit_once(':')
                .ok_or_else(|| anyhow::anyhow!("expected host:port, got '{raw}'"))?;
            let port: u16 = port.parse()?;
            Ok((host.to_string(), port))
        })
    }
}
