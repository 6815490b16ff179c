//! Runs the link protocol engine as a standalone `axum`-hosted server, for
//! manual exercising of the engine from the command line.

use clap::Parser;
use meshlink::server::{Server, ServerConfig};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "link-server", version, about = "Runs a link protocol endpoint that accepts connections")]
struct Cli {
    /// Address to bind the websocket endpoint on.
    #[arg(long, default_value = "0.0.0.0:9999")]
    bind_addr: SocketAddr,

    /// Heartbeat cadence advertised to connected peers, in milliseconds.
    /// `0` disables heartbeating.
    #[arg(long, default_value_t = 5000)]
    heartbeat_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let server = Server::new(ServerConfig {
        bind_addr: cli.bind_addr,
        heartbeat: Duration::from_millis(cli.heartbeat_ms),
    });

    server.serve().await?;
    Ok(())
}
