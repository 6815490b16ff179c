//! Dials a link protocol endpoint and runs the protocol over the resulting
//! connection, for manual exercising of the engine from the command line.

use clap::Parser;
use meshlink::client::resolve::HickoryResolver;
use meshlink::client::{Client, ClientConfig};
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "link-client", version, about = "Dials a link protocol endpoint")]
struct Cli {
    /// Websocket URL to dial, e.g. ws://127.0.0.1:9999/ or wss://host/.
    url: Url,

    /// Heartbeat cadence advertised to the peer, in milliseconds. `0`
    /// disables heartbeating.
    #[arg(long, default_value_t = 5000)]
    heartbeat_ms: u64,

    /// Value sent as the `X-API-Key` header during the websocket handshake.
    #[arg(long)]
    api_key: Option<String>,

    /// Channels to subscribe to on connect.
    #[arg(long, value_delimiter = ',')]
    subscribe: Vec<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::new(ClientConfig {
        heartbeat: Duration::from_millis(cli.heartbeat_ms),
        url: cli.url,
        api_key: cli.api_key,
        tls: None,
    });

    if !cli.subscribe.is_empty() {
        client.subscribe(&cli.subscribe);
    }

    let resolver = HickoryResolver::from_system_conf()?;
    client.dial_and_handle(&resolver).await?;
    Ok(())
}
