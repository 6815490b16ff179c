//! The client profile: dials a single peer, then hands the established
//! connection to the link core. Adds a `subscribe` convenience, a
//! `ready` signal callers can wait on to know the dial succeeded, and
//! SRV-aware address resolution.
//!
//! Grounded in the original `client.Config`/`basicClient`/`dialConfig` shape,
//! adapted to `tokio-tungstenite` for the transport and `rustls` for TLS.

pub mod resolve;

use crate::error::{Error, Result};
use crate::link::{Link, LinkBuilder};
use crate::message::Subscription;
use crate::transport;
use resolve::SrvResolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::Connector;
use tracing::{debug, instrument, warn};
use url::Url;

/// Mirrors the original `client.Config`: heartbeat cadence advertised to the
/// peer, the URL to dial, an optional API key sent as a header, and an
/// optional TLS client configuration for `wss://` targets.
#[derive(Clone)]
pub struct ClientConfig {
    pub heartbeat: Duration,
    pub url: Url,
    pub api_key: Option<String>,
    pub tls: Option<Arc<rustls::ClientConfig>>,
}

/// A dialing link endpoint. Wraps a [`Link`] with the dial driver and the
/// subscribe/ready conveniences the original `basicClient` adds on top of
/// the bare protocol engine.
pub struct Client {
    config: ClientConfig,
    link: Arc<Link>,
    ready_tx: tokio::sync::watch::Sender<bool>,
    ready_rx: tokio::sync::watch::Receiver<bool>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let link = LinkBuilder::new().heartbeat(config.heartbeat).build();
        let (ready_tx, ready_rx) = tokio::sync::watch::channel(false);
        Client {
            config,
            link,
            ready_tx,
            ready_rx,
        }
    }

    /// Builds a client around a caller-supplied link, for callers that also
    /// want `topology_fn`/`alert_fn`/`recv_capacity` customized via
    /// [`LinkBuilder`] directly.
    pub fn with_link(config: ClientConfig, link: Arc<Link>) -> Self {
        let (ready_tx, ready_rx) = tokio::sync::watch::channel(false);
        Client {
            config,
            link,
            ready_tx,
            ready_rx,
        }
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// Replaces the advertised subscription with a single entry listing
    /// `channels`, matching the original's variadic `Subscribe`.
    pub fn subscribe(&self, channels: &[u32]) {
        self.link.set_subscription(vec![Subscription {
            channel: channels.to_vec(),
        }]);
    }

    /// Resolves to `true` once the dial has completed and the connection
    /// handed off to the link core; closed (remains `true`) for the
    /// lifetime of the client after that point.
    pub fn ready(&self) -> tokio::sync::watch::Receiver<bool> {
        self.ready_rx.clone()
    }

    /// Dials `self.config.url` (resolving SRV records via `resolver`) and
    /// runs the link protocol over the resulting connection until it
    /// terminates.
    #[instrument(skip(self, resolver), fields(url = %self.config.url))]
    pub async fn dial_and_handle(&self, resolver: &dyn SrvResolver) -> Result<()> {
        let ws = self.dial(resolver).await?;
        let _ = self.ready_tx.send(true);
        let (reader, writer) = transport::split_tungstenite(ws);
        self.link.handle_connection(reader, writer).await
    }

    async fn dial(
        &self,
        resolver: &dyn SrvResolver,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<TcpStream>,
        >,
    > {
        let (default_port, service, use_tls) = match self.config.url.scheme() {
            "ws" => (80u16, "http", false),
            "wss" => (443u16, "https", true),
            other => return Err(Error::InvalidUrl(format!("unsupported scheme {other}"))),
        };

        let host = self
            .config
            .url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl("missing host".into()))?;
        let name = match self.config.url.port() {
            Some(p) => format!("{host}:{p}"),
            None => host.to_string(),
        };

        let (targets, server_name) = resolve::get_addrs(resolver, &name, service, default_port)
            .await
            .map_err(|e| Error::Resolve(e.to_string()))?;

        let mut request = self.config.url.as_str().into_client_request()?;
        if let Some(key) = &self.config.api_key {
            if !key.is_empty() {
                let value = key
                    .parse()
                    .map_err(|_| Error::InvalidUrl("api key is not a valid header value".into()))?;
                request.headers_mut().insert("X-API-Key", value);
            }
        }

        // `None` with TLS in play falls through to tokio-tungstenite's own
        // default connector (webpki roots, via this crate's enabled
        // feature); an explicit `ClientConfig` overrides it.
        let connector = use_tls.then(|| self.config.tls.clone().map(Connector::Rustls)).flatten();

        let mut last_err = None;
        for target in &targets {
            debug!(host = %target.host, port = target.port, %server_name, "dialing link peer");
            let tcp = match TcpStream::connect((target.host.as_str(), target.port)).await {
                Ok(tcp) => tcp,
                Err(e) => {
                    warn!(host = %target.host, port = target.port, error = %e, "dial attempt failed");
                    last_err = Some(Error::Io(e));
                    continue;
                }
            };
            match tokio_tungstenite::client_async_tls_with_config(
                request.clone(),
                tcp,
                None,
                connector.clone(),
            )
            .await
            {
                Ok((ws, _response)) => return Ok(ws),
                Err(e) => {
                    warn!(host = %target.host, port = target.port, error = %e, "websocket handshake failed");
                    last_err = Some(Error::Transport(e));
                    continue;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Resolve("no addresses resolved".into())))
    }
}
