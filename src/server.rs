//! The server profile: an `axum` handler that upgrades incoming HTTP
//! requests to websocket connections and feeds them to the link core.
//!
//! Grounded in the original `ws.Handler`/`ws.NewHandler` (an
//! `http.Handler` wrapping a websocket upgrader around a per-connection
//! callback), re-expressed as an `axum` route plus extractor.

use crate::error::Result;
use crate::link::{Link, LinkBuilder};
use crate::transport;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Configures the `axum`-hosted handler profile: the address it binds and
/// the heartbeat cadence it advertises to every accepted connection.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub heartbeat: Duration,
}

/// Wraps a [`Link`] with the `axum` route that accepts connections for it.
pub struct Server {
    bind_addr: SocketAddr,
    link: Arc<Link>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let link = LinkBuilder::new().heartbeat(config.heartbeat).build();
        Server {
            bind_addr: config.bind_addr,
            link,
        }
    }

    /// Wraps an existing link (already customized via [`LinkBuilder`] with
    /// `topology_fn`/`alert_fn`/`recv_capacity`) instead of building a
    /// default one.
    pub fn with_link(bind_addr: SocketAddr, link: Arc<Link>) -> Self {
        Server { bind_addr, link }
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    /// The `axum` router exposing the websocket upgrade endpoint at `/`.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(accept_connection))
            .with_state(self.link.clone())
    }

    /// Binds `self.bind_addr` and serves the router until the listener
    /// errors.
    pub async fn serve(&self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "link server listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

#[instrument(skip(link, ws))]
async fn accept_connection(State(link): State<Arc<Link>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let (reader, writer) = transport::split_axum(socket);
        if let Err(e) = link.handle_connection(reader, writer).await {
            warn!(error = %e, "connection terminated");
        }
    })
}
