//! A bidirectional, multi-connection link protocol engine for
//! websocket-based channel fan-in/fan-out.
//!
//! The [`link`] module is the core: [`link::Link`] multiplexes one or more
//! transport connections to a peer set, fanning incoming payloads into a
//! single receive stream and load-balancing outgoing payloads across
//! whichever connection is free. [`client`] and [`server`] are the two
//! usage profiles built on top of it -- dialing a peer via
//! `tokio-tungstenite`, or accepting connections via an `axum` websocket
//! route -- each otherwise driving the same link core.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod link;
pub mod message;
pub mod payload;
pub mod server;
pub mod transport;

pub use client::{Client, ClientConfig};
pub use error::{Error, Result};
pub use link::{Link, LinkBuilder};
pub use message::{Message, MessageType, PROTOCOL_VERSION};
pub use payload::Payload;
pub use server::{Server, ServerConfig};

/// The default bind address for the server profile's CLI binary.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:9999";
