use crate::message::AlertLevel;
use thiserror::Error;

/// Errors produced by the link protocol engine.
///
/// Lifecycle errors (`LinkClosed`, `LinkShutdown`, `LinkFinished`) are
/// returned by [`crate::link::Link`] methods once the corresponding
/// transition has happened; they are strictly monotone and, once observed,
/// keep being returned for every later call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("link is closed")]
    LinkClosed,
    #[error("link is shut down")]
    LinkShutdown,
    #[error("link is finished sending")]
    LinkFinished,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("websocket transport error: {0}")]
    AxumTransport(#[from] axum::Error),
    #[error("wire codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("protocol versions {0:?} not supported")]
    UnsupportedVersion(Vec<u32>),
    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(String),
    #[error("connection closed by peer without a Finished message")]
    ConnectionResetMidFrame,

    #[error("remote host reported {level}: {message}")]
    RemoteAlert { level: AlertLevel, message: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("dns resolution error: {0}")]
    Resolve(String),
}

pub type Result<T> = std::result::Result<T, Error>;
