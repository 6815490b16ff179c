//! Adapts a websocket stream into the framed, per-direction-deadline message
//! pipe the link protocol engine assumes.
//!
//! The engine treats a connection as opaque: read one [`Message`] at a
//! time, optionally bounded by a deadline, and write one [`Message`] at a
//! time, likewise optionally bounded. Two concrete websocket backends feed
//! this abstraction -- `tokio-tungstenite` on the dialing (client) side and
//! `axum`'s extractor on the accepting (server) side -- so reads/writes are
//! generic over any `Stream`/`Sink` of a frame type implementing [`WsFrame`],
//! rather than over a single concrete websocket crate.
//!
//! Neither backend exposes a per-call read/write deadline, so deadlines are
//! implemented here with `tokio::time::timeout` wrapping the underlying
//! `next()`/`send()` calls.

use crate::codec;
use crate::error::{Error, Result};
use crate::message::Message;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Identifies a connection to user-installed callbacks (`topology_fn`,
/// `alert_fn`) without exposing the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// A single websocket frame, abstracted over the concrete message type of
/// whichever backend produced it (`tungstenite::Message` for dialed
/// connections, `axum::extract::ws::Message` for accepted ones). The engine
/// only cares about binary frames (which carry an encoded [`Message`]) and
/// close frames; everything else is transparently skipped by the reader.
pub trait WsFrame: Send + 'static {
    fn binary(bytes: Vec<u8>) -> Self;
    fn into_binary(self) -> Option<Vec<u8>>;
    fn is_close(&self) -> bool;
}

impl WsFrame for tokio_tungstenite::tungstenite::Message {
    fn binary(bytes: Vec<u8>) -> Self {
        tokio_tungstenite::tungstenite::Message::Binary(bytes)
    }

    fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            tokio_tungstenite::tungstenite::Message::Binary(b) => Some(b),
            _ => None,
        }
    }

    fn is_close(&self) -> bool {
        matches!(self, tokio_tungstenite::tungstenite::Message::Close(_))
    }
}

impl WsFrame for axum::extract::ws::Message {
    fn binary(bytes: Vec<u8>) -> Self {
        axum::extract::ws::Message::Binary(bytes)
    }

    fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            axum::extract::ws::Message::Binary(b) => Some(b),
            _ => None,
        }
    }

    fn is_close(&self) -> bool {
        matches!(self, axum::extract::ws::Message::Close(_))
    }
}

fn deadline_exceeded(what: &'static str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{what} deadline exceeded"),
    ))
}

/// The read half of a connection. Owned exclusively by that connection's
/// reader task; the read deadline is therefore plain local state, not
/// shared.
pub struct TransportReader<St> {
    stream: St,
}

/// The write half of a connection, shared by the config sender, heartbeat
/// sender, and the main sender state machine -- all three may write to the
/// same underlying socket, so writes are serialized behind a mutex.
pub struct TransportWriter<Sk> {
    sink: Arc<AsyncMutex<Sk>>,
}

impl<Sk> Clone for TransportWriter<Sk> {
    fn clone(&self) -> Self {
        TransportWriter {
            sink: self.sink.clone(),
        }
    }
}

/// Splits a `tokio-tungstenite` websocket stream (the client/dialing
/// backend) into its framed reader/writer halves.
pub fn split_tungstenite<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
) -> (
    TransportReader<SplitStream<tokio_tungstenite::WebSocketStream<S>>>,
    TransportWriter<SplitSink<tokio_tungstenite::WebSocketStream<S>, tokio_tungstenite::tungstenite::Message>>,
)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (
        TransportReader { stream },
        TransportWriter {
            sink: Arc::new(AsyncMutex::new(sink)),
        },
    )
}

/// Splits an `axum` websocket (the server/accepting backend) into its
/// framed reader/writer halves.
pub fn split_axum(
    ws: axum::extract::ws::WebSocket,
) -> (
    TransportReader<SplitStream<axum::extract::ws::WebSocket>>,
    TransportWriter<SplitSink<axum::extract::ws::WebSocket, axum::extract::ws::Message>>,
) {
    let (sink, stream) = ws.split();
    (
        TransportReader { stream },
        TransportWriter {
            sink: Arc::new(AsyncMutex::new(sink)),
        },
    )
}

impl<St, F, E> TransportReader<St>
where
    St: Stream<Item = std::result::Result<F, E>> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    /// Reads the next [`Message`], ignoring non-data websocket frames
    /// (Ping/Pong/Text), bounded by `deadline` if one is given.
    ///
    /// Returns `Ok(None)` if the peer closed the connection cleanly.
    pub async fn read_message(&mut self, deadline: Option<Duration>) -> Result<Option<Message>> {
        loop {
            let next = match deadline {
                Some(d) => tokio::time::timeout(d, self.stream.next())
                    .await
                    .map_err(|_| deadline_exceeded("read"))?,
                None => self.stream.next().await,
            };

            let Some(frame) = next else {
                return Ok(None);
            };
            let frame = frame?;

            if frame.is_close() {
                return Ok(None);
            }
            match frame.into_binary() {
                Some(bytes) => return Ok(Some(codec::decode_message(&bytes)?)),
                // Ping/Pong/Text frames carry no protocol content for this
                // engine; keep reading.
                None => continue,
            }
        }
    }
}

impl<Sk, F, E> TransportWriter<Sk>
where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    /// Writes `message`, bounded by `deadline` if one is given.
    pub async fn write_message(&self, message: &Message, deadline: Option<Duration>) -> Result<()> {
        let bytes = codec::encode_message(message)?;
        let mut sink = self.sink.lock().await;
        let send = sink.send(F::binary(bytes));
        match deadline {
            Some(d) => tokio::time::timeout(d, send)
                .await
                .map_err(|_| deadline_exceeded("write"))??,
            None => send.await?,
        }
        Ok(())
    }

    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}
