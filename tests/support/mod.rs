//! Shared harness for the end-to-end protocol tests: an in-process duplex
//! pair wrapped as two already-established websocket connections, avoiding
//! a real socket/HTTP upgrade the way the crate's own design notes
//! describe. Both halves are handed to [`meshlink::transport::split_tungstenite`],
//! the same entry point `Client`/`Server` use for a real connection, so the
//! tests exercise exactly the code path production traffic goes through.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use meshlink::link::Link;
use meshlink::transport::{self, TransportReader, TransportWriter};
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;

type WsReader = TransportReader<futures_util::stream::SplitStream<WebSocketStream<DuplexStream>>>;
type WsWriter = TransportWriter<
    futures_util::stream::SplitSink<
        WebSocketStream<DuplexStream>,
        tokio_tungstenite::tungstenite::Message,
    >,
>;

/// How long any of these tests should wait for a protocol exchange to
/// settle before treating the run as hung.
pub const SETTLE: Duration = Duration::from_secs(1);

/// Builds a fresh duplex pair with each half wrapped as an already-open
/// websocket connection: one `Role::Client`, one `Role::Server`. Neither
/// side performs an HTTP upgrade handshake -- the link protocol's own
/// opening exchange is the first traffic on the wire.
async fn duplex_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
    let (a, b) = tokio::io::duplex(64 * 1024);
    let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
    (client, server)
}

/// Wires a fresh connection between `client` and `server`, spawning
/// `handle_connection` on both sides, and returns their join handles.
pub async fn connect(
    client: Arc<Link>,
    server: Arc<Link>,
) -> (
    JoinHandle<meshlink::Result<()>>,
    JoinHandle<meshlink::Result<()>>,
) {
    let (a, b) = duplex_pair().await;
    let (ra, wa) = transport::split_tungstenite(a);
    let (rb, wb) = transport::split_tungstenite(b);
    let client_handle = tokio::spawn(async move { client.handle_connection(ra, wa).await });
    let server_handle = tokio::spawn(async move { server.handle_connection(rb, wb).await });
    (client_handle, server_handle)
}

/// Wires `link` to a fresh connection, handing the *other* half back
/// unattached so the test can drive it directly as a scripted peer (for
/// exercising handshake failures without standing up a second [`Link`]).
pub async fn connect_to_fake_peer(
    link: Arc<Link>,
) -> (JoinHandle<meshlink::Result<()>>, WsReader, WsWriter) {
    let (a, b) = duplex_pair().await;
    let (ra, wa) = transport::split_tungstenite(a);
    let handle = tokio::spawn(async move { link.handle_connection(ra, wa).await });
    let (peer_reader, peer_writer) = transport::split_tungstenite(b);
    (handle, peer_reader, peer_writer)
}

/// Awaits `handle` within [`SETTLE`], panicking if it doesn't resolve.
pub async fn await_within_settle<T>(handle: JoinHandle<T>) -> T {
    tokio::time::timeout(SETTLE, handle)
        .await
        .expect("connection did not terminate within the settle window")
        .expect("connection task panicked")
}
