//! Per-connection task that sends a `Heartbeat` message on a fixed
//! interval, for as long as the socket write succeeds. Only spawned when
//! the link was built with a nonzero heartbeat cadence.

use crate::error::Error;
use crate::message::Message;
use crate::transport::{TransportWriter, WsFrame};
use futures_util::Sink;
use std::time::Duration;
use tracing::debug;

pub(crate) async fn run_heartbeat_sender<Sk, F, E>(writer: TransportWriter<Sk>, heartbeat_ms: u32)
where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    let mut interval = tokio::time::interval(Duration::from_millis(heartbeat_ms as u64));
    interval.tick().await; // first tick fires immediately; the opening message already covers it.
    let write_deadline = Duration::from_millis(heartbeat_ms as u64 + heartbeat_ms as u64 / 2);
    loop {
        interval.tick().await;
        if writer
            .write_message(&Message::heartbeat_message(heartbeat_ms), Some(write_deadline))
            .await
            .is_err()
        {
            debug!("heartbeat sender exiting on write error");
            return;
        }
    }
}
