//! The opening exchange and per-connection task orchestration: negotiate a
//! protocol version, validate the peer's first message, then hand off to
//! the reader, config sender, heartbeat sender, and sender state machine.

use super::reader::run_reader;
use super::sender::run_sender;
use super::{config_sender::run_config_sender, heartbeat::run_heartbeat_sender, LinkShared};
use crate::error::{Error, Result};
use crate::message::{AlertLevel, Message, MessageType};
use crate::transport::{ConnectionId, TransportReader, TransportWriter, WsFrame};
use futures_util::{Sink, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

#[instrument(skip_all, fields(conn = conn_id.0))]
pub(crate) async fn run_connection<St, F1, E1, Sk, F2, E2>(
    shared: Arc<LinkShared>,
    conn_id: ConnectionId,
    reader: TransportReader<St>,
    writer: TransportWriter<Sk>,
) -> Result<()>
where
    St: Stream<Item = std::result::Result<F1, E1>> + Unpin + Send + 'static,
    F1: WsFrame,
    Error: From<E1>,
    Sk: Sink<F2, Error = E2> + Unpin + Send + 'static,
    F2: WsFrame,
    Error: From<E2>,
{
    let result = run_connection_inner(&shared, conn_id, reader, &writer).await;
    match &result {
        Ok(()) => debug!("connection terminated cleanly"),
        Err(e) => warn!(cause = %e, "connection terminated"),
    }
    writer.close().await;
    result
}

async fn run_connection_inner<St, F1, E1, Sk, F2, E2>(
    shared: &Arc<LinkShared>,
    conn_id: ConnectionId,
    mut reader: TransportReader<St>,
    writer: &TransportWriter<Sk>,
) -> Result<()>
where
    St: Stream<Item = std::result::Result<F1, E1>> + Unpin + Send + 'static,
    F1: WsFrame,
    Error: From<E1>,
    Sk: Sink<F2, Error = E2> + Unpin + Send + 'static,
    F2: WsFrame,
    Error: From<E2>,
{
    let local_config = shared.config.current();
    writer.write_message(&local_config, None).await?;

    let opening = reader
        .read_message(None)
        .await?
        .ok_or(Error::ConnectionResetMidFrame)?;
    let initial_deadline = process_config(shared, conn_id, writer, &opening).await?;

    let Some(recv_tx) = shared.readers.register() else {
        return Err(Error::LinkFinished);
    };

    let config_task = tokio::spawn(run_config_sender(writer.clone(), shared.config.subscribe()));

    let heartbeat_ms = {
        let state = shared.state.lock().unwrap();
        state.heartbeat_ms
    };
    let heartbeat_task = (heartbeat_ms > 0)
        .then(|| tokio::spawn(run_heartbeat_sender(writer.clone(), heartbeat_ms)));

    let (receive_shutdown_tx, receive_shutdown_rx) = mpsc::channel(1);
    let (error_tx, error_rx) = oneshot::channel();

    let shared_for_reader = shared.clone();
    let reader_task = tokio::spawn(async move {
        let result = run_reader(
            shared_for_reader,
            conn_id,
            reader,
            recv_tx,
            initial_deadline,
            receive_shutdown_tx,
        )
        .await;
        let _ = error_tx.send(result);
    });

    let closed_rx = shared.closed_tx.subscribe();
    let shutdown_rx = shared.shutdown_tx.subscribe();

    let result = run_sender(
        shared.clone(),
        writer.clone(),
        receive_shutdown_rx,
        Some(error_rx),
        closed_rx,
        shutdown_rx,
    )
    .await;

    config_task.abort();
    if let Some(task) = heartbeat_task {
        task.abort();
    }

    // Close the transport now, before waiting on the reader: `run_sender`
    // may have returned immediately on a local `Close` while the reader is
    // still parked in a blocking read with no deadline (heartbeat disabled,
    // or the peer simply silent). Closing here sends/propagates a Close
    // frame that unblocks both this connection's own reader and -- once
    // observed by the peer -- the peer's reader in turn, instead of
    // deferring the close to the caller in `run_connection` and deadlocking
    // on this await.
    writer.close().await;
    let _ = reader_task.await;

    result
}

/// Validates the peer's opening message and derives the read deadline the
/// reader task starts with: `heartbeat` milliseconds flat, matching the
/// original protocol's handshake-time deadline -- only the reader's
/// steady-state re-arm widens it to `1.5 * heartbeat`.
async fn process_config<Sk, F, E>(
    shared: &Arc<LinkShared>,
    conn_id: ConnectionId,
    writer: &TransportWriter<Sk>,
    opening: &Message,
) -> Result<Option<Duration>>
where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    let Some(version) = opening.negotiate_version() else {
        let err = Error::UnsupportedVersion(opening.protocol_version.clone());
        warn!(peer_versions = ?opening.protocol_version, cause = %err, "rejecting connection");
        let _ = writer
            .write_message(&Message::alert_message(AlertLevel::FatalError, err.to_string()), None)
            .await;
        return Err(err);
    };
    debug!(version, "negotiated protocol version");

    let initial_deadline = (opening.heartbeat > 0)
        .then(|| Duration::from_millis(opening.heartbeat as u64));

    match opening.message_type {
        MessageType::Heartbeat => {}
        MessageType::Topology => {
            let topology = opening
                .topology
                .clone()
                .ok_or(Error::UnexpectedMessageType("Topology message without body".into()))?;
            (shared.topology_fn)(conn_id, Some(topology));
        }
        MessageType::Alert => {
            let alert = opening
                .alert
                .clone()
                .ok_or(Error::UnexpectedMessageType("Alert message without body".into()))?;
            if alert.level == AlertLevel::FatalError {
                warn!(message = %alert.message, "peer sent a fatal alert during handshake");
                return Err(Error::RemoteAlert {
                    level: alert.level,
                    message: alert.message,
                });
            }
            (shared.alert_fn)(conn_id, alert);
        }
        other => {
            let err = Error::UnexpectedMessageType(format!("{other} during handshake"));
            warn!(cause = %err, "rejecting connection");
            let _ = writer
                .write_message(&Message::alert_message(AlertLevel::FatalError, err.to_string()), None)
                .await;
            return Err(err);
        }
    }

    Ok(initial_deadline)
}
