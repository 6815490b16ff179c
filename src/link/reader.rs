//! The per-connection reader task: dispatches every inbound message to the
//! link's shared state and keeps the read deadline re-armed from heartbeats.

use super::LinkShared;
use crate::error::{Error, Result};
use crate::message::{AlertLevel, MessageType};
use crate::transport::{ConnectionId, TransportReader, WsFrame};
use futures_util::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Runs until the connection closes, a fatal alert arrives, or `Finished` is
/// received. `initial_deadline` is the read deadline `process_config`
/// computed from the peer's opening heartbeat advertisement; every later
/// iteration re-arms the deadline at `1.5 * heartbeat` from the most
/// recently seen heartbeat-carrying message, matching the slack the sender
/// side gives its own heartbeat cadence.
pub(crate) async fn run_reader<St, F, E>(
    shared: Arc<LinkShared>,
    conn_id: ConnectionId,
    mut reader: TransportReader<St>,
    recv_tx: mpsc::Sender<crate::payload::Payload>,
    initial_deadline: Option<Duration>,
    receive_shutdown_tx: mpsc::Sender<()>,
) -> Result<()>
where
    St: Stream<Item = std::result::Result<F, E>> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    let result = run_reader_inner(
        &shared,
        conn_id,
        &mut reader,
        recv_tx,
        initial_deadline,
        receive_shutdown_tx,
    )
    .await;

    match &result {
        Ok(()) => debug!(conn = conn_id.0, "reader exiting after peer Finished"),
        Err(e) => warn!(conn = conn_id.0, cause = %e, "reader exiting with error"),
    }
    (shared.topology_fn)(conn_id, None);
    shared.readers.unregister();
    result
}

async fn run_reader_inner<St, F, E>(
    shared: &Arc<LinkShared>,
    conn_id: ConnectionId,
    reader: &mut TransportReader<St>,
    recv_tx: mpsc::Sender<crate::payload::Payload>,
    mut deadline: Option<Duration>,
    receive_shutdown_tx: mpsc::Sender<()>,
) -> Result<()>
where
    St: Stream<Item = std::result::Result<F, E>> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    loop {
        let message = match reader.read_message(deadline).await? {
            Some(m) => m,
            None => return Err(Error::ConnectionResetMidFrame),
        };

        if message.heartbeat > 0 {
            let hb = message.heartbeat as u64;
            deadline = Some(Duration::from_millis(hb + hb / 2));
        }

        match message.message_type {
            MessageType::Data => {
                let payload = message
                    .payload
                    .ok_or(Error::UnexpectedMessageType("Data message without payload".into()))?;
                if recv_tx.send(payload).await.is_err() {
                    // Only reachable if the owner dropped every `Receive`
                    // handle while this connection was still delivering
                    // data -- treat it as the connection's terminal error.
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotConnected,
                        "inbound payload queue closed",
                    )));
                }
            }
            MessageType::Topology => {
                let topology = message
                    .topology
                    .ok_or(Error::UnexpectedMessageType("Topology message without body".into()))?;
                (shared.topology_fn)(conn_id, Some(topology));
            }
            MessageType::Heartbeat => {}
            MessageType::Alert => {
                let alert = message
                    .alert
                    .ok_or(Error::UnexpectedMessageType("Alert message without body".into()))?;
                if alert.level == AlertLevel::FatalError {
                    warn!(conn = conn_id.0, message = %alert.message, "peer sent a fatal alert");
                    return Err(Error::RemoteAlert {
                        level: alert.level,
                        message: alert.message,
                    });
                }
                (shared.alert_fn)(conn_id, alert);
            }
            MessageType::Shutdown => {
                debug!(conn = conn_id.0, "peer requested shutdown");
                let _ = receive_shutdown_tx.try_send(());
            }
            MessageType::Finished => return Ok(()),
        }
    }
}
