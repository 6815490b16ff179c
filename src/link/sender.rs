//! The per-connection sender state machine: drains the shared outbound
//! payload queue onto the wire and reacts to local/peer shutdown signals.
//!
//! Two states, matching the protocol's own description of this component:
//!
//! - `Running`: payloads flow, and either side's `Shutdown` flips this
//!   connection into `ShuttingDown`; the link entering `Closed` ends the
//!   connection immediately.
//! - `ShuttingDown`: payloads still flow (queued sends must drain) until the
//!   queue closes or the reader's outcome ends it, but a `Closed` transition
//!   still preempts it immediately, same as `Running`.
//!
//! Both states end by writing a `Finished` message and waiting for the
//! reader's outcome, so the peer always sees a `Finished` before the socket
//! closes from this side.

use super::LinkShared;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::transport::{TransportWriter, WsFrame};
use futures_util::Sink;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

type ReaderOutcome = oneshot::Receiver<Result<()>>;

pub(crate) async fn run_sender<Sk, F, E>(
    shared: Arc<LinkShared>,
    writer: TransportWriter<Sk>,
    mut receive_shutdown_rx: mpsc::Receiver<()>,
    mut receive_error: Option<ReaderOutcome>,
    mut closed_rx: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()>
where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    if *closed_rx.borrow() {
        return Ok(());
    }
    if *shutdown_rx.borrow() {
        writer.write_message(&Message::shutdown_message(), None).await?;
        return run_shutting_down(&shared, writer, closed_rx, receive_error).await;
    }

    loop {
        tokio::select! {
            payload = shared.send_rx.recv() => {
                match payload {
                    Ok(payload) => {
                        writer.write_message(&Message::payload_message(payload), None).await?;
                    }
                    Err(_closed) => return finish_connection(&writer, receive_error).await,
                }
            }
            _ = closed_rx.changed() => {
                debug!("link closed, tearing down without draining");
                return Ok(());
            }
            _ = shutdown_rx.changed() => {
                debug!("link shutdown, entering shutting-down state");
                writer.write_message(&Message::shutdown_message(), None).await?;
                return run_shutting_down(&shared, writer, closed_rx, receive_error).await;
            }
            _ = receive_shutdown_rx.recv() => {
                debug!("peer requested shutdown, finishing connection");
                return finish_connection(&writer, receive_error).await;
            }
            result = async { receive_error.as_mut().unwrap().await }, if receive_error.is_some() => {
                match result {
                    Ok(Ok(())) => {
                        debug!("peer sent Finished; reader done, still draining outbound queue");
                        receive_error = None;
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_dropped) => receive_error = None,
                }
            }
        }
    }
}

/// No `receive_shutdown` arm here: once a connection has issued its own
/// `Shutdown`, a further peer `Shutdown` is moot. `Close` still preempts
/// this state exactly as it does `Running` -- a connection asked to shut
/// down politely must still tear down immediately on a local `Close`.
async fn run_shutting_down<Sk, F, E>(
    shared: &Arc<LinkShared>,
    writer: TransportWriter<Sk>,
    mut closed_rx: watch::Receiver<bool>,
    mut receive_error: Option<ReaderOutcome>,
) -> Result<()>
where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    if *closed_rx.borrow() {
        return Ok(());
    }
    loop {
        tokio::select! {
            payload = shared.send_rx.recv() => {
                match payload {
                    Ok(payload) => {
                        writer.write_message(&Message::payload_message(payload), None).await?;
                    }
                    Err(_closed) => return finish_connection(&writer, receive_error).await,
                }
            }
            _ = closed_rx.changed() => {
                debug!("link closed, tearing down shutting-down connection without draining");
                return Ok(());
            }
            result = async { receive_error.as_mut().unwrap().await }, if receive_error.is_some() => {
                match result {
                    Ok(Ok(())) => receive_error = None,
                    Ok(Err(e)) => return Err(e),
                    Err(_dropped) => receive_error = None,
                }
            }
        }
    }
}

async fn finish_connection<Sk, F, E>(
    writer: &TransportWriter<Sk>,
    receive_error: Option<ReaderOutcome>,
) -> Result<()>
where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    debug!("writing Finished");
    writer.write_message(&Message::finished_message(), None).await?;
    match receive_error {
        None => Ok(()),
        Some(rx) => match rx.await {
            Ok(result) => result,
            Err(_dropped) => Ok(()),
        },
    }
}
