//! Per-connection task that republishes the link's config message whenever
//! `set_subscription`/`set_path` change it, for as long as the socket write
//! succeeds.

use crate::error::Error;
use crate::message::Message;
use crate::transport::{TransportWriter, WsFrame};
use futures_util::Sink;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub(crate) async fn run_config_sender<Sk, F, E>(
    writer: TransportWriter<Sk>,
    mut config_rx: watch::Receiver<Arc<Message>>,
) where
    Sk: Sink<F, Error = E> + Unpin,
    F: WsFrame,
    Error: From<E>,
{
    loop {
        if config_rx.changed().await.is_err() {
            return;
        }
        let message = config_rx.borrow_and_update().clone();
        if writer.write_message(&message, None).await.is_err() {
            debug!("config sender exiting on write error");
            return;
        }
    }
}
