//! The link protocol engine: a logical bundle of one or more transport
//! connections to a peer set.
//!
//! [`Link`] owns the shared state described in the data model -- the
//! current topology message, the lifecycle flag, the fan-in/fan-out payload
//! queues, and the user-installed callbacks -- and exposes the handful of
//! operations every usage profile (see [`crate::client`], [`crate::server`])
//! builds on: [`Link::set_subscription`], [`Link::set_path`],
//! [`Link::send`], [`Link::receive`], [`Link::finish`], [`Link::shutdown`],
//! [`Link::close`], and [`Link::handle_connection`].

mod config_sender;
mod handshake;
mod heartbeat;
mod reader;
mod readers;
mod sender;
mod state;

use crate::config::{build_config_message, ConfigChannel};
use crate::error::{Error, Result};
use crate::message::{Alert, Message, Path, Subscription};
use crate::payload::Payload;
use crate::transport::{ConnectionId, TransportReader, TransportWriter, WsFrame};
use futures_util::{Sink, Stream};
use readers::ReaderRegistry;
use state::{Lifecycle, LinkState};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;

/// Default buffer depth of the inbound payload queue, matching the
/// original protocol engine's fixed 100-payload buffer.
const DEFAULT_RECV_CAPACITY: usize = 100;

type TopologyFn = Box<dyn Fn(ConnectionId, Option<crate::message::Topology>) + Send + Sync>;
type AlertFn = Box<dyn Fn(ConnectionId, Alert) + Send + Sync>;

pub(crate) struct LinkShared {
    pub(crate) state: Mutex<LinkState>,
    pub(crate) config: ConfigChannel,
    pub(crate) send_tx: async_channel::Sender<Payload>,
    pub(crate) send_rx: async_channel::Receiver<Payload>,
    pub(crate) readers: ReaderRegistry,
    closed_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    pub(crate) topology_fn: TopologyFn,
    pub(crate) alert_fn: AlertFn,
    next_conn_id: AtomicU64,
}

/// A bidirectional, multi-connection link to a peer set.
///
/// Construct one with [`LinkBuilder`], hand connections to it via
/// [`Link::handle_connection`] as they're dialed or accepted, and drive its
/// [`Link::receive`] stream and [`Link::send`] queue from the owner.
pub struct Link {
    shared: Arc<LinkShared>,
    recv_rx: Mutex<Option<mpsc::Receiver<Payload>>>,
}

/// Builds a [`Link`] with the desired heartbeat cadence and control-plane
/// callbacks, in place of the original's constructor-plus-public-field
/// idiom.
pub struct LinkBuilder {
    heartbeat_ms: u32,
    recv_capacity: usize,
    topology_fn: TopologyFn,
    alert_fn: AlertFn,
}

impl Default for LinkBuilder {
    fn default() -> Self {
        LinkBuilder {
            heartbeat_ms: 0,
            recv_capacity: DEFAULT_RECV_CAPACITY,
            topology_fn: Box::new(|_, _| {}),
            alert_fn: Box::new(|_, _| {}),
        }
    }
}

impl LinkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the heartbeat cadence this link advertises to peers. `0` means
    /// no heartbeat is advertised (and no heartbeat sender is spawned per
    /// connection).
    pub fn heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_ms = interval.as_millis().min(u32::MAX as u128) as u32;
        self
    }

    /// Sets the inbound payload queue's buffer depth.
    pub fn recv_capacity(mut self, capacity: usize) -> Self {
        self.recv_capacity = capacity;
        self
    }

    /// Installs the callback invoked with every Topology message received
    /// on any connection, and with `None` when a connection's reader exits.
    ///
    /// Called synchronously from the connection's reader task: a callback
    /// that blocks stalls that connection's inbound processing.
    pub fn topology_fn(
        mut self,
        f: impl Fn(ConnectionId, Option<crate::message::Topology>) + Send + Sync + 'static,
    ) -> Self {
        self.topology_fn = Box::new(f);
        self
    }

    /// Installs the callback invoked with every non-fatal Alert received on
    /// any connection. Fatal alerts terminate the connection instead of
    /// reaching this callback.
    pub fn alert_fn(mut self, f: impl Fn(ConnectionId, Alert) + Send + Sync + 'static) -> Self {
        self.alert_fn = Box::new(f);
        self
    }

    pub fn build(self) -> Arc<Link> {
        let config_message = build_config_message(&[], &[], self.heartbeat_ms);
        let (send_tx, send_rx) = async_channel::bounded(0);
        let (recv_tx, recv_rx) = mpsc::channel(self.recv_capacity);
        let (closed_tx, _) = watch::channel(false);
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(LinkShared {
            state: Mutex::new(LinkState::new(self.heartbeat_ms)),
            config: ConfigChannel::new(config_message),
            send_tx,
            send_rx,
            readers: ReaderRegistry::new(recv_tx),
            closed_tx,
            shutdown_tx,
            topology_fn: self.topology_fn,
            alert_fn: self.alert_fn,
            next_conn_id: AtomicU64::new(0),
        });

        let closer_shared = shared.clone();
        tokio::spawn(async move {
            closer_shared.readers.close_when_drained().await;
        });

        Arc::new(Link {
            shared,
            recv_rx: Mutex::new(Some(recv_rx)),
        })
    }
}

impl Link {
    /// Atomically replaces the subscription list advertised to peers and
    /// wakes every connection's config sender.
    pub fn set_subscription(&self, subs: Vec<Subscription>) {
        let mut state = self.shared.state.lock().unwrap();
        state.subscriptions = subs;
        let message = build_config_message(&state.subscriptions, &state.paths, state.heartbeat_ms);
        drop(state);
        self.shared.config.publish(message);
    }

    /// Atomically replaces the path list advertised to peers and wakes
    /// every connection's config sender.
    pub fn set_path(&self, paths: Vec<Path>) {
        let mut state = self.shared.state.lock().unwrap();
        state.paths = paths;
        let message = build_config_message(&state.subscriptions, &state.paths, state.heartbeat_ms);
        drop(state);
        self.shared.config.publish(message);
    }

    /// The single fan-in stream of inbound payloads. Closes after every
    /// connection reader has exited.
    ///
    /// # Panics
    /// Panics if called more than once: the inbound queue has a single
    /// consumer, matching the original protocol engine's single receive
    /// channel.
    pub fn receive(&self) -> ReceiverStream<Payload> {
        let rx = self
            .recv_rx
            .lock()
            .unwrap()
            .take()
            .expect("Link::receive() called more than once");
        ReceiverStream::new(rx)
    }

    /// Enqueues `payload` on the shared outbound queue, to be written by
    /// whichever connection's sender is next available. Blocks while no
    /// connection sender is ready to consume it.
    ///
    /// A pending local `shutdown` does not reject this: the outbound queue
    /// stays open and every connection's sender keeps draining it in
    /// `ShuttingDown` until `finish` closes the queue for real.
    pub async fn send(&self, payload: Payload) -> Result<()> {
        {
            let state = self.shared.state.lock().unwrap();
            match state.lifecycle {
                Lifecycle::Closed => return Err(Error::LinkClosed),
                Lifecycle::Finished => return Err(Error::LinkFinished),
                Lifecycle::Active | Lifecycle::Shutdown => {}
            }
        }
        // `Close` never closes the outbound queue (only `Finish` does, so a
        // racing `Send` is reported precisely as `LinkFinished`), so a
        // `Send` already parked waiting for a consumer when `Close` happens
        // would otherwise hang forever; race it against the `closed`
        // broadcast to preempt that wait the way every connection sender
        // already does.
        let mut closed_rx = self.shared.closed_tx.subscribe();
        if *closed_rx.borrow() {
            return Err(Error::LinkClosed);
        }
        tokio::select! {
            result = self.shared.send_tx.send(payload) => {
                result.map_err(|_| self.lifecycle_error().unwrap_or(Error::LinkClosed))
            }
            _ = closed_rx.changed() => Err(Error::LinkClosed),
        }
    }

    /// Transitions to `finished`: the local side will send no more
    /// payloads. Closes the outbound queue so every connection sender
    /// drains it, emits a `Finished` message, and becomes read-only.
    ///
    /// A concurrent [`Link::send`] that loses the race against this call is
    /// reported as [`Error::LinkFinished`].
    pub fn finish(&self) -> Result<()> {
        self.transition(Lifecycle::Finished, |_shared| {})
    }

    /// Transitions to `shutdown`: asks every connected peer to stop
    /// sending, while the local side keeps accepting outbound payloads
    /// until [`Link::finish`] or [`Link::close`] follows.
    pub fn shutdown(&self) -> Result<()> {
        let shared = self.shared.clone();
        self.transition(Lifecycle::Shutdown, move |_| {
            let _ = shared.shutdown_tx.send(true);
        })
    }

    /// Transitions to `closed`: every connection tears down immediately
    /// without draining the outbound queue. Terminal; reachable from any
    /// prior lifecycle state.
    pub fn close(&self) -> Result<()> {
        let shared = self.shared.clone();
        self.transition(Lifecycle::Closed, move |_| {
            let _ = shared.closed_tx.send(true);
        })
    }

    /// Runs the per-connection protocol over a newly dialed or accepted
    /// connection until it terminates, returning the connection's terminal
    /// error (or `Ok(())` for a clean `Finished` exchange).
    ///
    /// Fails immediately -- after writing a fatal Alert describing why --
    /// if the link is no longer `active`.
    pub async fn handle_connection<St, F1, E1, Sk, F2, E2>(
        &self,
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
        if let Some(err) = self.lifecycle_error() {
            tracing::warn!(cause = %err, "rejecting connection: link is no longer active");
            let _ = writer
                .write_message(&Message::alert_message(crate::message::AlertLevel::FatalError, err.to_string()), None)
                .await;
            writer.close().await;
            return Err(err);
        }

        let conn_id = ConnectionId(self.shared.next_conn_id.fetch_add(1, Ordering::Relaxed));
        handshake::run_connection(self.shared.clone(), conn_id, reader, writer).await
    }

    fn lifecycle_error(&self) -> Option<Error> {
        self.shared.state.lock().unwrap().lifecycle.as_error()
    }

    /// Shared logic for the three lifecycle transitions: `Close` always
    /// wins from any non-terminal state (it is the universal override);
    /// `Finish`/`Shutdown` only succeed from `Active`, matching the
    /// original protocol's two divergent (not composable with each other)
    /// paths out of `active`. See DESIGN.md for why this departs from the
    /// original Go source's unconditional overwrite.
    fn transition(&self, target: Lifecycle, on_success: impl FnOnce(&Arc<LinkShared>)) -> Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            let allowed = match (state.lifecycle, target) {
                (Lifecycle::Active, _) => true,
                (Lifecycle::Shutdown, Lifecycle::Closed) => true,
                _ => false,
            };
            if !allowed {
                return Err(state.lifecycle.as_error().expect("non-active lifecycle always has an error"));
            }
            state.lifecycle = target;
        }
        info!(?target, "link lifecycle transition");
        on_success(&self.shared);
        if target == Lifecycle::Finished {
            self.shared.send_tx.close();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_blocks_until_a_connection_sender_consumes_it() {
        let link = LinkBuilder::new().build();

        let mut send_task = tokio_test::task::spawn(link.send(Payload::new(1, vec![1])));
        tokio_test::assert_pending!(send_task.poll());

        // Stand in for a connection sender: take the rendezvous directly
        // off the shared queue, the same way `link::sender::run_sender`
        // does.
        let taken = link.shared.send_rx.recv().await.unwrap();
        assert_eq!(taken.channel, 1);
        tokio_test::assert_ready_ok!(send_task.poll());
    }

    #[tokio::test]
    async fn send_after_close_is_rejected_even_while_parked() {
        let link = LinkBuilder::new().build();

        let mut send_task = tokio_test::task::spawn(link.send(Payload::new(1, vec![1])));
        tokio_test::assert_pending!(send_task.poll());

        link.close().unwrap();

        let result = send_task.await;
        assert!(matches!(result, Err(Error::LinkClosed)));
    }

    #[test]
    fn set_subscription_replaces_config_message_defensively() {
        let link = LinkBuilder::new().build();
        link.set_subscription(vec![Subscription { channel: vec![1, 2] }]);

        let current = link.shared.config.current();
        assert_eq!(
            current.topology.as_ref().unwrap().subscription[0].channel,
            vec![1, 2]
        );
    }

    #[test]
    fn repeated_finish_returns_the_same_lifecycle_error() {
        let link = LinkBuilder::new().build();
        link.finish().unwrap();
        assert!(matches!(link.finish(), Err(Error::LinkFinished)));
        assert!(matches!(link.shutdown(), Err(Error::LinkFinished)));
    }

    #[test]
    fn shutdown_then_close_is_allowed() {
        let link = LinkBuilder::new().build();
        link.shutdown().unwrap();
        link.close().unwrap();
    }

    #[tokio::test]
    async fn send_still_enqueues_after_shutdown_until_finish() {
        let link = LinkBuilder::new().build();
        link.shutdown().unwrap();

        let mut send_task = tokio_test::task::spawn(link.send(Payload::new(1, vec![9])));
        tokio_test::assert_pending!(send_task.poll());

        let taken = link.shared.send_rx.recv().await.unwrap();
        assert_eq!(taken.channel, 1);
        tokio_test::assert_ready_ok!(send_task.poll());

        link.finish().unwrap();
        assert!(matches!(
            link.send(Payload::new(1, vec![9])).await,
            Err(Error::LinkFinished)
        ));
    }
}
