//! Topology message construction and the edge-triggered broadcast that
//! notifies per-connection config senders of a new snapshot.
//!
//! The original protocol engine rebuilds the whole config message on every
//! `SetSubscription`/`SetPath`/heartbeat change and closes-and-replaces a
//! signal channel so waiters wake exactly once per generation, coalescing
//! any updates they missed. `tokio::sync::watch` already has this
//! coalescing behavior built in: a receiver that calls `changed().await`
//! after missing several `send()`s still only wakes once, and `borrow()`
//! always returns the latest value. So the watch channel itself doubles as
//! both the data store and the edge trigger.

use crate::message::{Message, Path, Subscription, Topology};
use std::sync::Arc;
use tokio::sync::watch;

/// Builds the topology message advertised to peers, given the current
/// subscription list, path list, and heartbeat cadence.
///
/// `subs` and `paths` are copied into the new message so callers may reuse
/// their `Vec`s afterward.
pub(crate) fn build_config_message(
    subs: &[Subscription],
    paths: &[Path],
    heartbeat_ms: u32,
) -> Message {
    Message::topology_message(
        Topology {
            subscription: subs.to_vec(),
            path: paths.to_vec(),
        },
        heartbeat_ms,
    )
}

/// A broadcast channel carrying the link's current config message.
///
/// Cloning a [`ConfigChannel`] clones the receiving side; every clone
/// observes the same edge-triggered stream of snapshots.
#[derive(Clone)]
pub(crate) struct ConfigChannel {
    tx: Arc<watch::Sender<Arc<Message>>>,
    rx: watch::Receiver<Arc<Message>>,
}

impl ConfigChannel {
    pub(crate) fn new(initial: Message) -> Self {
        let (tx, rx) = watch::channel(Arc::new(initial));
        ConfigChannel {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Publishes a new config message, waking every connection's config
    /// sender.
    pub(crate) fn publish(&self, message: Message) {
        // `send` always succeeds here: `self.tx` keeps at least one
        // receiver (`self.rx`) alive for the channel's lifetime.
        let _ = self.tx.send(Arc::new(message));
    }

    /// The current snapshot, without waiting for a change.
    pub(crate) fn current(&self) -> Arc<Message> {
        self.rx.borrow().clone()
    }

    /// A fresh receiver positioned at the current snapshot. Per-connection
    /// config senders each get their own, since `changed()` is
    /// per-receiver.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Message>> {
        self.rx.clone()
    }
}
