//! Tracks active connection readers so the inbound payload queue closes
//! exactly once, the first time the reader count returns to zero after at
//! least one reader has registered -- mirroring the original protocol's
//! single `sync.WaitGroup.Wait()` call, which is likewise a one-shot wait
//! rather than something re-armed across a connection's whole lifetime.

use crate::payload::Payload;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;

pub(crate) struct ReaderRegistry {
    inner: Mutex<Inner>,
    notify: Notify,
}

struct Inner {
    count: usize,
    ever_registered: bool,
    recv_tx: Option<mpsc::Sender<Payload>>,
}

impl ReaderRegistry {
    pub(crate) fn new(recv_tx: mpsc::Sender<Payload>) -> Self {
        ReaderRegistry {
            inner: Mutex::new(Inner {
                count: 0,
                ever_registered: false,
                recv_tx: Some(recv_tx),
            }),
            notify: Notify::new(),
        }
    }

    /// Registers a new reader and hands back its sender clone. Returns
    /// `None` if the inbound queue has already drained and closed -- only
    /// possible if a new connection races `handle_connection`'s own active
    /// check against every prior reader having already exited.
    pub(crate) fn register(&self) -> Option<mpsc::Sender<Payload>> {
        let mut inner = self.inner.lock().unwrap();
        let tx = inner.recv_tx.clone()?;
        inner.count += 1;
        inner.ever_registered = true;
        Some(tx)
    }

    pub(crate) fn unregister(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.count -= 1;
        drop(inner);
        self.notify.notify_one();
    }

    /// Closes the inbound queue once at least one reader has registered and
    /// the count has drained back to zero. Spawned once, unconditionally,
    /// when the link is built -- not gated on any lifecycle transition, so
    /// `Receive` closes purely from every reader having exited, per the
    /// protocol's own wording. A no-op if the queue is already closed.
    pub(crate) async fn close_when_drained(&self) {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if inner.ever_registered && inner.count == 0 {
                    inner.recv_tx.take();
                    return;
                }
            }
            notified.await;
        }
    }
}
