//! Lifecycle state shared by every public [`super::Link`] operation.

use crate::error::Error;
use crate::message::{Path, Subscription};

/// A link's lifecycle is strictly monotone: `Active` is the only state a
/// transition can leave from, and each of the three terminal states is
/// reached by at most one successful transition. A repeated transition call
/// observes the state unchanged and returns the error that state implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Active,
    Closed,
    Shutdown,
    Finished,
}

impl Lifecycle {
    /// The error a caller sees for this state, or `None` while still active.
    pub(crate) fn as_error(self) -> Option<Error> {
        match self {
            Lifecycle::Active => None,
            Lifecycle::Closed => Some(Error::LinkClosed),
            Lifecycle::Shutdown => Some(Error::LinkShutdown),
            Lifecycle::Finished => Some(Error::LinkFinished),
        }
    }
}

/// The mutable configuration a link advertises to peers, guarded by a single
/// mutex alongside the lifecycle flag so `set_subscription`/`set_path` always
/// rebuild the config message from a consistent snapshot.
pub(crate) struct LinkState {
    pub(crate) lifecycle: Lifecycle,
    pub(crate) subscriptions: Vec<Subscription>,
    pub(crate) paths: Vec<Path>,
    pub(crate) heartbeat_ms: u32,
}

impl LinkState {
    pub(crate) fn new(heartbeat_ms: u32) -> Self {
        LinkState {
            lifecycle: Lifecycle::Active,
            subscriptions: Vec::new(),
            paths: Vec::new(),
            heartbeat_ms,
        }
    }
}
