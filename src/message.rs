//! Wire message types exchanged between link peers.
//!
//! A [`Message`] is a tagged union: exactly one of its optional fields is
//! populated, selected by `message_type`. The concrete bytes-on-the-wire
//! encoding lives in [`crate::codec`].

use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The protocol version implemented by this crate.
pub const PROTOCOL_VERSION: u32 = 1;

/// Versions this crate can interoperate with.
pub fn supported_versions() -> Vec<u32> {
    vec![PROTOCOL_VERSION]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Data,
    Topology,
    Heartbeat,
    Alert,
    Shutdown,
    Finished,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Warning,
    FatalError,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
}

/// A set of channel identifiers a peer wants to receive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub channel: Vec<u32>,
}

/// A reachability path advertised between peers.
///
/// `site` is non-empty for any advertised path: `site[0]` is the
/// destination, `site[last]` is the next hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub metric: u64,
    pub site: Vec<u32>,
}

impl Path {
    /// The destination site of this path.
    ///
    /// Returns `None` if `site` is empty, which should not occur for a
    /// path that has actually been advertised (see the type's invariant).
    pub fn destination(&self) -> Option<u32> {
        self.site.first().copied()
    }

    /// The next hop along this path.
    pub fn next_hop(&self) -> Option<u32> {
        self.site.last().copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub subscription: Vec<Subscription>,
    pub path: Vec<Path>,
}

/// A single framed message exchanged over a link connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub protocol_version: Vec<u32>,
    pub message_type: MessageType,
    /// Heartbeat cadence in milliseconds, when the sender advertises one.
    /// Present on Heartbeat messages and on the opening Topology message.
    /// A value of `0` means "no heartbeat advertised".
    pub heartbeat: u32,
    pub topology: Option<Topology>,
    pub alert: Option<Alert>,
    pub payload: Option<Payload>,
}

impl Message {
    pub fn topology_message(topology: Topology, heartbeat: u32) -> Self {
        Message {
            protocol_version: supported_versions(),
            message_type: MessageType::Topology,
            heartbeat,
            topology: Some(topology),
            alert: None,
            payload: None,
        }
    }

    pub fn heartbeat_message(heartbeat_ms: u32) -> Self {
        Message {
            protocol_version: supported_versions(),
            message_type: MessageType::Heartbeat,
            heartbeat: heartbeat_ms,
            topology: None,
            alert: None,
            payload: None,
        }
    }

    pub fn alert_message(level: AlertLevel, message: impl Into<String>) -> Self {
        Message {
            protocol_version: supported_versions(),
            message_type: MessageType::Alert,
            heartbeat: 0,
            topology: None,
            alert: Some(Alert {
                level,
                message: message.into(),
            }),
            payload: None,
        }
    }

    pub fn payload_message(payload: Payload) -> Self {
        Message {
            protocol_version: supported_versions(),
            message_type: MessageType::Data,
            heartbeat: 0,
            topology: None,
            alert: None,
            payload: Some(payload),
        }
    }

    pub fn shutdown_message() -> Self {
        Message {
            protocol_version: supported_versions(),
            message_type: MessageType::Shutdown,
            heartbeat: 0,
            topology: None,
            alert: None,
            payload: None,
        }
    }

    pub fn finished_message() -> Self {
        Message {
            protocol_version: supported_versions(),
            message_type: MessageType::Finished,
            heartbeat: 0,
            topology: None,
            alert: None,
            payload: None,
        }
    }

    /// The maximum protocol version in common between `self.protocol_version`
    /// and the versions this crate supports, or `None` if there is no
    /// overlap.
    pub fn negotiate_version(&self) -> Option<u32> {
        supported_versions()
            .into_iter()
            .filter(|v| self.protocol_version.contains(v))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_destination_and_next_hop() {
        let p = Path {
            metric: 10,
            site: vec![5, 6, 7],
        };
        assert_eq!(p.destination(), Some(5));
        assert_eq!(p.next_hop(), Some(7));
    }

    #[test]
    fn path_empty_site_has_no_destination() {
        let p = Path {
            metric: 0,
            site: vec![],
        };
        assert_eq!(p.destination(), None);
        assert_eq!(p.next_hop(), None);
    }

    #[test]
    fn negotiate_version_picks_max_common() {
        let mut m = Message::heartbeat_message(0);
        m.protocol_version = vec![1, 2, 3];
        assert_eq!(m.negotiate_version(), Some(1));
    }

    #[test]
    fn negotiate_version_empty_intersection() {
        let mut m = Message::heartbeat_message(0);
        m.protocol_version = vec![0];
        assert_eq!(m.negotiate_version(), None);
    }
}
