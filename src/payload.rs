//! The data payload model and loss accounting.

use serde::{Deserialize, Serialize};

/// Bytes/payload counters used to track loss across link hops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossCounter {
    pub bytes: u64,
    pub payloads: u64,
}

/// A single channel-routed data payload.
///
/// `link_loss` counts `{bytes, payloads}` dropped on the *current* link hop.
/// `path_loss` accumulates losses absorbed from prior hops. `path_loss` only
/// grows by absorbing `link_loss` at hop boundaries (see [`Payload::record_link_loss`]);
/// `link_loss` only grows by discards on the current link (see
/// [`Payload::record_discard`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub channel: u32,
    pub data: Vec<u8>,
    pub link_loss: Option<LossCounter>,
    pub path_loss: Option<LossCounter>,
}

impl Payload {
    pub fn new(channel: u32, data: Vec<u8>) -> Self {
        Payload {
            channel,
            data,
            link_loss: None,
            path_loss: None,
        }
    }

    /// Records the discarding of `discarded` on the current link hop.
    pub fn record_discard(&mut self, discarded: &Payload) {
        match &mut self.link_loss {
            Some(loss) => {
                loss.bytes += discarded.data.len() as u64;
                loss.payloads += 1;
            }
            None => {
                self.link_loss = Some(LossCounter {
                    bytes: discarded.data.len() as u64,
                    payloads: 1,
                });
            }
        }
    }

    /// Folds `link_loss` into `path_loss` and resets `link_loss`, as the
    /// payload crosses a hop boundary.
    pub fn record_link_loss(&mut self) {
        let Some(link_loss) = self.link_loss.take() else {
            return;
        };
        match &mut self.path_loss {
            Some(path_loss) => {
                path_loss.bytes += link_loss.bytes;
                path_loss.payloads += link_loss.payloads;
            }
            None => {
                self.path_loss = Some(link_loss);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_discard_allocates_on_first_loss() {
        let mut p = Payload::new(1, vec![]);
        let discarded = Payload::new(1, vec![1, 2, 3, 4]);
        p.record_discard(&discarded);
        assert_eq!(
            p.link_loss,
            Some(LossCounter {
                bytes: 4,
                payloads: 1
            })
        );
    }

    #[test]
    fn record_discard_accumulates() {
        let mut p = Payload::new(1, vec![]);
        p.record_discard(&Payload::new(1, vec![1, 2]));
        p.record_discard(&Payload::new(1, vec![1, 2, 3]));
        assert_eq!(
            p.link_loss,
            Some(LossCounter {
                bytes: 5,
                payloads: 2
            })
        );
    }

    #[test]
    fn record_link_loss_moves_into_empty_path_loss() {
        let mut p = Payload::new(1, vec![]);
        p.record_discard(&Payload::new(1, vec![1, 2, 3]));
        p.record_link_loss();
        assert_eq!(p.link_loss, None);
        assert_eq!(
            p.path_loss,
            Some(LossCounter {
                bytes: 3,
                payloads: 1
            })
        );
    }

    #[test]
    fn record_link_loss_is_noop_without_link_loss() {
        let mut p = Payload::new(1, vec![]);
        p.record_link_loss();
        assert_eq!(p.link_loss, None);
        assert_eq!(p.path_loss, None);
    }

    #[test]
    fn loss_then_discard_then_loss_matches_invariant() {
        // record_link_loss, record_discard(d), record_link_loss leaves
        // link_loss == 0 and path_loss.payloads == 1 + prior.
        let mut p = Payload::new(1, vec![]);
        p.record_discard(&Payload::new(1, vec![1, 2, 3, 4, 5]));
        p.record_link_loss();
        let prior_payloads = p.path_loss.unwrap().payloads;

        p.record_discard(&Payload::new(1, vec![9, 9]));
        p.record_link_loss();

        assert_eq!(p.link_loss, None);
        assert_eq!(p.path_loss.unwrap().payloads, 1 + prior_payloads);
    }
}
