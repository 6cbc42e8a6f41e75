//! Tick-driven, lossy message transport.
//!
//! A receiver drains everything buffered since its previous tick and keeps only what it needs,
//! usually the most recent message of one type. Intermediate samples are dropped on purpose:
//! both loops re-publish their full state every tick, so the next tick corrects any loss.

pub mod local;
#[cfg(feature = "dora")]
pub mod dora;

pub use local::*;
#[cfg(feature = "dora")]
pub use dora::*;

use crate::error::ChannelError;
use crate::types::MessageEnvelope;
use tracing::warn;

pub trait MessageChannel {
    fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), ChannelError>;

    /// Raw payloads received since the previous call, per-sender order preserved.
    fn drain_raw(&mut self) -> Vec<Vec<u8>>;

    /// Decoded messages received since the previous call. Payloads that do not parse are
    /// logged and dropped.
    fn drain(&mut self) -> Vec<MessageEnvelope> {
        self.drain_raw()
            .into_iter()
            .filter_map(|bytes| match MessageEnvelope::decode(&bytes) {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    warn!("Dropping message ({} bytes): {}", bytes.len(), e);
                    None
                }
            })
            .collect()
    }
}

/// Single-slot mailbox overwritten by every newer value. Holds at most one item between ticks.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Option<T>,
    overwritten: u64,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: None,
            overwritten: 0,
        }
    }

    pub fn put(&mut self, value: T) {
        if self.slot.replace(value).is_some() {
            self.overwritten += 1;
        }
    }

    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }

    /// Number of values replaced before anyone took them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains `channel` and returns the newest message of type `kind`, if any arrived.
pub fn drain_latest<C: MessageChannel + ?Sized>(channel: &mut C, kind: &str) -> Option<MessageEnvelope> {
    let mut mailbox = Mailbox::new();
    for envelope in channel.drain() {
        if envelope.kind == kind {
            mailbox.put(envelope);
        }
    }
    mailbox.take()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_keeps_last() {
        let mut mailbox = Mailbox::new();
        mailbox.put(1);
        mailbox.put(2);
        mailbox.put(3);
        assert_eq!(mailbox.overwritten(), 2);
        assert_eq!(mailbox.take(), Some(3));
        assert_eq!(mailbox.take(), None);
    }

    #[test]
    fn test_drain_latest_filters_type_and_skips_garbage() {
        let bus = LocalBus::new();
        let mut sender = bus.endpoint();
        let mut receiver = bus.endpoint();

        for value in [1, 2] {
            let msg = MessageEnvelope::new("a", "state", &value).unwrap();
            sender.send(&msg).unwrap();
        }
        sender
            .send(&MessageEnvelope::new("a", "save_image", &0).unwrap())
            .unwrap();
        sender.send_raw(b"not json".to_vec());

        let latest = drain_latest(&mut receiver, "state").unwrap();
        assert_eq!(latest.data, serde_json::json!(2));
        assert!(drain_latest(&mut receiver, "state").is_none());
    }
}
