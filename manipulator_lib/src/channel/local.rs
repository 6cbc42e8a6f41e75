use super::MessageChannel;
use crate::error::ChannelError;
use crate::types::MessageEnvelope;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-process broadcast bus. Every endpoint receives what the others send, never its own
/// messages, in per-sender FIFO order.
#[derive(Clone, Default)]
pub struct LocalBus {
    subscribers: Arc<Mutex<Vec<(usize, flume::Sender<Vec<u8>>)>>>,
    next_id: Arc<AtomicUsize>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(&self) -> LocalEndpoint {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = flume::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, tx));

        LocalEndpoint {
            id,
            bus: self.clone(),
            inbox: rx,
        }
    }

    fn broadcast(&self, from: usize, bytes: Vec<u8>) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Endpoints that were dropped disconnect their queue.
        subscribers.retain(|(id, tx)| *id == from || tx.send(bytes.clone()).is_ok());
    }
}

pub struct LocalEndpoint {
    id: usize,
    bus: LocalBus,
    inbox: flume::Receiver<Vec<u8>>,
}

impl LocalEndpoint {
    /// Publishes an already-encoded payload.
    pub fn send_raw(&mut self, bytes: Vec<u8>) {
        self.bus.broadcast(self.id, bytes);
    }
}

impl MessageChannel for LocalEndpoint {
    fn send(&mut self, envelope: &MessageEnvelope) -> Result<(), ChannelError> {
        let bytes = envelope.encode()?;
        self.send_raw(bytes);
        Ok(())
    }

    fn drain_raw(&mut self) -> Vec<Vec<u8>> {
        self.inbox.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(source: &str, n: i32) -> MessageEnvelope {
        MessageEnvelope::new(source, "n", &n).unwrap()
    }

    #[test]
    fn test_sender_does_not_hear_itself() {
        let bus = LocalBus::new();
        let mut a = bus.endpoint();
        let mut b = bus.endpoint();

        a.send(&msg("a", 1)).unwrap();
        assert!(a.drain().is_empty());
        assert_eq!(b.drain().len(), 1);
    }

    #[test]
    fn test_per_sender_order_and_fan_out() {
        let bus = LocalBus::new();
        let mut a = bus.endpoint();
        let mut b = bus.endpoint();
        let mut c = bus.endpoint();

        for n in 0..3 {
            a.send(&msg("a", n)).unwrap();
        }
        b.send(&msg("b", 10)).unwrap();

        let at_c: Vec<_> = c
            .drain()
            .into_iter()
            .filter(|m| m.source == "a")
            .map(|m| m.data)
            .collect();
        assert_eq!(at_c, vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(2)]);

        let at_b = b.drain();
        assert_eq!(at_b.len(), 3);
    }

    #[test]
    fn test_drain_empties_buffer() {
        let bus = LocalBus::new();
        let mut a = bus.endpoint();
        let mut b = bus.endpoint();
        a.send(&msg("a", 1)).unwrap();
        assert_eq!(b.drain_raw().len(), 1);
        assert!(b.drain_raw().is_empty());
    }

    #[test]
    fn test_dropped_endpoint_is_pruned() {
        let bus = LocalBus::new();
        let mut a = bus.endpoint();
        {
            let _b = bus.endpoint();
        }
        a.send(&msg("a", 1)).unwrap();
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }
}
