//! Relay hand-off to the peer layer
//!
//! "Relay" is a fire-and-forget enqueue: validation never blocks on
//! network I/O and never fails because the peer layer is gone.

use tokio::sync::mpsc;
use vireo_core::Hash256;

/// Inventory item announced to peers, addressed by content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inventory {
    /// MNANNOUNCE
    Broadcast(Hash256),
    /// MNPING
    Ping(Hash256),
}

/// Outbound queue to the peer layer
pub struct RelayQueue {
    tx: mpsc::UnboundedSender<Inventory>,
}

impl RelayQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Inventory>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RelayQueue { tx }, rx)
    }

    /// Enqueue for relay; a closed receiver is ignored
    pub fn enqueue(&self, inv: Inventory) {
        let _ = self.tx.send(inv);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_delivers() {
        let (queue, mut rx) = RelayQueue::new();
        let hash = Hash256::digest(b"mnb");
        queue.enqueue(Inventory::Broadcast(hash));
        assert_eq!(rx.try_recv().unwrap(), Inventory::Broadcast(hash));
    }

    #[test]
    fn test_enqueue_survives_closed_receiver() {
        let (queue, rx) = RelayQueue::new();
        drop(rx);
        queue.enqueue(Inventory::Ping(Hash256::ZERO));
    }
}
