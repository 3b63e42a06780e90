use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use crate::Message;

/// A connected peer as seen by the service-node subsystem.
///
/// The subsystem never owns sockets; the network layer hands it peers
/// implementing this trait. Fulfillment flags stop a peer from being asked
/// for the same bulk data twice, and misbehavior scores feed the network
/// layer's ban logic.
pub trait Peer: Send + Sync {
    fn id(&self) -> u64;

    /// Peer's advertised protocol version.
    fn version(&self) -> u32;

    fn send(&self, message: Message);

    /// True once this peer has served (or been served) the named bulk
    /// request in the current session.
    fn has_fulfilled(&self, request: &str) -> bool;

    fn set_fulfilled(&self, request: &str);

    fn clear_fulfilled(&self, request: &str);

    /// Report misbehavior; higher scores mean faster banning upstream.
    fn misbehaving(&self, score: u32);
}

/// In-process [`Peer`] that queues outbound messages for the caller to
/// drain. Backs the dev network and the tests.
pub struct QueuedPeer {
    id: u64,
    version: u32,
    outbox: Mutex<Vec<Message>>,
    fulfilled: Mutex<HashSet<String>>,
    misbehavior: Mutex<u32>,
}

impl QueuedPeer {
    pub fn new(id: u64, version: u32) -> Self {
        QueuedPeer {
            id,
            version,
            outbox: Mutex::new(Vec::new()),
            fulfilled: Mutex::new(HashSet::new()),
            misbehavior: Mutex::new(0),
        }
    }

    /// Take everything queued for this peer.
    pub fn drain(&self) -> Vec<Message> {
        std::mem::take(&mut self.outbox.lock().unwrap())
    }

    pub fn queued(&self) -> usize {
        self.outbox.lock().unwrap().len()
    }

    pub fn misbehavior_score(&self) -> u32 {
        *self.misbehavior.lock().unwrap()
    }
}

impl Peer for QueuedPeer {
    fn id(&self) -> u64 {
        self.id
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn send(&self, message: Message) {
        self.outbox.lock().unwrap().push(message);
    }

    fn has_fulfilled(&self, request: &str) -> bool {
        self.fulfilled.lock().unwrap().contains(request)
    }

    fn set_fulfilled(&self, request: &str) {
        self.fulfilled.lock().unwrap().insert(request.to_owned());
    }

    fn clear_fulfilled(&self, request: &str) {
        self.fulfilled.lock().unwrap().remove(request);
    }

    fn misbehaving(&self, score: u32) {
        let mut total = self.misbehavior.lock().unwrap();
        *total += score;
        debug!(peer = self.id, score, total = *total, "peer misbehaving");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_queues_and_drains() {
        let peer = QueuedPeer::new(1, 70_912);
        peer.send(Message::SporkRequest);
        peer.send(Message::ListRequest(None));
        assert_eq!(peer.queued(), 2);
        let drained = peer.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(peer.queued(), 0);
    }

    #[test]
    fn fulfillment_flags() {
        let peer = QueuedPeer::new(2, 70_912);
        assert!(!peer.has_fulfilled("node-list"));
        peer.set_fulfilled("node-list");
        assert!(peer.has_fulfilled("node-list"));
        peer.clear_fulfilled("node-list");
        assert!(!peer.has_fulfilled("node-list"));
    }

    #[test]
    fn misbehavior_accumulates() {
        let peer = QueuedPeer::new(3, 70_912);
        peer.misbehaving(20);
        peer.misbehaving(33);
        assert_eq!(peer.misbehavior_score(), 53);
    }
}
