//! Per-key broadcast hub for stream subscribers.
//!
//! Each subscriber owns a bounded mpsc queue. Publishing uses `try_send`
//! and never blocks: a full queue drops the new message, which is safe
//! because every envelope carries the full latest state and a later
//! publish supersedes the dropped one. Messages never cross keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::record::UpdateEnvelope;

pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 32;

pub struct BroadcastHub {
    capacity: usize,
    // key -> subscriber id -> sender
    channels: Mutex<HashMap<String, HashMap<u64, mpsc::Sender<UpdateEnvelope>>>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a subscriber under `key`. The returned subscription
    /// unsubscribes itself when dropped.
    pub fn subscribe(self: &Arc<Self>, key: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(id, tx);
        debug!(key, id, "stream subscriber registered");
        Subscription {
            hub: Arc::clone(self),
            key: key.to_string(),
            id,
            receiver: rx,
        }
    }

    /// Remove one subscriber. The key entry disappears with its last
    /// subscriber, so idle keys hold no hub state.
    pub fn unsubscribe(&self, key: &str, id: u64) {
        let mut channels = self.channels.lock();
        if let Some(subscribers) = channels.get_mut(key) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                channels.remove(key);
            }
        }
        debug!(key, id, "stream subscriber removed");
    }

    /// Deliver `envelope` to every subscriber of `key`. Non-blocking; full
    /// or closed queues are skipped.
    pub fn publish(&self, key: &str, envelope: &UpdateEnvelope) {
        let channels = self.channels.lock();
        let Some(subscribers) = channels.get(key) else {
            return;
        };
        for (id, tx) in subscribers {
            match tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(key, id, "subscriber queue full, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    trace!(key, id, "subscriber gone, dropping update");
                }
            }
        }
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.channels.lock().get(key).map_or(0, HashMap::len)
    }
}

/// A live stream subscription. Dropping it deregisters the subscriber.
pub struct Subscription {
    hub: Arc<BroadcastHub>,
    key: String,
    id: u64,
    receiver: mpsc::Receiver<UpdateEnvelope>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<UpdateEnvelope> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UpdateEnvelope> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.key, self.id);
    }
}
