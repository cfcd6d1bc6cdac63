// src/logs/hub.rs

//! Per-service log hub: the ring buffer plus the live subscriber set.
//!
//! Ring and subscriber list live behind one mutex so that `subscribe` can
//! atomically hand the new subscriber the current snapshot and register it
//! for live entries. That single critical section is what guarantees a late
//! joiner sees snapshot entries exactly once, in order, with no gap before
//! the first live entry.
//!
//! Delivery uses an unbounded mpsc channel per subscriber: the producing
//! reader task never blocks on a slow consumer, and a dropped receiver just
//! gets its sender removed on the next append.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::logs::ring::LogRing;
use crate::proc::types::LogEntry;

#[derive(Debug)]
pub struct LogHub {
    inner: Mutex<HubInner>,
    next_sub_id: AtomicU64,
}

#[derive(Debug)]
struct HubInner {
    ring: LogRing,
    subscribers: Vec<SubscriberEntry>,
}

#[derive(Debug)]
struct SubscriberEntry {
    id: u64,
    tx: mpsc::UnboundedSender<Arc<LogEntry>>,
}

/// A live log subscription: the receiving end plus enough to unsubscribe.
///
/// Dropping the subscription (or just its receiver) is equivalent to
/// unsubscribing; the hub notices the closed channel on the next append.
#[derive(Debug)]
pub struct LogSubscription {
    pub rx: mpsc::UnboundedReceiver<Arc<LogEntry>>,
    id: u64,
    hub: Arc<LogHub>,
}

impl LogSubscription {
    /// Detach from the hub. Idempotent; safe to call after the producing
    /// instance has already terminated.
    pub fn unsubscribe(&self) {
        self.hub.unsubscribe(self.id);
    }

    pub async fn recv(&mut self) -> Option<Arc<LogEntry>> {
        self.rx.recv().await
    }
}

impl LogHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HubInner {
                ring: LogRing::new(capacity),
                subscribers: Vec::new(),
            }),
            next_sub_id: AtomicU64::new(0),
        })
    }

    /// Append one entry: store it in the ring, then offer it to every live
    /// subscriber. Subscribers whose receiver is gone are removed silently;
    /// a failed delivery never affects other subscribers or the producer.
    pub fn append(&self, entry: Arc<LogEntry>) {
        let mut inner = self.inner.lock().expect("log hub lock poisoned");
        inner.ring.push(entry.clone());
        inner
            .subscribers
            .retain(|sub| sub.tx.send(entry.clone()).is_ok());
    }

    /// Current ring contents, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        let inner = self.inner.lock().expect("log hub lock poisoned");
        inner.ring.snapshot()
    }

    /// Attach a subscriber. It first receives the current ring contents (in
    /// order), then every entry appended after this call; never a duplicate,
    /// never a live entry that predates the snapshot.
    pub fn subscribe(self: &Arc<Self>) -> LogSubscription {
        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().expect("log hub lock poisoned");
        for entry in inner.ring.snapshot() {
            // Cannot fail: we still own the receiver.
            let _ = tx.send(entry);
        }
        inner.subscribers.push(SubscriberEntry { id, tx });
        debug!(sub_id = id, "log subscriber attached");

        LogSubscription {
            rx,
            id,
            hub: Arc::clone(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().expect("log hub lock poisoned");
        inner.subscribers.retain(|sub| sub.id != id);
    }

    /// Clear the ring for a fresh instance. Standing subscribers stay
    /// attached, so a subscription taken out before the first `start` (or
    /// across a restart) keeps delivering.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("log hub lock poisoned");
        inner.ring.clear();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("log hub lock poisoned");
        inner.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
