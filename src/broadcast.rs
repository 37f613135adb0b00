// src/broadcast.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Identifies one subscriber of a [`BroadcastHub`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Fan-out where every subscriber only ever sees the most recent value.
///
/// Each subscriber owns a `watch` cell, so publishing never waits on a slow
/// reader: an unread value is simply overwritten by the next one.
pub struct BroadcastHub<T> {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<SubscriberId, watch::Sender<Option<T>>>>,
}

impl<T: Clone + Send + Sync> BroadcastHub<T> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<SubscriberId, watch::Sender<Option<T>>>> {
        // A panicking publisher cannot leave the map half-updated.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers `value` to every current subscriber; returns how many got it.
    pub fn publish(&self, value: T) -> usize {
        let subscribers = self.registry();
        for tx in subscribers.values() {
            tx.send_replace(Some(value.clone()));
        }
        subscribers.len()
    }

    /// Registers a subscriber. Only values published afterwards are seen.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = watch::channel(None);
        self.registry().insert(id, tx);
        Subscription { id, rx }
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.registry().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }
}

impl<T: Clone + Send + Sync> Default for BroadcastHub<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription<T> {
    id: SubscriberId,
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for a value newer than the last one seen. `None` once unsubscribed.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }

    /// Latest unseen value, if any, without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        if !self.rx.has_changed().unwrap_or(false) {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }
}
