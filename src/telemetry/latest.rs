// src/telemetry/latest.rs
// Depth-1 latest-only delivery slot. A full slot is resolved by replacing
// the pending item, never by blocking the producer: freshness beats
// completeness for live frames. This policy is deliberate and must not be
// approximated with a deeper buffer.

use std::sync::Mutex;
use tokio::sync::Notify;

/// Bounded queue of depth one with replace-on-full offers.
pub struct LatestSlot<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> LatestSlot<T> {
    /// Empty slot.
    pub fn new() -> Self {
        LatestSlot {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Offers an item, discarding any undelivered predecessor. Never
    /// blocks and never fails.
    pub fn offer(&self, item: T) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(item);
        self.notify.notify_one();
    }

    /// Waits for the next item. Per-consumer delivery is FIFO at depth 1:
    /// strictly latest-wins, no reordering.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                return item;
            }
            // notify_one stores a permit when no task is waiting, so an
            // offer landing between the take above and this await still
            // wakes us immediately.
            self.notify.notified().await;
        }
    }

    /// Non-blocking take, used when draining on teardown.
    pub fn try_take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
