//! Request correlation: a monotonic `request_id` generator paired with a
//! map of pending one-shot reply slots.
//!
//! A pending-requests map keyed by request id, each entry a per-request
//! one-shot reply slot, is the natural shape once a caller can have more
//! than one RPC outstanding at a time — the caller's RPC helper handles
//! enqueue, wait, and timeout in one place, replacing the alternative of a
//! single global counter with ad hoc matching at each call site. A request
//! is one-shot: [`RequestCorrelator::register`] reserves a
//! slot, the caller sends its request and then calls
//! [`RequestCorrelator::wait`]; whichever worker thread drains the
//! corresponding inbound channel calls [`RequestCorrelator::complete`] for
//! matching responses and discards the rest as stale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

struct Slot<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

pub struct RequestCorrelator<T> {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Arc<Slot<T>>>>,
}

impl<T> Default for RequestCorrelator<T> {
    fn default() -> Self {
        RequestCorrelator {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> RequestCorrelator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, linearizable `request_id`.
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Reserve a reply slot for `request_id`. Must be called before the
    /// outbound request is sent, to avoid a race with an immediate reply.
    pub fn register(&self, request_id: u64) {
        let slot = Arc::new(Slot {
            value: Mutex::new(None),
            ready: Condvar::new(),
        });
        self.pending
            .lock()
            .expect("lock poisoned")
            .insert(request_id, slot);
    }

    /// Block the caller until `complete` is called for `request_id` or
    /// `timeout` elapses. Removes the slot from the pending map either way.
    pub fn wait(&self, request_id: u64, timeout: Duration) -> Option<T> {
        let slot = {
            let pending = self.pending.lock().expect("lock poisoned");
            pending.get(&request_id).cloned()
        };
        let Some(slot) = slot else {
            return None;
        };

        let mut guard = slot.value.lock().expect("lock poisoned");
        if guard.is_none() {
            let (new_guard, _) = slot
                .ready
                .wait_timeout_while(guard, timeout, |v| v.is_none())
                .expect("lock poisoned");
            guard = new_guard;
        }
        let result = guard.take();
        drop(guard);
        self.pending.lock().expect("lock poisoned").remove(&request_id);
        result
    }

    /// Deliver a response for `request_id`. Returns `true` if a waiter was
    /// found (response routed), `false` if it must be discarded as stale —
    /// the waiter already timed out and deregistered, or this id was never
    /// registered at all.
    pub fn complete(&self, request_id: u64, value: T) -> bool {
        let slot = {
            let pending = self.pending.lock().expect("lock poisoned");
            pending.get(&request_id).cloned()
        };
        match slot {
            Some(slot) => {
                *slot.value.lock().expect("lock poisoned") = Some(value);
                slot.ready.notify_all();
                true
            }
            None => false,
        }
    }
}
