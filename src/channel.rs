//! Bounded, fixed-capacity message channel with timed send/receive.
//!
//! A single-producer/multi-consumer ring of `LayerMessage` records. There is
//! no off-the-shelf std type with exactly this contract (timed send *and*
//! timed receive, with overflow/enqueue/dequeue counters visible to a stats
//! reporter), so it is built directly on `Mutex` + `Condvar`, the same
//! primitives and waiting style a scheduler thread typically uses for its
//! scheduler thread (`cv().wait_timeout(guard, wait_dur)`).
//!
//! ## Lock ordering
//! A channel's internal mutex is never held while calling into any other
//! module. Callers must not call back into the channel from within a
//! callback invoked while the lock is held (there are none).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Result of a timed `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    TimedOut,
}

/// Result of a timed `receive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    TimedOut,
}

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    enqueue_count: u64,
    dequeue_count: u64,
    overflow_count: u64,
}

/// Fixed-capacity ring of `T`. No dynamic growth: `capacity` is set at
/// construction and never changes.
pub struct BoundedChannel<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> BoundedChannel<T> {
    pub fn new(capacity: usize) -> Self {
        BoundedChannel {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                enqueue_count: 0,
                dequeue_count: 0,
                overflow_count: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Block until a free slot is available or `timeout` elapses.
    /// Increments `overflow_count` on timeout.
    pub fn send(&self, msg: T, timeout: Duration) -> SendOutcome {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock().expect("lock poisoned");
        loop {
            if guard.queue.len() < guard.capacity {
                guard.queue.push_back(msg);
                guard.enqueue_count += 1;
                drop(guard);
                self.not_empty.notify_one();
                return SendOutcome::Sent;
            }
            let now = Instant::now();
            if now >= deadline {
                guard.overflow_count += 1;
                return SendOutcome::TimedOut;
            }
            let (new_guard, result) = self
                .not_full
                .wait_timeout(guard, deadline - now)
                .expect("lock poisoned");
            guard = new_guard;
            if result.timed_out() && guard.queue.len() >= guard.capacity {
                guard.overflow_count += 1;
                return SendOutcome::TimedOut;
            }
        }
    }

    /// Block until a message is present or `timeout` elapses. A timeout is
    /// a normal, recoverable event and is not counted as an overflow.
    pub fn receive(&self, timeout: Duration) -> Result<T, RecvOutcome> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock().expect("lock poisoned");
        loop {
            if let Some(msg) = guard.queue.pop_front() {
                guard.dequeue_count += 1;
                drop(guard);
                self.not_full.notify_one();
                return Ok(msg);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvOutcome::TimedOut);
            }
            let (new_guard, result) = self
                .not_empty
                .wait_timeout(guard, deadline - now)
                .expect("lock poisoned");
            guard = new_guard;
            if result.timed_out() && guard.queue.is_empty() {
                return Err(RecvOutcome::TimedOut);
            }
        }
    }

    /// Non-blocking peek.
    pub fn has_messages(&self) -> bool {
        !self.inner.lock().expect("lock poisoned").queue.is_empty()
    }

    pub fn counters(&self) -> (u64, u64, u64) {
        let guard = self.inner.lock().expect("lock poisoned");
        (guard.enqueue_count, guard.dequeue_count, guard.overflow_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn send_fills_to_capacity_then_times_out() {
        let ch: BoundedChannel<u32> = BoundedChannel::new(2);
        assert_eq!(ch.send(1, Duration::from_millis(10)), SendOutcome::Sent);
        assert_eq!(ch.send(2, Duration::from_millis(10)), SendOutcome::Sent);
        assert_eq!(ch.send(3, Duration::from_millis(10)), SendOutcome::TimedOut);
        let (enq, deq, overflow) = ch.counters();
        assert_eq!((enq, deq, overflow), (2, 0, 1));
    }

    #[test]
    fn receive_is_fifo() {
        let ch: BoundedChannel<u32> = BoundedChannel::new(4);
        ch.send(1, Duration::from_millis(10));
        ch.send(2, Duration::from_millis(10));
        assert_eq!(ch.receive(Duration::from_millis(10)), Ok(1));
        assert_eq!(ch.receive(Duration::from_millis(10)), Ok(2));
    }

    #[test]
    fn receive_on_empty_times_out_without_overflow() {
        let ch: BoundedChannel<u32> = BoundedChannel::new(4);
        assert_eq!(ch.receive(Duration::from_millis(5)), Err(RecvOutcome::TimedOut));
        let (_, _, overflow) = ch.counters();
        assert_eq!(overflow, 0);
    }

    #[test]
    fn blocked_send_is_released_by_concurrent_receive() {
        let ch: Arc<BoundedChannel<u32>> = Arc::new(BoundedChannel::new(1));
        ch.send(1, Duration::from_millis(10));

        let ch2 = Arc::clone(&ch);
        let handle = thread::spawn(move || ch2.send(2, Duration::from_secs(2)));

        thread::sleep(Duration::from_millis(20));
        assert_eq!(ch.receive(Duration::from_millis(10)), Ok(1));

        assert_eq!(handle.join().unwrap(), SendOutcome::Sent);
    }

    #[test]
    fn has_messages_is_non_blocking_peek() {
        let ch: BoundedChannel<u32> = BoundedChannel::new(2);
        assert!(!ch.has_messages());
        ch.send(7, Duration::from_millis(10));
        assert!(ch.has_messages());
    }
}
