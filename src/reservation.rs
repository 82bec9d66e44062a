//! NC reservation queue: accumulates slot requests between allocator runs
//! and orders them for [`crate::slot_allocator::SlotAllocator`].
//!
//! Capacity tracks the neighbor table (one pending reservation per known
//! neighbor at most). A second reservation for the same node before the
//! allocator has run merges into the first rather than queuing twice: the
//! shorter hop count wins (closer relay path), packet counts accumulate, and
//! the timestamp refreshes to the most recent sighting.

use crate::slot_allocator::{score, ScoreInput};
use crate::types::{NodeAddress, PriorityClass};

#[derive(Debug, Clone)]
struct Reservation {
    hop_count: u8,
    packet_count: u32,
    timestamp: u32,
    priority: PriorityClass,
    is_self_originated: bool,
}

pub struct ReservationQueue {
    pending: Vec<(NodeAddress, Reservation)>,
    capacity: usize,
}

impl ReservationQueue {
    pub fn new(capacity: usize) -> Self {
        ReservationQueue {
            pending: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Submit or merge a reservation request. Returns `false` if the queue
    /// is full and `node_id` was not already pending.
    pub fn submit(
        &mut self,
        node_id: NodeAddress,
        hop_count: u8,
        packet_count: u32,
        timestamp: u32,
        priority: PriorityClass,
        is_self_originated: bool,
    ) -> bool {
        if let Some((_, existing)) = self.pending.iter_mut().find(|(id, _)| *id == node_id) {
            existing.hop_count = existing.hop_count.min(hop_count);
            existing.packet_count += packet_count;
            existing.timestamp = timestamp;
            existing.priority = existing.priority.min(priority);
            existing.is_self_originated |= is_self_originated;
            return true;
        }
        if self.pending.len() >= self.capacity {
            return false;
        }
        self.pending.push((
            node_id,
            Reservation {
                hop_count,
                packet_count,
                timestamp,
                priority,
                is_self_originated,
            },
        ));
        true
    }

    /// Drop reservations not refreshed within `timeout_secs`.
    pub fn sweep_expired(&mut self, now: u32, timeout_secs: u32) -> Vec<NodeAddress> {
        let mut expired = Vec::new();
        self.pending.retain(|(id, r)| {
            let keep = now.saturating_sub(r.timestamp) <= timeout_secs;
            if !keep {
                expired.push(*id);
            }
            keep
        });
        expired
    }

    /// Drain all pending reservations, sorted ascending by allocator score
    /// (most deserving first), ready to feed the slot allocator in order.
    pub fn drain_sorted_by_score(&mut self) -> Vec<(NodeAddress, i64)> {
        let mut scored: Vec<(NodeAddress, i64)> = self
            .pending
            .drain(..)
            .map(|(id, r)| {
                let s = score(ScoreInput {
                    is_self_originated: r.is_self_originated,
                    hop_count: r.hop_count,
                    packet_count: r.packet_count,
                    timestamp: r.timestamp,
                    priority: r.priority,
                });
                (id, s)
            })
            .collect();
        scored.sort_by_key(|(_, s)| *s);
        scored
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
