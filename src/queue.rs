//! Shared frame queue: the per-priority rings `LinkFrame`s and `AppPacket`s
//! sit in between the priority plane and the OLSR/TDMA/PHY/APP boundaries.
//!
//! Unlike [`crate::channel::BoundedChannel`], nothing here blocks. Enqueue on
//! a full ring drops the newest frame and counts it; dequeue on an empty ring
//! returns `None`. That non-blocking contract is what lets a single worker
//! drain several of these every housekeeping tick without risking a stall on
//! one empty queue starving the others.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::piggyback::NcSlotMessage;
use crate::types::{AppPacket, LinkFrame};

struct Ring<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Ring {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns `true` if enqueued, `false` if dropped for being full.
    fn push(&self, item: T) -> bool {
        let mut guard = self.items.lock().expect("lock poisoned");
        if guard.len() >= self.capacity {
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return false;
        }
        guard.push_back(item);
        true
    }

    fn pop(&self) -> Option<T> {
        self.items.lock().expect("lock poisoned").pop_front()
    }

    fn len(&self) -> usize {
        self.items.lock().expect("lock poisoned").len()
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// One of the four data-plane priority tiers feeding `data_from_l3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTier {
    Tier0,
    Tier1,
    Tier2,
    Tier3,
}

/// Frame-carrying queues shared across the priority plane, NC slot manager
/// and event loop.
pub struct SharedFrameQueues {
    analog_voice: Ring<LinkFrame>,
    data_from_l3: [Ring<LinkFrame>; 4],
    rx: Ring<LinkFrame>,
    rrc_relay: Ring<LinkFrame>,
    nc_slot_queue: Ring<NcSlotMessage>,
    app_to_rrc: Ring<AppPacket>,
    rrc_to_app: Ring<AppPacket>,
}

impl SharedFrameQueues {
    pub fn new(queue_capacity: usize, app_queue_capacity: usize) -> Self {
        SharedFrameQueues {
            analog_voice: Ring::new(queue_capacity),
            data_from_l3: [
                Ring::new(queue_capacity),
                Ring::new(queue_capacity),
                Ring::new(queue_capacity),
                Ring::new(queue_capacity),
            ],
            rx: Ring::new(queue_capacity),
            rrc_relay: Ring::new(queue_capacity),
            nc_slot_queue: Ring::new(queue_capacity),
            app_to_rrc: Ring::new(app_queue_capacity),
            rrc_to_app: Ring::new(app_queue_capacity),
        }
    }

    pub fn push_analog_voice(&self, frame: LinkFrame) -> bool {
        self.analog_voice.push(frame)
    }
    pub fn pop_analog_voice(&self) -> Option<LinkFrame> {
        self.analog_voice.pop()
    }

    pub fn push_data(&self, tier: DataTier, frame: LinkFrame) -> bool {
        self.data_from_l3[tier_index(tier)].push(frame)
    }
    pub fn pop_data(&self, tier: DataTier) -> Option<LinkFrame> {
        self.data_from_l3[tier_index(tier)].pop()
    }

    pub fn push_rx(&self, frame: LinkFrame) -> bool {
        self.rx.push(frame)
    }
    pub fn pop_rx(&self) -> Option<LinkFrame> {
        self.rx.pop()
    }

    pub fn push_rrc_relay(&self, frame: LinkFrame) -> bool {
        self.rrc_relay.push(frame)
    }
    pub fn pop_rrc_relay(&self) -> Option<LinkFrame> {
        self.rrc_relay.pop()
    }

    pub fn push_nc_slot(&self, message: NcSlotMessage) -> bool {
        self.nc_slot_queue.push(message)
    }
    pub fn pop_nc_slot(&self) -> Option<NcSlotMessage> {
        self.nc_slot_queue.pop()
    }

    pub fn push_app_to_rrc(&self, packet: AppPacket) -> bool {
        self.app_to_rrc.push(packet)
    }
    pub fn pop_app_to_rrc(&self) -> Option<AppPacket> {
        self.app_to_rrc.pop()
    }

    pub fn push_rrc_to_app(&self, packet: AppPacket) -> bool {
        self.rrc_to_app.push(packet)
    }
    pub fn pop_rrc_to_app(&self) -> Option<AppPacket> {
        self.rrc_to_app.pop()
    }

    /// Sum of per-queue drop counters, used by the stats reporter.
    pub fn total_dropped(&self) -> u64 {
        self.analog_voice.dropped_count()
            + self.data_from_l3.iter().map(Ring::dropped_count).sum::<u64>()
            + self.rx.dropped_count()
            + self.rrc_relay.dropped_count()
            + self.nc_slot_queue.dropped_count()
            + self.app_to_rrc.dropped_count()
            + self.rrc_to_app.dropped_count()
    }

    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            analog_voice: self.analog_voice.len(),
            data_from_l3: [
                self.data_from_l3[0].len(),
                self.data_from_l3[1].len(),
                self.data_from_l3[2].len(),
                self.data_from_l3[3].len(),
            ],
            rx: self.rx.len(),
            rrc_relay: self.rrc_relay.len(),
            nc_slot_queue: self.nc_slot_queue.len(),
            app_to_rrc: self.app_to_rrc.len(),
            rrc_to_app: self.rrc_to_app.len(),
        }
    }
}

fn tier_index(tier: DataTier) -> usize {
    match tier {
        DataTier::Tier0 => 0,
        DataTier::Tier1 => 1,
        DataTier::Tier2 => 2,
        DataTier::Tier3 => 3,
    }
}

/// A point-in-time snapshot of every queue's occupancy, for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct QueueDepths {
    pub analog_voice: usize,
    pub data_from_l3: [usize; 4],
    pub rx: usize,
    pub rrc_relay: usize,
    pub nc_slot_queue: usize,
    pub app_to_rrc: usize,
    pub rrc_to_app: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, PriorityClass, TransmissionType};

    fn sample_frame() -> LinkFrame {
        LinkFrame {
            source: 1,
            destination: 2,
            next_hop: 2,
            rx_or_l3: false,
            ttl: 10,
            priority: PriorityClass::Data1,
            data_type: DataType::Sms,
            payload: vec![],
        }
    }

    fn sample_packet() -> AppPacket {
        AppPacket {
            src_id: 1,
            dest_id: 2,
            data_type: DataType::Sms,
            transmission_type: TransmissionType::Unicast,
            payload: vec![1, 2, 3],
            sequence_number: 1,
            timestamp: 0,
            urgent: false,
        }
    }

    #[test]
    fn enqueue_dequeue_is_fifo_per_tier() {
        let q = SharedFrameQueues::new(4, 4);
        q.push_data(DataTier::Tier0, sample_frame());
        let mut second = sample_frame();
        second.source = 9;
        q.push_data(DataTier::Tier0, second);

        let first = q.pop_data(DataTier::Tier0).unwrap();
        assert_eq!(first.source, 1);
        let next = q.pop_data(DataTier::Tier0).unwrap();
        assert_eq!(next.source, 9);
        assert!(q.pop_data(DataTier::Tier0).is_none());
    }

    #[test]
    fn tiers_are_independent() {
        let q = SharedFrameQueues::new(4, 4);
        q.push_data(DataTier::Tier0, sample_frame());
        assert!(q.pop_data(DataTier::Tier1).is_none());
        assert!(q.pop_data(DataTier::Tier0).is_some());
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let q = SharedFrameQueues::new(1, 1);
        assert!(q.push_rx(sample_frame()));
        assert!(!q.push_rx(sample_frame()));
        assert_eq!(q.total_dropped(), 1);
    }

    #[test]
    fn app_queues_round_trip() {
        let q = SharedFrameQueues::new(4, 4);
        assert!(q.push_app_to_rrc(sample_packet()));
        let popped = q.pop_app_to_rrc().unwrap();
        assert_eq!(popped.src_id, 1);
        assert!(q.pop_app_to_rrc().is_none());
    }

    #[test]
    fn nc_slot_queue_holds_messages_not_frames() {
        let q = SharedFrameQueues::new(4, 4);
        let msg = NcSlotMessage::new(7, 1, 100, 1);
        assert!(q.push_nc_slot(msg));
        let popped = q.pop_nc_slot().unwrap();
        assert_eq!(popped.assigned_slot, 7);
        assert_eq!(popped.source, 1);
        assert!(q.pop_nc_slot().is_none());
    }

    #[test]
    fn depths_reflect_pending_counts() {
        let q = SharedFrameQueues::new(4, 4);
        q.push_analog_voice(sample_frame());
        q.push_data(DataTier::Tier2, sample_frame());
        let depths = q.depths();
        assert_eq!(depths.analog_voice, 1);
        assert_eq!(depths.data_from_l3[2], 1);
        assert_eq!(depths.data_from_l3[0], 0);
    }
}
