//! `RrcCore`: owns every piece of shared state and wires the constructors
//! together. `main.rs` builds one of these and hands it to
//! [`crate::event_loop::spawn_workers`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::clients::{LayerClients, LayerLink};
use crate::config::RrcConfig;
use crate::correlator::RequestCorrelator;
use crate::fsm::Fsm;
use crate::messages::LayerMessageBody;
use crate::nc_slot::NcSlotManager;
use crate::neighbor::NeighborTable;
use crate::priority_plane::PriorityPlane;
use crate::queue::SharedFrameQueues;
use crate::reservation::ReservationQueue;
use crate::slot_allocator::SlotAllocator;
use crate::stats::Stats;
use crate::types::NodeAddress;

pub struct RrcCore {
    pub self_id: NodeAddress,
    pub config: RrcConfig,
    pub plane: Arc<PriorityPlane>,
    pub olsr: Arc<LayerLink>,
    pub tdma: Arc<LayerLink>,
    pub phy: Arc<LayerLink>,
    pub correlator: Arc<RequestCorrelator<LayerMessageBody>>,
    pub nc_slots: Arc<NcSlotManager>,
    pub slot_allocator: Mutex<SlotAllocator>,
    pub reservations: Arc<Mutex<ReservationQueue>>,
    pub global_fsm: Fsm,
    pub stats: Arc<Stats>,
    pub clock: Arc<AtomicU32>,
    pub running: Arc<AtomicBool>,
    pub start: Instant,
    nc_seq: AtomicU32,
}

impl RrcCore {
    pub fn new(self_id: NodeAddress, config: RrcConfig) -> Arc<Self> {
        let olsr = Arc::new(LayerLink::new(config.channel_capacity));
        let tdma = Arc::new(LayerLink::new(config.channel_capacity));
        let phy = Arc::new(LayerLink::new(config.channel_capacity));
        let correlator = Arc::new(RequestCorrelator::new());
        let stats = Arc::new(Stats::default());
        let clock = Arc::new(AtomicU32::new(0));

        let clients = LayerClients::new(
            self_id,
            Arc::clone(&olsr),
            Arc::clone(&tdma),
            Arc::clone(&phy),
            Arc::clone(&correlator),
            Arc::clone(&stats),
            Arc::clone(&clock),
            &config,
        );

        let neighbor_capacity = crate::neighbor::DEFAULT_CAPACITY;
        let reservations = Arc::new(Mutex::new(ReservationQueue::new(neighbor_capacity)));
        let plane = Arc::new(PriorityPlane::new(
            self_id,
            SharedFrameQueues::new(config.queue_capacity, config.app_queue_capacity),
            clients,
            NeighborTable::new(neighbor_capacity),
            Arc::clone(&reservations),
            Arc::clone(&stats),
            config.link_frame_default_ttl,
        ));

        Arc::new(RrcCore {
            self_id,
            config: config.clone(),
            plane,
            olsr,
            tdma,
            phy,
            correlator,
            nc_slots: Arc::new(NcSlotManager::new()),
            slot_allocator: Mutex::new(SlotAllocator::new(
                config.override_hysteresis,
                config.slot_timeout_secs,
            )),
            reservations,
            global_fsm: Fsm::new(),
            stats,
            clock,
            running: Arc::new(AtomicBool::new(true)),
            start: Instant::now(),
            nc_seq: AtomicU32::new(0),
        })
    }

    pub fn now(&self) -> u32 {
        self.clock.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Resync the logical clock to actual elapsed wall time. Called once per
    /// housekeeping tick; every other reader only ever loads the atomic.
    pub fn resync_clock(&self) -> u32 {
        let secs = self.start.elapsed().as_secs() as u32;
        self.clock.store(secs, std::sync::atomic::Ordering::Relaxed);
        secs
    }

    /// Monotonic sequence number stamped on each NC slot message this node
    /// assembles.
    pub fn next_nc_sequence(&self) -> u32 {
        self.nc_seq.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_core_starts_with_global_fsm_in_null() {
        let core = RrcCore::new(1, RrcConfig::default());
        assert_eq!(core.global_fsm.current(), crate::fsm::State::Null);
        assert_eq!(core.plane.connections().active_count(), 0);
    }
}
