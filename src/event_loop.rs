//! Five cooperating worker threads: one each for the OLSR, TDMA and PHY
//! message planes, one driving the APP-facing priority plane, and a 1s
//! housekeeping tick. All of them are plain `std::thread`s scheduled by the
//! OS, the same model a dedicated time-driver module would assume (a
//! dedicated scheduler thread woken by `Condvar::wait_timeout`) rather than
//! a cooperative async executor — appropriate here since RRC must keep
//! making progress even while one collaborator's RPC is blocked.
//!
//! Shutdown is cooperative: every loop rechecks `core.running` after each
//! bounded wait, so a `false` flip is noticed within one poll interval
//! everywhere, not just in the housekeeping thread that (typically) sets it.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::core::RrcCore;
use crate::messages::{Layer, LayerMessage, LayerMessageBody, OlsrProtocolMessage};
use crate::piggyback::{NcSlotMessage, PiggybackTlv};
use crate::stats::Stats;

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const HOUSEKEEPING_TICK: Duration = Duration::from_secs(1);
const SLOT_TABLE_PUBLISH_EVERY_TICKS: u64 = 10;
const STATS_LOG_EVERY_TICKS: u64 = 30;

/// Spawn all five workers and return their join handles, in the order
/// `[olsr, tdma, phy, app, housekeeping]`.
pub fn spawn_workers(core: Arc<RrcCore>) -> Vec<JoinHandle<()>> {
    vec![
        spawn_layer_worker(Arc::clone(&core), Layer::Olsr),
        spawn_layer_worker(Arc::clone(&core), Layer::Tdma),
        spawn_phy_worker(Arc::clone(&core)),
        spawn_app_worker(Arc::clone(&core)),
        spawn_housekeeping(core),
    ]
}

fn link_for<'a>(core: &'a RrcCore, layer: Layer) -> &'a crate::clients::LayerLink {
    match layer {
        Layer::Olsr => &core.olsr,
        Layer::Tdma => &core.tdma,
        Layer::Phy => &core.phy,
        Layer::Rrc | Layer::App => unreachable!("only OLSR/TDMA/PHY have dedicated links"),
    }
}

/// Dispatch one inbound message: route RPC responses to the correlator,
/// and act directly on unsolicited notifications.
fn dispatch_inbound(core: &RrcCore, msg: LayerMessage) {
    match msg.body {
        LayerMessageBody::RouteResponse { .. }
        | LayerMessageBody::SlotCheckResponse { .. }
        | LayerMessageBody::NcSlotResponse { .. }
        | LayerMessageBody::MetricsResponse { .. }
        | LayerMessageBody::LinkStatusResponse { .. }
        | LayerMessageBody::PacketCountResponse { .. } => {
            if !core.correlator.complete(msg.correlation_id, msg.body) {
                log::trace!(
                    "discarded stale response, correlation_id={}",
                    msg.correlation_id
                );
            }
        }
        LayerMessageBody::LinkStatusChange { node_id, active } => {
            let mut neighbors = core.plane.neighbors().lock().expect("lock poisoned");
            if active {
                neighbors.touch(node_id, core.now());
            } else if let Some(entry) = neighbors.get_mut(node_id) {
                entry.active = false;
            }
            drop(neighbors);
            if !active {
                core.global_fsm.apply(crate::fsm::Event::RouteChange, &core.stats).ok();
            }
        }
        LayerMessageBody::SlotStatusUpdate { du_gu_bitmap } => {
            core.nc_slots.bitmap().merge_remote(du_gu_bitmap);
        }
        LayerMessageBody::RxQueueNotification { source_node, .. } => {
            core.plane
                .neighbors()
                .lock()
                .expect("lock poisoned")
                .touch(source_node, core.now());
        }
        LayerMessageBody::OlsrProtocol(body) => {
            let now = core.now();
            let message = assemble_nc_slot_message(core, Some(body), now);
            if !core.plane.queues().push_nc_slot(message) {
                log::debug!("nc_slot_queue full, dropped inbound-triggered NC slot message");
            }
        }
        // Requests are things RRC itself sends; a collaborator echoing one
        // back would be a protocol error. Log and drop rather than panic.
        other => log::warn!("unexpected inbound message on RRC plane: {other:?}"),
    }
}

/// Build this node's piggyback summary: its outstanding per-tier reservation
/// counts, its DU/GU slot claims, and its view of the NC status bitmap.
fn build_piggyback(core: &RrcCore, slot: u8, now: u32) -> PiggybackTlv {
    let depths = core.plane.queues().depths();
    let reservation_counters = depths.data_from_l3.iter().map(|&d| d as u32).collect();
    let intention_bitmap = core
        .slot_allocator
        .lock()
        .expect("lock poisoned")
        .intention_bitmap(core.self_id);
    let nc_status_bitmap = core.nc_slots.bitmap().snapshot();
    PiggybackTlv::new(core.self_id, reservation_counters, intention_bitmap, nc_status_bitmap, now, slot)
}

/// Assemble an NC slot message for transmission in this node's assigned
/// slot: an inbound OLSR protocol payload rides along when present (the
/// reactive case), and a piggyback TLV is attached whenever this node
/// currently holds a slot, whether or not there is a payload to carry.
fn assemble_nc_slot_message(core: &RrcCore, olsr_body: Option<OlsrProtocolMessage>, now: u32) -> NcSlotMessage {
    let slot = core.nc_slots.own_slot().unwrap_or(0);
    let seq = core.next_nc_sequence();
    let mut message = NcSlotMessage::new(slot, core.self_id, now, seq);
    if let Some(body) = olsr_body {
        message = message.with_olsr_body(body);
    }
    if let Some(slot) = core.nc_slots.own_slot() {
        message = message.with_piggyback(build_piggyback(core, slot, now));
    }
    message
}

fn spawn_layer_worker(core: Arc<RrcCore>, layer: Layer) -> JoinHandle<()> {
    thread::spawn(move || {
        while core.running.load(Ordering::Relaxed) {
            let link = link_for(&core, layer);
            match link.inbound.receive(POLL_INTERVAL) {
                Ok(msg) => dispatch_inbound(&core, msg),
                Err(_) => continue,
            }
        }
    })
}

fn spawn_phy_worker(core: Arc<RrcCore>) -> JoinHandle<()> {
    thread::spawn(move || {
        while core.running.load(Ordering::Relaxed) {
            if let Ok(msg) = core.phy.inbound.receive(POLL_INTERVAL) {
                dispatch_inbound(&core, msg);
            }
            while core.plane.process_one_uplink(core.now()) {}
            core.plane
                .refresh_neighbor_links(core.now(), core.config.neighbor_timeout_secs as u32);
        }
    })
}

fn spawn_app_worker(core: Arc<RrcCore>) -> JoinHandle<()> {
    thread::spawn(move || {
        while core.running.load(Ordering::Relaxed) {
            if !core.plane.process_one_downlink(core.now()) {
                thread::sleep(POLL_INTERVAL);
            }
        }
    })
}

fn spawn_housekeeping(core: Arc<RrcCore>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut tick: u64 = 0;
        while core.running.load(Ordering::Relaxed) {
            thread::sleep(HOUSEKEEPING_TICK);
            let now = core.resync_clock();
            tick += 1;

            let released = core
                .plane
                .connections()
                .sweep_inactive(now, core.config.inactivity_timeout_secs as u32, &core.stats);
            if !released.is_empty() {
                log::info!("released {} idle connection(s): {:?}", released.len(), released);
            }

            let expired = core
                .reservations
                .lock()
                .expect("lock poisoned")
                .sweep_expired(now, core.config.reservation_timeout_secs as u32);
            if !expired.is_empty() {
                log::debug!("expired {} stale reservation(s)", expired.len());
            }

            let freed = core.slot_allocator.lock().expect("lock poisoned").sweep_idle(now);
            if !freed.is_empty() {
                log::debug!("auto-released {} idle DU/GU slot(s)", freed.len());
            }

            let scored = core.reservations.lock().expect("lock poisoned").drain_sorted_by_score();
            for (node_id, score) in scored {
                let outcome = core.slot_allocator.lock().expect("lock poisoned").allocate(node_id, score, now);
                match outcome {
                    crate::slot_allocator::AllocationOutcome::ReusedFree(_)
                    | crate::slot_allocator::AllocationOutcome::Preempted(_) => {
                        Stats::incr(&core.stats.slots_allocated);
                    }
                    crate::slot_allocator::AllocationOutcome::Failed => {
                        Stats::incr(&core.stats.allocation_failures);
                        log::debug!("DU/GU slot allocation failed for node {node_id}");
                    }
                }
            }

            if core.nc_slots.own_slot().is_none() {
                let active = core.plane.active_node_count();
                if let Some((candidate, _tier)) = core.nc_slots.assign(core.self_id, tick as u32, active) {
                    match core.plane.clients().nc_slot_request(vec![candidate]) {
                        Some(granted) => {
                            if granted != candidate {
                                core.nc_slots.bitmap().release(candidate);
                                core.nc_slots.set_own_slot(granted);
                            }
                            Stats::incr(&core.stats.nc_slots_assigned);
                            log::info!("NC slot {granted} granted for this node");
                        }
                        None => {
                            core.nc_slots.bitmap().release(candidate);
                            core.nc_slots.clear_own_slot();
                            log::debug!("NC slot candidate {candidate} refused by TDMA");
                        }
                    }
                }
            } else {
                let message = assemble_nc_slot_message(&core, None, now);
                if !core.plane.queues().push_nc_slot(message) {
                    log::debug!("nc_slot_queue full, dropped self-announcement");
                }
            }

            if tick % SLOT_TABLE_PUBLISH_EVERY_TICKS == 0 {
                let bitmap = core.nc_slots.bitmap().snapshot();
                let id = core.correlator.next_request_id();
                let msg = LayerMessage::new(
                    id,
                    now,
                    Layer::Rrc,
                    Layer::Tdma,
                    LayerMessageBody::SlotStatusUpdate { du_gu_bitmap: bitmap },
                );
                core.tdma.outbound.send(msg, POLL_INTERVAL);
            }

            if tick % STATS_LOG_EVERY_TICKS == 0 {
                log::info!("stats: {}", core.stats.snapshot());
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RrcConfig;
    use std::sync::atomic::Ordering as AtomicOrdering;

    #[test]
    fn workers_start_and_stop_cleanly() {
        let core = RrcCore::new(1, RrcConfig::default());
        let handles = spawn_workers(Arc::clone(&core));
        thread::sleep(Duration::from_millis(50));
        core.running.store(false, AtomicOrdering::Relaxed);
        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
    }

    #[test]
    fn slot_status_update_merges_into_local_bitmap() {
        let core = RrcCore::new(1, RrcConfig::default());
        dispatch_inbound(
            &core,
            LayerMessage::new(
                1,
                0,
                Layer::Tdma,
                Layer::Rrc,
                LayerMessageBody::SlotStatusUpdate { du_gu_bitmap: 0b101 },
            ),
        );
        assert_eq!(core.nc_slots.bitmap().snapshot(), 0b101);
    }

    #[test]
    fn olsr_protocol_inbound_is_wrapped_and_queued_for_nc_slot() {
        let core = RrcCore::new(1, RrcConfig::default());
        dispatch_inbound(
            &core,
            LayerMessage::new(
                1,
                0,
                Layer::Olsr,
                Layer::Rrc,
                LayerMessageBody::OlsrProtocol(crate::messages::OlsrProtocolMessage {
                    msg_type: 3,
                    originator: 7,
                    ttl: 5,
                    hop_count: 1,
                    seq_num: 2,
                    payload: vec![9],
                }),
            ),
        );
        let queued = core.plane.queues().pop_nc_slot().expect("message should be queued");
        assert_eq!(queued.source, 1);
        let body = queued.olsr_body.expect("olsr body should ride along");
        assert_eq!(body.originator, 7);
    }

    #[test]
    fn housekeeping_drains_reservations_into_slot_allocator() {
        let core = RrcCore::new(1, RrcConfig::default());
        core.reservations.lock().expect("lock poisoned").submit(
            9,
            0,
            1,
            0,
            crate::types::PriorityClass::Data1,
            true,
        );
        let scored = core.reservations.lock().expect("lock poisoned").drain_sorted_by_score();
        assert_eq!(scored.len(), 1);
        let outcome = core.slot_allocator.lock().expect("lock poisoned").allocate(scored[0].0, scored[0].1, 0);
        assert!(matches!(
            outcome,
            crate::slot_allocator::AllocationOutcome::ReusedFree(_)
        ));
    }

    #[test]
    fn stale_response_is_discarded_without_panicking() {
        let core = RrcCore::new(1, RrcConfig::default());
        dispatch_inbound(
            &core,
            LayerMessage::new(
                999,
                0,
                Layer::Olsr,
                Layer::Rrc,
                LayerMessageBody::RouteResponse {
                    dest_node: 5,
                    next_hop: Some(5),
                    hop_count: 1,
                    available: true,
                },
            ),
        );
    }
}
