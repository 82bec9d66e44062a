//! Priority plane: the downlink (app -> radio) and uplink (radio -> app /
//! relay) packet-processing steps.
//!
//! Each `process_one_*` call drains exactly one packet or frame and is meant
//! to be driven in a tight loop by the APP/PHY workers in
//! [`crate::event_loop`]. Keeping one item per call (rather than draining a
//! queue to empty) keeps a single noisy queue from starving its siblings,
//! the same cooperative-scheduling shape every other worker in this crate
//! uses for its own per-tick work budget.

use std::sync::{Arc, Mutex};

use crate::clients::LayerClients;
use crate::fsm::ConnectionPool;
use crate::messages::OlsrProtocolMessage;
use crate::neighbor::NeighborTable;
use crate::queue::{DataTier, SharedFrameQueues};
use crate::reservation::ReservationQueue;
use crate::stats::Stats;
use crate::types::{AppPacket, DataType, LinkFrame, NodeAddress, PriorityClass, TransmissionType};

pub struct PriorityPlane {
    self_id: NodeAddress,
    queues: SharedFrameQueues,
    clients: LayerClients,
    neighbors: Mutex<NeighborTable>,
    connections: ConnectionPool,
    reservations: Arc<Mutex<ReservationQueue>>,
    stats: Arc<Stats>,
    default_ttl: i32,
}

impl PriorityPlane {
    pub fn new(
        self_id: NodeAddress,
        queues: SharedFrameQueues,
        clients: LayerClients,
        neighbors: NeighborTable,
        reservations: Arc<Mutex<ReservationQueue>>,
        stats: Arc<Stats>,
        default_ttl: i32,
    ) -> Self {
        PriorityPlane {
            self_id,
            queues,
            clients,
            neighbors: Mutex::new(neighbors),
            connections: ConnectionPool::new(),
            reservations,
            stats,
            default_ttl,
        }
    }

    pub fn connections(&self) -> &ConnectionPool {
        &self.connections
    }

    pub fn queues(&self) -> &SharedFrameQueues {
        &self.queues
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn clients(&self) -> &LayerClients {
        &self.clients
    }

    pub fn neighbors(&self) -> &Mutex<NeighborTable> {
        &self.neighbors
    }

    pub fn reservations(&self) -> &Arc<Mutex<ReservationQueue>> {
        &self.reservations
    }

    /// Count of neighbors this node currently considers active, plus one
    /// for itself — the `N` the NC slot round-robin tier is computed modulo.
    pub fn active_node_count(&self) -> u32 {
        let active_neighbors = self
            .neighbors
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|e| e.active)
            .count() as u32;
        active_neighbors + 1
    }

    fn submit_reservation(
        &self,
        node_id: NodeAddress,
        hop_count: u8,
        now: u32,
        priority: PriorityClass,
        is_self_originated: bool,
    ) {
        self.reservations.lock().expect("lock poisoned").submit(
            node_id,
            hop_count,
            1,
            now,
            priority,
            is_self_originated,
        );
    }

    /// Refresh PHY metrics and the active flag for every known neighbor, and
    /// fire a route-change event on any connection whose current next-hop
    /// has gone poor.
    pub fn refresh_neighbor_links(&self, now: u32, neighbor_timeout_secs: u32) {
        let node_ids: Vec<NodeAddress> = self
            .neighbors
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|e| e.node_id)
            .collect();

        for node_id in node_ids {
            let metrics = self.clients.link_metrics(node_id);
            let active = self.clients.link_active(node_id);
            let queued = self.clients.packet_count(node_id);
            log::trace!(
                "neighbor {node_id}: rssi={:.1} snr={:.1} per={:.2} active={active} queued={queued}",
                metrics.rssi_dbm,
                metrics.snr_db,
                metrics.per_percent,
            );
            let good = {
                let mut neighbors = self.neighbors.lock().expect("lock poisoned");
                neighbors.update_metrics(node_id, metrics);
                if let Some(entry) = neighbors.get_mut(node_id) {
                    entry.active = active;
                }
                neighbors
                    .get(node_id)
                    .map(|e| e.link_is_good(now, neighbor_timeout_secs))
                    .unwrap_or(false)
            };
            if !good {
                log::debug!("poor link quality observed toward neighbor {node_id}");
                for dest in self.connections.destinations_via(node_id) {
                    if self.connections.route_change(dest, &self.stats) == crate::fsm::State::Reconfiguration {
                        self.clients.trigger_discovery(dest, false);
                    }
                }
            }
        }
    }

    /// Drain and process a single `app_to_rrc` packet, if any is pending.
    /// Returns `true` if a packet was processed.
    pub fn process_one_downlink(&self, now: u32) -> bool {
        let Some(packet) = self.queues.pop_app_to_rrc() else {
            return false;
        };

        let priority = PriorityClass::from_data_type(packet.data_type, packet.urgent);

        let was_idle = self.connections.state_of(packet.dest_id) == crate::fsm::State::Idle;
        if was_idle {
            self.connections.begin_setup(packet.dest_id, now, &self.stats);
        } else {
            self.connections.touch_activity(packet.dest_id, now);
        }
        let finish_setup = |success: bool, stats: &Stats| {
            if was_idle {
                self.connections.complete_setup(packet.dest_id, now, success, stats);
            }
        };

        let next_hop = if packet.dest_id == crate::types::BROADCAST {
            Some(crate::types::BROADCAST)
        } else {
            self.clients.next_hop(packet.dest_id)
        };

        let Some(next_hop) = next_hop else {
            finish_setup(false, &self.stats);
            self.reject_downlink(packet, "no route to destination", now);
            return true;
        };
        if packet.dest_id != crate::types::BROADCAST {
            self.connections.set_next_hop(packet.dest_id, next_hop);
        }

        if priority == PriorityClass::AnalogVoicePtt {
            // PTT is unconditional: it is never held back by slot availability,
            // but it still marks a fresh connection context as connected.
            finish_setup(true, &self.stats);
            self.submit_reservation(next_hop, 0, now, priority, true);
            let frame = self.build_frame(&packet, next_hop, priority);
            self.queues.push_analog_voice(frame);
            Stats::incr(&self.stats.messages_enqueued_total);
            return true;
        }

        if !self.clients.slot_available(next_hop, priority) {
            finish_setup(false, &self.stats);
            self.reject_downlink(packet, "no slot available", now);
            return true;
        }
        finish_setup(true, &self.stats);
        self.submit_reservation(next_hop, 0, now, priority, true);

        let tier = match priority {
            PriorityClass::DigitalVoice => DataTier::Tier0,
            PriorityClass::Data1 => DataTier::Tier1,
            PriorityClass::Data2 => DataTier::Tier2,
            PriorityClass::Data3 => DataTier::Tier3,
            PriorityClass::AnalogVoicePtt | PriorityClass::RxRelay => unreachable!(
                "PTT is handled above and downlink packets are never RxRelay"
            ),
        };
        let frame = self.build_frame(&packet, next_hop, priority);
        self.queues.push_data(tier, frame);
        Stats::incr(&self.stats.messages_enqueued_total);
        true
    }

    fn build_frame(&self, packet: &AppPacket, next_hop: NodeAddress, priority: PriorityClass) -> LinkFrame {
        LinkFrame {
            source: self.self_id,
            destination: packet.dest_id,
            next_hop,
            rx_or_l3: false,
            ttl: self.default_ttl,
            priority,
            data_type: packet.data_type,
            payload: packet.payload.clone(),
        }
    }

    fn reject_downlink(&self, packet: AppPacket, reason: &str, now: u32) {
        log::debug!("downlink rejected for node {}: {reason}", packet.dest_id);
        Stats::incr(&self.stats.messages_discarded_no_slots);
        let notice = AppPacket::delivery_failed(packet.dest_id, reason, now);
        self.queues.push_rrc_to_app(notice);
    }

    /// Drain and process a single `rx` frame, if any is pending. Returns
    /// `true` if a frame was processed.
    pub fn process_one_uplink(&self, now: u32) -> bool {
        let Some(frame) = self.queues.pop_rx() else {
            return false;
        };

        self.neighbors.lock().expect("lock poisoned").touch(frame.source, now);

        if frame.destination == self.self_id || frame.destination == crate::types::BROADCAST {
            let packet = AppPacket {
                src_id: frame.source,
                dest_id: frame.destination,
                data_type: frame.data_type,
                transmission_type: if frame.destination == crate::types::BROADCAST {
                    TransmissionType::Broadcast
                } else {
                    TransmissionType::Unicast
                },
                payload: frame.payload,
                sequence_number: 0,
                timestamp: now,
                urgent: false,
            };
            self.queues.push_rrc_to_app(packet);
            self.connections.touch_activity(frame.source, now);
            Stats::incr(&self.stats.relay_packets_to_self);
            return true;
        }

        if frame.rx_or_l3 {
            let olsr_body = OlsrProtocolMessage {
                msg_type: 0,
                originator: frame.source,
                ttl: frame.ttl.max(0) as u8,
                hop_count: 0,
                seq_num: 0,
                payload: frame.payload,
            };
            self.clients.trigger_discovery(frame.destination, false);
            log::trace!("forwarded control payload from {} to OLSR", olsr_body.originator);
            return true;
        }

        self.relay(frame, now);
        true
    }

    fn relay(&self, frame: LinkFrame, now: u32) {
        let Some(next_hop) = self.clients.next_hop(frame.destination) else {
            log::debug!("relay dropped: no route to {}", frame.destination);
            Stats::incr(&self.stats.messages_discarded_no_slots);
            return;
        };
        let hop_count = self.default_ttl.saturating_sub(frame.ttl).max(0) as u8;
        match frame.relayed(next_hop) {
            Some(relayed) => {
                self.submit_reservation(next_hop, hop_count, now, relayed.priority, false);
                self.queues.push_rrc_relay(relayed);
                Stats::incr(&self.stats.relay_packets_forwarded);
            }
            None => {
                Stats::incr(&self.stats.relay_packets_ttl_expired);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::BoundedChannel;
    use crate::clients::LayerLink;
    use crate::config::RrcConfig;
    use crate::correlator::RequestCorrelator;
    use crate::messages::{Layer, LayerMessage, LayerMessageBody};
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn make_plane() -> (Arc<PriorityPlane>, Arc<LayerLink>, Arc<LayerLink>, Arc<LayerLink>) {
        let olsr = Arc::new(LayerLink::new(8));
        let tdma = Arc::new(LayerLink::new(8));
        let phy = Arc::new(LayerLink::new(8));
        let correlator = Arc::new(RequestCorrelator::new());
        let stats = Arc::new(Stats::default());
        let clock = Arc::new(AtomicU32::new(0));
        let config = RrcConfig::default();
        let clients = LayerClients::new(
            1,
            Arc::clone(&olsr),
            Arc::clone(&tdma),
            Arc::clone(&phy),
            correlator,
            Arc::clone(&stats),
            clock,
            &config,
        );
        let plane = Arc::new(PriorityPlane::new(
            1,
            SharedFrameQueues::new(config.queue_capacity, config.app_queue_capacity),
            clients,
            NeighborTable::new(crate::neighbor::DEFAULT_CAPACITY),
            Arc::new(Mutex::new(ReservationQueue::new(crate::neighbor::DEFAULT_CAPACITY))),
            stats,
            config.link_frame_default_ttl,
        ));
        (plane, olsr, tdma, phy)
    }

    fn sample_app_packet(dest: NodeAddress, data_type: DataType, urgent: bool) -> AppPacket {
        AppPacket {
            src_id: 1,
            dest_id: dest,
            data_type,
            transmission_type: TransmissionType::Unicast,
            payload: vec![9, 9],
            sequence_number: 1,
            timestamp: 0,
            urgent,
        }
    }

    fn auto_reply_route_and_slot(olsr: Arc<LayerLink>, tdma: Arc<LayerLink>, next_hop: NodeAddress) {
        let o = Arc::clone(&olsr);
        thread::spawn(move || {
            if let Ok(req) = o.outbound.receive(Duration::from_secs(2)) {
                let reply = LayerMessage::new(
                    req.correlation_id,
                    0,
                    Layer::Olsr,
                    Layer::Rrc,
                    LayerMessageBody::RouteResponse {
                        dest_node: 9,
                        next_hop: Some(next_hop),
                        hop_count: 1,
                        available: true,
                    },
                );
                o.inbound.send(reply, Duration::from_secs(2));
            }
        });
        thread::spawn(move || {
            if let Ok(req) = tdma.outbound.receive(Duration::from_secs(2)) {
                let reply = LayerMessage::new(
                    req.correlation_id,
                    0,
                    Layer::Tdma,
                    Layer::Rrc,
                    LayerMessageBody::SlotCheckResponse { available: true },
                );
                tdma.inbound.send(reply, Duration::from_secs(2));
            }
        });
    }

    #[test]
    fn ptt_bypasses_slot_check_and_lands_in_analog_voice() {
        let (plane, olsr, _tdma, _phy) = make_plane();
        let o = Arc::clone(&olsr);
        thread::spawn(move || {
            if let Ok(req) = o.outbound.receive(Duration::from_secs(2)) {
                let reply = LayerMessage::new(
                    req.correlation_id,
                    0,
                    Layer::Olsr,
                    Layer::Rrc,
                    LayerMessageBody::RouteResponse {
                        dest_node: 9,
                        next_hop: Some(9),
                        hop_count: 1,
                        available: true,
                    },
                );
                o.inbound.send(reply, Duration::from_secs(2));
            }
        });
        plane
            .queues
            .push_app_to_rrc(sample_app_packet(9, DataType::VoiceAnalogPtt, false));
        assert!(plane.process_one_downlink(0));
        assert!(plane.queues.pop_analog_voice().is_some());
    }

    #[test]
    fn no_route_produces_delivery_failed_notice() {
        let (plane, _olsr, _tdma, _phy) = make_plane();
        plane.queues.push_app_to_rrc(sample_app_packet(9, DataType::Sms, false));
        assert!(plane.process_one_downlink(0));
        let notice = plane.queues.pop_rrc_to_app().unwrap();
        assert!(String::from_utf8_lossy(&notice.payload).starts_with("DELIVERY_FAILED"));
    }

    #[test]
    fn routed_data_lands_in_matching_tier() {
        let (plane, olsr, tdma, _phy) = make_plane();
        auto_reply_route_and_slot(olsr, tdma, 9);
        plane.queues.push_app_to_rrc(sample_app_packet(9, DataType::Sms, false));
        assert!(plane.process_one_downlink(0));
        assert!(plane.queues.pop_data(DataTier::Tier2).is_some());
    }

    #[test]
    fn self_destined_uplink_goes_to_rrc_to_app() {
        let (plane, _olsr, _tdma, _phy) = make_plane();
        let frame = LinkFrame {
            source: 9,
            destination: 1,
            next_hop: 1,
            rx_or_l3: false,
            ttl: 5,
            priority: PriorityClass::Data2,
            data_type: DataType::Sms,
            payload: vec![1],
        };
        plane.queues.push_rx(frame);
        assert!(plane.process_one_uplink(0));
        assert!(plane.queues.pop_rrc_to_app().is_some());
    }

    #[test]
    fn relay_with_no_route_is_dropped_not_panicking() {
        let (plane, _olsr, _tdma, _phy) = make_plane();
        let frame = LinkFrame {
            source: 9,
            destination: 42,
            next_hop: 1,
            rx_or_l3: false,
            ttl: 5,
            priority: PriorityClass::RxRelay,
            data_type: DataType::Relay,
            payload: vec![],
        };
        plane.queues.push_rx(frame);
        assert!(plane.process_one_uplink(0));
        assert!(plane.queues.pop_rrc_relay().is_none());
    }

    #[test]
    fn empty_queues_return_false_without_blocking() {
        let (plane, _olsr, _tdma, _phy) = make_plane();
        assert!(!plane.process_one_downlink(0));
        assert!(!plane.process_one_uplink(0));
    }
}
