//! Layer client stubs: the only door the rest of RRC has onto OLSR, TDMA and
//! PHY.
//!
//! Every call here is the same shape: build a [`crate::messages::LayerMessage`],
//! send it on that layer's outbound [`crate::channel::BoundedChannel`],
//! register the correlation id first so a fast reply can never race ahead of
//! the wait, then block on [`crate::correlator::RequestCorrelator::wait`] for
//! at most the configured timeout. A timeout returns the conservative default
//! fallback defaults rather than propagating an error, since a missing
//! collaborator reply is routine on a lossy radio link, not a bug.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::{BoundedChannel, SendOutcome};
use crate::correlator::RequestCorrelator;
use crate::messages::{Layer, LayerMessage, LayerMessageBody, PhyMetrics};
use crate::stats::Stats;
use crate::types::{NodeAddress, PriorityClass};

/// Outbound/inbound channel pair for one collaborator layer.
pub struct LayerLink {
    pub outbound: BoundedChannel<LayerMessage>,
    pub inbound: BoundedChannel<LayerMessage>,
}

impl LayerLink {
    pub fn new(capacity: usize) -> Self {
        LayerLink {
            outbound: BoundedChannel::new(capacity),
            inbound: BoundedChannel::new(capacity),
        }
    }
}

struct FlapEntry {
    last_next_hop: Option<NodeAddress>,
    flap_count: u32,
}

/// Stubs for the three collaborator layers, plus next-hop flap tracking.
pub struct LayerClients {
    self_id: NodeAddress,
    olsr: Arc<LayerLink>,
    tdma: Arc<LayerLink>,
    phy: Arc<LayerLink>,
    correlator: Arc<RequestCorrelator<LayerMessageBody>>,
    stats: Arc<Stats>,
    clock: Arc<AtomicU32>,
    route_lookup_timeout: Duration,
    route_request_timeout: Duration,
    metrics_request_timeout: Duration,
    flap_threshold: u32,
    flap_table: Mutex<HashMap<NodeAddress, FlapEntry>>,
}

impl LayerClients {
    pub fn new(
        self_id: NodeAddress,
        olsr: Arc<LayerLink>,
        tdma: Arc<LayerLink>,
        phy: Arc<LayerLink>,
        correlator: Arc<RequestCorrelator<LayerMessageBody>>,
        stats: Arc<Stats>,
        clock: Arc<AtomicU32>,
        config: &crate::config::RrcConfig,
    ) -> Self {
        LayerClients {
            self_id,
            olsr,
            tdma,
            phy,
            correlator,
            stats,
            clock,
            route_lookup_timeout: Duration::from_millis(config.route_lookup_timeout_ms),
            route_request_timeout: Duration::from_millis(config.route_request_timeout_ms),
            metrics_request_timeout: Duration::from_millis(config.metrics_request_timeout_ms),
            flap_threshold: config.flap_threshold,
            flap_table: Mutex::new(HashMap::new()),
        }
    }

    fn now(&self) -> u32 {
        self.clock.load(Ordering::Relaxed)
    }

    fn rpc(
        &self,
        link: &LayerLink,
        destination_layer: Layer,
        body: LayerMessageBody,
        timeout: Duration,
    ) -> Option<LayerMessageBody> {
        let id = self.correlator.next_request_id();
        self.correlator.register(id);
        let msg = LayerMessage::new(id, self.now(), Layer::Rrc, destination_layer, body);
        if link.outbound.send(msg, timeout) != SendOutcome::Sent {
            // Couldn't even hand it off; the reserved slot will simply expire.
        }
        self.correlator.wait(id, timeout)
    }

    /// Resolve the next hop toward `dest`, tracking flaps and forcing a
    /// discovery once the configured flap threshold (default 5) is crossed.
    pub fn next_hop(&self, dest: NodeAddress) -> Option<NodeAddress> {
        let reply = self.rpc(
            &self.olsr,
            Layer::Olsr,
            LayerMessageBody::RouteRequest { dest_node: dest },
            self.route_lookup_timeout,
        );
        let resolved = match reply {
            Some(LayerMessageBody::RouteResponse {
                next_hop, available, ..
            }) if available => next_hop,
            _ => None,
        };
        self.record_flap(dest, resolved);
        resolved
    }

    fn record_flap(&self, dest: NodeAddress, resolved: Option<NodeAddress>) {
        let mut table = self.flap_table.lock().expect("lock poisoned");
        let entry = table.entry(dest).or_insert(FlapEntry {
            last_next_hop: resolved,
            flap_count: 0,
        });
        if entry.last_next_hop == resolved {
            entry.flap_count = 0;
        } else {
            entry.flap_count += 1;
            entry.last_next_hop = resolved;
            if entry.flap_count >= self.flap_threshold {
                entry.flap_count = 0;
                drop(table);
                self.trigger_discovery(dest, true);
                return;
            }
        }
    }

    /// Ask OLSR to (re-)discover a route. Fire-and-forget: there is no
    /// reply to wait for.
    pub fn trigger_discovery(&self, dest: NodeAddress, urgent: bool) {
        let id = self.correlator.next_request_id();
        let msg = LayerMessage::new(
            id,
            self.now(),
            Layer::Rrc,
            Layer::Olsr,
            LayerMessageBody::DiscoveryRequest {
                dest_node: dest,
                urgent,
            },
        );
        self.olsr.outbound.send(msg, self.route_request_timeout);
        Stats::incr(&self.stats.route_discoveries_triggered);
    }

    /// Ask TDMA whether a slot is available toward `next_hop` at `priority`.
    /// Conservative default on timeout: unavailable.
    pub fn slot_available(&self, next_hop: NodeAddress, priority: PriorityClass) -> bool {
        let reply = self.rpc(
            &self.tdma,
            Layer::Tdma,
            LayerMessageBody::SlotCheckRequest { next_hop, priority },
            self.route_lookup_timeout,
        );
        matches!(
            reply,
            Some(LayerMessageBody::SlotCheckResponse { available: true })
        )
    }

    /// Request an NC slot grant from TDMA, carrying an opaque payload
    /// (typically a piggyback TLV). Returns `None` on refusal or timeout.
    pub fn nc_slot_request(&self, payload: Vec<u8>) -> Option<u8> {
        let reply = self.rpc(
            &self.tdma,
            Layer::Tdma,
            LayerMessageBody::NcSlotRequest { payload },
            self.route_request_timeout,
        );
        match reply {
            Some(LayerMessageBody::NcSlotResponse {
                granted: true,
                assigned_slot,
            }) => assigned_slot,
            _ => None,
        }
    }

    /// PHY link-quality metrics toward `node`. Falls back to
    /// [`PhyMetrics::TIMEOUT_DEFAULT`] on timeout.
    pub fn link_metrics(&self, node: NodeAddress) -> PhyMetrics {
        let reply = self.rpc(
            &self.phy,
            Layer::Phy,
            LayerMessageBody::MetricsRequest { node_id: node },
            self.metrics_request_timeout,
        );
        match reply {
            Some(LayerMessageBody::MetricsResponse { metrics, .. }) => metrics,
            _ => PhyMetrics::TIMEOUT_DEFAULT,
        }
    }

    /// Whether PHY currently considers the link to `node` active. Falls
    /// back to `false` ("link inactive") on timeout.
    pub fn link_active(&self, node: NodeAddress) -> bool {
        let reply = self.rpc(
            &self.phy,
            Layer::Phy,
            LayerMessageBody::LinkStatusRequest { node_id: node },
            self.metrics_request_timeout,
        );
        matches!(
            reply,
            Some(LayerMessageBody::LinkStatusResponse { active: true, .. })
        )
    }

    /// Outstanding packet count queued toward `node`. Falls back to `0` on
    /// timeout.
    pub fn packet_count(&self, node: NodeAddress) -> u32 {
        let reply = self.rpc(
            &self.phy,
            Layer::Phy,
            LayerMessageBody::PacketCountRequest { node_id: node },
            self.metrics_request_timeout,
        );
        match reply {
            Some(LayerMessageBody::PacketCountResponse { count, .. }) => count,
            _ => 0,
        }
    }

    pub fn self_id(&self) -> NodeAddress {
        self.self_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RrcConfig;
    use std::thread;

    fn harness() -> (Arc<LayerClients>, Arc<LayerLink>, Arc<LayerLink>, Arc<LayerLink>) {
        let olsr = Arc::new(LayerLink::new(8));
        let tdma = Arc::new(LayerLink::new(8));
        let phy = Arc::new(LayerLink::new(8));
        let correlator = Arc::new(RequestCorrelator::new());
        let stats = Arc::new(Stats::default());
        let clock = Arc::new(AtomicU32::new(0));
        let config = RrcConfig::default();
        let clients = Arc::new(LayerClients::new(
            1,
            Arc::clone(&olsr),
            Arc::clone(&tdma),
            Arc::clone(&phy),
            correlator,
            stats,
            clock,
            &config,
        ));
        (clients, olsr, tdma, phy)
    }

    fn respond_to_next_request(link: Arc<LayerLink>, body: LayerMessageBody) {
        thread::spawn(move || {
            if let Ok(req) = link.outbound.receive(Duration::from_secs(2)) {
                let reply = LayerMessage::new(req.correlation_id, 0, Layer::Olsr, Layer::Rrc, body);
                link.inbound.send(reply, Duration::from_secs(2));
            }
        });
    }

    #[test]
    fn next_hop_times_out_to_none_when_olsr_is_silent() {
        let (clients, _olsr, _tdma, _phy) = harness();
        assert_eq!(clients.next_hop(42), None);
    }

    #[test]
    fn link_metrics_times_out_to_default() {
        let (clients, _olsr, _tdma, _phy) = harness();
        assert_eq!(clients.link_metrics(3), PhyMetrics::TIMEOUT_DEFAULT);
    }

    #[test]
    fn packet_count_times_out_to_zero() {
        let (clients, _olsr, _tdma, _phy) = harness();
        assert_eq!(clients.packet_count(3), 0);
    }

    #[test]
    fn slot_available_times_out_to_false() {
        let (clients, _olsr, _tdma, _phy) = harness();
        assert!(!clients.slot_available(3, PriorityClass::Data1));
    }

    #[test]
    fn flapping_next_hop_triggers_discovery_after_threshold() {
        let (clients, olsr, _tdma, _phy) = harness();
        // flap_threshold defaults to 5: alternate responses to force flapping.
        for i in 0..6 {
            let next_hop = if i % 2 == 0 { Some(2u8) } else { Some(3u8) };
            respond_to_next_request(
                Arc::clone(&olsr),
                LayerMessageBody::RouteResponse {
                    dest_node: 9,
                    next_hop,
                    hop_count: 1,
                    available: true,
                },
            );
            clients.next_hop(9);
        }
        let snapshot = clients.stats.snapshot();
        assert!(snapshot.route_discoveries_triggered >= 1);
    }
}
