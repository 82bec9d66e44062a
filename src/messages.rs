//! Inter-layer message plane: the tagged record carried on every bounded
//! [`crate::channel::BoundedChannel`] between RRC and its collaborators.
//!
//! One canonical tagged sum type stands in for what would otherwise be
//! several near-duplicate request/response structs per collaborator layer.
//! Every dispatcher below matches on `LayerMessageBody` exhaustively; a new
//! variant forces every receiving `match` to be updated.

use crate::types::NodeAddress;

/// Which collaborator layer a message is headed to or arrived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Rrc,
    Olsr,
    Tdma,
    Phy,
    App,
}

/// PHY link metrics, with a conservative fallback reading used on RPC
/// timeout: RSSI -120 dBm, SNR 0 dB, PER 1.0 (worst-case, not a guess).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhyMetrics {
    pub rssi_dbm: f32,
    pub snr_db: f32,
    pub per_percent: f32,
}

impl PhyMetrics {
    pub const TIMEOUT_DEFAULT: PhyMetrics = PhyMetrics {
        rssi_dbm: -120.0,
        snr_db: 0.0,
        per_percent: 1.0,
    };
}

/// An opaque OLSR protocol payload (HELLO/TC), treated as bytes no larger
/// than one slot's worth of data. Parsing HELLO/TC contents is out of scope
/// here; RRC only ever forwards this payload between OLSR and TDMA.
#[derive(Debug, Clone)]
pub struct OlsrProtocolMessage {
    pub msg_type: u8,
    pub originator: NodeAddress,
    pub ttl: u8,
    pub hop_count: u8,
    pub seq_num: u32,
    pub payload: Vec<u8>,
}

/// The tagged body of a `LayerMessage`: every cross-layer message kind.
#[derive(Debug, Clone)]
pub enum LayerMessageBody {
    RouteRequest { dest_node: NodeAddress },
    RouteResponse {
        dest_node: NodeAddress,
        next_hop: Option<NodeAddress>,
        hop_count: u8,
        available: bool,
    },
    DiscoveryRequest { dest_node: NodeAddress, urgent: bool },
    OlsrProtocol(OlsrProtocolMessage),

    SlotCheckRequest { next_hop: NodeAddress, priority: crate::types::PriorityClass },
    SlotCheckResponse { available: bool },
    NcSlotRequest { payload: Vec<u8> },
    NcSlotResponse { granted: bool, assigned_slot: Option<u8> },
    SlotStatusUpdate { du_gu_bitmap: u64 },
    RxQueueNotification {
        frame_count: u32,
        source_node: NodeAddress,
        dest_node: NodeAddress,
        is_for_self: bool,
        timestamp: u32,
    },

    MetricsRequest { node_id: NodeAddress },
    MetricsResponse { node_id: NodeAddress, metrics: PhyMetrics },
    LinkStatusRequest { node_id: NodeAddress },
    LinkStatusResponse { node_id: NodeAddress, active: bool },
    PacketCountRequest { node_id: NodeAddress },
    PacketCountResponse { node_id: NodeAddress, count: u32 },
    LinkStatusChange { node_id: NodeAddress, active: bool },
}

/// Header carried by every `LayerMessage`: kind tag is implicit in `body`,
/// the remaining fields support correlation and routing.
#[derive(Debug, Clone)]
pub struct LayerMessage {
    pub correlation_id: u64,
    pub timestamp: u32,
    pub source_layer: Layer,
    pub destination_layer: Layer,
    pub body: LayerMessageBody,
}

impl LayerMessage {
    pub fn new(
        correlation_id: u64,
        timestamp: u32,
        source_layer: Layer,
        destination_layer: Layer,
        body: LayerMessageBody,
    ) -> Self {
        LayerMessage {
            correlation_id,
            timestamp,
            source_layer,
            destination_layer,
            body,
        }
    }
}
