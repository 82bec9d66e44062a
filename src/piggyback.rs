//! Piggyback TLV and the NC slot message it rides inside.
//!
//! Every NC slot transmission carries one piggyback TLV: reservation
//! counters, this node's intended DU/GU slots, its view of the global NC
//! status bitmap, a time-sync stamp and its own assigned NC slot, wrapped in
//! a frame-counted TTL rather than a time-based one (decremented once per NC
//! frame, stale once it reaches zero). A TLV with an unexpected type byte is
//! rejected outright rather than partially parsed.

use crate::messages::{OlsrProtocolMessage, PhyMetrics};
use crate::neighbor::Capabilities;
use crate::types::NodeAddress;

/// The only TLV type this node emits or accepts.
pub const PIGGYBACK_TLV_TYPE: u8 = 0x01;

/// Initial frame-counted TTL stamped on a freshly built TLV.
pub const PIGGYBACK_TTL_FRAMES: u8 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct PiggybackTlv {
    pub tlv_type: u8,
    pub source: NodeAddress,
    pub reservation_counters: Vec<u32>,
    /// Intended DU/GU slots, one bit per slot index.
    pub du_gu_intention_bitmap: u64,
    /// This node's view of the 40-bit NC status bitmap.
    pub nc_status_bitmap: u64,
    pub time_sync: u32,
    pub own_nc_slot: u8,
    /// Frames remaining before this TLV is considered stale.
    pub ttl_frames: u8,
}

impl PiggybackTlv {
    pub fn new(
        source: NodeAddress,
        reservation_counters: Vec<u32>,
        du_gu_intention_bitmap: u64,
        nc_status_bitmap: u64,
        time_sync: u32,
        own_nc_slot: u8,
    ) -> Self {
        PiggybackTlv {
            tlv_type: PIGGYBACK_TLV_TYPE,
            source,
            reservation_counters,
            du_gu_intention_bitmap,
            nc_status_bitmap,
            time_sync,
            own_nc_slot,
            ttl_frames: PIGGYBACK_TTL_FRAMES,
        }
    }

    /// Validate the type byte against [`PIGGYBACK_TLV_TYPE`]. Rejects
    /// anything else rather than attempting a best-effort parse.
    pub fn validate_type(tlv_type: u8) -> Result<(), PiggybackError> {
        if tlv_type == PIGGYBACK_TLV_TYPE {
            Ok(())
        } else {
            Err(PiggybackError::UnexpectedType(tlv_type))
        }
    }

    pub fn is_stale(&self) -> bool {
        self.ttl_frames == 0
    }

    /// Age the TLV by one NC frame. Returns `None` once it has gone stale.
    pub fn aged_one_frame(&self) -> Option<PiggybackTlv> {
        if self.ttl_frames == 0 {
            return None;
        }
        Some(PiggybackTlv {
            ttl_frames: self.ttl_frames - 1,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiggybackError {
    UnexpectedType(u8),
}

impl std::fmt::Display for PiggybackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PiggybackError::UnexpectedType(t) => write!(f, "unexpected piggyback TLV type: {t:#x}"),
        }
    }
}

impl std::error::Error for PiggybackError {}

/// What this node reports about itself in a NC slot message, so neighbors
/// can populate their own neighbor table without a separate RPC.
#[derive(Debug, Clone, Copy)]
pub struct NeighborSnapshot {
    pub metrics: PhyMetrics,
    pub capabilities: Capabilities,
}

/// The composite record transmitted during this node's assigned NC slot.
#[derive(Debug, Clone)]
pub struct NcSlotMessage {
    /// 1..=40.
    pub assigned_slot: u8,
    pub olsr_body: Option<OlsrProtocolMessage>,
    pub piggyback: Option<PiggybackTlv>,
    pub self_snapshot: Option<NeighborSnapshot>,
    pub timestamp: u32,
    pub source: NodeAddress,
    pub sequence_number: u32,
    pub valid: bool,
}

impl NcSlotMessage {
    pub fn new(assigned_slot: u8, source: NodeAddress, timestamp: u32, sequence_number: u32) -> Self {
        NcSlotMessage {
            assigned_slot,
            olsr_body: None,
            piggyback: None,
            self_snapshot: None,
            timestamp,
            source,
            sequence_number,
            valid: true,
        }
    }

    pub fn with_piggyback(mut self, tlv: PiggybackTlv) -> Self {
        self.piggyback = Some(tlv);
        self
    }

    pub fn with_olsr_body(mut self, body: OlsrProtocolMessage) -> Self {
        self.olsr_body = Some(body);
        self
    }

    pub fn with_self_snapshot(mut self, snapshot: NeighborSnapshot) -> Self {
        self.self_snapshot = Some(snapshot);
        self
    }
}
