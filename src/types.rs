//! Core data model: node addresses, data types, priorities, application
//! packets and link frames.
//!
//! Mirrors the entities of the data model: everything here is a plain,
//! `Clone`-able value type. Nothing in this module owns a lock or a thread.

/// 8-bit node identifier. `BROADCAST` has no routable semantics beyond
/// equality; `SELF_DEFAULT` is the conventional default used before a node
/// has been told its own address.
pub type NodeAddress = u8;

/// Broadcast destination address.
pub const BROADCAST: NodeAddress = 0xFF;
/// Conventional self-default address, used when no node id has been configured.
pub const SELF_DEFAULT: NodeAddress = 0xFE;

/// Closed enumeration of application data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Sms,
    VoiceDigital,
    VoiceAnalogPtt,
    Video,
    File,
    Relay,
    Unknown,
}

/// Priority classes in ascending numeric order; lower value is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum PriorityClass {
    AnalogVoicePtt = 0,
    DigitalVoice = 1,
    Data1 = 2,
    Data2 = 3,
    Data3 = 4,
    RxRelay = 5,
}

impl PriorityClass {
    /// Fixed mapping from data type to priority class, per the data model.
    /// `urgent` promotes `Sms`/`File` by one class (toward more urgent).
    pub fn from_data_type(data_type: DataType, urgent: bool) -> Self {
        let base = match data_type {
            DataType::VoiceAnalogPtt => PriorityClass::AnalogVoicePtt,
            DataType::VoiceDigital => PriorityClass::DigitalVoice,
            DataType::Video => PriorityClass::Data1,
            DataType::Sms => PriorityClass::Data2,
            DataType::File => PriorityClass::Data3,
            DataType::Relay => PriorityClass::RxRelay,
            DataType::Unknown => PriorityClass::Data3,
        };
        if urgent {
            base.promote()
        } else {
            base
        }
    }

    /// Promote to the next more-urgent class (one step toward index 0).
    fn promote(self) -> Self {
        match self {
            PriorityClass::Data3 => PriorityClass::Data2,
            PriorityClass::Data2 => PriorityClass::Data1,
            other => other,
        }
    }

    /// Index into the `data_from_l3` array of queues (0..=3 map onto the
    /// four data-plane priority classes; voice/relay are routed elsewhere).
    pub fn l3_queue_index(self) -> Option<usize> {
        match self {
            PriorityClass::DigitalVoice => Some(0),
            PriorityClass::Data1 => Some(1),
            PriorityClass::Data2 => Some(2),
            PriorityClass::Data3 => Some(3),
            PriorityClass::AnalogVoicePtt | PriorityClass::RxRelay => None,
        }
    }
}

/// Unicast/multicast/broadcast transmission type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionType {
    Unicast,
    Multicast,
    Broadcast,
}

/// Application packet exchanged across the `app_to_rrc` / `rrc_to_app`
/// boundary. `payload` is bounded by `payload_max_app` (a deployment
/// constant, see [`crate::config::RrcConfig`]); `data_size` records the
/// logical length and must never exceed the allocation.
#[derive(Debug, Clone)]
pub struct AppPacket {
    pub src_id: NodeAddress,
    pub dest_id: NodeAddress,
    pub data_type: DataType,
    pub transmission_type: TransmissionType,
    pub payload: Vec<u8>,
    pub sequence_number: u32,
    pub timestamp: u32,
    pub urgent: bool,
}

impl AppPacket {
    /// Build a synthetic delivery-failure notification for `rrc_to_app`;
    /// the payload begins with `"DELIVERY_FAILED"`.
    pub fn delivery_failed(dest_id: NodeAddress, reason: &str, now: u32) -> Self {
        AppPacket {
            src_id: dest_id,
            dest_id: SELF_DEFAULT,
            data_type: DataType::Unknown,
            transmission_type: TransmissionType::Unicast,
            payload: format!("DELIVERY_FAILED: {reason}").into_bytes(),
            sequence_number: 0,
            timestamp: now,
            urgent: false,
        }
    }
}

/// A single link-layer unit (not a time-frame).
///
/// Invariant: `payload.len() <= payload_max_link` (enforced by the caller
/// that constructs a frame, since the limit is deployment-configured).
#[derive(Debug, Clone)]
pub struct LinkFrame {
    pub source: NodeAddress,
    pub destination: NodeAddress,
    pub next_hop: NodeAddress,
    /// `true` = control/uplink (e.g. carries an OLSR body), `false` = app/downlink.
    pub rx_or_l3: bool,
    pub ttl: i32,
    pub priority: PriorityClass,
    pub data_type: DataType,
    pub payload: Vec<u8>,
}

impl LinkFrame {
    /// Decrement TTL for a relay hop. Returns `None` if the frame must be
    /// dropped (incoming TTL was already `<= 0`, or decrementing reaches 0).
    pub fn relayed(&self, new_next_hop: NodeAddress) -> Option<LinkFrame> {
        if self.ttl <= 0 {
            return None;
        }
        let ttl = self.ttl - 1;
        if ttl <= 0 {
            return None;
        }
        Some(LinkFrame {
            next_hop: new_next_hop,
            ttl,
            ..self.clone()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urgent_promotes_sms_and_file_one_class() {
        assert_eq!(
            PriorityClass::from_data_type(DataType::Sms, false),
            PriorityClass::Data2
        );
        assert_eq!(
            PriorityClass::from_data_type(DataType::Sms, true),
            PriorityClass::Data1
        );
        assert_eq!(
            PriorityClass::from_data_type(DataType::File, true),
            PriorityClass::Data2
        );
    }

    #[test]
    fn ptt_never_promoted_past_itself() {
        assert_eq!(
            PriorityClass::from_data_type(DataType::VoiceAnalogPtt, true),
            PriorityClass::AnalogVoicePtt
        );
    }

    #[test]
    fn relay_decrements_ttl_and_drops_at_zero() {
        let frame = LinkFrame {
            source: 1,
            destination: 7,
            next_hop: 5,
            rx_or_l3: false,
            ttl: 1,
            priority: PriorityClass::Data3,
            data_type: DataType::File,
            payload: vec![],
        };
        assert!(frame.relayed(4).is_none());

        let frame = LinkFrame { ttl: 2, ..frame };
        let relayed = frame.relayed(4).unwrap();
        assert_eq!(relayed.ttl, 1);
        assert_eq!(relayed.next_hop, 4);
    }

    #[test]
    fn relay_never_forwards_nonpositive_ttl() {
        let frame = LinkFrame {
            source: 1,
            destination: 7,
            next_hop: 5,
            rx_or_l3: false,
            ttl: 0,
            priority: PriorityClass::Data3,
            data_type: DataType::File,
            payload: vec![],
        };
        assert!(frame.relayed(4).is_none());
    }
}
