//! Neighbor and link-state table.
//!
//! A fixed-capacity table (default 40 entries, matching the NC slot space)
//! holding what RRC itself tracks about each neighbor: how long since it was
//! last heard from, its TX/RX slot bitmaps, PHY metrics, capability bits and
//! assigned NC slot. Lookup is linear — the table is small and the access
//! pattern is dominated by per-tick sweeps, not point queries, so there is no
//! payoff to a hash index over a plain `Vec` scan at this size.

use crate::messages::PhyMetrics;
use crate::types::NodeAddress;

pub const DEFAULT_CAPACITY: usize = 40;

/// Capability bits a neighbor may advertise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub relay: bool,
    pub gateway: bool,
}

#[derive(Debug, Clone)]
pub struct NeighborEntry {
    pub node_id: NodeAddress,
    pub last_heard_time: u32,
    pub tx_slot_bitmap: [u8; 10],
    pub rx_slot_bitmap: [u8; 10],
    pub metrics: PhyMetrics,
    pub capabilities: Capabilities,
    pub active: bool,
    /// `1..=40` when an NC slot is assigned, `0` otherwise.
    pub assigned_nc_slot: u8,
}

impl NeighborEntry {
    fn new(node_id: NodeAddress, now: u32) -> Self {
        NeighborEntry {
            node_id,
            last_heard_time: now,
            tx_slot_bitmap: [0; 10],
            rx_slot_bitmap: [0; 10],
            metrics: PhyMetrics::TIMEOUT_DEFAULT,
            capabilities: Capabilities::default(),
            active: true,
            assigned_nc_slot: 0,
        }
    }

    /// A link is "good" when active, heard recently, and its PHY metrics
    /// clear all of: PER <= 50%, RSSI >= -90 dBm, SNR >= 10 dB, and it was
    /// updated within the last 30s.
    pub fn link_is_good(&self, now: u32, neighbor_timeout_secs: u32) -> bool {
        self.active
            && now.saturating_sub(self.last_heard_time) <= neighbor_timeout_secs
            && self.metrics.per_percent <= 0.5
            && self.metrics.rssi_dbm >= -90.0
            && self.metrics.snr_db >= 10.0
    }
}

/// Fixed-capacity neighbor table.
pub struct NeighborTable {
    entries: Vec<NeighborEntry>,
    capacity: usize,
}

impl NeighborTable {
    pub fn new(capacity: usize) -> Self {
        NeighborTable {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get(&self, node_id: NodeAddress) -> Option<&NeighborEntry> {
        self.entries.iter().find(|e| e.node_id == node_id)
    }

    pub fn get_mut(&mut self, node_id: NodeAddress) -> Option<&mut NeighborEntry> {
        self.entries.iter_mut().find(|e| e.node_id == node_id)
    }

    /// Insert a new entry if the table has room and the node is unknown.
    /// Returns `false` if the table is full — there is no eviction policy
    /// here beyond the neighbor-silence timeout sweep.
    pub fn touch(&mut self, node_id: NodeAddress, now: u32) -> bool {
        if let Some(entry) = self.get_mut(node_id) {
            entry.last_heard_time = now;
            entry.active = true;
            return true;
        }
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push(NeighborEntry::new(node_id, now));
        true
    }

    pub fn update_metrics(&mut self, node_id: NodeAddress, metrics: PhyMetrics) {
        if let Some(entry) = self.get_mut(node_id) {
            entry.metrics = metrics;
        }
    }

    /// Mark entries unheard-from for longer than `timeout_secs` as inactive.
    /// Returns the node ids that changed from active to inactive this sweep.
    pub fn sweep_timeouts(&mut self, now: u32, timeout_secs: u32) -> Vec<NodeAddress> {
        let mut newly_inactive = Vec::new();
        for entry in self.entries.iter_mut() {
            if entry.active && now.saturating_sub(entry.last_heard_time) > timeout_secs {
                entry.active = false;
                newly_inactive.push(entry.node_id);
            }
        }
        newly_inactive
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_inserts_then_refreshes() {
        let mut table = NeighborTable::new(DEFAULT_CAPACITY);
        assert!(table.touch(5, 100));
        assert_eq!(table.len(), 1);
        assert!(table.touch(5, 150));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(5).unwrap().last_heard_time, 150);
    }

    #[test]
    fn full_table_rejects_new_nodes() {
        let mut table = NeighborTable::new(1);
        assert!(table.touch(1, 0));
        assert!(!table.touch(2, 0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn sweep_marks_stale_entries_inactive_once() {
        let mut table = NeighborTable::new(DEFAULT_CAPACITY);
        table.touch(1, 0);
        let stale = table.sweep_timeouts(31, 30);
        assert_eq!(stale, vec![1]);
        assert!(!table.get(1).unwrap().active);
        // Already-inactive entries don't repeat in the next sweep.
        let stale_again = table.sweep_timeouts(62, 30);
        assert!(stale_again.is_empty());
    }

    #[test]
    fn link_is_good_requires_all_thresholds() {
        let mut table = NeighborTable::new(DEFAULT_CAPACITY);
        table.touch(1, 0);
        table.update_metrics(
            1,
            PhyMetrics {
                rssi_dbm: -80.0,
                snr_db: 15.0,
                per_percent: 0.1,
            },
        );
        assert!(table.get(1).unwrap().link_is_good(10, 30));

        table.update_metrics(
            1,
            PhyMetrics {
                rssi_dbm: -95.0,
                snr_db: 15.0,
                per_percent: 0.1,
            },
        );
        assert!(!table.get(1).unwrap().link_is_good(10, 30));
    }

    #[test]
    fn link_is_good_false_when_stale() {
        let mut table = NeighborTable::new(DEFAULT_CAPACITY);
        table.touch(1, 0);
        table.update_metrics(
            1,
            PhyMetrics {
                rssi_dbm: -80.0,
                snr_db: 15.0,
                per_percent: 0.1,
            },
        );
        assert!(!table.get(1).unwrap().link_is_good(31, 30));
    }
}
