//! Central counter registry.
//!
//! Every named statistic in the system (`messages_enqueued_total`,
//! `nc_slots_assigned`, `slots_allocated`, `allocation_failures`, ...) gets
//! a home here rather than scattered local counters, since these are
//! touched from five independent worker threads and need one shared,
//! lock-free registry of relaxed atomics.

use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! counters {
    ($($name:ident),+ $(,)?) => {
        /// Process-wide counters, one per named statistic.
        #[derive(Default)]
        pub struct Stats {
            $(pub $name: AtomicU64),+
        }

        /// Point-in-time snapshot, used by the housekeeping worker's periodic
        /// log line and by tests asserting on counter values.
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
        pub struct StatsSnapshot {
            $(pub $name: u64),+
        }

        impl Stats {
            pub fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed)),+
                }
            }
        }
    };
}

counters!(
    messages_enqueued_total,
    messages_discarded_no_slots,
    route_discoveries_triggered,
    nc_slots_assigned,
    slots_allocated,
    allocation_failures,
    relay_packets_to_self,
    relay_packets_forwarded,
    relay_packets_ttl_expired,
    fsm_transitions,
    fsm_transitions_refused,
    connections_released,
);

impl Stats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "enqueued={} discarded_no_slots={} discoveries={} nc_assigned={} \
             slots_allocated={} alloc_failures={} relay_self={} relay_fwd={} \
             relay_ttl_expired={} fsm_transitions={} fsm_refused={} released={}",
            self.messages_enqueued_total,
            self.messages_discarded_no_slots,
            self.route_discoveries_triggered,
            self.nc_slots_assigned,
            self.slots_allocated,
            self.allocation_failures,
            self.relay_packets_to_self,
            self.relay_packets_forwarded,
            self.relay_packets_ttl_expired,
            self.fsm_transitions,
            self.fsm_transitions_refused,
            self.connections_released,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = Stats::default();
        Stats::incr(&stats.slots_allocated);
        Stats::incr(&stats.slots_allocated);
        Stats::incr(&stats.allocation_failures);
        let snap = stats.snapshot();
        assert_eq!(snap.slots_allocated, 2);
        assert_eq!(snap.allocation_failures, 1);
        assert_eq!(snap.nc_slots_assigned, 0);
    }
}
