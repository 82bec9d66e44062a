//! The RRC state machine. One instance of this is the node's global state;
//! each active connection context also carries its own instance.
//!
//! Transitions are an explicit table, matched exhaustively. There is no
//! default-case fallthrough: an event that is not allowed in the current
//! state is refused, logged, and counted, and the state does not change.
//! This mirrors the strict state-machine style used elsewhere in this
//! crate's own worker stepping (task phase is matched exhaustively before
//! acting, never falling through to a catch-all).

use std::collections::HashMap;
use std::sync::Mutex;

use crate::stats::Stats;
use crate::types::NodeAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Null,
    Idle,
    ConnectionSetup,
    Connected,
    Reconfiguration,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    PowerOn,
    DataRequest,
    RouteAndSlotsAllocated,
    SetupTimeout,
    NoRoute,
    RouteChange,
    ReconfigSuccess,
    ReconfigFail,
    ReconfigTimeout,
    InactivityTimeout,
    ExplicitRelease,
    ReleaseComplete,
    PowerOff,
}

/// Look up the next state for `(state, event)`, or `None` if the
/// transition is not allowed.
fn next_state(state: State, event: Event) -> Option<State> {
    if event == Event::PowerOff {
        return Some(State::Null);
    }
    match (state, event) {
        (State::Null, Event::PowerOn) => Some(State::Idle),
        (State::Idle, Event::DataRequest) => Some(State::ConnectionSetup),
        (State::ConnectionSetup, Event::RouteAndSlotsAllocated) => Some(State::Connected),
        (State::ConnectionSetup, Event::SetupTimeout) => Some(State::Idle),
        (State::ConnectionSetup, Event::NoRoute) => Some(State::Idle),
        (State::Connected, Event::RouteChange) => Some(State::Reconfiguration),
        (State::Reconfiguration, Event::ReconfigSuccess) => Some(State::Connected),
        (State::Reconfiguration, Event::ReconfigFail) => Some(State::Idle),
        (State::Reconfiguration, Event::ReconfigTimeout) => Some(State::Idle),
        (State::Connected, Event::InactivityTimeout) => Some(State::Release),
        (State::Connected, Event::ExplicitRelease) => Some(State::Release),
        (State::Reconfiguration, Event::InactivityTimeout) => Some(State::Release),
        (State::Reconfiguration, Event::ExplicitRelease) => Some(State::Release),
        (State::Release, Event::ReleaseComplete) => Some(State::Idle),
        _ => None,
    }
}

/// A single state holder, safe to share across threads. Used both for the
/// node-global FSM and for each per-connection context.
pub struct Fsm {
    state: Mutex<State>,
}

impl Default for Fsm {
    fn default() -> Self {
        Fsm {
            state: Mutex::new(State::Null),
        }
    }
}

impl Fsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> State {
        *self.state.lock().expect("lock poisoned")
    }

    /// Apply `event`. Returns the resulting state on success, or the
    /// unchanged current state if the transition was refused.
    pub fn apply(&self, event: Event, stats: &Stats) -> Result<State, State> {
        let mut guard = self.state.lock().expect("lock poisoned");
        match next_state(*guard, event) {
            Some(new_state) => {
                log::debug!("fsm: {:?} --{:?}--> {:?}", *guard, event, new_state);
                *guard = new_state;
                Stats::incr(&stats.fsm_transitions);
                Ok(new_state)
            }
            None => {
                log::warn!("fsm: refused {:?} in state {:?}", event, *guard);
                Stats::incr(&stats.fsm_transitions_refused);
                Err(*guard)
            }
        }
    }
}

struct ConnectionContext {
    fsm: Fsm,
    last_activity: u32,
    next_hop: Option<NodeAddress>,
}

/// One RRC connection context per destination node, each with its own FSM
/// instance: the same state shape applies both to the node-global state and
/// to each per-destination context. An entry that has fallen
/// back to `Idle` is dropped rather than kept around forever; a connection
/// pool entry only exists while a destination has unfinished business.
pub struct ConnectionPool {
    contexts: Mutex<HashMap<NodeAddress, ConnectionContext>>,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        ConnectionPool {
            contexts: Mutex::new(HashMap::new()),
        }
    }
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_of(&self, dest: NodeAddress) -> State {
        self.contexts
            .lock()
            .expect("lock poisoned")
            .get(&dest)
            .map(|c| c.fsm.current())
            .unwrap_or(State::Idle)
    }

    /// Move `dest` from `Idle` into `ConnectionSetup`, creating the context
    /// if this is its first activity.
    pub fn begin_setup(&self, dest: NodeAddress, now: u32, stats: &Stats) -> State {
        let mut contexts = self.contexts.lock().expect("lock poisoned");
        let ctx = contexts.entry(dest).or_insert_with(|| ConnectionContext {
            fsm: Fsm::new(),
            last_activity: now,
            next_hop: None,
        });
        if ctx.fsm.current() == State::Null {
            ctx.fsm.apply(Event::PowerOn, stats).ok();
        }
        ctx.last_activity = now;
        ctx.fsm.apply(Event::DataRequest, stats).unwrap_or_else(|s| s)
    }

    /// Report the outcome of a setup attempt (route + slot resolution).
    pub fn complete_setup(&self, dest: NodeAddress, now: u32, success: bool, stats: &Stats) -> State {
        let mut contexts = self.contexts.lock().expect("lock poisoned");
        let Some(ctx) = contexts.get_mut(&dest) else {
            return State::Idle;
        };
        ctx.last_activity = now;
        let event = if success {
            Event::RouteAndSlotsAllocated
        } else {
            Event::NoRoute
        };
        ctx.fsm.apply(event, stats).unwrap_or_else(|s| s)
    }

    pub fn touch_activity(&self, dest: NodeAddress, now: u32) {
        if let Some(ctx) = self.contexts.lock().expect("lock poisoned").get_mut(&dest) {
            ctx.last_activity = now;
        }
    }

    /// Record the next-hop currently in use for `dest`, so a later poor-link
    /// observation on that next-hop can find every connection relying on it.
    pub fn set_next_hop(&self, dest: NodeAddress, next_hop: NodeAddress) {
        if let Some(ctx) = self.contexts.lock().expect("lock poisoned").get_mut(&dest) {
            ctx.next_hop = Some(next_hop);
        }
    }

    /// Destinations whose context currently routes through `next_hop`.
    pub fn destinations_via(&self, next_hop: NodeAddress) -> Vec<NodeAddress> {
        self.contexts
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(_, ctx)| ctx.next_hop == Some(next_hop))
            .map(|(dest, _)| *dest)
            .collect()
    }

    /// Apply a route-change event to `dest`'s context, if one exists.
    pub fn route_change(&self, dest: NodeAddress, stats: &Stats) -> State {
        let contexts = self.contexts.lock().expect("lock poisoned");
        let Some(ctx) = contexts.get(&dest) else {
            return State::Idle;
        };
        ctx.fsm.apply(Event::RouteChange, stats).unwrap_or_else(|s| s)
    }

    /// Release any context connected or reconfiguring but idle past
    /// `timeout_secs`. Entries that land back in `Idle` are removed, since
    /// an absent entry and an `Idle` entry are equivalent.
    pub fn sweep_inactive(&self, now: u32, timeout_secs: u32, stats: &Stats) -> Vec<NodeAddress> {
        let mut contexts = self.contexts.lock().expect("lock poisoned");
        let mut released = Vec::new();
        contexts.retain(|dest, ctx| {
            let idle_for = now.saturating_sub(ctx.last_activity);
            if matches!(ctx.fsm.current(), State::Connected | State::Reconfiguration)
                && idle_for > timeout_secs
            {
                ctx.fsm.apply(Event::InactivityTimeout, stats).ok();
                ctx.fsm.apply(Event::ReleaseComplete, stats).ok();
                Stats::incr(&stats.connections_released);
                released.push(*dest);
                false
            } else {
                true
            }
        });
        released
    }

    pub fn active_count(&self) -> usize {
        self.contexts.lock().expect("lock poisoned").len()
    }
}
