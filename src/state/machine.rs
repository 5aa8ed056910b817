//! Atomic finite automaton enforcing legal lifecycle transitions.

use super::ServiceState;
use crate::error::{Result, ServiceError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Invoked inline after every successful transition with `(from, to)`.
///
/// Runs on the transitioning task, so it must not block.
pub type TransitionCallback = Arc<dyn Fn(ServiceState, ServiceState) + Send + Sync>;

/// Per-service state machine.
///
/// The current state is a single atomic and only changes through
/// [`transition_to`](Self::transition_to) (a validated compare-and-swap) or
/// [`reset`](Self::reset). The transition table is edited through `&mut self`
/// only, so it cannot change while transitions are in flight.
pub struct StateMachine {
    state: AtomicU8,
    transitions: HashMap<ServiceState, HashSet<ServiceState>>,
    on_transition: Option<TransitionCallback>,
}

impl StateMachine {
    /// Create a state machine with the default transition table
    pub fn new(initial: ServiceState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
            transitions: default_transitions(),
            on_transition: None,
        }
    }

    /// Create a state machine that reports transitions to `callback`
    pub fn with_callback(initial: ServiceState, callback: TransitionCallback) -> Self {
        Self {
            on_transition: Some(callback),
            ..Self::new(initial)
        }
    }

    /// Current state (lock-free)
    pub fn current(&self) -> ServiceState {
        decode(self.state.load(Ordering::Acquire))
    }

    /// Attempt to move to `new_state`.
    ///
    /// Fails with `InvalidStateTransition` when the table has no edge from
    /// the observed state, and with `ConcurrentStateChange` when another
    /// transition lands between the check and the swap. No retry happens
    /// here.
    pub fn transition_to(&self, new_state: ServiceState) -> Result<()> {
        let current = self.current();

        if !self.can_transition(current, new_state) {
            return Err(ServiceError::InvalidStateTransition {
                from: current,
                to: new_state,
            });
        }

        self.state
            .compare_exchange(
                current as u8,
                new_state as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|actual| ServiceError::ConcurrentStateChange {
                expected: current,
                actual: decode(actual),
            })?;

        if let Some(callback) = &self.on_transition {
            callback(current, new_state);
        }
        Ok(())
    }

    /// Whether the table allows `from -> to`
    pub fn can_transition(&self, from: ServiceState, to: ServiceState) -> bool {
        self.transitions
            .get(&from)
            .is_some_and(|allowed| allowed.contains(&to))
    }

    /// States reachable from `from` in one step
    pub fn allowed_from(&self, from: ServiceState) -> Vec<ServiceState> {
        let mut allowed: Vec<_> = self
            .transitions
            .get(&from)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        allowed.sort();
        allowed
    }

    /// Allow additional transitions out of `from`
    pub fn add_transition(&mut self, from: ServiceState, to: &[ServiceState]) {
        self.transitions
            .entry(from)
            .or_default()
            .extend(to.iter().copied());
    }

    /// Disallow `from -> to`
    pub fn remove_transition(&mut self, from: ServiceState, to: ServiceState) {
        if let Some(allowed) = self.transitions.get_mut(&from) {
            allowed.remove(&to);
        }
    }

    /// Overwrite the state without validation or callback.
    ///
    /// Manual recovery only; normal flow goes through `transition_to`.
    pub fn reset(&self, state: ServiceState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.current())
            .finish_non_exhaustive()
    }
}

fn decode(raw: u8) -> ServiceState {
    // only valid discriminants are ever stored
    ServiceState::from_repr(raw).unwrap_or(ServiceState::Error)
}

fn default_transitions() -> HashMap<ServiceState, HashSet<ServiceState>> {
    use ServiceState::*;

    HashMap::from([
        (Uninitialized, HashSet::from([Initialized])),
        (Initialized, HashSet::from([Starting])),
        (Starting, HashSet::from([Running, Error])),
        (Running, HashSet::from([Stopping, Error])),
        (Stopping, HashSet::from([Stopped, Error])),
        (Stopped, HashSet::from([Starting])),
        (Error, HashSet::from([Initialized, Stopped])),
    ])
}
