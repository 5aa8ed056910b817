//! Service states, priorities, and the per-service state machine.

mod machine;

pub use machine::{StateMachine, TransitionCallback};

use serde::Serialize;

/// Lifecycle state of a single service
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::FromRepr,
)]
#[repr(u8)]
pub enum ServiceState {
    #[default]
    Uninitialized = 0,
    Initialized = 1,
    Starting = 2,
    Running = 3,
    Stopping = 4,
    Stopped = 5,
    Error = 6,
}

/// Start priority within a dependency level. Lower values start first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ServicePriority(pub i32);

impl ServicePriority {
    pub const HIGHEST: Self = Self(0);
    pub const HIGH: Self = Self(25);
    pub const NORMAL: Self = Self(50);
    pub const LOW: Self = Self(75);
    pub const LOWEST: Self = Self(100);
}

impl Default for ServicePriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<i32> for ServicePriority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ServicePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_state_repr_round_trip() {
        for state in ServiceState::iter() {
            assert_eq!(ServiceState::from_repr(state as u8), Some(state));
        }
        assert_eq!(ServiceState::from_repr(7), None);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ServiceState::Uninitialized.to_string(), "Uninitialized");
        assert_eq!(ServiceState::Error.to_string(), "Error");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(ServicePriority::HIGHEST < ServicePriority::NORMAL);
        assert!(ServicePriority::LOW < ServicePriority::LOWEST);
        assert_eq!(ServicePriority::default(), ServicePriority(50));
    }
}
