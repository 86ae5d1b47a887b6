//! Engine lifecycle states.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where an engine version is in its lifecycle.
///
/// ```text
/// Unregistered -> Installing -> Waiting -> Activating -> Active
///                      \            \                      \
///                       +------------+----------------------+--> Redundant
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Unregistered,
    Installing,
    Waiting,
    Activating,
    Active,
    Redundant,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unregistered, Installing)
                | (Installing, Waiting)
                | (Installing, Redundant)
                | (Waiting, Activating)
                | (Waiting, Redundant)
                | (Activating, Active)
                | (Active, Redundant)
        )
    }

    /// Only an active engine answers intercepted requests.
    pub fn is_controlling(self) -> bool {
        self == LifecycleState::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Unregistered => "unregistered",
            LifecycleState::Installing => "installing",
            LifecycleState::Waiting => "waiting",
            LifecycleState::Activating => "activating",
            LifecycleState::Active => "active",
            LifecycleState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
