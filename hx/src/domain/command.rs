//! Valve commands issued by the coordinator

use serde::{Deserialize, Serialize};
use std::fmt;

use super::NodeId;

/// Command sent to a node's valve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValveCommand {
    /// Open the valve; `on_behalf_of` names the helped node when this node is a helper
    Open { on_behalf_of: Option<NodeId> },

    /// Close the valve if the node believes it is open
    Close,

    /// Actuate a close regardless of logical state (crash recovery)
    ForceClose { on_behalf_of: Option<NodeId> },
}

impl ValveCommand {
    pub fn open_for_self() -> Self {
        Self::Open { on_behalf_of: None }
    }

    pub fn open_for(helped: NodeId) -> Self {
        Self::Open {
            on_behalf_of: Some(helped),
        }
    }
}

impl fmt::Display for ValveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { on_behalf_of: None } => write!(f, "open"),
            Self::Open {
                on_behalf_of: Some(id),
            } => write!(f, "open(for {})", id),
            Self::Close => write!(f, "close"),
            Self::ForceClose { .. } => write!(f, "force-close"),
        }
    }
}

/// Successful result of a valve command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The actuator moved
    Actuated,
    /// Valve was already in the target state; nothing moved
    AlreadyInState,
}
