//! Access kinds.
//!
//! Every field declares how the outside world may use it. Checks only
//! apply to callers other than the owning node, and can be switched off
//! per field.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a field may be read, written and routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessType {
    /// Set once before the owning node is initialized; cannot be routed to.
    InitializeOnly,
    /// Written only by the owning node; may be routed from.
    Output,
    /// Written from outside; may not be routed from or read by others.
    Input,
    /// No restrictions.
    #[default]
    InputOutput,
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessType::InitializeOnly => "initializeOnly",
            AccessType::Output => "outputOnly",
            AccessType::Input => "inputOnly",
            AccessType::InputOutput => "inputOutput",
        };
        f.write_str(name)
    }
}

impl AccessType {
    /// Reason a route out of a field with this access kind is refused.
    pub(crate) fn route_out_denied(self) -> Option<&'static str> {
        match self {
            AccessType::Input => Some("cannot route from it outside its node"),
            _ => None,
        }
    }

    /// Reason a route into a field with this access kind is refused.
    pub(crate) fn route_in_denied(self) -> Option<&'static str> {
        match self {
            AccessType::InitializeOnly => Some("cannot be routed to"),
            AccessType::Output => Some("cannot be routed to from outside its node"),
            _ => None,
        }
    }

    /// Reason a write from outside the owning node is refused.
    pub(crate) fn set_denied(self, node_initialized: bool) -> Option<&'static str> {
        match self {
            AccessType::InitializeOnly if node_initialized => {
                Some("cannot be set after initialization")
            }
            AccessType::Output => Some("cannot be set from outside its node"),
            _ => None,
        }
    }

    /// Reason a read from outside the owning node is refused.
    ///
    /// An input field that already routes somewhere is readable; nodes
    /// rely on that when they forward their inputs.
    pub(crate) fn get_denied(self, has_routes_out: bool) -> Option<&'static str> {
        match self {
            AccessType::Input if !has_routes_out => {
                Some("cannot be read from outside its node")
            }
            _ => None,
        }
    }
}
