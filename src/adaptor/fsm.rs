//! NodePool lifecycle classification
//!
//! Evaluated fresh on every reconcile from the recorded status; nothing is
//! persisted beyond the NodePool's own conditions and observed generation.

use std::fmt;

use crate::cluster::NodePool;

/// What a reconcile should do with a NodePool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePoolAction {
    /// No condition recorded yet
    Create,
    /// Provisioning started but not complete
    Processing,
    /// Provisioned, but the spec changed since
    SpecChanged,
    /// Nothing to do
    Noop,
}

impl fmt::Display for NodePoolAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "Create",
            Self::Processing => "Processing",
            Self::SpecChanged => "SpecChanged",
            Self::Noop => "Noop",
        };
        f.write_str(s)
    }
}

/// Classify a NodePool by its status
pub fn determine_action(pool: &NodePool) -> NodePoolAction {
    if pool.status.conditions.is_empty() {
        return NodePoolAction::Create;
    }

    match pool.provisioned_condition() {
        None => NodePoolAction::Noop,
        Some(c) if !c.is_true() => NodePoolAction::Processing,
        Some(_) if pool.metadata.generation != pool.status.observed_generation => {
            NodePoolAction::SpecChanged
        }
        Some(_) => NodePoolAction::Noop,
    }
}
