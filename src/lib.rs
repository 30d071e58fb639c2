//! hwpool: a simulated bare-metal node pool for hardware-manager plugins.
//!
//! Clouds request groups of nodes through NodePool objects; the
//! [`adaptor`] satisfies them from a fixed [`inventory`] of machines and
//! publishes Node objects with BMC access and network interfaces.

pub mod adaptor;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod inventory;
