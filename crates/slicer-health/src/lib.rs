//! slicer-health: Node health oracle
//!
//! This crate answers "is the node-local capacity component usable?":
//! - The oracle trait the controller consults before ungating
//! - A device-plugin check over the workload repository
//! - A fixed oracle for externally managed plugins and tests

pub mod fixed;
pub mod oracle;

pub use fixed::FixedHealth;
pub use oracle::{DevicePluginHealth, NodeHealthOracle};
