//! slicer-controller: Slice allocation controller
//!
//! This crate moves workloads from gated to running and back:
//! - Reconciliation passes over one workload at a time
//! - Gate and finalizer bookkeeping
//! - Mapping of inventory and workload changes to queued passes
//! - The driver that serializes passes per workload

pub mod controller;
pub mod coordinator;
pub mod directive;
pub mod events;
pub mod reconciler;

pub use controller::{Controller, WorkQueue};
pub use coordinator::GateCoordinator;
pub use directive::Directive;
pub use events::{watch_inventory, watch_workloads, workloads_to_wake};
pub use reconciler::Reconciler;
