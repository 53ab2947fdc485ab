//! slicer-store: Repositories for slicer
//!
//! This crate provides the storage seams the controller works against:
//! - Inventory and workload repository traits
//! - In-memory implementations with optimistic concurrency
//! - Change notifications for the controller's watch loop

pub mod inventory;
pub mod traits;
pub mod workloads;

pub use inventory::MemoryInventory;
pub use traits::{InventoryRepository, WatchEvent, WorkloadRepository};
pub use workloads::MemoryWorkloads;
