//! slicer-core: Core types for the slicer allocator
//!
//! This crate provides the fundamental types used throughout slicer:
//! - Slice inventory records and allocations
//! - Workload objects and references
//! - Slice request extraction and resource quantities
//! - Configuration types
//! - Error handling

pub mod config;
pub mod error;
pub mod inventory;
pub mod quantity;
pub mod request;
pub mod time;
pub mod workload;

pub use config::*;
pub use error::*;
pub use inventory::*;
pub use quantity::Quantity;
pub use request::{profile_from_resource, SliceRequest};
pub use time::{Clock, ManualClock, SystemClock};
pub use workload::*;
