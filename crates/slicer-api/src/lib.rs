//! slicer-api: REST API server for slicer
//!
//! This crate provides the REST API for interacting with a standalone slicer:
//! - Inventory publishing and inspection
//! - Workload submission, update and deletion
//! - Allocation listing and system status

pub mod rest;

pub use rest::create_router;
