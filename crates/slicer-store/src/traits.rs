//! Repository trait definitions

use async_trait::async_trait;
use slicer_core::{SliceInventoryRecord, SliceResult, Versioned, Workload, WorkloadRef};

/// Change notification emitted by a repository
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<T> {
    /// Object created or updated; carries the new value
    Applied(T),
    /// Object removed; carries the last stored value
    Deleted(T),
}

impl<T> WatchEvent<T> {
    pub fn object(&self) -> &T {
        match self {
            WatchEvent::Applied(obj) | WatchEvent::Deleted(obj) => obj,
        }
    }
}

/// Versioned store of per-node slice inventory
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// List every record
    async fn list(&self) -> SliceResult<Vec<Versioned<SliceInventoryRecord>>>;

    /// Get one record by node name
    ///
    /// Fails with `RecordNotFound` if the node has no record.
    async fn get(&self, node_name: &str) -> SliceResult<Versioned<SliceInventoryRecord>>;

    /// Replace a record if it is still at `expected_version`
    ///
    /// Returns the new version, or `Conflict` if another writer got there first.
    async fn update(
        &self,
        record: SliceInventoryRecord,
        expected_version: u64,
    ) -> SliceResult<u64>;
}

/// Versioned store of workload objects
#[async_trait]
pub trait WorkloadRepository: Send + Sync {
    /// Get a workload; `None` if it does not exist
    async fn get(&self, workload: &WorkloadRef) -> SliceResult<Option<Workload>>;

    /// List workloads, optionally restricted to one namespace
    async fn list(&self, namespace: Option<&str>) -> SliceResult<Vec<Workload>>;

    /// Write a workload read at `workload.resource_version`
    ///
    /// Returns the stored object with its new version, or `Conflict` if the
    /// object changed since it was read. A workload that is being deleted and
    /// has no finalizers left is removed instead of stored.
    async fn update(&self, workload: Workload) -> SliceResult<Workload>;
}
