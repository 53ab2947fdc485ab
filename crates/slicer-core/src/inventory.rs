//! Per-node slice inventory records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::workload::WorkloadRef;

/// A value read from a repository together with the version it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The stored value
    pub value: T,
    /// Monotonic version, bumped on every successful write
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// Address of a slice on a device: `[start, start + size)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceRange {
    pub device_id: String,
    pub start: u32,
    pub size: u32,
}

impl SliceRange {
    pub fn new(device_id: impl Into<String>, start: u32, size: u32) -> Self {
        Self {
            device_id: device_id.into(),
            start,
            size,
        }
    }

    /// Exclusive end offset
    pub fn end(&self) -> u32 {
        self.start.saturating_add(self.size)
    }

    /// Whether two ranges share at least one unit on the same device
    pub fn overlaps(&self, other: &SliceRange) -> bool {
        self.device_id == other.device_id && self.start < other.end() && other.start < self.end()
    }
}

impl std::fmt::Display for SliceRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}..{})", self.device_id, self.start, self.end())
    }
}

/// A slice physically created on a device by the node agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedSlice {
    /// Workload the slice was created for
    pub owner_workload_id: String,
    /// Device the slice lives on
    pub parent_device_id: String,
    pub start: u32,
    pub size: u32,
    /// GPU instance id assigned by the driver
    pub gi_id: u32,
    /// Compute instance id assigned by the driver
    pub ci_id: u32,
}

impl PreparedSlice {
    pub fn range(&self) -> SliceRange {
        SliceRange::new(self.parent_device_id.clone(), self.start, self.size)
    }
}

/// Lifecycle of an allocation
///
/// Transitions only move forward: `Creating -> Created -> Ungated -> Deleting
/// -> Deleted`, after which the entry is removed from the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    /// Chosen by the controller, waiting for the node agent to create the slice
    Creating,
    /// Slice exists on the device
    Created,
    /// Workload released to the scheduler, steady state while running
    Ungated,
    /// Teardown requested, waiting for the node agent
    Deleting,
    /// Slice destroyed by the node agent, entry may be removed
    Deleted,
}

impl std::fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocationStatus::Creating => write!(f, "creating"),
            AllocationStatus::Created => write!(f, "created"),
            AllocationStatus::Ungated => write!(f, "ungated"),
            AllocationStatus::Deleting => write!(f, "deleting"),
            AllocationStatus::Deleted => write!(f, "deleted"),
        }
    }
}

/// Binding of one workload to one slice on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Requested profile, e.g. `1g.5gb`
    pub profile: String,
    pub start: u32,
    pub size: u32,
    /// UID of the owning workload; also the key in the allocation map
    pub workload_id: String,
    pub node_name: String,
    pub device_id: String,
    pub status: AllocationStatus,
    pub namespace: String,
    pub workload_name: String,
    /// Name under which the node agent advertises the slice as capacity
    pub resource_identifier: String,
    pub gi_profile_id: u32,
    pub ci_profile_id: u32,
    pub ci_eng_profile_id: u32,
    /// Requested CPU in millicores
    pub cpu_milli: i64,
    /// Requested memory in bytes
    pub memory: i64,
}

impl Allocation {
    pub fn range(&self) -> SliceRange {
        SliceRange::new(self.device_id.clone(), self.start, self.size)
    }

    /// Reference of the workload this allocation is bound to
    pub fn workload_ref(&self) -> WorkloadRef {
        WorkloadRef::new(self.namespace.clone(), self.workload_name.clone())
    }

    /// Copy of this allocation with a different status
    pub fn with_status(&self, status: AllocationStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// One address/size option offered for a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementOption {
    pub start: u32,
    pub size: u32,
}

/// Placement-table entry for a profile, populated by node discovery
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfilePlacement {
    /// GPU instance profile id
    pub gi_profile_id: u32,
    /// Compute instance profile id
    pub ci_profile_id: u32,
    /// Compute engine profile id
    pub ci_eng_profile_id: u32,
    pub placements: Vec<PlacementOption>,
}

/// Slice inventory of a single node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SliceInventoryRecord {
    pub node_name: String,
    /// Device ids present on the node
    #[serde(default)]
    pub devices: Vec<String>,
    /// Slice id -> slice created by the node agent
    #[serde(default)]
    pub prepared: BTreeMap<String, PreparedSlice>,
    /// Workload UID -> allocation
    #[serde(default)]
    pub allocations: BTreeMap<String, Allocation>,
    /// Profile name -> placement options
    #[serde(default)]
    pub placement_table: BTreeMap<String, ProfilePlacement>,
}

impl SliceInventoryRecord {
    /// Create an empty record for a node
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            ..Default::default()
        }
    }

    /// Allocation owned by the given workload UID, if any
    pub fn allocation(&self, workload_id: &str) -> Option<&Allocation> {
        self.allocations.get(workload_id)
    }

    /// Insert or replace the allocation keyed by its workload UID
    pub fn put_allocation(&mut self, allocation: Allocation) {
        self.allocations
            .insert(allocation.workload_id.clone(), allocation);
    }

    /// Remove the allocation keyed by the given workload UID
    pub fn remove_allocation(&mut self, workload_id: &str) -> Option<Allocation> {
        self.allocations.remove(workload_id)
    }

    /// Whether a prepared slice overlaps the range
    pub fn prepared_overlaps(&self, range: &SliceRange) -> bool {
        self.prepared.values().any(|p| p.range().overlaps(range))
    }

    /// Whether an allocation overlaps the range
    pub fn allocation_overlaps(&self, range: &SliceRange) -> bool {
        self.allocations.values().any(|a| a.range().overlaps(range))
    }

    /// Whether the range is unclaimed by both prepared slices and allocations
    pub fn is_range_free(&self, range: &SliceRange) -> bool {
        !self.prepared_overlaps(range) && !self.allocation_overlaps(range)
    }
}

/// Point-in-time view of every inventory record in the cluster
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    records: Vec<SliceInventoryRecord>,
}

impl InventorySnapshot {
    /// Build a snapshot, ordering records by node name
    pub fn new(mut records: Vec<SliceInventoryRecord>) -> Self {
        records.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SliceInventoryRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Allocation for a workload UID anywhere in the cluster
    pub fn find_by_workload_id(&self, workload_id: &str) -> Option<&Allocation> {
        self.records
            .iter()
            .find_map(|record| record.allocation(workload_id))
    }

    /// Allocation bound to a workload by namespace and name
    ///
    /// Used when the workload object is gone and its UID is unknown.
    pub fn find_by_ref(&self, workload: &WorkloadRef) -> Option<&Allocation> {
        self.allocations()
            .find(|a| a.namespace == workload.namespace && a.workload_name == workload.name)
    }

    /// Every allocation across all nodes
    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.records.iter().flat_map(|r| r.allocations.values())
    }
}

impl From<Vec<Versioned<SliceInventoryRecord>>> for InventorySnapshot {
    fn from(records: Vec<Versioned<SliceInventoryRecord>>) -> Self {
        Self::new(records.into_iter().map(|r| r.value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocation(uid: &str, device: &str, start: u32, size: u32) -> Allocation {
        Allocation {
            profile: "1g.5gb".to_string(),
            start,
            size,
            workload_id: uid.to_string(),
            node_name: "node-1".to_string(),
            device_id: device.to_string(),
            status: AllocationStatus::Creating,
            namespace: "default".to_string(),
            workload_name: format!("pod-{}", uid),
            resource_identifier: "res".to_string(),
            gi_profile_id: 19,
            ci_profile_id: 0,
            ci_eng_profile_id: 0,
            cpu_milli: 0,
            memory: 0,
        }
    }

    #[test]
    fn test_range_overlap() {
        let a = SliceRange::new("GPU-1", 0, 2);
        assert!(a.overlaps(&SliceRange::new("GPU-1", 1, 1)));
        assert!(!a.overlaps(&SliceRange::new("GPU-1", 2, 1)));
        assert!(!a.overlaps(&SliceRange::new("GPU-2", 0, 2)));
        assert_eq!(a.to_string(), "GPU-1[0..2)");
    }

    #[test]
    fn test_record_range_checks() {
        let mut record = SliceInventoryRecord::new("node-1");
        record.put_allocation(allocation("uid-1", "GPU-1", 0, 1));
        record.prepared.insert(
            "mig-1".to_string(),
            PreparedSlice {
                owner_workload_id: "uid-0".to_string(),
                parent_device_id: "GPU-1".to_string(),
                start: 4,
                size: 4,
                gi_id: 1,
                ci_id: 0,
            },
        );

        assert!(!record.is_range_free(&SliceRange::new("GPU-1", 0, 1)));
        assert!(record.prepared_overlaps(&SliceRange::new("GPU-1", 6, 1)));
        assert!(record.is_range_free(&SliceRange::new("GPU-1", 1, 1)));
        assert!(record.is_range_free(&SliceRange::new("GPU-2", 0, 1)));
    }

    #[test]
    fn test_snapshot_lookup_and_ordering() {
        let mut b = SliceInventoryRecord::new("node-b");
        b.put_allocation(allocation("uid-2", "GPU-2", 0, 1));
        let a = SliceInventoryRecord::new("node-a");

        let snapshot = InventorySnapshot::new(vec![b, a]);
        assert_eq!(snapshot.records()[0].node_name, "node-a");
        assert!(snapshot.find_by_workload_id("uid-2").is_some());
        assert!(snapshot.find_by_workload_id("uid-3").is_none());

        let found = snapshot.find_by_ref(&WorkloadRef::new("default", "pod-uid-2"));
        assert_eq!(found.map(|a| a.workload_id.as_str()), Some("uid-2"));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&AllocationStatus::Ungated).unwrap();
        assert_eq!(json, "\"ungated\"");
        let status: AllocationStatus = serde_json::from_str("\"deleting\"").unwrap();
        assert_eq!(status, AllocationStatus::Deleting);
    }
}
