//! Slice placement decisions

use slicer_core::{
    Allocation, AllocationStatus, InventorySnapshot, PlacementPolicyKind, SliceError,
    SliceRange, SliceResult,
};
use std::sync::Arc;

use crate::first_fit::FirstFitStrategy;

/// What is being placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementRequest {
    /// Requested profile, e.g. `1g.5gb`
    pub profile: String,
    pub workload_id: String,
    pub namespace: String,
    pub workload_name: String,
    /// Identifier the node agent will advertise the slice under
    pub resource_identifier: String,
    pub cpu_milli: i64,
    pub memory: i64,
}

/// Where a slice goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub node_name: String,
    pub device_id: String,
    pub start: u32,
    pub size: u32,
    pub gi_profile_id: u32,
    pub ci_profile_id: u32,
    pub ci_eng_profile_id: u32,
    pub request: PlacementRequest,
}

impl Placement {
    pub fn range(&self) -> SliceRange {
        SliceRange::new(self.device_id.clone(), self.start, self.size)
    }

    /// Turn the placement into an inventory allocation
    pub fn into_allocation(self, status: AllocationStatus) -> Allocation {
        Allocation {
            profile: self.request.profile,
            start: self.start,
            size: self.size,
            workload_id: self.request.workload_id,
            node_name: self.node_name,
            device_id: self.device_id,
            status,
            namespace: self.request.namespace,
            workload_name: self.request.workload_name,
            resource_identifier: self.request.resource_identifier,
            gi_profile_id: self.gi_profile_id,
            ci_profile_id: self.ci_profile_id,
            ci_eng_profile_id: self.ci_eng_profile_id,
            cpu_milli: self.request.cpu_milli,
            memory: self.request.memory,
        }
    }
}

/// Result of a placement search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    Placed(Placement),
    NoCapacity,
}

/// Strategy for choosing a slice
pub trait PlacementStrategy: Send + Sync {
    /// Search the snapshot for a slice that fits the request
    ///
    /// Must not touch the snapshot; the caller owns the write.
    fn place(
        &self,
        request: &PlacementRequest,
        snapshot: &InventorySnapshot,
    ) -> SliceResult<PlacementOutcome>;

    /// Strategy name for logging
    fn name(&self) -> &'static str;
}

/// Declared strategy without an implementation
///
/// Fails loudly so a missing strategy is never read as "no capacity".
pub struct ReservedStrategy {
    kind: PlacementPolicyKind,
}

impl PlacementStrategy for ReservedStrategy {
    fn place(
        &self,
        _request: &PlacementRequest,
        _snapshot: &InventorySnapshot,
    ) -> SliceResult<PlacementOutcome> {
        Err(SliceError::PolicyUnimplemented(self.kind.to_string()))
    }

    fn name(&self) -> &'static str {
        match self.kind {
            PlacementPolicyKind::FirstFit => "first-fit",
            PlacementPolicyKind::LeftToRight => "left-to-right",
            PlacementPolicyKind::RightToLeft => "right-to-left",
        }
    }
}

/// Strategy for a configured policy
pub fn strategy_for(kind: PlacementPolicyKind) -> Arc<dyn PlacementStrategy> {
    match kind {
        PlacementPolicyKind::FirstFit => Arc::new(FirstFitStrategy),
        reserved => Arc::new(ReservedStrategy { kind: reserved }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PlacementRequest {
        PlacementRequest {
            profile: "1g.5gb".to_string(),
            workload_id: "uid-1".to_string(),
            namespace: "default".to_string(),
            workload_name: "w1".to_string(),
            resource_identifier: "res-1".to_string(),
            cpu_milli: 500,
            memory: 1024,
        }
    }

    #[test]
    fn test_reserved_strategies_fail_loudly() {
        for kind in [PlacementPolicyKind::LeftToRight, PlacementPolicyKind::RightToLeft] {
            let strategy = strategy_for(kind);
            let result = strategy.place(&request(), &InventorySnapshot::empty());
            assert!(matches!(result, Err(SliceError::PolicyUnimplemented(_))));
        }
    }

    #[test]
    fn test_strategy_for_first_fit() {
        let strategy = strategy_for(PlacementPolicyKind::FirstFit);
        assert_eq!(strategy.name(), "first-fit");
        let result = strategy.place(&request(), &InventorySnapshot::empty()).unwrap();
        assert_eq!(result, PlacementOutcome::NoCapacity);
    }

    #[test]
    fn test_into_allocation() {
        let placement = Placement {
            node_name: "node-1".to_string(),
            device_id: "GPU-1".to_string(),
            start: 2,
            size: 1,
            gi_profile_id: 19,
            ci_profile_id: 0,
            ci_eng_profile_id: 0,
            request: request(),
        };
        assert_eq!(placement.range(), SliceRange::new("GPU-1", 2, 1));

        let allocation = placement.into_allocation(AllocationStatus::Creating);
        assert_eq!(allocation.workload_id, "uid-1");
        assert_eq!(allocation.node_name, "node-1");
        assert_eq!(allocation.status, AllocationStatus::Creating);
        assert_eq!(allocation.gi_profile_id, 19);
        assert_eq!(allocation.cpu_milli, 500);
        assert_eq!(allocation.memory, 1024);
    }
}
