//! Scheduling gate and cleanup finalizer handling
//!
//! The gate keeps a workload off the scheduler until its slice exists; the
//! finalizer keeps the object around until its slice is reclaimed. Methods
//! return modified copies and leave the write to the caller.

use slicer_core::{ControllerConfig, Workload, WorkloadPhase};

/// Owner of one named gate and one named finalizer
#[derive(Debug, Clone)]
pub struct GateCoordinator {
    gate_name: String,
    finalizer_name: String,
    node_selector_key: String,
}

impl GateCoordinator {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            gate_name: config.gate_name.clone(),
            finalizer_name: config.finalizer_name.clone(),
            node_selector_key: config.node_selector_key.clone(),
        }
    }

    /// Held back by a gate this coordinator does not own
    pub fn is_gated_by_others(&self, workload: &Workload) -> bool {
        workload.has_foreign_gate(&self.gate_name)
    }

    /// Pending and still carrying our gate
    pub fn is_gated(&self, workload: &Workload) -> bool {
        workload.phase == WorkloadPhase::Pending && workload.has_gate(&self.gate_name)
    }

    pub fn has_finalizer(&self, workload: &Workload) -> bool {
        workload.has_finalizer(&self.finalizer_name)
    }

    /// Copy with our finalizer added, or `None` if already present
    pub fn with_finalizer(&self, workload: &Workload) -> Option<Workload> {
        let mut updated = workload.clone();
        updated.add_finalizer(&self.finalizer_name).then_some(updated)
    }

    /// Copy with our finalizer removed, or `None` if absent
    pub fn without_finalizer(&self, workload: &Workload) -> Option<Workload> {
        let mut updated = workload.clone();
        updated.remove_finalizer(&self.finalizer_name).then_some(updated)
    }

    /// Copy pinned to `node_name` with our gate removed
    ///
    /// Both changes travel in one write so the workload can only become
    /// schedulable on the node that holds its slice. Returns `None` when the
    /// workload is already in that state.
    pub fn released_to(&self, workload: &Workload, node_name: &str) -> Option<Workload> {
        let mut updated = workload.clone();
        let pinned = updated
            .node_selector
            .insert(self.node_selector_key.clone(), node_name.to_string())
            .as_deref()
            != Some(node_name);
        let ungated = updated.remove_gate(&self.gate_name);
        (pinned || ungated).then_some(updated)
    }
}
