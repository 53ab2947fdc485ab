//! Workload object model
//!
//! A workload is the schedulable unit (a pod) that requests a slice. Only the
//! fields the allocator reads or writes are modelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::SliceError;

/// Resource name -> quantity string (e.g. `"nvidia.com/mig-1g.5gb": "1"`)
pub type ResourceList = BTreeMap<String, String>;

/// Namespaced reference to a workload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub namespace: String,
    pub name: String,
}

impl WorkloadRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl std::str::FromStr for WorkloadRef {
    type Err = SliceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(SliceError::Config(format!(
                "invalid workload reference '{}', expected <namespace>/<name>",
                s
            ))),
        }
    }
}

/// Lifecycle phase of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WorkloadPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl WorkloadPhase {
    /// Whether the workload has finished and will not run again
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkloadPhase::Succeeded | WorkloadPhase::Failed)
    }
}

impl std::fmt::Display for WorkloadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadPhase::Pending => write!(f, "Pending"),
            WorkloadPhase::Running => write!(f, "Running"),
            WorkloadPhase::Succeeded => write!(f, "Succeeded"),
            WorkloadPhase::Failed => write!(f, "Failed"),
            WorkloadPhase::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Status condition reported on a workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type, e.g. `Ready`
    #[serde(rename = "type")]
    pub condition_type: String,
    /// `True`, `False` or `Unknown`
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub fn new(condition_type: &str, status: &str) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: status.to_string(),
            message: String::new(),
        }
    }
}

/// Resource requirements of a container
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub limits: ResourceList,
    #[serde(default)]
    pub requests: ResourceList,
}

/// A container of a workload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub resources: Resources,
}

/// A schedulable workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub uid: String,
    pub namespace: String,
    pub name: String,
    /// Store version, maintained by the workload repository
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub scheduling_gates: Vec<String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub phase: WorkloadPhase,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl Workload {
    /// Create a pending workload with a fresh UID
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            namespace: namespace.into(),
            name: name.into(),
            resource_version: 0,
            scheduling_gates: Vec::new(),
            finalizers: Vec::new(),
            node_selector: BTreeMap::new(),
            containers: Vec::new(),
            phase: WorkloadPhase::Pending,
            conditions: Vec::new(),
            deletion_timestamp: None,
        }
    }

    pub fn reference(&self) -> WorkloadRef {
        WorkloadRef::new(self.namespace.clone(), self.name.clone())
    }

    pub fn has_gate(&self, gate: &str) -> bool {
        self.scheduling_gates.iter().any(|g| g == gate)
    }

    /// Whether any gate other than `own_gate` is present
    pub fn has_foreign_gate(&self, own_gate: &str) -> bool {
        self.scheduling_gates.iter().any(|g| g != own_gate)
    }

    /// Remove a gate; returns true if it was present
    pub fn remove_gate(&mut self, gate: &str) -> bool {
        let before = self.scheduling_gates.len();
        self.scheduling_gates.retain(|g| g != gate);
        before != self.scheduling_gates.len()
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Add a finalizer; returns true if it was not already present
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Remove a finalizer; returns true if it was present
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }

    /// Condition of the given type, if reported
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_ref_parse() {
        let r: WorkloadRef = "default/w1".parse().unwrap();
        assert_eq!(r, WorkloadRef::new("default", "w1"));
        assert_eq!(r.to_string(), "default/w1");

        assert!("w1".parse::<WorkloadRef>().is_err());
        assert!("/w1".parse::<WorkloadRef>().is_err());
        assert!("a/b/c".parse::<WorkloadRef>().is_err());
    }

    #[test]
    fn test_gates_and_finalizers() {
        let mut w = Workload::new("default", "w1");
        w.scheduling_gates = vec!["slicer.io/accelerator".to_string()];

        assert!(w.has_gate("slicer.io/accelerator"));
        assert!(!w.has_foreign_gate("slicer.io/accelerator"));

        w.scheduling_gates.push("other.io/quota".to_string());
        assert!(w.has_foreign_gate("slicer.io/accelerator"));

        assert!(w.remove_gate("slicer.io/accelerator"));
        assert!(!w.remove_gate("slicer.io/accelerator"));

        assert!(w.add_finalizer("slicer.io/accelerator"));
        assert!(!w.add_finalizer("slicer.io/accelerator"));
        assert_eq!(w.finalizers.len(), 1);
        assert!(w.remove_finalizer("slicer.io/accelerator"));
        assert!(w.finalizers.is_empty());
    }

    #[test]
    fn test_terminal_phases() {
        assert!(WorkloadPhase::Failed.is_terminal());
        assert!(WorkloadPhase::Succeeded.is_terminal());
        assert!(!WorkloadPhase::Running.is_terminal());
        assert!(!WorkloadPhase::Pending.is_terminal());
    }

    #[test]
    fn test_workload_deserialize_defaults() {
        let json = r#"{"uid":"u1","namespace":"default","name":"w1"}"#;
        let w: Workload = serde_json::from_str(json).unwrap();
        assert_eq!(w.phase, WorkloadPhase::Pending);
        assert!(w.scheduling_gates.is_empty());
        assert!(!w.is_being_deleted());
    }
}
