//! In-memory workload repository
//!
//! Mirrors the object-store rules the controller relies on: every write bumps
//! the resource version, stale writes are rejected, and a deletion request on
//! an object with finalizers only stamps a deletion timestamp. The object goes
//! away once its last finalizer is removed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slicer_core::{SliceError, SliceResult, Workload, WorkloadRef};
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::traits::{WatchEvent, WorkloadRepository};

const EVENT_CAPACITY: usize = 1024;

struct WorkloadState {
    objects: BTreeMap<WorkloadRef, Workload>,
    last_version: u64,
}

/// Workload objects held in memory
pub struct MemoryWorkloads {
    state: RwLock<WorkloadState>,
    events: broadcast::Sender<WatchEvent<Workload>>,
}

impl MemoryWorkloads {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(WorkloadState {
                objects: BTreeMap::new(),
                last_version: 0,
            }),
            events,
        }
    }

    /// Subscribe to workload changes
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent<Workload>> {
        self.events.subscribe()
    }

    /// Store a new workload
    pub async fn create(&self, mut workload: Workload) -> SliceResult<Workload> {
        let mut state = self.state.write().await;
        let key = workload.reference();
        if state.objects.contains_key(&key) {
            return Err(SliceError::AlreadyExists(key.to_string()));
        }

        state.last_version += 1;
        workload.resource_version = state.last_version;
        state.objects.insert(key.clone(), workload.clone());

        info!(workload = %key, uid = %workload.uid, "Workload created");
        let _ = self.events.send(WatchEvent::Applied(workload.clone()));
        Ok(workload)
    }

    /// Request deletion of a workload
    ///
    /// Returns the object still held back by finalizers, or `None` if it was
    /// removed immediately.
    pub async fn request_deletion(
        &self,
        workload: &WorkloadRef,
        at: DateTime<Utc>,
    ) -> SliceResult<Option<Workload>> {
        let mut state = self.state.write().await;
        let current = state
            .objects
            .get(workload)
            .cloned()
            .ok_or_else(|| SliceError::WorkloadNotFound(workload.to_string()))?;

        if current.finalizers.is_empty() {
            state.objects.remove(workload);
            info!(workload = %workload, "Workload deleted");
            let _ = self.events.send(WatchEvent::Deleted(current));
            return Ok(None);
        }

        if current.is_being_deleted() {
            return Ok(Some(current));
        }

        let mut updated = current;
        updated.deletion_timestamp = Some(at);
        state.last_version += 1;
        updated.resource_version = state.last_version;
        state.objects.insert(workload.clone(), updated.clone());

        debug!(
            workload = %workload,
            finalizers = ?updated.finalizers,
            "Deletion requested, waiting for finalizers"
        );
        let _ = self.events.send(WatchEvent::Applied(updated.clone()));
        Ok(Some(updated))
    }

    /// Number of stored workloads
    pub async fn len(&self) -> usize {
        self.state.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryWorkloads {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkloadRepository for MemoryWorkloads {
    async fn get(&self, workload: &WorkloadRef) -> SliceResult<Option<Workload>> {
        Ok(self.state.read().await.objects.get(workload).cloned())
    }

    async fn list(&self, namespace: Option<&str>) -> SliceResult<Vec<Workload>> {
        let state = self.state.read().await;
        Ok(state
            .objects
            .values()
            .filter(|w| namespace.map_or(true, |ns| w.namespace == ns))
            .cloned()
            .collect())
    }

    async fn update(&self, mut workload: Workload) -> SliceResult<Workload> {
        let mut state = self.state.write().await;
        let key = workload.reference();
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| SliceError::WorkloadNotFound(key.to_string()))?;

        if current.resource_version != workload.resource_version || current.uid != workload.uid {
            return Err(SliceError::Conflict {
                key: key.to_string(),
                expected: workload.resource_version,
                actual: current.resource_version,
            });
        }

        // A deletion timestamp can be set but never cleared by an update.
        if current.deletion_timestamp.is_some() {
            workload.deletion_timestamp = current.deletion_timestamp;
        }

        state.last_version += 1;
        workload.resource_version = state.last_version;

        if workload.is_being_deleted() && workload.finalizers.is_empty() {
            state.objects.remove(&key);
            info!(workload = %key, "Last finalizer removed, workload deleted");
            let _ = self.events.send(WatchEvent::Deleted(workload.clone()));
            return Ok(workload);
        }

        state.objects.insert(key, workload.clone());
        let _ = self.events.send(WatchEvent::Applied(workload.clone()));
        Ok(workload)
    }
}
