//! In-memory inventory repository

use async_trait::async_trait;
use slicer_core::{SliceError, SliceInventoryRecord, SliceResult, Versioned};
use std::collections::BTreeMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::traits::{InventoryRepository, WatchEvent};

const EVENT_CAPACITY: usize = 1024;

struct InventoryState {
    records: BTreeMap<String, Versioned<SliceInventoryRecord>>,
    last_version: u64,
}

/// Inventory records held in memory with optimistic concurrency
pub struct MemoryInventory {
    state: RwLock<InventoryState>,
    events: broadcast::Sender<WatchEvent<SliceInventoryRecord>>,
}

impl MemoryInventory {
    /// Create an empty inventory
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(InventoryState {
                records: BTreeMap::new(),
                last_version: 0,
            }),
            events,
        }
    }

    /// Subscribe to record changes
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent<SliceInventoryRecord>> {
        self.events.subscribe()
    }

    /// Create or overwrite a record regardless of its current version
    ///
    /// This is how discovery and the node agent publish node state.
    pub async fn put(&self, record: SliceInventoryRecord) -> u64 {
        let mut state = self.state.write().await;
        state.last_version += 1;
        let version = state.last_version;

        debug!(node = %record.node_name, version, "Inventory record stored");
        state
            .records
            .insert(record.node_name.clone(), Versioned::new(record.clone(), version));
        let _ = self.events.send(WatchEvent::Applied(record));
        version
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryRepository for MemoryInventory {
    async fn list(&self) -> SliceResult<Vec<Versioned<SliceInventoryRecord>>> {
        let state = self.state.read().await;
        Ok(state.records.values().cloned().collect())
    }

    async fn get(&self, node_name: &str) -> SliceResult<Versioned<SliceInventoryRecord>> {
        let state = self.state.read().await;
        state
            .records
            .get(node_name)
            .cloned()
            .ok_or_else(|| SliceError::RecordNotFound(node_name.to_string()))
    }

    async fn update(
        &self,
        record: SliceInventoryRecord,
        expected_version: u64,
    ) -> SliceResult<u64> {
        let mut state = self.state.write().await;
        let current = state
            .records
            .get(&record.node_name)
            .map(|r| r.version)
            .ok_or_else(|| SliceError::RecordNotFound(record.node_name.clone()))?;

        if current != expected_version {
            return Err(SliceError::Conflict {
                key: record.node_name,
                expected: expected_version,
                actual: current,
            });
        }

        state.last_version += 1;
        let version = state.last_version;
        state
            .records
            .insert(record.node_name.clone(), Versioned::new(record.clone(), version));

        debug!(node = %record.node_name, version, "Inventory record updated");
        let _ = self.events.send(WatchEvent::Applied(record));
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryInventory::new();
        let v1 = store.put(SliceInventoryRecord::new("node-1")).await;

        let record = store.get("node-1").await.unwrap();
        assert_eq!(record.version, v1);
        assert_eq!(record.value.node_name, "node-1");
        assert!(matches!(
            store.get("node-2").await,
            Err(SliceError::RecordNotFound(_))
        ));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let store = MemoryInventory::new();
        store.put(SliceInventoryRecord::new("node-1")).await;

        let read_a = store.get("node-1").await.unwrap();
        let read_b = store.get("node-1").await.unwrap();

        let mut a = read_a.value.clone();
        a.devices.push("GPU-A".to_string());
        let new_version = store.update(a, read_a.version).await.unwrap();
        assert!(new_version > read_a.version);

        let mut b = read_b.value.clone();
        b.devices.push("GPU-B".to_string());
        let err = store.update(b, read_b.version).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get("node-1").await.unwrap();
        assert_eq!(stored.value.devices, vec!["GPU-A".to_string()]);
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = MemoryInventory::new();
        let err = store
            .update(SliceInventoryRecord::new("node-9"), 1)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let store = MemoryInventory::new();
        let mut rx = store.subscribe();

        store.put(SliceInventoryRecord::new("node-1")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.object().node_name, "node-1");
    }
}
