//! Turning repository changes into reconciliation requests

use slicer_core::{AllocationStatus, SliceInventoryRecord, Workload, WorkloadRef};
use slicer_store::{InventoryRepository, WatchEvent, WorkloadRepository};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::controller::WorkQueue;

/// Workloads that need a pass after `record` changed
///
/// Only allocations the node agent just moved forward matter: `Created`
/// means the workload can be released, `Deleted` means its entry can go.
pub fn workloads_to_wake(record: &SliceInventoryRecord) -> Vec<WorkloadRef> {
    record
        .allocations
        .values()
        .filter(|a| matches!(a.status, AllocationStatus::Created | AllocationStatus::Deleted))
        .map(|a| a.workload_ref())
        .collect()
}

/// Forward workload changes to the queue
///
/// Starts with a full listing so workloads that existed before the watch
/// are seen. A lagging subscriber relists instead of guessing what it missed.
pub fn watch_workloads(
    mut events: broadcast::Receiver<WatchEvent<Workload>>,
    workloads: Arc<dyn WorkloadRepository>,
    queue: WorkQueue,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        resync_workloads(workloads.as_ref(), &queue).await;
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !queue.enqueue(event.object().reference()) {
                        break;
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Workload watch lagged, relisting");
                    resync_workloads(workloads.as_ref(), &queue).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Workload watch stopped");
    })
}

/// Forward inventory changes to the queue
pub fn watch_inventory(
    mut events: broadcast::Receiver<WatchEvent<SliceInventoryRecord>>,
    inventory: Arc<dyn InventoryRepository>,
    queue: WorkQueue,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(WatchEvent::Applied(record)) => {
                    for workload in workloads_to_wake(&record) {
                        if !queue.enqueue(workload) {
                            return;
                        }
                    }
                }
                Ok(WatchEvent::Deleted(_)) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Inventory watch lagged, relisting");
                    resync_inventory(inventory.as_ref(), &queue).await;
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Inventory watch stopped");
    })
}

async fn resync_workloads(workloads: &dyn WorkloadRepository, queue: &WorkQueue) {
    match workloads.list(None).await {
        Ok(all) => {
            info!(count = all.len(), "Enqueueing all workloads");
            for workload in all {
                queue.enqueue(workload.reference());
            }
        }
        Err(e) => warn!(error = %e, "Unable to list workloads"),
    }
}

async fn resync_inventory(inventory: &dyn InventoryRepository, queue: &WorkQueue) {
    match inventory.list().await {
        Ok(records) => {
            for record in records {
                for workload in workloads_to_wake(&record.value) {
                    queue.enqueue(workload);
                }
            }
        }
        Err(e) => warn!(error = %e, "Unable to list slice inventory"),
    }
}
