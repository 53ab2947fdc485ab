//! Allocation reconciliation
//!
//! One pass reads the workload and a snapshot of every node's inventory,
//! decides the single next step for that workload, performs it, and tells
//! the driver when to come back. Every write is conditional on the version
//! that was read; losing a race just schedules another pass.

use rand::Rng;
use slicer_core::{
    Allocation, AllocationStatus, Clock, ControllerConfig, InventorySnapshot, SliceError,
    SliceRequest, SliceResult, SystemClock, Workload, WorkloadRef,
};
use slicer_health::NodeHealthOracle;
use slicer_placement::{strategy_for, PlacementOutcome, PlacementRequest, PlacementStrategy};
use slicer_store::{InventoryRepository, WorkloadRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::coordinator::GateCoordinator;
use crate::directive::Directive;

/// Change to one allocation entry
#[derive(Debug)]
enum AllocationChange {
    Insert(Allocation),
    Advance(AllocationStatus),
    Remove,
}

/// Result of a conditional inventory write
#[derive(Debug, PartialEq)]
enum InventoryWrite {
    Applied,
    /// Fresh record already matched the requested change
    Unchanged,
    /// Fresh record disagrees with what the pass decided on
    Stale,
    /// Write lost or failed; carry this directive back to the driver
    Retry(Directive),
}

/// Drives workloads through slice allocation, ungating and teardown
pub struct Reconciler {
    inventory: Arc<dyn InventoryRepository>,
    workloads: Arc<dyn WorkloadRepository>,
    health: Arc<dyn NodeHealthOracle>,
    strategy: Arc<dyn PlacementStrategy>,
    clock: Arc<dyn Clock>,
    coordinator: GateCoordinator,
    config: ControllerConfig,
}

impl Reconciler {
    /// Create a reconciler using the configured placement policy and the system clock
    pub fn new(
        inventory: Arc<dyn InventoryRepository>,
        workloads: Arc<dyn WorkloadRepository>,
        health: Arc<dyn NodeHealthOracle>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            inventory,
            workloads,
            health,
            strategy: strategy_for(config.placement_policy),
            clock: Arc::new(SystemClock),
            coordinator: GateCoordinator::new(&config),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn PlacementStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one pass for `target`
    ///
    /// Transient failures come back as retry directives. Errors are reserved
    /// for problems another pass cannot fix, such as a malformed request.
    #[instrument(skip(self), fields(workload = %target))]
    pub async fn reconcile(&self, target: &WorkloadRef) -> SliceResult<Directive> {
        let snapshot = self.snapshot().await;

        let workload = match self.workloads.get(target).await {
            Ok(Some(workload)) => workload,
            Ok(None) => return Ok(self.reclaim_orphan(target, &snapshot).await),
            Err(e) => {
                warn!(error = %e, "Unable to read workload");
                return Ok(Directive::after(self.config.timing.update_race()));
            }
        };

        if self.coordinator.is_gated_by_others(&workload) {
            debug!("Workload held by another scheduling gate");
            return Ok(Directive::Done);
        }

        let gated = self.coordinator.is_gated(&workload);
        if !self.coordinator.has_finalizer(&workload) {
            // Deleting objects cannot take new finalizers; a missing object is
            // reclaimed through the not-found path instead.
            if gated && !workload.is_being_deleted() {
                return Ok(self.protect(&workload).await);
            }
            return Ok(Directive::Done);
        }

        let allocation = snapshot.find_by_workload_id(&workload.uid).cloned();

        if workload.phase.is_terminal() {
            return Ok(self.finish_terminal(&workload, allocation).await);
        }

        if workload.is_being_deleted() {
            if gated {
                return Ok(self.delete_gated(&workload, allocation).await);
            }
            return Ok(self.delete_released(&workload, allocation).await);
        }

        if gated {
            return self.progress(&workload, allocation, &snapshot).await;
        }

        Ok(Directive::Done)
    }

    /// Read every node's inventory; a failed list degrades to an empty view
    async fn snapshot(&self) -> InventorySnapshot {
        match self.inventory.list().await {
            Ok(records) => InventorySnapshot::from(records),
            Err(e) => {
                warn!(error = %e, "Unable to list slice inventory, continuing with empty view");
                InventorySnapshot::empty()
            }
        }
    }

    /// Workload is gone: drop whatever allocation still names it
    async fn reclaim_orphan(
        &self,
        target: &WorkloadRef,
        snapshot: &InventorySnapshot,
    ) -> Directive {
        let Some(allocation) = snapshot.find_by_ref(target) else {
            debug!("Workload not found and holds no allocation");
            return Directive::Done;
        };

        match self.remove_allocation(allocation).await {
            InventoryWrite::Retry(directive) => directive,
            _ => {
                info!(
                    node = %allocation.node_name,
                    slice = %allocation.range(),
                    "Removed allocation of deleted workload"
                );
                Directive::Done
            }
        }
    }

    /// Attach our finalizer before any slice is allocated
    async fn protect(&self, workload: &Workload) -> Directive {
        match self.coordinator.with_finalizer(workload) {
            Some(updated) => {
                let directive = self.write_workload(updated, Directive::RetryNow).await;
                if directive == Directive::RetryNow {
                    debug!("Finalizer added");
                }
                directive
            }
            None => Directive::RetryNow,
        }
    }

    /// Workload ran to completion; tear its slice down
    async fn finish_terminal(
        &self,
        workload: &Workload,
        allocation: Option<Allocation>,
    ) -> Directive {
        let Some(allocation) = allocation else {
            return self.release_finalizer(workload).await;
        };

        match allocation.status {
            AllocationStatus::Creating => Directive::after(self.config.timing.dependency_wait()),
            AllocationStatus::Created | AllocationStatus::Ungated => {
                self.request_teardown(&allocation).await
            }
            AllocationStatus::Deleting => Directive::Done,
            AllocationStatus::Deleted => {
                match self.remove_allocation(&allocation).await {
                    InventoryWrite::Retry(directive) => directive,
                    _ => {
                        info!(
                            node = %allocation.node_name,
                            slice = %allocation.range(),
                            "Allocation removed"
                        );
                        Directive::after(self.config.timing.dependency_wait())
                    }
                }
            }
        }
    }

    /// Deletion requested before the workload was ever released
    async fn delete_gated(&self, workload: &Workload, allocation: Option<Allocation>) -> Directive {
        let Some(allocation) = allocation else {
            return self.release_finalizer(workload).await;
        };

        match allocation.status {
            AllocationStatus::Creating => Directive::after(self.config.timing.dependency_wait()),
            AllocationStatus::Created | AllocationStatus::Ungated => {
                self.request_teardown(&allocation).await
            }
            AllocationStatus::Deleting => Directive::Done,
            AllocationStatus::Deleted => self.remove_and_release(workload, &allocation).await,
        }
    }

    /// Deletion requested for a released workload; teardown waits out the grace period
    async fn delete_released(
        &self,
        workload: &Workload,
        allocation: Option<Allocation>,
    ) -> Directive {
        let Some(allocation) = allocation else {
            return self.release_finalizer(workload).await;
        };

        match allocation.status {
            AllocationStatus::Creating => Directive::after(self.config.timing.dependency_wait()),
            AllocationStatus::Deleting => Directive::Done,
            AllocationStatus::Deleted => self.remove_and_release(workload, &allocation).await,
            AllocationStatus::Created | AllocationStatus::Ungated => {
                if let Some(remaining) = self.grace_remaining(workload) {
                    debug!(remaining = ?remaining, "Waiting out grace period before teardown");
                    return Directive::after(remaining);
                }
                self.request_teardown(&allocation).await
            }
        }
    }

    /// Time left before a deleting workload may lose its slice
    fn grace_remaining(&self, workload: &Workload) -> Option<Duration> {
        let requested = workload.deletion_timestamp?;
        let grace = self.config.timing.grace_period();
        let elapsed = self.clock.now().signed_duration_since(requested);
        match elapsed.to_std() {
            Ok(elapsed) if elapsed >= grace => None,
            Ok(elapsed) => Some(grace - elapsed),
            // Deletion stamped in the future; wait the full period.
            Err(_) => Some(grace),
        }
    }

    /// Gated workload with no deletion in sight: allocate or release it
    async fn progress(
        &self,
        workload: &Workload,
        allocation: Option<Allocation>,
        snapshot: &InventorySnapshot,
    ) -> SliceResult<Directive> {
        let Some(allocation) = allocation else {
            return self.allocate(workload, snapshot).await;
        };

        let directive = match allocation.status {
            AllocationStatus::Created => self.release(workload, &allocation, true).await,
            AllocationStatus::Ungated => self.release(workload, &allocation, false).await,
            AllocationStatus::Creating | AllocationStatus::Deleting | AllocationStatus::Deleted => {
                debug!(status = %allocation.status, "Waiting for node agent");
                Directive::Done
            }
        };
        Ok(directive)
    }

    /// Choose a slice and record it as `Creating`
    async fn allocate(
        &self,
        workload: &Workload,
        snapshot: &InventorySnapshot,
    ) -> SliceResult<Directive> {
        let request = SliceRequest::from_workload(workload, &self.config.profile_resource_marker)
            .map_err(|e| {
                error!(error = %e, "Workload does not describe a usable slice request");
                e
            })?;

        let placement_request = PlacementRequest {
            profile: request.profile,
            workload_id: workload.uid.clone(),
            namespace: workload.namespace.clone(),
            workload_name: workload.name.clone(),
            resource_identifier: Uuid::new_v4().to_string(),
            cpu_milli: request.cpu_milli,
            memory: request.memory,
        };

        let placement = match self.strategy.place(&placement_request, snapshot)? {
            PlacementOutcome::Placed(placement) => placement,
            PlacementOutcome::NoCapacity => {
                let backoff = self.no_capacity_backoff();
                info!(
                    profile = %placement_request.profile,
                    backoff = ?backoff,
                    "No free slice for profile"
                );
                return Ok(Directive::after(backoff));
            }
        };

        let node_name = placement.node_name.clone();
        let allocation = placement.into_allocation(AllocationStatus::Creating);
        let slice = allocation.range();
        let workload_id = allocation.workload_id.clone();

        let directive = match self
            .change_allocation(&node_name, &workload_id, AllocationChange::Insert(allocation))
            .await
        {
            InventoryWrite::Applied => {
                info!(
                    node = %node_name,
                    slice = %slice,
                    strategy = self.strategy.name(),
                    "Slice allocated"
                );
                Directive::Done
            }
            InventoryWrite::Unchanged => Directive::Done,
            InventoryWrite::Stale => {
                debug!(node = %node_name, slice = %slice, "Chosen slice taken concurrently");
                Directive::RetryNow
            }
            InventoryWrite::Retry(directive) => directive,
        };
        Ok(directive)
    }

    /// Hand a workload whose slice exists over to the scheduler
    async fn release(
        &self,
        workload: &Workload,
        allocation: &Allocation,
        mark_ungated: bool,
    ) -> Directive {
        match self.health.is_healthy().await {
            Ok(true) => {}
            Ok(false) => {
                info!(node = %allocation.node_name, "Device plugin not ready, holding workload");
                return Directive::after(self.config.timing.dependency_wait());
            }
            Err(e) => {
                warn!(error = %e, "Device plugin health unknown, holding workload");
                return Directive::after(self.config.timing.dependency_wait());
            }
        }

        if mark_ungated {
            match self
                .change_allocation(
                    &allocation.node_name,
                    &allocation.workload_id,
                    AllocationChange::Advance(AllocationStatus::Ungated),
                )
                .await
            {
                InventoryWrite::Applied | InventoryWrite::Unchanged => {}
                InventoryWrite::Stale => return Directive::RetryNow,
                InventoryWrite::Retry(directive) => return directive,
            }
        }

        let Some(released) = self.coordinator.released_to(workload, &allocation.node_name) else {
            return Directive::Done;
        };
        let directive = self.write_workload(released, Directive::Done).await;
        if directive == Directive::Done {
            info!(node = %allocation.node_name, slice = %allocation.range(), "Workload ungated");
        }
        directive
    }

    /// Ask the node agent to destroy the slice
    async fn request_teardown(&self, allocation: &Allocation) -> Directive {
        match self
            .change_allocation(
                &allocation.node_name,
                &allocation.workload_id,
                AllocationChange::Advance(AllocationStatus::Deleting),
            )
            .await
        {
            InventoryWrite::Applied => {
                info!(
                    node = %allocation.node_name,
                    slice = %allocation.range(),
                    "Slice teardown requested"
                );
                Directive::Done
            }
            InventoryWrite::Unchanged => Directive::Done,
            InventoryWrite::Stale => Directive::RetryNow,
            InventoryWrite::Retry(directive) => directive,
        }
    }

    /// Drop a destroyed slice's entry and let the workload go
    async fn remove_and_release(&self, workload: &Workload, allocation: &Allocation) -> Directive {
        if let InventoryWrite::Retry(directive) = self.remove_allocation(allocation).await {
            return directive;
        }
        info!(node = %allocation.node_name, slice = %allocation.range(), "Allocation removed");
        self.release_finalizer(workload).await
    }

    async fn release_finalizer(&self, workload: &Workload) -> Directive {
        match self.coordinator.without_finalizer(workload) {
            Some(updated) => {
                let directive = self.write_workload(updated, Directive::Done).await;
                if directive == Directive::Done {
                    info!("Finalizer removed");
                }
                directive
            }
            None => Directive::Done,
        }
    }

    /// Conditionally write a workload, mapping failures to retry directives
    async fn write_workload(&self, workload: Workload, on_success: Directive) -> Directive {
        match self.workloads.update(workload).await {
            Ok(_) => on_success,
            Err(e) if e.is_conflict() || e.is_not_found() => {
                debug!(error = %e, "Workload changed underneath, retrying");
                Directive::RetryNow
            }
            Err(e) => {
                warn!(error = %e, "Workload update failed");
                Directive::after(self.config.timing.update_race())
            }
        }
    }

    async fn remove_allocation(&self, allocation: &Allocation) -> InventoryWrite {
        self.change_allocation(
            &allocation.node_name,
            &allocation.workload_id,
            AllocationChange::Remove,
        )
        .await
    }

    /// Re-read a node's record, apply `change`, and write it back at the read version
    async fn change_allocation(
        &self,
        node_name: &str,
        workload_id: &str,
        change: AllocationChange,
    ) -> InventoryWrite {
        let current = match self.inventory.get(node_name).await {
            Ok(current) => current,
            Err(e) => {
                warn!(node = %node_name, error = %e, "Unable to read inventory record");
                return InventoryWrite::Retry(Directive::after(self.config.timing.update_race()));
            }
        };
        let mut record = current.value;

        match change {
            AllocationChange::Insert(allocation) => {
                if record.allocation(workload_id).is_some() {
                    return InventoryWrite::Unchanged;
                }
                if !record.is_range_free(&allocation.range()) {
                    return InventoryWrite::Stale;
                }
                record.put_allocation(allocation);
            }
            AllocationChange::Advance(status) => {
                let Some(existing) = record.allocation(workload_id) else {
                    return InventoryWrite::Stale;
                };
                if existing.status == status {
                    return InventoryWrite::Unchanged;
                }
                if existing.status > status {
                    return InventoryWrite::Stale;
                }
                let advanced = existing.with_status(status);
                record.put_allocation(advanced);
            }
            AllocationChange::Remove => {
                if record.remove_allocation(workload_id).is_none() {
                    return InventoryWrite::Unchanged;
                }
            }
        }

        match self.inventory.update(record, current.version).await {
            Ok(_) => InventoryWrite::Applied,
            Err(SliceError::Conflict { .. }) => {
                debug!(node = %node_name, "Inventory record changed underneath, retrying");
                InventoryWrite::Retry(Directive::RetryNow)
            }
            Err(e) => {
                warn!(node = %node_name, error = %e, "Inventory update failed");
                InventoryWrite::Retry(Directive::after(self.config.timing.update_race()))
            }
        }
    }

    /// Jittered wait before looking for capacity again
    fn no_capacity_backoff(&self) -> Duration {
        let timing = &self.config.timing;
        let low = timing
            .no_capacity_backoff_min_secs
            .min(timing.no_capacity_backoff_max_secs);
        let high = timing
            .no_capacity_backoff_min_secs
            .max(timing.no_capacity_backoff_max_secs);
        Duration::from_secs(rand::rng().random_range(low..=high))
    }
}
