//! Work queue and pass driver
//!
//! Requests for the same workload never run concurrently: a request that
//! arrives while its workload is in flight marks it dirty, and the pass is
//! repeated once the current one finishes. Distinct workloads run in
//! parallel up to the configured bound. Delayed requests are kept as one
//! deadline per workload, and any pass started for a workload cancels it.

use slicer_core::WorkloadRef;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::directive::Directive;
use crate::reconciler::Reconciler;

#[derive(Debug)]
enum Request {
    Now(WorkloadRef),
    At(WorkloadRef, Instant),
}

/// Handle for asking the controller to look at a workload
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<Request>,
}

impl WorkQueue {
    /// Request a pass; returns false once the controller has stopped
    pub fn enqueue(&self, workload: WorkloadRef) -> bool {
        self.tx.send(Request::Now(workload)).is_ok()
    }

    /// Request a pass after `delay`
    pub fn enqueue_after(&self, workload: WorkloadRef, delay: Duration) -> bool {
        self.tx
            .send(Request::At(workload, Instant::now() + delay))
            .is_ok()
    }
}

/// Pending delayed passes, at most one per workload
#[derive(Debug, Default)]
struct Delays {
    deadlines: HashMap<WorkloadRef, Instant>,
}

impl Delays {
    /// Keep the earlier of the existing and the new deadline
    fn schedule(&mut self, target: WorkloadRef, at: Instant) {
        self.deadlines
            .entry(target)
            .and_modify(|existing| *existing = (*existing).min(at))
            .or_insert(at);
    }

    fn cancel(&mut self, target: &WorkloadRef) {
        self.deadlines.remove(target);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return every workload whose deadline has passed
    fn take_due(&mut self, now: Instant) -> Vec<WorkloadRef> {
        let due: Vec<WorkloadRef> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(target, _)| target.clone())
            .collect();
        for target in &due {
            self.deadlines.remove(target);
        }
        due
    }

    fn len(&self) -> usize {
        self.deadlines.len()
    }
}

/// Workloads with a pass running, and those needing another one after it
#[derive(Debug, Default)]
struct Passes {
    in_flight: HashSet<WorkloadRef>,
    dirty: HashSet<WorkloadRef>,
}

impl Passes {
    /// Returns true if a pass should start now
    fn admit(&mut self, target: &WorkloadRef) -> bool {
        if self.in_flight.contains(target) {
            self.dirty.insert(target.clone());
            false
        } else {
            self.in_flight.insert(target.clone());
            true
        }
    }

    /// Returns true if the workload needs another pass right away
    fn finish(&mut self, target: &WorkloadRef) -> bool {
        if self.dirty.remove(target) {
            true
        } else {
            self.in_flight.remove(target);
            false
        }
    }
}

/// Runs reconciliation passes for queued workloads
pub struct Controller {
    reconciler: Arc<Reconciler>,
    queue: WorkQueue,
    requests: mpsc::UnboundedReceiver<Request>,
    max_concurrent: usize,
}

impl Controller {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let (tx, requests) = mpsc::unbounded_channel();
        let max_concurrent = reconciler.config().max_concurrent_reconciles.max(1);
        Self {
            reconciler,
            queue: WorkQueue { tx },
            requests,
            max_concurrent,
        }
    }

    pub fn queue(&self) -> WorkQueue {
        self.queue.clone()
    }

    /// Run until shutdown is signaled, then let running passes finish
    #[instrument(skip(self, shutdown))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let Controller {
            reconciler,
            queue,
            mut requests,
            max_concurrent,
        } = self;

        info!(max_concurrent, "Starting controller");

        let permits = Arc::new(Semaphore::new(max_concurrent));
        let (finished_tx, mut finished) = mpsc::unbounded_channel::<WorkloadRef>();
        let mut passes = Passes::default();
        let mut delays = Delays::default();

        let start = |target: WorkloadRef| {
            spawn_pass(
                reconciler.clone(),
                queue.clone(),
                permits.clone(),
                finished_tx.clone(),
                target,
            )
        };

        loop {
            let next_deadline = delays.next_deadline();
            tokio::select! {
                Some(request) = requests.recv() => match request {
                    Request::Now(target) => {
                        delays.cancel(&target);
                        if passes.admit(&target) {
                            start(target);
                        }
                    }
                    Request::At(target, at) => {
                        delays.schedule(target, at);
                        debug!(pending = delays.len(), "Delayed pass scheduled");
                    }
                },
                _ = sleep_until(next_deadline) => {
                    for target in delays.take_due(Instant::now()) {
                        if passes.admit(&target) {
                            start(target);
                        }
                    }
                }
                Some(target) = finished.recv() => {
                    if passes.finish(&target) {
                        delays.cancel(&target);
                        start(target);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Controller shutting down");
                        break;
                    }
                }
            }
        }

        while !passes.in_flight.is_empty() {
            match finished.recv().await {
                Some(target) => {
                    passes.in_flight.remove(&target);
                }
                None => break,
            }
        }
        debug!("Controller stopped");
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn spawn_pass(
    reconciler: Arc<Reconciler>,
    queue: WorkQueue,
    permits: Arc<Semaphore>,
    finished: mpsc::UnboundedSender<WorkloadRef>,
    target: WorkloadRef,
) {
    tokio::spawn(async move {
        if let Ok(_permit) = permits.acquire_owned().await {
            let pass_target = target.clone();
            let pass = tokio::spawn(async move { reconciler.reconcile(&pass_target).await });
            match pass.await {
                Ok(Ok(Directive::Done)) => {}
                Ok(Ok(Directive::RetryNow)) => {
                    queue.enqueue(target.clone());
                }
                Ok(Ok(Directive::RetryAfter(delay))) => {
                    queue.enqueue_after(target.clone(), delay);
                }
                Ok(Err(e)) => error!(workload = %target, error = %e, "Reconciliation failed"),
                Err(e) => error!(workload = %target, error = %e, "Reconciliation pass aborted"),
            }
        }
        let _ = finished.send(target);
    });
}
