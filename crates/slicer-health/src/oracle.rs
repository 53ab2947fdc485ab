//! Health checking for the node-local device plugin

use async_trait::async_trait;
use slicer_core::{HealthOracleConfig, SliceError, SliceResult, WorkloadPhase};
use slicer_store::WorkloadRepository;
use std::sync::Arc;
use tracing::{debug, warn};

/// Reports whether the component that advertises slice capacity is usable
#[async_trait]
pub trait NodeHealthOracle: Send + Sync {
    /// `Ok(true)` when healthy; errors mean "unknown" and callers retry
    async fn is_healthy(&self) -> SliceResult<bool>;
}

/// Looks for a running, ready device-plugin workload by name prefix
pub struct DevicePluginHealth {
    workloads: Arc<dyn WorkloadRepository>,
    namespace: String,
    name_prefix: String,
}

impl DevicePluginHealth {
    /// Create a new device-plugin health oracle
    pub fn new(workloads: Arc<dyn WorkloadRepository>, config: &HealthOracleConfig) -> Self {
        Self {
            workloads,
            namespace: config.namespace.clone(),
            name_prefix: config.name_prefix.clone(),
        }
    }
}

#[async_trait]
impl NodeHealthOracle for DevicePluginHealth {
    async fn is_healthy(&self) -> SliceResult<bool> {
        let candidates = self
            .workloads
            .list(Some(&self.namespace))
            .await
            .map_err(|e| {
                warn!(
                    namespace = %self.namespace,
                    error = %e,
                    "Unable to list device-plugin workloads"
                );
                SliceError::Health(e.to_string())
            })?;

        // The first matching workload decides.
        let Some(plugin) = candidates
            .iter()
            .find(|w| w.name.starts_with(&self.name_prefix))
        else {
            debug!(
                namespace = %self.namespace,
                prefix = %self.name_prefix,
                "No device-plugin workload found"
            );
            return Ok(false);
        };

        if plugin.phase != WorkloadPhase::Running {
            debug!(name = %plugin.name, phase = %plugin.phase, "Device plugin not running");
            return Ok(false);
        }

        if let Some(ready) = plugin.condition("Ready") {
            if ready.status != "True" {
                debug!(name = %plugin.name, "Device plugin not ready");
                return Ok(false);
            }
        }

        debug!(name = %plugin.name, "Device plugin running and ready");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slicer_core::{Condition, Workload};
    use slicer_store::MemoryWorkloads;

    fn plugin(name: &str, phase: WorkloadPhase, ready: Option<&str>) -> Workload {
        let mut w = Workload::new("gpu-operator", name);
        w.phase = phase;
        if let Some(status) = ready {
            w.conditions.push(Condition::new("Ready", status));
        }
        w
    }

    async fn oracle_with(workloads: Vec<Workload>) -> DevicePluginHealth {
        let store = Arc::new(MemoryWorkloads::new());
        for w in workloads {
            store.create(w).await.unwrap();
        }
        DevicePluginHealth::new(store, &HealthOracleConfig::default())
    }

    #[tokio::test]
    async fn test_running_and_ready_is_healthy() {
        let oracle = oracle_with(vec![plugin(
            "nvidia-device-plugin-daemonset-x1",
            WorkloadPhase::Running,
            Some("True"),
        )])
        .await;
        assert!(oracle.is_healthy().await.unwrap());
    }

    #[tokio::test]
    async fn test_not_ready_is_unhealthy() {
        let oracle = oracle_with(vec![plugin(
            "nvidia-device-plugin-daemonset-x1",
            WorkloadPhase::Running,
            Some("False"),
        )])
        .await;
        assert!(!oracle.is_healthy().await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_is_unhealthy() {
        let oracle = oracle_with(vec![plugin(
            "nvidia-device-plugin-daemonset-x1",
            WorkloadPhase::Pending,
            None,
        )])
        .await;
        assert!(!oracle.is_healthy().await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_plugin_is_unhealthy() {
        let mut elsewhere = plugin(
            "nvidia-device-plugin-daemonset-x1",
            WorkloadPhase::Running,
            Some("True"),
        );
        elsewhere.namespace = "default".to_string();
        let oracle = oracle_with(vec![
            elsewhere,
            plugin("gpu-feature-discovery", WorkloadPhase::Running, Some("True")),
        ])
        .await;
        assert!(!oracle.is_healthy().await.unwrap());
    }
}
