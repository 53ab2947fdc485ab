//! Configuration types for slicer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// API server configuration
    pub api: ApiConfig,
    /// Controller configuration
    pub controller: ControllerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, crate::SliceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::SliceError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::SliceError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to bind the REST API server
    pub address: String,
    /// Port for the REST API server
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 9090,
        }
    }
}

/// Reconciliation controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Scheduling gate owned by the controller
    pub gate_name: String,
    /// Finalizer owned by the controller
    pub finalizer_name: String,
    /// Node-selector key set to the allocated node when ungating
    pub node_selector_key: String,
    /// Substring identifying the slice resource among a container's limits
    pub profile_resource_marker: String,
    /// Placement strategy
    pub placement_policy: PlacementPolicyKind,
    /// Device-plugin health oracle
    pub health: HealthOracleConfig,
    /// Requeue delays
    pub timing: TimingConfig,
    /// Upper bound on concurrently running reconciliation passes
    pub max_concurrent_reconciles: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gate_name: "slicer.io/accelerator".to_string(),
            finalizer_name: "slicer.io/accelerator".to_string(),
            node_selector_key: "kubernetes.io/hostname".to_string(),
            profile_resource_marker: "mig-".to_string(),
            placement_policy: PlacementPolicyKind::FirstFit,
            health: HealthOracleConfig::default(),
            timing: TimingConfig::default(),
            max_concurrent_reconciles: 16,
        }
    }
}

/// Placement strategy selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementPolicyKind {
    /// First node, device and offset that fits
    #[default]
    FirstFit,
    /// Pack slices from the lowest offset (reserved)
    LeftToRight,
    /// Pack slices from the highest offset (reserved)
    RightToLeft,
}

impl std::fmt::Display for PlacementPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlacementPolicyKind::FirstFit => write!(f, "first-fit"),
            PlacementPolicyKind::LeftToRight => write!(f, "left-to-right"),
            PlacementPolicyKind::RightToLeft => write!(f, "right-to-left"),
        }
    }
}

/// Where the device-plugin health oracle looks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthOracleConfig {
    /// Namespace holding the device-plugin workloads
    pub namespace: String,
    /// Name prefix of the device-plugin workloads
    pub name_prefix: String,
}

impl Default for HealthOracleConfig {
    fn default() -> Self {
        Self {
            namespace: "gpu-operator".to_string(),
            name_prefix: "nvidia-device-plugin-daemonset".to_string(),
        }
    }
}

/// Requeue delays used by the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait for health checks and in-flight node-agent work
    pub dependency_wait_secs: u64,
    /// Wait after losing an object-update race
    pub update_race_secs: u64,
    /// Grace window between deletion request and teardown of a running workload
    pub grace_period_secs: u64,
    /// Lower bound of the jittered no-capacity backoff
    pub no_capacity_backoff_min_secs: u64,
    /// Upper bound (inclusive) of the jittered no-capacity backoff
    pub no_capacity_backoff_max_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            dependency_wait_secs: 2,
            update_race_secs: 1,
            grace_period_secs: 30,
            no_capacity_backoff_min_secs: 1,
            no_capacity_backoff_max_secs: 10,
        }
    }
}

impl TimingConfig {
    pub fn dependency_wait(&self) -> Duration {
        Duration::from_secs(self.dependency_wait_secs)
    }

    pub fn update_race(&self) -> Duration {
        Duration::from_secs(self.update_race_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive
    pub level: String,
    /// Log format (json or text)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_daemon_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.api.port, 9090);
        assert_eq!(config.controller.timing.grace_period(), Duration::from_secs(30));
        assert_eq!(config.controller.placement_policy, PlacementPolicyKind::FirstFit);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_partial_config_parse() {
        let toml_str = r#"
[api]
port = 8181

[controller]
gate_name = "example.com/slice"
placement_policy = "left-to-right"

[controller.timing]
grace_period_secs = 5

[logging]
format = "json"
"#;
        let config: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.port, 8181);
        assert_eq!(config.api.address, "0.0.0.0");
        assert_eq!(config.controller.gate_name, "example.com/slice");
        assert_eq!(config.controller.finalizer_name, "slicer.io/accelerator");
        assert_eq!(
            config.controller.placement_policy,
            PlacementPolicyKind::LeftToRight
        );
        assert_eq!(config.controller.timing.grace_period_secs, 5);
        assert_eq!(config.controller.timing.dependency_wait_secs, 2);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
