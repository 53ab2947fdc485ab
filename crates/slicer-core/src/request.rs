//! Extraction of the slice request from a workload's resource limits

use regex::Regex;
use std::sync::OnceLock;

use crate::{Quantity, SliceError, SliceResult, Workload};

/// Slice shape and bookkeeping figures requested by a workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRequest {
    /// Profile name, e.g. `1g.5gb`
    pub profile: String,
    /// Requested CPU in millicores
    pub cpu_milli: i64,
    /// Requested memory in bytes
    pub memory: i64,
}

fn profile_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+g\.\d+gb)").expect("static profile pattern"))
}

/// Profile name embedded in a resource key such as `nvidia.com/mig-1g.5gb`
pub fn profile_from_resource(resource: &str) -> Option<String> {
    profile_pattern()
        .captures(resource)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl SliceRequest {
    /// Build the request from the workload's single container
    ///
    /// `marker` selects the slice resource among the limits (e.g. `mig-`).
    /// Anything other than exactly one container asking for exactly one unit
    /// of exactly one slice resource is a configuration error.
    pub fn from_workload(workload: &Workload, marker: &str) -> SliceResult<Self> {
        let container = match workload.containers.as_slice() {
            [container] => container,
            containers => {
                return Err(SliceError::Config(format!(
                    "workload {} has {} containers, exactly one is supported",
                    workload.reference(),
                    containers.len()
                )))
            }
        };

        let mut slice_limits = container
            .resources
            .limits
            .iter()
            .filter(|(key, _)| key.contains(marker));

        let (resource, quantity) = slice_limits.next().ok_or_else(|| {
            SliceError::Config(format!(
                "workload {} does not request a slice resource",
                workload.reference()
            ))
        })?;
        if slice_limits.next().is_some() {
            return Err(SliceError::Config(format!(
                "workload {} requests more than one slice resource",
                workload.reference()
            )));
        }

        let units = Quantity::parse(quantity)?;
        if !units.is_one() {
            return Err(SliceError::Config(format!(
                "workload {} requests {} units of {}, exactly one is supported",
                workload.reference(),
                quantity,
                resource
            )));
        }

        let profile = profile_from_resource(resource).ok_or_else(|| {
            SliceError::Config(format!("resource {} does not name a slice profile", resource))
        })?;

        let lookup = |name: &str| {
            container
                .resources
                .requests
                .get(name)
                .or_else(|| container.resources.limits.get(name))
        };
        let cpu_milli = match lookup("cpu") {
            Some(q) => Quantity::parse(q)?
                .milli_ceil()
                .ok_or_else(|| SliceError::Quantity(q.to_string()))?,
            None => 0,
        };
        let memory = match lookup("memory") {
            Some(q) => Quantity::parse(q)?
                .units_ceil()
                .ok_or_else(|| SliceError::Quantity(q.to_string()))?,
            None => 0,
        };

        Ok(Self {
            profile,
            cpu_milli,
            memory,
        })
    }
}
