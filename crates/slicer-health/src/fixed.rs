//! Health oracle with an externally controlled answer

use async_trait::async_trait;
use slicer_core::{SliceError, SliceResult};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::oracle::NodeHealthOracle;

const UNHEALTHY: u8 = 0;
const HEALTHY: u8 = 1;
const FAILING: u8 = 2;

/// Oracle whose answer is set by its owner
///
/// Used when the device plugin is known to be managed elsewhere, and as a
/// stand-in in tests.
#[derive(Debug)]
pub struct FixedHealth {
    state: AtomicU8,
}

impl FixedHealth {
    pub fn healthy() -> Self {
        Self {
            state: AtomicU8::new(HEALTHY),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            state: AtomicU8::new(UNHEALTHY),
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        let state = if healthy { HEALTHY } else { UNHEALTHY };
        self.state.store(state, Ordering::SeqCst);
    }

    /// Make every query fail until the next `set_healthy`
    pub fn set_failing(&self) {
        self.state.store(FAILING, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeHealthOracle for FixedHealth {
    async fn is_healthy(&self) -> SliceResult<bool> {
        match self.state.load(Ordering::SeqCst) {
            HEALTHY => Ok(true),
            FAILING => Err(SliceError::Health("health oracle unavailable".to_string())),
            _ => Ok(false),
        }
    }
}
