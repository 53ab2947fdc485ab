//! What the driver should do after a reconciliation pass

use std::time::Duration;

/// Outcome of one pass over one workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Nothing left to do until the next event
    Done,
    /// Run again immediately, usually after losing a write race
    RetryNow,
    /// Run again after the delay
    RetryAfter(Duration),
}

impl Directive {
    pub fn after(delay: Duration) -> Self {
        Directive::RetryAfter(delay)
    }

    /// Delay before the next pass, if one is wanted
    pub fn requeue_delay(&self) -> Option<Duration> {
        match self {
            Directive::Done => None,
            Directive::RetryNow => Some(Duration::ZERO),
            Directive::RetryAfter(delay) => Some(*delay),
        }
    }
}

impl std::fmt::Display for Directive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Directive::Done => write!(f, "done"),
            Directive::RetryNow => write!(f, "retry-now"),
            Directive::RetryAfter(delay) => write!(f, "retry-after({:?})", delay),
        }
    }
}
