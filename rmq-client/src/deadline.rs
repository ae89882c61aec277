use std::time::Duration;
use tokio::time::Instant;

use crate::errors::{ClientError, Result};

/// Overall time budget of one scrape, threaded through every remote call it makes.
///
/// Each call runs for at most `min(call_timeout, remaining)`, so a scrape never
/// outlives its own deadline however many topics and brokers it visits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No overall budget; only the per-call timeout applies.
    pub fn none() -> Self {
        Deadline { at: None }
    }

    pub fn after(budget: Duration) -> Self {
        Deadline {
            at: Some(Instant::now() + budget),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Timeout for the next call, or a timeout error when the budget is spent.
    pub fn call_timeout(&self, addr: &str, per_call: Duration) -> Result<Duration> {
        match self.remaining() {
            None => Ok(per_call),
            Some(left) if left.is_zero() => Err(ClientError::timeout(addr, Duration::ZERO)),
            Some(left) => Ok(per_call.min(left)),
        }
    }
}
