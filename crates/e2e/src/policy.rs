//! Bounded retry policies shared by the input driver and the convergence waiter

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::HarnessResult;

/// How many times to try something, how long to pause between tries, and how
/// long a single try may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub inter_attempt_delay: Duration,
    #[serde(with = "millis")]
    pub per_attempt_timeout: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, inter_attempt_delay: Duration, per_attempt_timeout: Duration) -> Self {
        Self {
            max_attempts,
            inter_attempt_delay,
            per_attempt_timeout,
        }
    }

    /// A single attempt of at most `timeout`
    pub const fn once(timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, timeout)
    }

    /// Run `operation` until it succeeds or the attempts are used up. The
    /// attempt number (starting at 1) is passed in; the last error is returned.
    pub async fn run<F, Fut, T>(&self, what: &str, mut operation: F) -> HarnessResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = HarnessResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", what, attempt, attempts);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < attempts => {
                    warn!("{} failed (attempt {}/{}): {}", what, attempt, attempts, e);
                    sleep(self.inter_attempt_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Every retry policy the harness uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySet {
    /// Waiting for the field to become visible
    pub acquire: RetryPolicy,
    /// Focusing and clearing the field
    pub clear: RetryPolicy,
    /// Applying input with either strategy
    pub input: RetryPolicy,
    /// Phase 1 window after bulk input
    pub passive_bulk: RetryPolicy,
    /// Phase 1 window after incremental input
    pub passive_incremental: RetryPolicy,
    /// Phase 2 nudge-and-wait cycles
    pub nudge: RetryPolicy,
    /// Page navigation before each case
    pub navigate: RetryPolicy,
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            acquire: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(5)),
            clear: RetryPolicy::new(3, Duration::from_millis(300), Duration::from_secs(5)),
            input: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_secs(30)),
            passive_bulk: RetryPolicy::once(Duration::from_secs(15)),
            passive_incremental: RetryPolicy::once(Duration::from_millis(1000)),
            nudge: RetryPolicy::new(2, Duration::from_millis(500), Duration::from_secs(10)),
            navigate: RetryPolicy::new(2, Duration::from_millis(0), Duration::from_secs(60)),
        }
    }
}

/// Durations as integer milliseconds in config files
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
