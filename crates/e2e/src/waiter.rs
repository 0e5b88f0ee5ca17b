//! Convergence detection
//!
//! The remote converter never signals completion. The only observable is the
//! field's own value, so "done" is inferred from content: sample until the
//! predicate holds or the window closes. After bulk input a timed-out window
//! escalates to nudge cycles (Space, Backspace, Space) that make the widget's
//! listeners re-evaluate, each followed by another passive window.
//!
//! A predicate that never holds is a normal outcome, not an error: negative
//! vectors are expected to end that way, and the caller decides what it means.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::driver::{FieldHandle, Key};
use crate::error::HarnessResult;
use crate::input::InputStrategy;
use crate::policy::{PolicySet, RetryPolicy};

/// One snapshot of the field value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedState {
    pub raw_text: String,
}

impl ObservedState {
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self { raw_text: raw_text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub succeeded: bool,
    /// Last completed sample; `None` if every read missed its deadline
    pub final_state: Option<ObservedState>,
    /// Passive windows entered: 1 for phase 1, plus one per nudge cycle
    pub attempts_used: u32,
}

/// Windows for one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPlan {
    /// Phase 1 window
    pub passive: Duration,
    /// Phase 2 cycles; `None` skips phase 2
    pub nudge: Option<RetryPolicy>,
}

impl WaitPlan {
    pub fn for_strategy(strategy: InputStrategy, policies: &PolicySet) -> Self {
        match strategy {
            InputStrategy::Bulk => WaitPlan {
                passive: policies.passive_bulk.per_attempt_timeout,
                nudge: Some(policies.nudge),
            },
            InputStrategy::Incremental => WaitPlan {
                passive: policies.passive_incremental.per_attempt_timeout,
                nudge: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    #[serde(with = "crate::policy::millis")]
    pub poll_interval: Duration,
    /// Gap between the keys of a nudge
    #[serde(with = "crate::policy::millis")]
    pub nudge_key_gap: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            nudge_key_gap: Duration::from_millis(200),
        }
    }
}

pub struct ConvergenceWaiter {
    config: WaitConfig,
}

impl ConvergenceWaiter {
    pub fn new(config: WaitConfig) -> Self {
        Self { config }
    }

    /// Sample `field` until `predicate` holds or every window in `plan` closes
    pub async fn wait_for_conversion<P>(
        &self,
        field: &dyn FieldHandle,
        predicate: P,
        plan: &WaitPlan,
    ) -> HarnessResult<WaitOutcome>
    where
        P: Fn(&str) -> bool,
    {
        let mut last = None;
        let mut attempts_used = 1;

        if self.passive_wait(field, &predicate, plan.passive, &mut last).await? {
            return Ok(WaitOutcome { succeeded: true, final_state: last, attempts_used });
        }

        if let Some(nudge) = plan.nudge {
            for cycle in 1..=nudge.max_attempts {
                if cycle > 1 {
                    sleep(nudge.inter_attempt_delay).await;
                }
                debug!("No conversion yet, nudge {}/{}", cycle, nudge.max_attempts);
                self.nudge(field).await?;
                attempts_used += 1;

                if self
                    .passive_wait(field, &predicate, nudge.per_attempt_timeout, &mut last)
                    .await?
                {
                    return Ok(WaitOutcome { succeeded: true, final_state: last, attempts_used });
                }
            }
        }

        debug!("Field did not converge after {} window(s)", attempts_used);
        Ok(WaitOutcome { succeeded: false, final_state: last, attempts_used })
    }

    /// Poll until the predicate holds or `window` elapses. A sample still in
    /// flight at the deadline ends the window and leaves `last` untouched.
    async fn passive_wait<P>(
        &self,
        field: &dyn FieldHandle,
        predicate: &P,
        window: Duration,
        last: &mut Option<ObservedState>,
    ) -> HarnessResult<bool>
    where
        P: Fn(&str) -> bool,
    {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, field.current_value()).await {
                Ok(sample) => {
                    let state = ObservedState::new(sample?);
                    let matched = predicate(&state.raw_text);
                    *last = Some(state);
                    if matched {
                        return Ok(true);
                    }
                }
                Err(_) => return Ok(false),
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn nudge(&self, field: &dyn FieldHandle) -> HarnessResult<()> {
        field.press_key(Key::Space).await?;
        sleep(self.config.nudge_key_gap).await;
        field.press_key(Key::Backspace).await?;
        sleep(self.config.nudge_key_gap).await;
        field.press_key(Key::Space).await
    }
}
