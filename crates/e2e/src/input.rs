//! Applying test input to the remote field
//!
//! Short inputs are typed one character at a time. Large inputs are set in one
//! operation followed by a synthetic input event, because a direct value
//! assignment does not wake the widget's listeners on its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::driver::{FieldHandle, Key};
use crate::error::{HarnessError, HarnessResult};
use crate::policy::{PolicySet, RetryPolicy};
use crate::vectors::{SizeClass, TestVector};

/// Inputs longer than this many characters always use the bulk strategy
pub const BULK_THRESHOLD: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputStrategy {
    Bulk,
    Incremental,
}

impl InputStrategy {
    pub fn select(size_class: SizeClass, input_len: usize) -> Self {
        if size_class == SizeClass::L || input_len > BULK_THRESHOLD {
            InputStrategy::Bulk
        } else {
            InputStrategy::Incremental
        }
    }

    pub fn for_vector(vector: &TestVector) -> Self {
        Self::select(vector.size_class, vector.input_len())
    }
}

/// Keystroke timing for the incremental strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypingCadence {
    #[serde(with = "crate::policy::millis")]
    pub char_delay: Duration,
    /// Per-character delay while sampling for live updates
    #[serde(with = "crate::policy::millis")]
    pub observed_char_delay: Duration,
    /// Pause between a keystroke and its sample
    #[serde(with = "crate::policy::millis")]
    pub sample_pause: Duration,
    /// Pause after the field is cleared, before input starts
    #[serde(with = "crate::policy::millis")]
    pub settle: Duration,
}

impl Default for TypingCadence {
    fn default() -> Self {
        Self {
            char_delay: Duration::from_millis(50),
            observed_char_delay: Duration::from_millis(30),
            sample_pause: Duration::from_millis(100),
            settle: Duration::from_millis(300),
        }
    }
}

/// A field that has been made visible, focused and cleared.
///
/// Holding a lease is the only way to drive input, so every input attempt
/// starts from a known-empty field. Retries go through [`FieldLease::reset`].
pub struct FieldLease<'f> {
    field: &'f dyn FieldHandle,
    clear_policy: RetryPolicy,
}

impl<'f> FieldLease<'f> {
    pub fn field(&self) -> &'f dyn FieldHandle {
        self.field
    }

    /// Focus and clear the field again
    pub async fn reset(&self) -> HarnessResult<()> {
        let field = self.field;
        self.clear_policy
            .run("focus and clear", |_| async move {
                field.focus().await?;
                field.clear().await
            })
            .await
            .map_err(|e| as_driver(e, "cannot focus and clear field"))
    }
}

pub struct InputDriver {
    policies: PolicySet,
    cadence: TypingCadence,
}

impl InputDriver {
    pub fn new(policies: PolicySet, cadence: TypingCadence) -> Self {
        Self { policies, cadence }
    }

    /// Wait for the field, then focus and clear it
    pub async fn acquire<'f>(&self, field: &'f dyn FieldHandle) -> HarnessResult<FieldLease<'f>> {
        let visible = self.policies.acquire;
        visible
            .run("wait for field", |_| field.wait_visible(visible.per_attempt_timeout))
            .await
            .map_err(|e| match e {
                HarnessError::Acquisition(_) => e,
                other => HarnessError::Acquisition(format!("field not ready: {}", other)),
            })?;

        let lease = FieldLease {
            field,
            clear_policy: self.policies.clear,
        };
        lease.reset().await?;
        sleep(self.cadence.settle).await;
        Ok(lease)
    }

    /// Apply the vector's input with the strategy its size calls for
    pub async fn apply(&self, lease: &FieldLease<'_>, vector: &TestVector) -> HarnessResult<InputStrategy> {
        let strategy = InputStrategy::for_vector(vector);
        let text = vector.input_text.as_str();
        debug!("{}: {:?} input of {} chars", vector.id, strategy, vector.input_len());

        match strategy {
            InputStrategy::Bulk => self.retrying(lease, "bulk input", |f| bulk(f, text)).await?,
            InputStrategy::Incremental => {
                let delay = self.cadence.char_delay;
                self.retrying(lease, "typed input", |f| type_text(f, text, delay))
                    .await?
            }
        }
        Ok(strategy)
    }

    /// Type `text` one character at a time, sampling the field after each
    /// keystroke. Returns the samples of the attempt that succeeded.
    pub async fn apply_observed(&self, lease: &FieldLease<'_>, text: &str) -> HarnessResult<Vec<String>> {
        let cadence = self.cadence;
        self.retrying(lease, "observed typing", |field| async move {
            let mut samples = Vec::with_capacity(text.chars().count());
            for c in text.chars() {
                field.type_char(c, cadence.observed_char_delay).await?;
                sleep(cadence.sample_pause).await;
                samples.push(field.current_value().await?);
            }
            Ok(samples)
        })
        .await
    }

    /// Run one input attempt under the input policy, resetting the field
    /// before every retry
    async fn retrying<'f, F, Fut, T>(&self, lease: &FieldLease<'f>, what: &str, mut attempt: F) -> HarnessResult<T>
    where
        F: FnMut(&'f dyn FieldHandle) -> Fut,
        Fut: std::future::Future<Output = HarnessResult<T>>,
    {
        let policy = self.policies.input;
        let field = lease.field();
        policy
            .run(what, |n| {
                let fut = attempt(field);
                async move {
                    if n > 1 {
                        lease.reset().await?;
                    }
                    match timeout(policy.per_attempt_timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(HarnessError::Driver(format!(
                            "input attempt exceeded {} ms",
                            policy.per_attempt_timeout.as_millis()
                        ))),
                    }
                }
            })
            .await
            .map_err(|e| as_driver(e, what))
    }
}

async fn bulk(field: &dyn FieldHandle, text: &str) -> HarnessResult<()> {
    field.focus().await?;
    field.set_value(text).await?;
    field.dispatch_input_event().await?;
    // a trailing space tells the converter the last word is complete
    if !text.ends_with(' ') {
        field.press_key(Key::Space).await?;
    }
    Ok(())
}

async fn type_text(field: &dyn FieldHandle, text: &str, delay: Duration) -> HarnessResult<()> {
    for c in text.chars() {
        field.type_char(c, delay).await?;
    }
    Ok(())
}

fn as_driver(e: HarnessError, context: &str) -> HarnessError {
    match e {
        HarnessError::Driver(_) => e,
        other => HarnessError::Driver(format!("{}: {}", context, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::simulated::{PageFaults, SimulatedConfig, SimulatedDriver};
    use crate::driver::AutomationDriver;
    use std::collections::{BTreeMap, BTreeSet};
    use test_case::test_case;

    const SELECTOR: &str = "#transliterateTextarea";

    fn vector(size_class: SizeClass, input: &str) -> TestVector {
        TestVector {
            id: "Pos_Fun_9000".into(),
            name: "input".into(),
            size_class,
            input_text: input.into(),
            expected_has_converted_output: true,
            tags: BTreeSet::new(),
            known_broken: false,
        }
    }

    async fn driver_with(faults: PageFaults, config: SimulatedConfig) -> SimulatedDriver {
        let mut map = BTreeMap::new();
        map.insert(0, faults);
        let driver = SimulatedDriver::new(SimulatedConfig { faults: map, ..config });
        driver.navigate("sim://").await.unwrap();
        driver
    }

    #[test_case(SizeClass::S, 10 => InputStrategy::Incremental)]
    #[test_case(SizeClass::M, 200 => InputStrategy::Incremental)]
    #[test_case(SizeClass::S, 201 => InputStrategy::Bulk)]
    #[test_case(SizeClass::M, 201 => InputStrategy::Bulk)]
    #[test_case(SizeClass::L, 5 => InputStrategy::Bulk)]
    #[test_case(SizeClass::L, 400 => InputStrategy::Bulk)]
    fn test_strategy_selection(size: SizeClass, len: usize) -> InputStrategy {
        InputStrategy::select(size, len)
    }

    #[test]
    fn test_strategy_counts_characters_not_bytes() {
        // 150 Tamil characters are 450 bytes
        let v = vector(SizeClass::S, &"த".repeat(150));
        assert_eq!(InputStrategy::for_vector(&v), InputStrategy::Incremental);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_retries_visibility() {
        let driver = driver_with(
            PageFaults { invisible_checks: 2, initial_value: "leftover".into(), ..Default::default() },
            SimulatedConfig::default(),
        )
        .await;
        let field = driver.locate(SELECTOR).await.unwrap();
        let input = InputDriver::new(PolicySet::default(), TypingCadence::default());

        let lease = input.acquire(field.as_ref()).await.unwrap();
        assert_eq!(lease.field().current_value().await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_gives_up_after_policy() {
        let driver = driver_with(
            PageFaults { invisible_checks: 3, ..Default::default() },
            SimulatedConfig::default(),
        )
        .await;
        let field = driver.locate(SELECTOR).await.unwrap();
        let input = InputDriver::new(PolicySet::default(), TypingCadence::default());

        let err = input.acquire(field.as_ref()).await.err().unwrap();
        assert!(matches!(err, HarnessError::Acquisition(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_failure_is_driver_error() {
        let driver = driver_with(
            PageFaults { stale_calls: 10, ..Default::default() },
            SimulatedConfig::default(),
        )
        .await;
        let field = driver.locate(SELECTOR).await.unwrap();
        let input = InputDriver::new(PolicySet::default(), TypingCadence::default());

        let err = input.acquire(field.as_ref()).await.err().unwrap();
        assert!(matches!(err, HarnessError::Driver(_)), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bulk_appends_trailing_space() {
        let driver = driver_with(
            PageFaults::default(),
            SimulatedConfig { convert_on_input_event: false, convert_on_keystroke: false, ..Default::default() },
        )
        .await;
        let field = driver.locate(SELECTOR).await.unwrap();
        let input = InputDriver::new(PolicySet::default(), TypingCadence::default());
        let lease = input.acquire(field.as_ref()).await.unwrap();

        let text = "x".repeat(210);
        let strategy = input.apply(&lease, &vector(SizeClass::L, &text)).await.unwrap();
        assert_eq!(strategy, InputStrategy::Bulk);
        assert_eq!(field.current_value().await.unwrap(), format!("{} ", text));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_input_retries_from_clean_field() {
        let mut faults = BTreeMap::new();
        // second page load: leftover text and two detached-element failures
        faults.insert(
            1,
            PageFaults { stale_calls: 2, initial_value: "zz".into(), ..Default::default() },
        );
        let driver = SimulatedDriver::new(SimulatedConfig {
            convert_on_keystroke: false,
            faults,
            ..Default::default()
        });
        driver.navigate("sim://").await.unwrap();
        let field = driver.locate(SELECTOR).await.unwrap();
        let input = InputDriver::new(PolicySet::default(), TypingCadence::default());
        let lease = input.acquire(field.as_ref()).await.unwrap();

        driver.navigate("sim://").await.unwrap();
        let strategy = input.apply(&lease, &vector(SizeClass::S, "vang ")).await.unwrap();
        assert_eq!(strategy, InputStrategy::Incremental);
        assert_eq!(field.current_value().await.unwrap(), "vang ");
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_typing_samples_each_keystroke() {
        let driver = driver_with(
            PageFaults::default(),
            SimulatedConfig { convert_on_keystroke: false, ..Default::default() },
        )
        .await;
        let field = driver.locate(SELECTOR).await.unwrap();
        let input = InputDriver::new(PolicySet::default(), TypingCadence::default());
        let lease = input.acquire(field.as_ref()).await.unwrap();

        let samples = input.apply_observed(&lease, "abc").await.unwrap();
        assert_eq!(samples, ["a", "ab", "abc"]);
    }
}
