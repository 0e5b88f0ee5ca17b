//! Case runner and suite runner
//!
//! A case is navigation, field acquisition, input, and a convergence wait,
//! resolved into exactly one [`Verdict`]. Every failure inside a case becomes
//! a failed verdict, and so does a driver that never launched; only
//! run-fatal errors (report sink, vector source, config) stop the suite.

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::classifier::OutputClassifier;
use crate::config::{HarnessConfig, ReportConfig, TargetConfig};
use crate::driver::{AutomationDriver, FieldHandle};
use crate::error::{HarnessError, HarnessResult};
use crate::input::{InputDriver, InputStrategy, TypingCadence};
use crate::policy::{PolicySet, RetryPolicy};
use crate::report::{ReportSink, SuiteSummary};
use crate::vectors::{SizeClass, TestVector, VectorCategory};
use crate::waiter::{ConvergenceWaiter, WaitConfig, WaitPlan};

/// Characters of the observed text quoted in failure notes
const NOTE_SNAPSHOT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Pass,
    Fail,
    Skip,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "Pass",
            Status::Fail => "Fail",
            Status::Skip => "Skip",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome and evidence for one vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub vector_id: String,
    pub test_name: String,
    pub size_class: SizeClass,
    pub input: String,
    pub expected: String,
    /// Final field text, truncated for reporting
    pub observed: String,
    pub status: Status,
    pub note: String,
}

/// Whether the field changed between consecutive samples while typing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeTracker {
    NoChangeSeen { previous: String },
    ChangeSeen,
}

impl ChangeTracker {
    /// Start from the value observed before typing began
    pub fn new(baseline: impl Into<String>) -> Self {
        ChangeTracker::NoChangeSeen { previous: baseline.into() }
    }

    pub fn observe(&mut self, sample: &str) {
        if let ChangeTracker::NoChangeSeen { previous } = self {
            if previous != sample {
                *self = ChangeTracker::ChangeSeen;
            }
        }
    }

    pub fn change_seen(&self) -> bool {
        matches!(self, ChangeTracker::ChangeSeen)
    }
}

/// First `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Everything [`CaseRunner`] needs to judge a vector
#[derive(Debug, Clone, Default)]
pub struct CaseSettings {
    pub policies: PolicySet,
    pub typing: TypingCadence,
    pub wait: WaitConfig,
    pub classifier: OutputClassifier,
    pub report: ReportConfig,
}

/// Runs one vector against an already-located field
pub struct CaseRunner {
    input: InputDriver,
    waiter: ConvergenceWaiter,
    classifier: OutputClassifier,
    policies: PolicySet,
    report: ReportConfig,
}

struct Observation {
    /// `None` when no read of the field finished inside any wait window
    final_text: Option<String>,
    change: Option<ChangeTracker>,
}

impl CaseRunner {
    pub fn new(settings: CaseSettings) -> Self {
        Self {
            input: InputDriver::new(settings.policies.clone(), settings.typing),
            waiter: ConvergenceWaiter::new(settings.wait),
            classifier: settings.classifier,
            policies: settings.policies,
            report: settings.report,
        }
    }

    /// Expected column text for a vector
    pub fn expected_label(&self, vector: &TestVector) -> String {
        match vector.category() {
            VectorCategory::UiBehavior => "Real-time updates".to_string(),
            _ if vector.expected_has_converted_output => format!("{} output", self.report.script_label),
            _ => format!("No {} output", self.report.script_label),
        }
    }

    /// Verdict for a vector that is never executed
    pub fn skipped(&self, vector: &TestVector) -> Verdict {
        self.verdict(
            vector,
            String::new(),
            Status::Skip,
            format!("Known converter defect: {} not executed", vector.id),
        )
    }

    /// Verdict for a case that ended in an error
    pub fn errored(&self, vector: &TestVector, err: &HarnessError) -> Verdict {
        self.verdict(vector, "Error".to_string(), Status::Fail, err.sanitized_message())
    }

    /// Drive one vector and judge the final field state. Never fails: errors
    /// become failed verdicts.
    pub async fn run_case(&self, vector: &TestVector, field: &dyn FieldHandle) -> Verdict {
        if vector.known_broken {
            return self.skipped(vector);
        }
        let category = vector.category();
        if category == VectorCategory::Unrecognized {
            return self.verdict(
                vector,
                String::new(),
                Status::Fail,
                format!("Unrecognized vector category for id {}", vector.id),
            );
        }

        match self.observe(vector, category, field).await {
            Ok(observation) => self.resolve(vector, category, observation),
            Err(e) => {
                debug!("{} errored: {}", vector.id, e);
                self.errored(vector, &e)
            }
        }
    }

    async fn observe(
        &self,
        vector: &TestVector,
        category: VectorCategory,
        field: &dyn FieldHandle,
    ) -> HarnessResult<Observation> {
        let lease = self.input.acquire(field).await?;
        let predicate = |text: &str| self.classifier.classify(text);

        let (strategy, change) = if category == VectorCategory::UiBehavior {
            let mut tracker = ChangeTracker::new(lease.field().current_value().await?);
            for sample in self.input.apply_observed(&lease, &vector.input_text).await? {
                tracker.observe(&sample);
            }
            (InputStrategy::Incremental, Some(tracker))
        } else {
            (self.input.apply(&lease, vector).await?, None)
        };

        let plan = WaitPlan::for_strategy(strategy, &self.policies);
        let outcome = self
            .waiter
            .wait_for_conversion(lease.field(), predicate, &plan)
            .await?;
        debug!(
            "{}: converged={} after {} window(s)",
            vector.id, outcome.succeeded, outcome.attempts_used
        );

        Ok(Observation {
            final_text: outcome.final_state.map(|s| s.raw_text),
            change,
        })
    }

    fn resolve(&self, vector: &TestVector, category: VectorCategory, observation: Observation) -> Verdict {
        let Observation { final_text, change } = observation;
        let Some(final_text) = final_text else {
            return self.verdict(
                vector,
                String::new(),
                Status::Fail,
                "No field value could be read before the wait deadline".to_string(),
            );
        };
        let converted = self.classifier.classify(&final_text);
        let expected = vector.expected_has_converted_output;
        let label = &self.report.script_label;
        let snapshot = truncate_chars(&final_text, NOTE_SNAPSHOT_CHARS);

        let (status, note) = match category {
            VectorCategory::Positive if expected && converted => {
                (Status::Pass, format!("{} conversion successful", label))
            }
            VectorCategory::Positive if !expected => (
                Status::Fail,
                "Positive vector is marked as expecting no converted output".to_string(),
            ),
            VectorCategory::Positive => (
                Status::Fail,
                format!("No {} output. Content: \"{}\"", label, snapshot),
            ),
            VectorCategory::Negative if !expected && !converted => {
                (Status::Pass, format!("Correctly no {} output", label))
            }
            VectorCategory::Negative if expected => (
                Status::Fail,
                "Negative vector is marked as expecting converted output".to_string(),
            ),
            VectorCategory::Negative => (
                Status::Fail,
                format!("Unexpectedly produced {}: \"{}\"", label, snapshot),
            ),
            VectorCategory::UiBehavior => {
                let changed = change.map(|c| c.change_seen()).unwrap_or(false);
                match (changed, converted) {
                    (true, true) => (Status::Pass, "Real-time conversion worked".to_string()),
                    (false, _) => (
                        Status::Fail,
                        "Real-time conversion failed: field never changed while typing".to_string(),
                    ),
                    (true, false) => (
                        Status::Fail,
                        format!("Real-time conversion failed: no {} output", label),
                    ),
                }
            }
            VectorCategory::Unrecognized => (Status::Fail, "Unrecognized vector category".to_string()),
        };

        let observed = truncate_chars(&final_text, self.report.max_observed_chars).to_string();
        self.verdict(vector, observed, status, note)
    }

    fn verdict(&self, vector: &TestVector, observed: String, status: Status, note: String) -> Verdict {
        Verdict {
            vector_id: vector.id.clone(),
            test_name: vector.name.clone(),
            size_class: vector.size_class,
            input: vector.input_text.clone(),
            expected: self.expected_label(vector),
            observed,
            status,
            note,
        }
    }
}

/// Pass/fail/skip counts for a run in progress
struct Tally {
    start: Instant,
    started_at: DateTime<Utc>,
    passed: usize,
    failed: usize,
    skipped: usize,
}

impl Tally {
    fn start() -> Self {
        Self {
            start: Instant::now(),
            started_at: Utc::now(),
            passed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    fn count(&mut self, verdict: &Verdict, elapsed_ms: u128) {
        match verdict.status {
            Status::Pass => {
                self.passed += 1;
                info!("✓ {}: Pass - {} ({} ms)", verdict.vector_id, verdict.note, elapsed_ms);
            }
            Status::Fail => {
                self.failed += 1;
                error!("✗ {}: Fail - {} ({} ms)", verdict.vector_id, verdict.note, elapsed_ms);
            }
            Status::Skip => {
                self.skipped += 1;
                info!("- {}: Skip - {}", verdict.vector_id, verdict.note);
            }
        }
    }

    fn finish(self) -> SuiteSummary {
        let duration_ms = self.start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            self.passed, self.failed, self.skipped, duration_ms
        );

        SuiteSummary {
            total: self.passed + self.failed + self.skipped,
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
            duration_ms,
            started_at: self.started_at,
            report: PathBuf::new(),
        }
    }
}

/// Runs a list of vectors in order, one fresh page per case
pub struct TestRunner<'d> {
    driver: &'d dyn AutomationDriver,
    target: TargetConfig,
    navigate: RetryPolicy,
    cases: CaseRunner,
}

impl<'d> TestRunner<'d> {
    pub fn new(driver: &'d dyn AutomationDriver, target: TargetConfig, settings: CaseSettings) -> Self {
        Self {
            driver,
            target,
            navigate: settings.policies.navigate,
            cases: CaseRunner::new(settings),
        }
    }

    /// Run every vector, recording each verdict as soon as it exists
    pub async fn run_vectors<W: Write>(
        &self,
        vectors: &[TestVector],
        sink: &mut ReportSink<W>,
    ) -> HarnessResult<SuiteSummary> {
        let mut tally = Tally::start();
        info!("Running {} test(s) against {}", vectors.len(), self.target.url);

        for vector in vectors {
            let case_start = Instant::now();
            let verdict = self.run_one(vector).await;
            sink.record(&verdict)?;
            tally.count(&verdict, case_start.elapsed().as_millis());
        }

        Ok(tally.finish())
    }

    async fn run_one(&self, vector: &TestVector) -> Verdict {
        if vector.known_broken {
            return self.cases.skipped(vector);
        }
        match self.open_field().await {
            Ok(field) => self.cases.run_case(vector, field.as_ref()).await,
            Err(e) => self.cases.errored(vector, &e),
        }
    }

    /// Load a fresh page and locate the field
    async fn open_field(&self) -> HarnessResult<Box<dyn FieldHandle>> {
        let url = self.target.url.as_str();
        let limit = self.navigate.per_attempt_timeout;
        self.navigate
            .run("navigation", |_| async move {
                match timeout(limit, self.driver.navigate(url)).await {
                    Ok(result) => result,
                    Err(_) => Err(HarnessError::Acquisition(format!(
                        "navigation to {} exceeded {} ms",
                        url,
                        limit.as_millis()
                    ))),
                }
            })
            .await?;
        self.driver.locate(&self.target.field_selector).await
    }
}

/// Record a failed row for every vector that could not be attempted
fn fail_all<W: Write>(
    cases: &CaseRunner,
    vectors: &[TestVector],
    err: &HarnessError,
    sink: &mut ReportSink<W>,
) -> HarnessResult<SuiteSummary> {
    let mut tally = Tally::start();
    for vector in vectors {
        let verdict = if vector.known_broken {
            cases.skipped(vector)
        } else {
            cases.errored(vector, err)
        };
        sink.record(&verdict)?;
        tally.count(&verdict, 0);
    }
    Ok(tally.finish())
}

/// Run a whole suite: truncate the report, launch the driver, run every
/// vector, then write the summary.
///
/// The report is opened before anything else, so an empty selection still
/// leaves a fresh header-only report. A driver that fails to launch fails
/// each vector rather than the run; only run-fatal errors are returned.
pub async fn run_suite<F, Fut>(
    config: &HarnessConfig,
    vectors: &[TestVector],
    launch: F,
) -> HarnessResult<SuiteSummary>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = HarnessResult<Box<dyn AutomationDriver>>>,
{
    let mut sink = ReportSink::create(&config.report.path)?;

    let outcome = if vectors.is_empty() {
        info!("No vectors match the selection");
        Ok(Tally::start().finish())
    } else {
        match launch().await {
            Ok(driver) => {
                let runner = TestRunner::new(driver.as_ref(), config.target.clone(), config.case_settings());
                let outcome = runner.run_vectors(vectors, &mut sink).await;
                if let Err(e) = driver.shutdown().await {
                    error!("Driver shutdown failed: {}", e);
                }
                outcome
            }
            Err(e) if e.is_run_fatal() => Err(e),
            Err(e) => {
                error!("Driver launch failed: {}", e);
                fail_all(&CaseRunner::new(config.case_settings()), vectors, &e, &mut sink)
            }
        }
    };

    let mut summary = outcome?;
    sink.close()?;
    info!("Results written to: {}", config.report.path.display());

    summary.report = config.report.path.clone();
    summary.write(&config.report.summary_path)?;
    Ok(summary)
}
