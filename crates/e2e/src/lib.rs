//! Transliteration widget E2E harness
//!
//! Drives a remote, asynchronously-converting text field through a browser
//! and records one verdict per test vector:
//! - Applies input by typing or by bulk set-value, depending on size
//! - Waits for the converted text to appear, nudging the widget when needed
//! - Judges the final field content by its Unicode script
//! - Writes every verdict to a CSV report as soon as it exists
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TestRunner (suite)                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  for each TestVector:                                       │
//! │    navigate + locate ─── AutomationDriver / FieldHandle     │
//! │    CaseRunner::run_case                                     │
//! │      ├── InputDriver::acquire / apply      (RetryPolicy)    │
//! │      ├── ConvergenceWaiter::wait_for_conversion             │
//! │      └── resolve ── OutputClassifier ──> Verdict            │
//! │    ReportSink::record                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Drivers: Playwright bridge (node) │ simulated widget       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod input;
pub mod policy;
pub mod report;
pub mod runner;
pub mod vectors;
pub mod waiter;

pub use classifier::{OutputClassifier, ScriptRange};
pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
pub use report::{ReportSink, SuiteSummary};
pub use runner::{run_suite, CaseRunner, Status, TestRunner, Verdict};
pub use vectors::{Selection, TestVector};
