//! Suite runs against the simulated widget

use std::collections::BTreeMap;
use std::io::Write;

use translit_e2e::config::TargetConfig;
use translit_e2e::driver::simulated::{PageFaults, SimulatedConfig, SimulatedDriver};
use translit_e2e::driver::AutomationDriver;
use translit_e2e::report::HEADER;
use translit_e2e::runner::CaseSettings;
use translit_e2e::vectors::builtin;
use translit_e2e::{run_suite, HarnessConfig, HarnessError, ReportSink, TestRunner, TestVector};

fn target() -> TargetConfig {
    TargetConfig {
        url: "sim://widget".into(),
        ..Default::default()
    }
}

fn with_faults(faults: Vec<(usize, PageFaults)>) -> SimulatedDriver {
    SimulatedDriver::new(SimulatedConfig {
        faults: faults.into_iter().collect::<BTreeMap<_, _>>(),
        ..Default::default()
    })
}

fn suite_config(dir: &std::path::Path) -> HarnessConfig {
    let mut config = HarnessConfig::default();
    config.target = target();
    config.report.path = dir.join("results.csv");
    config.report.summary_path = dir.join("summary.json");
    config
}

async fn run(driver: &SimulatedDriver, vectors: &[TestVector]) -> (translit_e2e::SuiteSummary, Vec<String>) {
    let mut sink = ReportSink::open(Vec::new()).unwrap();
    let runner = TestRunner::new(driver, target(), CaseSettings::default());
    let summary = runner.run_vectors(vectors, &mut sink).await.unwrap();
    assert_eq!(sink.rows(), vectors.len());

    let text = String::from_utf8(sink.close().unwrap()).unwrap();
    let lines = text.lines().map(str::to_string).collect();
    (summary, lines)
}

#[tokio::test(start_paused = true)]
async fn builtin_suite_passes_on_simulated_widget() {
    let vectors = builtin();
    let driver = SimulatedDriver::default();

    let (summary, lines) = run(&driver, &vectors).await;

    assert_eq!(summary.total, 36);
    assert_eq!(summary.passed, 36, "{:#?}", lines);
    assert_eq!(summary.failed, 0);
    assert!(summary.success());
    assert_eq!(driver.page_loads(), 36);

    assert_eq!(lines[0], HEADER.join(","));
    assert_eq!(lines.len(), 37);
    assert!(lines[1].starts_with("Pos_Fun_0001,nalama test,S,nalama? ,Tamil output,நலமா? ,Pass,"));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("Neg_Fun_0003,random characters,S,xyz123abc ,No Tamil output,")));
    assert!(lines.last().unwrap().contains("Real-time updates"));
}

#[tokio::test(start_paused = true)]
async fn failing_case_does_not_stop_the_run() {
    let vectors: Vec<TestVector> = builtin().into_iter().take(5).collect();
    // third page load never shows the field
    let driver = with_faults(vec![(
        2,
        PageFaults { invisible_checks: u32::MAX, ..Default::default() },
    )]);

    let (summary, lines) = run(&driver, &vectors).await;

    assert_eq!(summary.total, 5);
    assert_eq!(summary.passed, 4);
    assert_eq!(summary.failed, 1);
    assert!(!summary.success());

    let failed = &lines[3];
    assert!(failed.starts_with("Pos_Fun_0003,"));
    assert!(failed.contains(",Error,Fail,Acquisition failed:"), "{failed}");
    assert!(lines[4].contains(",Pass,"));
    assert!(lines[5].contains(",Pass,"));
}

#[tokio::test(start_paused = true)]
async fn missing_field_fails_every_case() {
    let vectors: Vec<TestVector> = builtin().into_iter().take(3).collect();
    let driver = SimulatedDriver::default();
    let target = TargetConfig {
        field_selector: "#missing".into(),
        ..target()
    };

    let mut sink = ReportSink::open(Vec::new()).unwrap();
    let runner = TestRunner::new(&driver, target, CaseSettings::default());
    let summary = runner.run_vectors(&vectors, &mut sink).await.unwrap();

    assert_eq!(summary.failed, 3);
    let text = String::from_utf8(sink.close().unwrap()).unwrap();
    assert_eq!(text.matches("no element matches #missing").count(), 3);
}

#[tokio::test(start_paused = true)]
async fn known_broken_vectors_are_skipped_without_a_page_load() {
    let mut vectors: Vec<TestVector> = builtin().into_iter().take(3).collect();
    vectors[1].known_broken = true;
    let driver = SimulatedDriver::default();

    let (summary, lines) = run(&driver, &vectors).await;

    assert_eq!(summary.passed, 2);
    assert_eq!(summary.skipped, 1);
    assert!(summary.success());
    assert_eq!(driver.page_loads(), 2);
    assert!(lines[2].starts_with("Pos_Fun_0002,"));
    assert!(lines[2].contains(",,Skip,"));
}

#[tokio::test(start_paused = true)]
async fn frozen_field_fails_real_time_check() {
    let vectors: Vec<TestVector> = builtin()
        .into_iter()
        .filter(|v| v.id == "Pos_UI_0001")
        .collect();
    let driver = with_faults(vec![(
        0,
        PageFaults {
            frozen: true,
            initial_value: "போறேன் ".into(),
            ..Default::default()
        },
    )]);

    let (summary, lines) = run(&driver, &vectors).await;

    assert_eq!(summary.failed, 1);
    assert!(lines[1].contains(",Fail,Real-time conversion failed"), "{}", lines[1]);
}

#[tokio::test(start_paused = true)]
async fn nudge_recovers_bulk_input() {
    let vectors: Vec<TestVector> = builtin()
        .into_iter()
        .filter(|v| v.id == "Pos_Fun_0024")
        .collect();
    // the input event alone never triggers the converter
    let driver = SimulatedDriver::new(SimulatedConfig {
        convert_on_input_event: false,
        ignored_keystrokes: 1,
        ..Default::default()
    });

    let start = tokio::time::Instant::now();
    let (summary, lines) = run(&driver, &vectors).await;

    assert_eq!(summary.passed, 1, "{}", lines[1]);
    assert!(start.elapsed() >= std::time::Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn sink_failure_aborts_the_run() {
    /// Accepts the header, then runs out of space
    struct OneWrite(usize);
    impl Write for OneWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0 += 1;
            if self.0 > 1 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let vectors: Vec<TestVector> = builtin().into_iter().take(3).collect();
    let driver = SimulatedDriver::default();
    let mut sink = ReportSink::open(OneWrite(0)).unwrap();
    let runner = TestRunner::new(&driver, target(), CaseSettings::default());

    let err = runner.run_vectors(&vectors, &mut sink).await.unwrap_err();
    assert!(matches!(err, HarnessError::Sink(_)));
    assert!(err.is_run_fatal());
    // stopped at the first row
    assert_eq!(driver.page_loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn report_file_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test-results").join("results.csv");
    let vectors: Vec<TestVector> = builtin()
        .into_iter()
        .filter(|v| v.id.starts_with("Neg_"))
        .collect();
    let driver = SimulatedDriver::default();

    let mut sink = ReportSink::create(&path).unwrap();
    let runner = TestRunner::new(&driver, target(), CaseSettings::default());
    let summary = runner.run_vectors(&vectors, &mut sink).await.unwrap();
    sink.close().unwrap();

    assert_eq!(summary.passed, 10);
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 11);
    assert_eq!(text.matches("Correctly no Tamil output").count(), 10);
}

#[tokio::test(start_paused = true)]
async fn suite_writes_report_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = suite_config(dir.path());
    let vectors: Vec<TestVector> = builtin().into_iter().take(3).collect();

    let summary = run_suite(&config, &vectors, || async {
        Ok::<_, HarnessError>(Box::new(SimulatedDriver::default()) as Box<dyn AutomationDriver>)
    })
    .await
    .unwrap();

    assert_eq!(summary.passed, 3);
    assert!(summary.success());
    assert_eq!(summary.report, config.report.path);

    let text = std::fs::read_to_string(&config.report.path).unwrap();
    assert_eq!(text.lines().count(), 4);
    let json = std::fs::read_to_string(&config.report.summary_path).unwrap();
    let written: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(written["passed"], 3);
}

#[tokio::test(start_paused = true)]
async fn launch_failure_fails_every_vector() {
    let dir = tempfile::tempdir().unwrap();
    let config = suite_config(dir.path());
    let mut vectors: Vec<TestVector> = builtin().into_iter().take(3).collect();
    vectors[2].known_broken = true;

    let summary = run_suite(&config, &vectors, || async {
        Err::<Box<dyn AutomationDriver>, _>(HarnessError::PlaywrightNotFound)
    })
    .await
    .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.skipped, 1);
    assert!(!summary.success());

    let text = std::fs::read_to_string(&config.report.path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("Pos_Fun_0001,"));
    assert!(lines[1].contains(",Error,Fail,Playwright not found"), "{}", lines[1]);
    assert!(lines[2].contains(",Error,Fail,Playwright not found"), "{}", lines[2]);
    assert!(lines[3].contains(",,Skip,"), "{}", lines[3]);
    assert!(config.report.summary_path.exists());
}

#[tokio::test(start_paused = true)]
async fn run_fatal_launch_error_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let config = suite_config(dir.path());
    let vectors: Vec<TestVector> = builtin().into_iter().take(2).collect();

    let err = run_suite(&config, &vectors, || async {
        Err::<Box<dyn AutomationDriver>, _>(HarnessError::Config("bad browser".into()))
    })
    .await
    .unwrap_err();

    assert!(err.is_run_fatal());
    assert!(!config.report.summary_path.exists());
}

#[tokio::test(start_paused = true)]
async fn empty_selection_replaces_stale_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = suite_config(dir.path());
    std::fs::write(&config.report.path, "Pos_Fun_0001,stale row\n").unwrap();

    let mut launched = false;
    let summary = run_suite(&config, &[], || {
        launched = true;
        async { Ok::<_, HarnessError>(Box::new(SimulatedDriver::default()) as Box<dyn AutomationDriver>) }
    })
    .await
    .unwrap();

    assert!(!launched);
    assert_eq!(summary.total, 0);
    assert!(summary.success());
    let text = std::fs::read_to_string(&config.report.path).unwrap();
    assert_eq!(text.trim_end(), HEADER.join(","));
}
