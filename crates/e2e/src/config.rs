//! Harness configuration
//!
//! Every tunable has a default, so a missing config file means a stock run
//! against the public widget. CLI flags are applied on top by the binary.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::classifier::{OutputClassifier, ScriptRange};
use crate::driver::playwright::PlaywrightConfig;
use crate::driver::simulated::SimulatedConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::input::TypingCadence;
use crate::policy::PolicySet;
use crate::runner::CaseSettings;
use crate::waiter::WaitConfig;

/// Harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub target: TargetConfig,
    pub report: ReportConfig,
    /// Code point range that counts as converted output
    pub classifier: ScriptRange,
    pub driver: DriverConfig,
    pub policies: PolicySet,
    pub typing: TypingCadence,
    pub wait: WaitConfig,
}

/// Where the widget lives
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub url: String,
    pub field_selector: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: "https://tamil.changathi.com/".to_string(),
            field_selector: "#transliterateTextarea".to_string(),
        }
    }
}

/// Report wording and limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
    pub summary_path: PathBuf,
    /// Longest observed text written to the report, in characters
    pub max_observed_chars: usize,
    /// Name of the target script in the Expected column and notes
    pub script_label: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("test-results/translit-results.csv"),
            summary_path: PathBuf::from("test-results/summary.json"),
            max_observed_chars: 1000,
            script_label: "Tamil".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real browser through Playwright
    #[default]
    Playwright,
    /// In-process widget, no browser
    Simulated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub kind: DriverKind,
    pub playwright: PlaywrightConfig,
    pub simulated: SimulatedConfig,
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)
                .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.target.url.trim().is_empty() {
            return Err(HarnessError::Config("target.url is empty".into()));
        }
        if self.target.field_selector.trim().is_empty() {
            return Err(HarnessError::Config("target.field_selector is empty".into()));
        }
        if self.classifier.start > self.classifier.end {
            return Err(HarnessError::Config(format!(
                "classifier range U+{:04X}..U+{:04X} is inverted",
                self.classifier.start as u32, self.classifier.end as u32
            )));
        }
        if self.report.max_observed_chars == 0 {
            return Err(HarnessError::Config("report.max_observed_chars must be positive".into()));
        }
        if self.wait.poll_interval.is_zero() {
            return Err(HarnessError::Config("wait.poll_interval must be positive".into()));
        }
        Ok(())
    }

    /// Settings handed to the case runner
    pub fn case_settings(&self) -> CaseSettings {
        CaseSettings {
            policies: self.policies.clone(),
            typing: self.typing,
            wait: self.wait,
            classifier: OutputClassifier::new(self.classifier),
            report: self.report.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.target.url, "https://tamil.changathi.com/");
        assert_eq!(config.report.max_observed_chars, 1000);
        assert_eq!(config.driver.kind, DriverKind::Playwright);
    }

    #[test]
    fn test_partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            r#"
[target]
url = "http://localhost:8080/"

[driver]
kind = "simulated"

[policies.nudge]
max_attempts = 4
inter_attempt_delay = 250
per_attempt_timeout = 2000

[typing]
char_delay = 10
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.target.url, "http://localhost:8080/");
        assert_eq!(config.target.field_selector, "#transliterateTextarea");
        assert_eq!(config.driver.kind, DriverKind::Simulated);
        assert_eq!(config.policies.nudge.max_attempts, 4);
        assert_eq!(config.policies.nudge.per_attempt_timeout, Duration::from_secs(2));
        assert_eq!(config.policies.passive_bulk.per_attempt_timeout, Duration::from_secs(15));
        assert_eq!(config.typing.char_delay, Duration::from_millis(10));
        assert_eq!(config.typing.settle, Duration::from_millis(300));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");

        std::fs::write(&path, "[target]\nurl = \"\"\n").unwrap();
        let err = HarnessConfig::load(&path).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
        assert!(err.is_run_fatal());

        std::fs::write(&path, "[report]\nmax_observed_chars = \"many\"\n").unwrap();
        assert!(matches!(HarnessConfig::load(&path), Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("harness.toml");
        let mut config = HarnessConfig::default();
        config.report.script_label = "Devanagari".into();
        config.classifier = ScriptRange { start: '\u{0900}', end: '\u{097F}' };
        config.save(&path).unwrap();

        let loaded = HarnessConfig::load(&path).unwrap();
        assert_eq!(loaded.report.script_label, "Devanagari");
        assert_eq!(loaded.classifier, config.classifier);
    }
}
