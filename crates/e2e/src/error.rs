//! Error types for the harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    /// The target field never became visible, or the page could not be reached
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    /// Input could not be applied to the field after retries
    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright bridge error: {0}")]
    Bridge(String),

    #[error("Report sink error: {0}")]
    Sink(#[source] std::io::Error),

    #[error("Vector source error: {0}")]
    VectorSource(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl HarnessError {
    /// Errors that end the whole run instead of a single case
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Sink(_) | HarnessError::VectorSource(_) | HarnessError::Config(_)
        )
    }

    /// Message suitable for a report note: double quotes become single quotes
    pub fn sanitized_message(&self) -> String {
        self.to_string().replace('"', "'")
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
