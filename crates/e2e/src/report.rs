//! CSV report sink and run summary

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{HarnessError, HarnessResult};
use crate::runner::Verdict;

pub const HEADER: [&str; 8] = [
    "TC ID",
    "Test Name",
    "Input Length",
    "Input",
    "Expected",
    "Actual Output",
    "Status",
    "Notes",
];

/// Quote a field if it holds a comma, quote or line break; inner quotes are doubled
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Append-only verdict log. The header is written once, when the sink opens.
pub struct ReportSink<W: Write> {
    writer: W,
    rows: usize,
}

impl ReportSink<BufWriter<File>> {
    /// Create (or truncate) the report file and write the header
    pub fn create(path: &Path) -> HarnessResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(HarnessError::Sink)?;
            }
        }
        let file = File::create(path).map_err(HarnessError::Sink)?;
        Self::open(BufWriter::new(file))
    }
}

impl<W: Write> ReportSink<W> {
    pub fn open(writer: W) -> HarnessResult<Self> {
        let mut sink = Self { writer, rows: 0 };
        sink.write_line(&format_row(&HEADER))?;
        Ok(sink)
    }

    /// Append one verdict row and flush it
    pub fn record(&mut self, verdict: &Verdict) -> HarnessResult<()> {
        let line = format_row(&[
            verdict.vector_id.as_str(),
            verdict.test_name.as_str(),
            verdict.size_class.as_str(),
            verdict.input.as_str(),
            verdict.expected.as_str(),
            verdict.observed.as_str(),
            verdict.status.as_str(),
            verdict.note.as_str(),
        ]);
        self.write_line(&line)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header excluded
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn close(mut self) -> HarnessResult<W> {
        self.writer.flush().map_err(HarnessError::Sink)?;
        Ok(self.writer)
    }

    fn write_line(&mut self, line: &str) -> HarnessResult<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(HarnessError::Sink)
    }
}

/// Counters for a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub report: PathBuf,
}

impl SuiteSummary {
    pub fn success(&self) -> bool {
        self.failed == 0
    }

    /// Write the summary as pretty JSON
    pub fn write(&self, path: &Path) -> HarnessResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;

        info!("Summary written to: {}", path.display());
        Ok(())
    }
}
