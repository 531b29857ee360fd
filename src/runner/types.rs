//! Types for test run results.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Number of hierarchical taxonomy levels below the category
pub const DEPTH_LEVELS: usize = 7;

/// Placeholder for empty taxonomy cells
pub const EMPTY_CELL: &str = "-";

/// Case number of the synthetic record for a run that died before recording anything
pub const FATAL_CASE_NUMBER: &str = "FATAL";

/// Outcome of one executed case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StepOutcome {
    Pass,
    Fail,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Pass => "PASS",
            StepOutcome::Fail => "FAIL",
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, StepOutcome::Pass)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-text taxonomy describing a case, as it appears in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInfo {
    pub category: String,

    /// Up to seven levels; missing levels render as `-`
    #[serde(default)]
    pub depths: Vec<String>,

    #[serde(default = "empty_cell")]
    pub precondition: String,

    /// What the case expects to see
    pub expected: String,
}

fn empty_cell() -> String {
    EMPTY_CELL.to_string()
}

impl CaseInfo {
    pub fn new(category: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            depths: Vec::new(),
            precondition: empty_cell(),
            expected: expected.into(),
        }
    }

    pub fn depths<I, S>(mut self, depths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depths = depths.into_iter().map(Into::into).collect();
        self
    }

    pub fn precondition(mut self, precondition: impl Into<String>) -> Self {
        self.precondition = precondition.into();
        self
    }

    /// Depth label at `level` (0-based), `-` when absent or blank
    pub fn depth(&self, level: usize) -> &str {
        self.depths
            .get(level)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(EMPTY_CELL)
    }

    /// Record describing a run that could not start or died in setup
    pub fn fatal() -> Self {
        CaseInfo::new("System", "Script runs to completion")
            .depths(["Initialization"])
            .precondition("Automation session and initial setup")
    }
}

/// Files captured when a case fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureArtifacts {
    /// None when there was no live session to capture from
    pub screenshot_path: Option<PathBuf>,

    /// None when the log could not be written
    pub log_path: Option<PathBuf>,

    /// Error message and its cause chain
    pub error_trace: String,

    /// Root-cause guess, when an analyzer ran
    pub analysis: Option<String>,
}

impl FailureArtifacts {
    /// Failure with an error trace and nothing captured
    pub fn trace_only(error_trace: impl Into<String>) -> Self {
        Self {
            screenshot_path: None,
            log_path: None,
            error_trace: error_trace.into(),
            analysis: None,
        }
    }
}

/// One executed case, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStepResult {
    pub device: String,
    pub number: String,
    pub info: CaseInfo,
    pub outcome: StepOutcome,
    pub executed_at: DateTime<Local>,
    pub failure: Option<FailureArtifacts>,
}

impl TestStepResult {
    pub fn executed_at_label(&self) -> String {
        format_timestamp(&self.executed_at)
    }
}

/// What one device produced in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRun {
    pub label: String,
    /// Serial / UDID
    pub device_name: String,
    pub device_model: String,
    pub platform_version: String,
    pub app_package: String,
    pub app_version: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub results: Vec<TestStepResult>,
    /// Fatal error that ended the run early
    pub fatal_error: Option<String>,
}

impl DeviceRun {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }
}

/// Timestamp format used in records, logs and reports
pub fn format_timestamp(ts: &DateTime<Local>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
