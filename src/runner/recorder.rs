//! Turns case outcomes into records and captures failure artifacts.
//!
//! Recording never fails: screenshot, log and analysis problems are logged
//! and replaced by placeholders, and the record is appended regardless.

use chrono::Local;
use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::types::{CaseInfo, FATAL_CASE_NUMBER, FailureArtifacts, StepOutcome, TestStepResult};
use crate::analysis::{FailureAnalyzer, analyze_or_placeholder};
use crate::artifacts::ArtifactStore;
use crate::webdriver::UiDriver;

pub struct ResultRecorder {
    device_label: String,
    results: Vec<TestStepResult>,
    artifacts: ArtifactStore,
    analyzer: Option<Arc<dyn FailureAnalyzer>>,
}

impl ResultRecorder {
    pub fn new(device_label: impl Into<String>, artifacts: ArtifactStore) -> Self {
        Self {
            device_label: device_label.into(),
            results: Vec::new(),
            artifacts,
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Option<Arc<dyn FailureAnalyzer>>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn device_label(&self) -> &str {
        &self.device_label
    }

    /// Append one record. On FAIL, screenshot/log/analysis are captured first.
    pub fn record(
        &mut self,
        driver: Option<&dyn UiDriver>,
        number: impl Into<String>,
        info: &CaseInfo,
        outcome: StepOutcome,
        cause: Option<&(dyn Error + 'static)>,
    ) -> &TestStepResult {
        let number = number.into();
        let failure = match outcome {
            StepOutcome::Pass => None,
            StepOutcome::Fail => {
                let base_name = ArtifactStore::case_base_name(&self.device_label, &number);
                Some(self.capture_failure(driver, &base_name, cause))
            }
        };

        info!(device = %self.device_label, case = %number, "[{}] {}", outcome, info.expected);
        self.results.push(TestStepResult {
            device: self.device_label.clone(),
            number,
            info: info.clone(),
            outcome,
            executed_at: Local::now(),
            failure,
        });
        // just pushed
        &self.results[self.results.len() - 1]
    }

    /// Screenshot, trace log and optional analysis for a failure.
    ///
    /// Every slot is filled, with `None` where capture was impossible.
    pub fn capture_failure(
        &self,
        driver: Option<&dyn UiDriver>,
        base_name: &str,
        cause: Option<&(dyn Error + 'static)>,
    ) -> FailureArtifacts {
        let error_trace = match cause {
            Some(err) => error_trace(err),
            None => "no error object was provided".to_string(),
        };

        let mut screenshot_bytes = None;
        let screenshot_path = match driver {
            None => {
                warn!(device = %self.device_label, "no live session, screenshot not captured");
                None
            }
            Some(driver) => match driver.screenshot() {
                Ok(bytes) => match self.artifacts.save_screenshot(base_name, &bytes) {
                    Ok(path) => {
                        info!(device = %self.device_label, path = %path.display(), "screenshot saved");
                        screenshot_bytes = Some(bytes);
                        Some(path)
                    }
                    Err(e) => {
                        error!(device = %self.device_label, "failed to write screenshot: {}", e);
                        None
                    }
                },
                Err(e) => {
                    error!(device = %self.device_label, "failed to capture screenshot: {}", e);
                    None
                }
            },
        };

        let log_path = match self
            .artifacts
            .write_failure_log(base_name, screenshot_path.as_deref(), &error_trace)
        {
            Ok(path) => {
                info!(device = %self.device_label, path = %path.display(), "failure log saved");
                Some(path)
            }
            Err(e) => {
                error!(device = %self.device_label, "failed to write failure log: {}", e);
                None
            }
        };

        let analysis = match (&self.analyzer, &screenshot_bytes) {
            (Some(analyzer), Some(bytes)) => {
                let text = analyze_or_placeholder(analyzer.as_ref(), bytes, &error_trace);
                if let Some(log) = &log_path {
                    if let Err(e) = self.artifacts.append_analysis(log, &text) {
                        error!(device = %self.device_label, "failed to append analysis: {}", e);
                    }
                }
                Some(text)
            }
            _ => None,
        };

        FailureArtifacts {
            screenshot_path,
            log_path,
            error_trace,
            analysis,
        }
    }

    /// Add the single synthetic FAIL record for a run that produced nothing
    pub fn ensure_represented(&mut self, failure: Option<FailureArtifacts>) {
        if self.results.is_empty() {
            warn!(device = %self.device_label, "run produced no records, adding FATAL record");
            self.results.push(fatal_record(&self.device_label, failure));
        }
    }

    pub fn results(&self) -> &[TestStepResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> Vec<TestStepResult> {
        self.results
    }
}

/// Synthetic FAIL record standing in for a device whose run produced no records
pub fn fatal_record(device_label: &str, failure: Option<FailureArtifacts>) -> TestStepResult {
    TestStepResult {
        device: device_label.to_string(),
        number: FATAL_CASE_NUMBER.to_string(),
        info: CaseInfo::fatal(),
        outcome: StepOutcome::Fail,
        executed_at: Local::now(),
        failure,
    }
}

/// Render an error and its `source()` chain
pub fn error_trace(err: &(dyn Error + 'static)) -> String {
    let mut trace = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let _ = write!(trace, "\ncaused by: {}", cause);
        source = cause.source();
    }
    trace
}
