//! Per-device test runs.
//!
//! [`run_device`] owns one automation session from start to quit and always
//! returns a [`DeviceRun`]; nothing that goes wrong on the device escapes.

pub mod case;
pub mod probe;
pub mod recorder;
pub mod suite;
pub mod types;

pub use case::{CaseRunner, StepError};
pub use recorder::{ResultRecorder, error_trace, fatal_record};
pub use suite::{Action, CaseSpec, Entry, SetupBlock, Step, Suite, SuiteError, SuiteResult, Tier, load_devices};
pub use types::{CaseInfo, DeviceRun, FailureArtifacts, StepOutcome, TestStepResult};

use chrono::Local;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info, info_span, warn};

use crate::analysis::FailureAnalyzer;
use crate::artifacts::{ArtifactStore, UNAVAILABLE};
use crate::config::WaitSettings;
use crate::webdriver::{DeviceConfig, UiDriver, WebDriverSession};

/// Shared, read-only inputs for every device run
#[derive(Clone)]
pub struct RunContext {
    pub waits: WaitSettings,
    pub artifacts: ArtifactStore,
    pub analyzer: Option<Arc<dyn FailureAnalyzer>>,
}

impl RunContext {
    pub fn new(waits: WaitSettings, artifacts: ArtifactStore) -> Self {
        Self {
            waits,
            artifacts,
            analyzer: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn FailureAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}

/// Records and fatal error from one pass over a suite
#[derive(Debug)]
pub struct SuiteOutcome {
    pub results: Vec<TestStepResult>,
    pub fatal_error: Option<String>,
}

/// Run `suite` on an already-started driver.
///
/// A setup failure ends the pass: `FATAL_ERROR_*` artifacts are captured and,
/// if nothing was recorded yet, a synthetic FAIL stands in for the device.
pub fn run_suite_on(driver: &dyn UiDriver, device_label: &str, suite: &Suite, ctx: &RunContext) -> SuiteOutcome {
    let mut recorder =
        ResultRecorder::new(device_label, ctx.artifacts.clone()).with_analyzer(ctx.analyzer.clone());

    let result = {
        let mut runner = CaseRunner::new(driver, &mut recorder, ctx.waits);
        runner.run_suite(suite)
    };

    let fatal = match result {
        Ok(()) => None,
        Err(e) => Some(record_fatal(&recorder, Some(driver), &e)),
    };
    finish(recorder, fatal)
}

/// Capture `FATAL_ERROR_*` artifacts for an error that ends the run
fn record_fatal(
    recorder: &ResultRecorder,
    driver: Option<&dyn UiDriver>,
    err: &(dyn Error + 'static),
) -> FailureArtifacts {
    error!(device = %recorder.device_label(), "fatal error, aborting run: {}", err);
    let base = ArtifactStore::fatal_base_name(recorder.device_label());
    recorder.capture_failure(driver, &base, Some(err))
}

fn finish(mut recorder: ResultRecorder, fatal: Option<FailureArtifacts>) -> SuiteOutcome {
    let fatal_error = fatal.as_ref().map(|f| f.error_trace.clone());
    recorder.ensure_represented(fatal);
    SuiteOutcome {
        results: recorder.into_results(),
        fatal_error,
    }
}

/// Start a session on `device`, probe it, run the suite and quit.
pub fn run_device(device: &DeviceConfig, suite: &Suite, ctx: &RunContext) -> DeviceRun {
    let span = info_span!("device", label = %device.label);
    let _enter = span.enter();

    let started_at = Local::now();
    let app_package = suite
        .app_package
        .clone()
        .or_else(|| device.app_package.clone())
        .unwrap_or_else(|| UNAVAILABLE.to_string());

    let mut device_model = UNAVAILABLE.to_string();
    let mut app_version = UNAVAILABLE.to_string();

    info!(server = %device.server_url(), "starting session");
    let outcome = match WebDriverSession::start(&device.server_url(), device.capabilities(), ctx.waits.command_timeout) {
        Ok(mut session) => {
            device_model = probe::device_model(&session);
            if app_package != UNAVAILABLE {
                app_version = probe::app_version(&session, &app_package);
            }
            info!(model = %device_model, version = %app_version, "session {} started", session.id());

            let outcome = run_suite_on(&session, &device.label, suite, ctx);

            if let Err(e) = session.quit() {
                warn!("failed to quit session: {}", e);
            }
            outcome
        }
        Err(e) => {
            let recorder = ResultRecorder::new(&device.label, ctx.artifacts.clone());
            let fatal = record_fatal(&recorder, None, &e);
            finish(recorder, Some(fatal))
        }
    };

    let run = DeviceRun {
        label: device.label.clone(),
        device_name: device.device_name.clone(),
        device_model,
        platform_version: device.platform_version.clone(),
        app_package,
        app_version,
        started_at,
        finished_at: Local::now(),
        results: outcome.results,
        fatal_error: outcome.fatal_error,
    };
    info!(passed = run.passed(), failed = run.failed(), "device run finished");
    run
}
