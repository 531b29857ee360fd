//! Mobile QA - UI automation runs against Appium/WebDriver devices.
//!
//! This crate provides:
//! - A blocking WebDriver client and bounded element waits
//! - Declarative suites of setup blocks and recorded cases
//! - Failure artifacts (screenshot, trace log, optional model analysis)
//! - Parallel dispatch over devices with result merging
//! - Google Sheets reporting and push notifications
//!
//! # Example
//!
//! ```rust,no_run
//! use mobile_qa::{ArtifactStore, Reporter, RunContext, Suite, config, load_devices, pipeline};
//! use std::path::Path;
//!
//! let suite = Suite::load(Path::new("suites/daum_search.json")).unwrap();
//! let devices = load_devices(Path::new("devices.example.json")).unwrap();
//! let ctx = RunContext::new(config::get().waits, ArtifactStore::from_config());
//! let report = pipeline::execute(&devices, &suite, &ctx, &Reporter::new(config::tester()));
//! println!("{} passed, {} failed", report.run.passed(), report.run.failed());
//! ```

pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod webdriver;

// Re-export runner types
pub use runner::{
    CaseInfo, CaseRunner, DeviceRun, ResultRecorder, RunContext, StepError, StepOutcome, Suite, SuiteError,
    TestStepResult, load_devices, run_device,
};

// Re-export dispatch and pipeline
pub use dispatch::{MergedRun, dispatch, merge};
pub use pipeline::{RunReport, execute};

// Re-export reporting
pub use report::{
    GoogleSheetsSink, Layout, Notifier, NtfyNotifier, Reporter, ReportError, ReportSink, RunSummary, SheetsConfig,
};

// Re-export artifacts and analysis
pub use analysis::{AnalysisError, FailureAnalyzer, GeminiAnalyzer, GeminiConfig};
pub use artifacts::ArtifactStore;

// Re-export the device session
pub use webdriver::{DeviceConfig, DriverError, Locator, UiDriver, WebDriverSession};
