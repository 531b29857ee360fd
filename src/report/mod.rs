//! Run reporting: spreadsheet report and push notification.
//!
//! Both stages are best effort. A failing stage is logged and skipped; it
//! never changes the results or the other stage.

pub mod format;
pub mod notify;
pub mod sheets;
pub mod summary;
pub mod table;

pub use notify::{Notification, Notifier, NotifyError, NotifyResult, NtfyNotifier, Priority};
pub use sheets::{GoogleSheetsSink, ReportError, ReportResult, ReportSink, SheetReport, SheetsConfig};
pub use summary::{RunSummary, format_duration, success_rate};
pub use table::{Layout, ReportTable, sheet_title, summary_rows};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::dispatch::MergedRun;

/// What the publish step managed to do
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishOutcome {
    /// Link to the written sheet
    pub sheet: Option<String>,
    pub notified: bool,
}

pub struct Reporter {
    sink: Option<Box<dyn ReportSink>>,
    notifier: Option<Box<dyn Notifier>>,
    layout: Option<Layout>,
    tester: String,
}

impl Reporter {
    pub fn new(tester: impl Into<String>) -> Self {
        Self {
            sink: None,
            notifier: None,
            layout: None,
            tester: tester.into(),
        }
    }

    pub fn sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Fixed layout; by default multi-device runs pivot by device
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn layout_for(&self, run: &MergedRun) -> Layout {
        self.layout.unwrap_or(if run.is_multi_device() {
            Layout::ByDevice
        } else {
            Layout::Flat
        })
    }

    /// Build the sheet contents for a run
    pub fn build(&self, run: &MergedRun) -> (RunSummary, SheetReport) {
        let layout = self.layout_for(run);
        let summary = RunSummary::from_run(run, &self.tester);
        let report = SheetReport {
            title: sheet_title(&summary, layout),
            summary_rows: summary_rows(&summary, layout),
            table: ReportTable::build(layout, run.results()),
        };
        (summary, report)
    }

    /// Write the sheet, then notify. Nothing is sent for an empty run.
    pub fn publish(&self, run: &MergedRun) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        if run.is_empty() {
            warn!("no test results recorded, skipping report and notification");
            return outcome;
        }

        let (summary, report) = self.build(run);
        info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            rate = %summary.success_rate_label(),
            "run summary"
        );

        if let Some(sink) = &self.sink {
            match sink.write(&report) {
                Ok(link) => {
                    info!(sheet = %report.title, "report saved: {}", link);
                    outcome.sheet = Some(link);
                }
                Err(e) => error!("report not written: {}", e),
            }
        }

        if let Some(notifier) = &self.notifier {
            match notifier.send(&Notification::from_summary(&summary)) {
                Ok(()) => outcome.notified = true,
                Err(e) => error!("notification not sent: {}", e),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::types::{CaseInfo, DeviceRun, StepOutcome, TestStepResult};
    use chrono::Local;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<String>>>);

    impl ReportSink for Calls {
        fn write(&self, report: &SheetReport) -> ReportResult<String> {
            self.0.lock().unwrap().push(format!("sheet {}", report.table.rows.len()));
            Err(ReportError::MissingCredentials("config/service-account.json".into()))
        }
    }

    impl Notifier for Calls {
        fn send(&self, n: &Notification) -> NotifyResult<()> {
            self.0.lock().unwrap().push(format!("notify {}", n.priority.as_str()));
            Ok(())
        }
    }

    fn merged(results: Vec<TestStepResult>) -> MergedRun {
        let now = Local::now();
        MergedRun {
            suite_name: "daum-search".into(),
            app_name: "Daum".into(),
            runs: vec![DeviceRun {
                label: "S20".into(),
                device_name: "R3CN".into(),
                device_model: "SM-G981N".into(),
                platform_version: "13.0".into(),
                app_package: "net.daum.android.daum".into(),
                app_version: "8.12.3".into(),
                started_at: now,
                finished_at: now,
                results,
                fatal_error: None,
            }],
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_sheet_failure_does_not_stop_notification() {
        let calls = Calls::default();
        let reporter = Reporter::new("jayden")
            .sink(Box::new(calls.clone()))
            .notifier(Box::new(calls.clone()));
        let run = merged(vec![TestStepResult {
            device: "S20".into(),
            number: "1".into(),
            info: CaseInfo::new("c", "e"),
            outcome: StepOutcome::Fail,
            executed_at: Local::now(),
            failure: None,
        }]);

        let outcome = reporter.publish(&run);
        assert!(outcome.sheet.is_none());
        assert!(outcome.notified);
        assert_eq!(*calls.0.lock().unwrap(), vec!["sheet 1", "notify high"]);
        assert_eq!(run.total(), 1);
    }

    #[test]
    fn test_empty_run_makes_no_calls() {
        let calls = Calls::default();
        let reporter = Reporter::new("jayden")
            .sink(Box::new(calls.clone()))
            .notifier(Box::new(calls.clone()));
        let outcome = reporter.publish(&merged(vec![]));
        assert!(!outcome.notified);
        assert!(calls.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_single_device_defaults_to_flat() {
        let reporter = Reporter::new("jayden");
        let run = merged(vec![]);
        assert_eq!(reporter.layout_for(&run), Layout::Flat);
        let (_, report) = reporter.build(&run);
        assert!(report.title.starts_with("jayden(SM-G981N)"));
    }
}
