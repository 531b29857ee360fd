//! Parallel dispatch over devices.
//!
//! One scoped thread per device, no shared mutable state. Runs are collected
//! in completion order through a channel and merged by concatenation.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;
use tracing::{error, info};

use crate::artifacts::UNAVAILABLE;
use crate::runner::types::{DeviceRun, FailureArtifacts, TestStepResult};
use crate::runner::{RunContext, Suite, fatal_record, run_device};
use crate::webdriver::DeviceConfig;

/// All device runs of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct MergedRun {
    pub suite_name: String,
    pub app_name: String,
    /// In completion order
    pub runs: Vec<DeviceRun>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
}

impl MergedRun {
    /// Every record, device runs concatenated
    pub fn results(&self) -> impl Iterator<Item = &TestStepResult> {
        self.runs.iter().flat_map(|r| r.results.iter())
    }

    pub fn total(&self) -> usize {
        self.runs.iter().map(|r| r.results.len()).sum()
    }

    pub fn passed(&self) -> usize {
        self.runs.iter().map(DeviceRun::passed).sum()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn is_multi_device(&self) -> bool {
        self.runs.len() > 1
    }
}

/// Run `suite` on every device concurrently
pub fn dispatch(devices: &[DeviceConfig], suite: &Suite, ctx: &RunContext) -> Vec<DeviceRun> {
    dispatch_with(devices, |device| run_device(device, suite, ctx))
}

/// Run `worker` once per device on its own thread.
///
/// A panicking worker is replaced by a run holding one synthetic FAIL record.
pub fn dispatch_with<F>(devices: &[DeviceConfig], worker: F) -> Vec<DeviceRun>
where
    F: Fn(&DeviceConfig) -> DeviceRun + Sync,
{
    info!(devices = devices.len(), "dispatching");
    let (tx, rx) = mpsc::channel();
    let worker = &worker;

    thread::scope(|scope| {
        for device in devices {
            let tx = tx.clone();
            scope.spawn(move || {
                let started_at = Local::now();
                let run = match panic::catch_unwind(AssertUnwindSafe(|| worker(device))) {
                    Ok(run) => run,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        error!(device = %device.label, "device run panicked: {}", message);
                        panicked_run(device, started_at, message)
                    }
                };
                info!(device = %device.label, records = run.results.len(), "device finished");
                // receiver outlives the scope
                let _ = tx.send(run);
            });
        }
    });
    drop(tx);

    rx.into_iter().collect()
}

/// Concatenate runs; start is the earliest start, end the latest end
pub fn merge(suite: &Suite, runs: Vec<DeviceRun>) -> MergedRun {
    let now = Local::now();
    let started_at = runs.iter().map(|r| r.started_at).min().unwrap_or(now);
    let finished_at = runs.iter().map(|r| r.finished_at).max().unwrap_or(now);
    MergedRun {
        suite_name: suite.name.clone(),
        app_name: suite.app_name().to_string(),
        runs,
        started_at,
        finished_at,
    }
}

fn panicked_run(device: &DeviceConfig, started_at: DateTime<Local>, message: String) -> DeviceRun {
    let trace = format!("device run panicked: {}", message);
    DeviceRun {
        label: device.label.clone(),
        device_name: device.device_name.clone(),
        device_model: UNAVAILABLE.to_string(),
        platform_version: device.platform_version.clone(),
        app_package: device
            .app_package
            .clone()
            .unwrap_or_else(|| UNAVAILABLE.to_string()),
        app_version: UNAVAILABLE.to_string(),
        started_at,
        finished_at: Local::now(),
        results: vec![fatal_record(&device.label, Some(FailureArtifacts::trace_only(trace.clone())))],
        fatal_error: Some(trace),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::types::{CaseInfo, StepOutcome};
    use std::time::Duration;

    fn device(label: &str, port: u16) -> DeviceConfig {
        serde_json::from_value(serde_json::json!({
            "label": label,
            "port": port,
            "platform_version": "15.0",
            "device_name": format!("serial-{}", label),
        }))
        .unwrap()
    }

    fn run_with(device: &DeviceConfig, outcomes: &[StepOutcome]) -> DeviceRun {
        let started_at = Local::now();
        let results = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| TestStepResult {
                device: device.label.clone(),
                number: (i + 1).to_string(),
                info: CaseInfo::new("c", "e"),
                outcome: *outcome,
                executed_at: Local::now(),
                failure: None,
            })
            .collect();
        DeviceRun {
            label: device.label.clone(),
            device_name: device.device_name.clone(),
            device_model: "SM-G981N".into(),
            platform_version: device.platform_version.clone(),
            app_package: "net.daum.android.daum".into(),
            app_version: "8.12.3".into(),
            started_at,
            finished_at: Local::now(),
            results,
            fatal_error: None,
        }
    }

    fn suite() -> Suite {
        Suite {
            name: "daum-search".into(),
            app_name: Some("Daum".into()),
            app_package: None,
            sequence: vec![],
        }
    }

    #[test]
    fn test_merge_keeps_every_record() {
        let devices = [device("S20", 4723), device("S23", 4724)];
        let runs = dispatch_with(&devices, |d| {
            if d.label == "S20" {
                thread::sleep(Duration::from_millis(50));
                run_with(d, &[StepOutcome::Pass, StepOutcome::Fail, StepOutcome::Pass])
            } else {
                run_with(d, &[StepOutcome::Pass, StepOutcome::Pass])
            }
        });
        // completion order
        assert_eq!(runs[0].label, "S23");

        let merged = merge(&suite(), runs);
        assert_eq!(merged.total(), 5);
        assert_eq!(merged.passed(), 4);
        assert_eq!(merged.failed(), 1);
        assert!(merged.is_multi_device());

        let mut s20: Vec<_> = merged
            .results()
            .filter(|r| r.device == "S20")
            .map(|r| r.number.clone())
            .collect();
        s20.sort();
        assert_eq!(s20, vec!["1", "2", "3"]);
        assert!(merged.started_at <= merged.finished_at);
    }

    #[test]
    fn test_panic_is_isolated() {
        let devices = [device("S20", 4723), device("S23", 4724)];
        let runs = dispatch_with(&devices, |d| {
            if d.label == "S20" {
                panic!("driver went away");
            }
            run_with(d, &[StepOutcome::Pass])
        });
        assert_eq!(runs.len(), 2);

        let broken = runs.iter().find(|r| r.label == "S20").unwrap();
        assert_eq!(broken.results.len(), 1);
        assert_eq!(broken.results[0].number, "FATAL");
        assert_eq!(broken.results[0].outcome, StepOutcome::Fail);
        assert!(broken.fatal_error.as_ref().unwrap().contains("driver went away"));

        let healthy = runs.iter().find(|r| r.label == "S23").unwrap();
        assert_eq!(healthy.passed(), 1);
    }

    #[test]
    fn test_merge_empty() {
        let merged = merge(&suite(), Vec::new());
        assert!(merged.is_empty());
        assert_eq!(merged.app_name, "Daum");
    }
}
