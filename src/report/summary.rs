//! Aggregate counts over a merged run.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::dispatch::MergedRun;
use crate::runner::types::format_timestamp;

/// Identification of one device in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdent {
    pub label: String,
    pub model: String,
    pub serial: String,
    pub platform_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tester: String,
    pub app_name: String,
    pub app_version: String,
    pub devices: Vec<DeviceIdent>,
    pub suite_name: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    /// Distinct case numbers
    pub scenarios: usize,
    /// Device x case records
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_run(run: &MergedRun, tester: &str) -> Self {
        let mut devices: Vec<DeviceIdent> = run
            .runs
            .iter()
            .map(|r| DeviceIdent {
                label: r.label.clone(),
                model: r.device_model.clone(),
                serial: r.device_name.clone(),
                platform_version: r.platform_version.clone(),
            })
            .collect();
        devices.sort_by(|a, b| a.label.cmp(&b.label));

        let versions: BTreeSet<&str> = run.runs.iter().map(|r| r.app_version.as_str()).collect();
        let scenarios: BTreeSet<&str> = run.results().map(|r| r.number.as_str()).collect();

        Self {
            tester: tester.to_string(),
            app_name: run.app_name.clone(),
            app_version: versions.into_iter().collect::<Vec<_>>().join(", "),
            devices,
            suite_name: run.suite_name.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            scenarios: scenarios.len(),
            total: run.total(),
            passed: run.passed(),
            failed: run.failed(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.passed, self.total)
    }

    /// e.g. `83.33%`
    pub fn success_rate_label(&self) -> String {
        format!("{:.2}%", self.success_rate())
    }

    pub fn duration_label(&self) -> String {
        let millis = (self.finished_at - self.started_at).num_milliseconds().max(0);
        format_duration(((millis as f64) / 1000.0).round() as u64)
    }

    pub fn app_label(&self) -> String {
        format!("{} (v{})", self.app_name, self.app_version)
    }

    /// `2 devices (S20, S23)`
    pub fn devices_label(&self) -> String {
        let labels: Vec<&str> = self.devices.iter().map(|d| d.label.as_str()).collect();
        let noun = if labels.len() == 1 { "device" } else { "devices" };
        format!("{} {} ({})", labels.len(), noun, labels.join(", "))
    }

    pub fn started_label(&self) -> String {
        format_timestamp(&self.started_at)
    }

    pub fn finished_label(&self) -> String {
        format_timestamp(&self.finished_at)
    }
}

/// `passed / total * 100`, zero when nothing ran
pub fn success_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

/// `H:MM:SS`, prefixed with `N day(s), ` past 24 hours
pub fn format_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let rest = total_seconds % 86_400;
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}
