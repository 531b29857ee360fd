//! Tabular report rows: the summary block and the detail table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use super::summary::RunSummary;
use crate::artifacts::UNAVAILABLE;
use crate::runner::types::{DEPTH_LEVELS, TestStepResult};

pub const REPORT_TITLE: &str = "Test Result Report";
pub const RESULTS_SECTION_TITLE: &str = "Result Summary";

/// Header of the expected-result column
pub const EXPECTED_HEADER: &str = "Expected Result";
/// Header of the depth column that gets a fixed width
pub const WIDE_DEPTH_HEADER: &str = "4depth";
/// Summary label whose value is left-aligned
pub const DEVICES_LABEL: &str = "Devices";

/// How detail rows are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// One row per record with a single `Result` column
    Flat,
    /// One row per case number, one result column per device
    ByDevice,
}

/// Detail table ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Columns holding PASS/FAIL cells
    pub result_columns: Range<usize>,
}

impl ReportTable {
    pub fn build<'a, I>(layout: Layout, results: I) -> Self
    where
        I: IntoIterator<Item = &'a TestStepResult>,
    {
        let mut results: Vec<&TestStepResult> = results.into_iter().collect();
        results.sort_by_key(|r| sort_key(&r.number));
        match layout {
            Layout::Flat => Self::flat(&results),
            Layout::ByDevice => Self::by_device(&results),
        }
    }

    fn flat(results: &[&TestStepResult]) -> Self {
        let mut headers = base_headers();
        let result_col = headers.len();
        headers.push("Result".to_string());
        headers.push("Executed At".to_string());

        let rows = results
            .iter()
            .map(|r| {
                let mut row = taxonomy_cells(r);
                row.push(r.outcome.to_string());
                row.push(r.executed_at_label());
                row
            })
            .collect();

        Self {
            headers,
            rows,
            result_columns: result_col..result_col + 1,
        }
    }

    fn by_device(results: &[&TestStepResult]) -> Self {
        let devices: Vec<&str> = results
            .iter()
            .map(|r| r.device.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // first-seen order of the already sorted records
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&TestStepResult>> = HashMap::new();
        for r in results {
            let group = groups.entry(r.number.as_str()).or_default();
            if group.is_empty() {
                order.push(r.number.as_str());
            }
            group.push(r);
        }

        let mut headers = base_headers();
        let first_result_col = headers.len();
        headers.extend(devices.iter().map(|d| d.to_string()));
        headers.push("Executed At".to_string());

        let rows = order
            .iter()
            .filter_map(|number| groups.get(number))
            .filter_map(|group| {
                let first = group.first()?;
                let mut row = taxonomy_cells(first);
                for device in &devices {
                    let cell = group
                        .iter()
                        .rev()
                        .find(|r| r.device == *device)
                        .map(|r| r.outcome.to_string())
                        .unwrap_or_else(|| UNAVAILABLE.to_string());
                    row.push(cell);
                }
                let latest = group.iter().map(|r| r.executed_at).max()?;
                row.push(crate::runner::types::format_timestamp(&latest));
                Some(row)
            })
            .collect();

        Self {
            headers,
            rows,
            result_columns: first_result_col..first_result_col + devices.len(),
        }
    }

    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }
}

/// Numbers first in numeric order, then everything else in input order
pub fn sort_key(number: &str) -> (bool, u64) {
    if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) {
        (false, number.parse().unwrap_or(u64::MAX))
    } else {
        (true, 0)
    }
}

fn base_headers() -> Vec<String> {
    let mut headers = vec!["No".to_string(), "Category".to_string()];
    headers.extend((1..=DEPTH_LEVELS).map(|i| format!("{}depth", i)));
    headers.push("Pre-Condition".to_string());
    headers.push(EXPECTED_HEADER.to_string());
    headers
}

fn taxonomy_cells(r: &TestStepResult) -> Vec<String> {
    let mut row = vec![r.number.clone(), r.info.category.clone()];
    row.extend((0..DEPTH_LEVELS).map(|i| r.info.depth(i).to_string()));
    row.push(r.info.precondition.clone());
    row.push(r.info.expected.clone());
    row
}

/// Two-column summary block written above the detail table
pub fn summary_rows(summary: &RunSummary, layout: Layout) -> Vec<Vec<String>> {
    let pair = |k: &str, v: String| vec![k.to_string(), v];
    let mut rows = vec![
        pair(REPORT_TITLE, String::new()),
        pair("Item", "Value".to_string()),
        pair("Tester", summary.tester.clone()),
        pair("App", summary.app_label()),
    ];

    match (layout, summary.devices.as_slice()) {
        (Layout::Flat, [device]) => {
            rows.push(pair(DEVICES_LABEL, format!("{} ({})", device.model, device.serial)));
            rows.push(pair("OS Version", format!("Android {}", device.platform_version)));
        }
        _ => rows.push(pair(DEVICES_LABEL, summary.devices_label())),
    }

    rows.extend([
        pair("Script", summary.suite_name.clone()),
        pair("Start", summary.started_label()),
        pair("End", summary.finished_label()),
        pair("Duration", summary.duration_label()),
        pair("", String::new()),
        pair(RESULTS_SECTION_TITLE, String::new()),
    ]);
    if layout == Layout::ByDevice {
        rows.push(pair("Scenarios", format!("{} cases", summary.scenarios)));
    }
    rows.extend([
        pair("Total Checks", format!("{} checks", summary.total)),
        pair("PASS", format!("{} checks", summary.passed)),
        pair("FAIL", format!("{} checks", summary.failed)),
        pair("Success Rate", summary.success_rate_label()),
    ]);
    rows
}

/// 1-based sheet row where the detail header goes
pub fn detail_start_row(summary_len: usize) -> usize {
    summary_len + 3
}

/// Title of the per-run sheet tab
pub fn sheet_title(summary: &RunSummary, layout: Layout) -> String {
    match (layout, summary.devices.first()) {
        (Layout::Flat, Some(device)) => {
            format!("{}({}){}", summary.tester, device.model, summary.finished_label())
        }
        _ => format!("{}_{}", summary.tester, summary.finished_label()),
    }
}
