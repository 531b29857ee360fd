//! One full invocation: dispatch, merge, publish.

use serde::Serialize;
use tracing::info;

use crate::dispatch::{MergedRun, dispatch, dispatch_with, merge};
use crate::report::{PublishOutcome, Reporter};
use crate::runner::types::DeviceRun;
use crate::runner::{RunContext, Suite};
use crate::webdriver::DeviceConfig;

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run: MergedRun,
    pub publish: PublishOutcome,
}

/// Run the suite on every device, then report once all devices are done
pub fn execute(devices: &[DeviceConfig], suite: &Suite, ctx: &RunContext, reporter: &Reporter) -> RunReport {
    let runs = dispatch(devices, suite, ctx);
    finish(suite, runs, reporter)
}

/// [`execute`] with a custom per-device worker
pub fn execute_with<F>(devices: &[DeviceConfig], suite: &Suite, reporter: &Reporter, worker: F) -> RunReport
where
    F: Fn(&DeviceConfig) -> DeviceRun + Sync,
{
    let runs = dispatch_with(devices, worker);
    finish(suite, runs, reporter)
}

fn finish(suite: &Suite, runs: Vec<DeviceRun>, reporter: &Reporter) -> RunReport {
    let run = merge(suite, runs);
    info!(
        devices = run.runs.len(),
        records = run.total(),
        failed = run.failed(),
        "all devices finished"
    );
    let publish = reporter.publish(&run);
    RunReport { run, publish }
}
