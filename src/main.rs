use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use mobile_qa::config;
use mobile_qa::pipeline;
use mobile_qa::report::{GoogleSheetsSink, Layout, NtfyNotifier, Reporter, SheetsConfig};
use mobile_qa::{ArtifactStore, GeminiAnalyzer, GeminiConfig, RunContext, Suite, load_devices};

/// Mobile QA - UI automation runs on Appium devices
#[derive(Parser, Debug)]
#[command(
    name = "mobile-qa",
    about = "Run declarative UI test suites on Appium devices and report the results",
    after_help = "ENVIRONMENT VARIABLES:\n\
        MOBILE_QA_SHORT_TIMEOUT        Short wait tier (seconds)\n\
        MOBILE_QA_LONG_TIMEOUT         Long wait tier (seconds)\n\
        MOBILE_QA_ARTIFACTS_DIR        Failure screenshots and logs\n\
        MOBILE_QA_SPREADSHEET          Spreadsheet document name\n\
        MOBILE_QA_SHEETS_CREDENTIALS   Service account JSON path\n\
        MOBILE_QA_NOTIFY_URL           Push notification endpoint\n\
        GEMINI_API_KEY                 Failure analysis API key\n\
        RUST_LOG                       Log filter (default: info)"
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a suite on every listed device, then report
    Run {
        /// Suite file (JSON)
        #[arg(short, long, env = "MOBILE_QA_SUITE")]
        suite: PathBuf,

        /// Device list file (JSON array)
        #[arg(short, long, env = "MOBILE_QA_DEVICES")]
        devices: PathBuf,

        /// Report layout (default: by-device for several devices, flat for one)
        #[arg(short, long, value_enum)]
        layout: Option<Layout>,

        /// Skip the spreadsheet report
        #[arg(long)]
        no_report: bool,

        /// Skip the push notification
        #[arg(long)]
        no_notify: bool,

        /// Ask the analysis model for a root-cause guess on each failure
        #[arg(long)]
        analyze: bool,

        /// Tester name shown in the report
        #[arg(long, env = "MOBILE_QA_TESTER")]
        tester: Option<String>,

        /// Failure artifacts directory
        #[arg(long, env = "MOBILE_QA_ARTIFACTS_DIR")]
        artifacts: Option<PathBuf>,

        /// Print the merged run as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a suite (and optionally a device list) without running it
    Check {
        /// Suite file (JSON)
        #[arg(short, long)]
        suite: PathBuf,

        /// Device list file (JSON array)
        #[arg(short, long)]
        devices: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Commands::Run {
            suite,
            devices,
            layout,
            no_report,
            no_notify,
            analyze,
            tester,
            artifacts,
            json,
        } => {
            let suite = Suite::load(&suite)?;
            let devices = load_devices(&devices)?;
            let cfg = config::get();

            let artifacts = artifacts
                .map(ArtifactStore::new)
                .unwrap_or_else(ArtifactStore::from_config);
            let mut ctx = RunContext::new(cfg.waits, artifacts);
            if analyze {
                if cfg.analysis.api_key.is_none() {
                    warn!("GEMINI_API_KEY is not set, analysis will be skipped per failure");
                }
                match GeminiAnalyzer::new(GeminiConfig::default()) {
                    Ok(analyzer) => ctx = ctx.with_analyzer(Arc::new(analyzer)),
                    Err(e) => error!("failure analysis disabled: {}", e),
                }
            }

            let mut reporter = Reporter::new(tester.unwrap_or_else(config::tester));
            if let Some(layout) = layout {
                reporter = reporter.layout(layout);
            }
            if !no_report {
                match GoogleSheetsSink::new(SheetsConfig::default()) {
                    Ok(sink) => reporter = reporter.sink(Box::new(sink)),
                    Err(e) => error!("spreadsheet report disabled: {}", e),
                }
            }
            if !no_notify {
                match NtfyNotifier::from_config() {
                    Ok(notifier) => reporter = reporter.notifier(Box::new(notifier)),
                    Err(e) => error!("notification disabled: {}", e),
                }
            }

            let report = pipeline::execute(&devices, &suite, &ctx, &reporter);

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let run = &report.run;
                println!(
                    "Run completed: {} checks on {} device(s), {} passed, {} failed",
                    run.total(),
                    run.runs.len(),
                    run.passed(),
                    run.failed()
                );
                for device in &run.runs {
                    println!(
                        "  {} ({}, Android {}): {} passed, {} failed",
                        device.label,
                        device.device_model,
                        device.platform_version,
                        device.passed(),
                        device.failed()
                    );
                    if let Some(fatal) = &device.fatal_error {
                        let first = fatal.lines().next().unwrap_or_default();
                        println!("    Aborted: {}", first);
                    }
                }
                if let Some(sheet) = &report.publish.sheet {
                    println!("\nReport: {}", sheet);
                }
            }
        }

        Commands::Check { suite, devices } => {
            let suite = Suite::load(&suite)?;
            println!("Suite '{}' ({}): {} cases", suite.name, suite.app_name(), suite.case_count());
            if let Some(path) = devices {
                let devices = load_devices(&path)?;
                println!("{} device(s):", devices.len());
                for device in &devices {
                    println!(
                        "  {} -> {} ({} {})",
                        device.label,
                        device.server_url(),
                        device.platform_name,
                        device.platform_version
                    );
                }
            }
        }
    }

    Ok(())
}
