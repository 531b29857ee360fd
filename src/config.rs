//! Configuration management with environment variable support.
//!
//! Settings that are not part of a suite or device file are read from the
//! environment here, falling back to the defaults below.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MOBILE_QA_SHORT_TIMEOUT` | Short wait tier (seconds) | `15` |
//! | `MOBILE_QA_LONG_TIMEOUT` | Long wait tier (seconds) | `30` |
//! | `MOBILE_QA_LAUNCH_TIMEOUT` | App launch wait tier (seconds) | `20` |
//! | `MOBILE_QA_POLL_INTERVAL_MS` | Wait condition poll interval | `500` |
//! | `MOBILE_QA_ARTIFACTS_DIR` | Failure screenshots and logs | `test_issue` |
//! | `MOBILE_QA_SPREADSHEET` | Spreadsheet document name | `Appium Auto test Report` |
//! | `MOBILE_QA_SHEETS_CREDENTIALS` | Service account JSON path | `config/service-account.json` |
//! | `MOBILE_QA_SHEETS_TOKEN` | Pre-issued OAuth access token | unset |
//! | `MOBILE_QA_NOTIFY_URL` | Push notification endpoint | `https://ntfy.sh/daumapp_autotest` |
//! | `MOBILE_QA_ANALYSIS_ENDPOINT` | Generative analysis base URL | `https://generativelanguage.googleapis.com/v1beta` |
//! | `MOBILE_QA_ANALYSIS_MODEL` | Analysis model | `gemini-2.0-flash` |
//! | `GEMINI_API_KEY` | Analysis API key | unset |
//! | `MOBILE_QA_TESTER` | Tester name shown in reports | login user |
//!
//! # Example
//!
//! ```bash
//! export MOBILE_QA_SHEETS_CREDENTIALS="$HOME/Autotest/config/daumapp.json"
//! export MOBILE_QA_LONG_TIMEOUT=45
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default short wait tier (seconds)
pub const DEFAULT_SHORT_TIMEOUT: u64 = 15;

/// Default long wait tier (seconds)
pub const DEFAULT_LONG_TIMEOUT: u64 = 30;

/// Default wait for the first screen after launch (seconds)
pub const DEFAULT_LAUNCH_TIMEOUT: u64 = 20;

/// Default poll interval for wait conditions (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Default WebDriver HTTP timeout per command (seconds)
pub const DEFAULT_COMMAND_TIMEOUT: u64 = 120;

/// Default artifacts directory
pub const DEFAULT_ARTIFACTS_DIR: &str = "test_issue";

/// Default spreadsheet document name
pub const DEFAULT_SPREADSHEET: &str = "Appium Auto test Report";

/// Default service account credential path
pub const DEFAULT_SHEETS_CREDENTIALS: &str = "config/service-account.json";

/// Default push notification endpoint
pub const DEFAULT_NOTIFY_URL: &str = "https://ntfy.sh/daumapp_autotest";

/// Default generative analysis API base
pub const DEFAULT_ANALYSIS_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default analysis model
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.0-flash";

/// Default analysis request timeout (seconds)
pub const DEFAULT_ANALYSIS_TIMEOUT: u64 = 60;

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_SHORT_TIMEOUT: &str = "MOBILE_QA_SHORT_TIMEOUT";
pub const ENV_LONG_TIMEOUT: &str = "MOBILE_QA_LONG_TIMEOUT";
pub const ENV_LAUNCH_TIMEOUT: &str = "MOBILE_QA_LAUNCH_TIMEOUT";
pub const ENV_POLL_INTERVAL: &str = "MOBILE_QA_POLL_INTERVAL_MS";
pub const ENV_COMMAND_TIMEOUT: &str = "MOBILE_QA_COMMAND_TIMEOUT";
pub const ENV_ARTIFACTS_DIR: &str = "MOBILE_QA_ARTIFACTS_DIR";
pub const ENV_SPREADSHEET: &str = "MOBILE_QA_SPREADSHEET";
pub const ENV_SHEETS_CREDENTIALS: &str = "MOBILE_QA_SHEETS_CREDENTIALS";
pub const ENV_SHEETS_TOKEN: &str = "MOBILE_QA_SHEETS_TOKEN";
pub const ENV_NOTIFY_URL: &str = "MOBILE_QA_NOTIFY_URL";
pub const ENV_ANALYSIS_ENDPOINT: &str = "MOBILE_QA_ANALYSIS_ENDPOINT";
pub const ENV_ANALYSIS_MODEL: &str = "MOBILE_QA_ANALYSIS_MODEL";
pub const ENV_ANALYSIS_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_TESTER: &str = "MOBILE_QA_TESTER";

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub waits: WaitSettings,
    pub artifacts: ArtifactSettings,
    pub report: ReportSettings,
    pub analysis: AnalysisSettings,
    pub notify: NotifySettings,
    /// Tester name shown in reports and notifications
    pub tester: String,
}

/// Wait tiers and polling
#[derive(Debug, Clone, Copy)]
pub struct WaitSettings {
    pub short: Duration,
    pub long: Duration,
    pub launch: Duration,
    pub poll_interval: Duration,
    /// HTTP timeout for a single WebDriver command
    pub command_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub spreadsheet: String,
    pub credentials_path: PathBuf,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub url: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            waits: WaitSettings::from_env(),
            artifacts: ArtifactSettings {
                dir: env::var(ENV_ARTIFACTS_DIR)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARTIFACTS_DIR)),
            },
            report: ReportSettings {
                spreadsheet: env::var(ENV_SPREADSHEET)
                    .unwrap_or_else(|_| DEFAULT_SPREADSHEET.to_string()),
                credentials_path: env::var(ENV_SHEETS_CREDENTIALS)
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_SHEETS_CREDENTIALS)),
                access_token: non_empty_var(ENV_SHEETS_TOKEN),
            },
            analysis: AnalysisSettings {
                endpoint: env::var(ENV_ANALYSIS_ENDPOINT)
                    .unwrap_or_else(|_| DEFAULT_ANALYSIS_ENDPOINT.to_string()),
                model: env::var(ENV_ANALYSIS_MODEL)
                    .unwrap_or_else(|_| DEFAULT_ANALYSIS_MODEL.to_string()),
                api_key: non_empty_var(ENV_ANALYSIS_API_KEY),
                timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT),
            },
            notify: NotifySettings {
                url: env::var(ENV_NOTIFY_URL).unwrap_or_else(|_| DEFAULT_NOTIFY_URL.to_string()),
            },
            tester: non_empty_var(ENV_TESTER).unwrap_or_else(default_tester),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            waits: WaitSettings::defaults(),
            artifacts: ArtifactSettings {
                dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            },
            report: ReportSettings {
                spreadsheet: DEFAULT_SPREADSHEET.to_string(),
                credentials_path: PathBuf::from(DEFAULT_SHEETS_CREDENTIALS),
                access_token: None,
            },
            analysis: AnalysisSettings {
                endpoint: DEFAULT_ANALYSIS_ENDPOINT.to_string(),
                model: DEFAULT_ANALYSIS_MODEL.to_string(),
                api_key: None,
                timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT),
            },
            notify: NotifySettings {
                url: DEFAULT_NOTIFY_URL.to_string(),
            },
            tester: default_tester(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl WaitSettings {
    pub fn from_env() -> Self {
        Self {
            short: Duration::from_secs(parse_var(ENV_SHORT_TIMEOUT).unwrap_or(DEFAULT_SHORT_TIMEOUT)),
            long: Duration::from_secs(parse_var(ENV_LONG_TIMEOUT).unwrap_or(DEFAULT_LONG_TIMEOUT)),
            launch: Duration::from_secs(parse_var(ENV_LAUNCH_TIMEOUT).unwrap_or(DEFAULT_LAUNCH_TIMEOUT)),
            poll_interval: Duration::from_millis(
                parse_var(ENV_POLL_INTERVAL).unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            command_timeout: Duration::from_secs(
                parse_var(ENV_COMMAND_TIMEOUT).unwrap_or(DEFAULT_COMMAND_TIMEOUT),
            ),
        }
    }

    pub fn defaults() -> Self {
        Self {
            short: Duration::from_secs(DEFAULT_SHORT_TIMEOUT),
            long: Duration::from_secs(DEFAULT_LONG_TIMEOUT),
            launch: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_var(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Login user, then host name, then a fixed fallback
fn default_tester() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| {
            hostname::get()
                .ok()
                .map(|h| h.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "tester".to_string())
}

/// Get the artifacts directory (convenience function)
pub fn artifacts_dir() -> PathBuf {
    get().artifacts.dir.clone()
}

/// Get the tester name (convenience function)
pub fn tester() -> String {
    get().tester.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.waits.short, Duration::from_secs(15));
        assert_eq!(config.waits.long, Duration::from_secs(30));
        assert_eq!(config.waits.launch, Duration::from_secs(20));
        assert_eq!(config.artifacts.dir, PathBuf::from("test_issue"));
        assert_eq!(config.report.spreadsheet, DEFAULT_SPREADSHEET);
        assert!(config.analysis.api_key.is_none());
    }

    #[test]
    fn test_default_tester_is_never_empty() {
        assert!(!default_tester().is_empty());
    }

    #[test]
    fn test_parse_var_missing() {
        assert_eq!(parse_var("MOBILE_QA_DEFINITELY_UNSET_VAR"), None);
    }
}
