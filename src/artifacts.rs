//! Failure artifact storage.
//!
//! Screenshots and plain-text failure logs land in one flat directory
//! (`test_issue` by default), created on first use:
//! - `FAIL_<device>_case_<n>_<YYYYMMDD_HHMMSS>.png`
//! - `FAIL_<device>_case_<n>_<YYYYMMDD_HHMMSS>_log.txt`

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder written wherever an artifact could not be produced
pub const UNAVAILABLE: &str = "N/A";

/// Directory of failure artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    pub dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the configured artifacts directory
    pub fn from_config() -> Self {
        Self::new(crate::config::artifacts_dir())
    }

    /// Create the directory if missing
    pub fn ensure_dir(&self) -> std::io::Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            info!(dir = %self.dir.display(), "created artifacts directory");
        }
        Ok(())
    }

    /// Base name for a failed case
    pub fn case_base_name(device_label: &str, case_number: &str) -> String {
        format!(
            "FAIL_{}_case_{}_{}",
            sanitize_name(device_label),
            sanitize_name(case_number),
            timestamp_suffix()
        )
    }

    /// Base name for a run-fatal error
    pub fn fatal_base_name(device_label: &str) -> String {
        format!("FATAL_ERROR_{}_{}", sanitize_name(device_label), timestamp_suffix())
    }

    /// Path for a screenshot; `extension` follows the detected image format
    pub fn screenshot_path(&self, base_name: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", base_name, extension))
    }

    pub fn log_path(&self, base_name: &str) -> PathBuf {
        self.dir.join(format!("{}_log.txt", base_name))
    }

    pub fn save_screenshot(&self, base_name: &str, image_data: &[u8]) -> std::io::Result<PathBuf> {
        self.ensure_dir()?;
        let extension = image::guess_format(image_data)
            .ok()
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("png");
        let path = self.screenshot_path(base_name, extension);
        fs::write(&path, image_data)?;
        debug!(path = %path.display(), bytes = image_data.len(), "screenshot saved");
        Ok(path)
    }

    /// Write the failure log: time, screenshot location and error trace
    pub fn write_failure_log(
        &self,
        base_name: &str,
        screenshot: Option<&Path>,
        error_trace: &str,
    ) -> std::io::Result<PathBuf> {
        self.ensure_dir()?;
        let path = self.log_path(base_name);
        let screenshot_line = screenshot
            .map(|p| absolute(p).display().to_string())
            .unwrap_or_else(|| UNAVAILABLE.to_string());

        let content = format!(
            "### Test failure log ###\nOccurred at: {}\nScreenshot: {}\n\n--- Error trace ---\n{}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            screenshot_line,
            error_trace
        );
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Append the analysis section to an existing log
    pub fn append_analysis(&self, log_path: &Path, analysis: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(log_path)?;
        write!(file, "\n\n--- Failure analysis ---\n{}", analysis)?;
        Ok(())
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::from_config()
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn timestamp_suffix() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames. Letters and digits in any script
/// are kept; everything else becomes `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
