//! Device and app identification over `mobile: shell`.

use tracing::warn;

use crate::artifacts::UNAVAILABLE;
use crate::webdriver::UiDriver;

/// Shown when the package exists but reports no version
pub const VERSION_NOT_FOUND: &str = "Not Found";

/// `ro.product.model`, or `N/A` when the shell call fails
pub fn device_model(driver: &dyn UiDriver) -> String {
    match driver.shell("getprop ro.product.model") {
        Ok(out) if !out.trim().is_empty() => out.trim().to_string(),
        Ok(_) => UNAVAILABLE.to_string(),
        Err(e) => {
            warn!("device model probe failed: {}", e);
            UNAVAILABLE.to_string()
        }
    }
}

/// `versionName` of an installed package
pub fn app_version(driver: &dyn UiDriver, package: &str) -> String {
    match driver.shell(&format!("dumpsys package {}", package)) {
        Ok(out) => parse_version_name(&out).unwrap_or_else(|| VERSION_NOT_FOUND.to_string()),
        Err(e) => {
            warn!(package, "app version probe failed: {}", e);
            UNAVAILABLE.to_string()
        }
    }
}

fn parse_version_name(dumpsys: &str) -> Option<String> {
    dumpsys
        .lines()
        .filter_map(|line| line.trim().strip_prefix("versionName="))
        .map(|v| v.split_whitespace().next().unwrap_or("").to_string())
        .find(|v| !v.is_empty())
}
