//! Push notification of the run outcome (ntfy-style topic endpoint).

use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::summary::RunSummary;
use crate::config;

/// Result type for notification operations
pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Default,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Default => "default",
            Priority::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    /// Comma-separated emoji short codes
    pub tags: String,
}

impl Notification {
    pub fn from_summary(summary: &RunSummary) -> Self {
        let (title, priority) = if summary.failed > 0 {
            (format!("Appium test failed ({} failed)", summary.failed), Priority::High)
        } else if summary.total > 0 {
            (format!("Appium test passed ({} passed)", summary.passed), Priority::Default)
        } else {
            ("Appium test produced no results".to_string(), Priority::Low)
        };
        let tags = if summary.failed == 0 {
            "tada,white_check_mark"
        } else {
            "rotating_light,x"
        };

        let body = format!(
            "App: {} ({} devices)\nResult: {} passed / {} failed\nDuration: {}\nTester: {}",
            summary.app_name,
            summary.devices.len(),
            summary.passed,
            summary.failed,
            summary.duration_label(),
            summary.tester
        );

        Self {
            title,
            body,
            priority,
            tags: tags.to_string(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn send(&self, notification: &Notification) -> NotifyResult<()>;
}

pub struct NtfyNotifier {
    url: String,
    http: Client,
}

impl NtfyNotifier {
    pub fn new(url: impl Into<String>) -> NotifyResult<Self> {
        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { url: url.into(), http })
    }

    /// Notifier posting to the configured topic URL
    pub fn from_config() -> NotifyResult<Self> {
        Self::new(config::get().notify.url.clone())
    }
}

impl Notifier for NtfyNotifier {
    fn send(&self, notification: &Notification) -> NotifyResult<()> {
        let resp = self
            .http
            .post(&self.url)
            .header("Title", notification.title.as_str())
            .header("Priority", notification.priority.as_str())
            .header("Tags", notification.tags.as_str())
            .body(notification.body.clone())
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: resp.text().unwrap_or_default(),
            });
        }
        info!(url = %self.url, "notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn summary(passed: usize, failed: usize) -> RunSummary {
        let now = Local::now();
        RunSummary {
            tester: "jayden".into(),
            app_name: "Daum".into(),
            app_version: "8.12.3".into(),
            devices: vec![],
            suite_name: "daum-search".into(),
            started_at: now,
            finished_at: now,
            scenarios: passed + failed,
            total: passed + failed,
            passed,
            failed,
        }
    }

    #[test]
    fn test_priority_follows_outcome() {
        let failing = Notification::from_summary(&summary(3, 1));
        assert_eq!(failing.priority, Priority::High);
        assert_eq!(failing.tags, "rotating_light,x");
        assert_eq!(failing.title, "Appium test failed (1 failed)");

        let passing = Notification::from_summary(&summary(4, 0));
        assert_eq!(passing.priority, Priority::Default);
        assert_eq!(passing.tags, "tada,white_check_mark");

        let empty = Notification::from_summary(&summary(0, 0));
        assert_eq!(empty.priority, Priority::Low);
    }

    #[test]
    fn test_body_lines() {
        let n = Notification::from_summary(&summary(4, 1));
        assert_eq!(
            n.body,
            "App: Daum (0 devices)\nResult: 4 passed / 1 failed\nDuration: 0:00:00\nTester: jayden"
        );
    }
}
