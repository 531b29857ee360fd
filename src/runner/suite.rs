//! Declarative suites and device lists.
//!
//! A suite is an ordered `sequence` of `setup` blocks and `case` entries.
//! Setup blocks are not recorded and abort the device run when they fail,
//! unless marked `"fatal": false`; cases are recorded PASS/FAIL and never abort.
//!
//! ```json
//! {
//!   "name": "daum-search",
//!   "app_name": "Daum",
//!   "sequence": [
//!     { "setup": { "name": "launch", "steps": [
//!       { "action": "wait_present", "locator": { "xpath": "//androidx.compose.ui.platform.ComposeView" }, "timeout": "launch", "optional": true }
//!     ] } },
//!     { "case": { "category": "Entry page", "depths": ["Search box"], "expected": "Search box is shown",
//!       "steps": [ { "action": "wait_visible", "locator": { "xpath": "//android.widget.EditText" } } ] } }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::types::CaseInfo;
use crate::webdriver::{DeviceConfig, Locator, Point};

/// Result type for loading suites and device lists
pub type SuiteResult<T> = Result<T, SuiteError>;

#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid suite: {0}")]
    Invalid(String),
}

/// Which wait budget a step uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Short,
    Long,
    Launch,
}

/// One UI interaction or assertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Wait until clickable, then click
    Tap {
        locator: Locator,
        #[serde(default)]
        timeout: Tier,
    },
    TapAt {
        at: Point,
    },
    /// Wait until clickable, click, optionally clear, then type
    Type {
        locator: Locator,
        text: String,
        #[serde(default = "default_true")]
        clear: bool,
        #[serde(default)]
        timeout: Tier,
    },
    Swipe {
        from: Point,
        to: Point,
        #[serde(default = "default_swipe_ms")]
        duration_ms: u64,
    },
    WaitVisible {
        locator: Locator,
        #[serde(default)]
        timeout: Tier,
    },
    WaitInvisible {
        locator: Locator,
        #[serde(default)]
        timeout: Tier,
    },
    WaitClickable {
        locator: Locator,
        #[serde(default)]
        timeout: Tier,
    },
    WaitPresent {
        locator: Locator,
        #[serde(default)]
        timeout: Tier,
    },
    /// Wait for a template image on screen, optionally searched only inside
    /// the bounds of the `within` element
    WaitImage {
        image: String,
        #[serde(default)]
        within: Option<Locator>,
        #[serde(default)]
        timeout: Tier,
    },
    Sleep {
        ms: u64,
    },
    /// Android BACK key
    Back,
    Navigate {
        url: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_swipe_ms() -> u64 {
    300
}

impl Action {
    /// Short description for logs and error traces
    pub fn describe(&self) -> String {
        match self {
            Action::Tap { locator, .. } => format!("tap {}", locator),
            Action::TapAt { at } => format!("tap at ({}, {})", at.x, at.y),
            Action::Type { locator, text, .. } => format!("type '{}' into {}", text, locator),
            Action::Swipe { from, to, .. } => {
                format!("swipe ({}, {}) -> ({}, {})", from.x, from.y, to.x, to.y)
            }
            Action::WaitVisible { locator, .. } => format!("wait visible {}", locator),
            Action::WaitInvisible { locator, .. } => format!("wait invisible {}", locator),
            Action::WaitClickable { locator, .. } => format!("wait clickable {}", locator),
            Action::WaitPresent { locator, .. } => format!("wait present {}", locator),
            Action::WaitImage { image, within: None, .. } => format!("wait image {}", image),
            Action::WaitImage { image, within: Some(area), .. } => {
                format!("wait image {} within {}", image, area)
            }
            Action::Sleep { ms } => format!("sleep {}ms", ms),
            Action::Back => "back".to_string(),
            Action::Navigate { url } => format!("navigate {}", url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: Action,

    /// Failure is logged and the enclosing block continues
    #[serde(default)]
    pub optional: bool,
}

impl From<Action> for Step {
    fn from(action: Action) -> Self {
        Self {
            action,
            optional: false,
        }
    }
}

/// Unrecorded steps run between cases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupBlock {
    pub name: String,
    pub steps: Vec<Step>,

    /// Record a FAIL with this taxonomy, numbered `<next>-0`, when the block fails
    #[serde(default)]
    pub record_failure_as: Option<CaseInfo>,

    /// Failure aborts the device run; when false the sequence continues
    #[serde(default = "default_true")]
    pub fatal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSpec {
    #[serde(flatten)]
    pub info: CaseInfo,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Setup(SetupBlock),
    Case(CaseSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub name: String,

    /// Display name in reports; defaults to the suite name
    #[serde(default)]
    pub app_name: Option<String>,

    /// Package probed for the app version; defaults to the device's package
    #[serde(default)]
    pub app_package: Option<String>,

    pub sequence: Vec<Entry>,
}

impl Suite {
    pub fn load(path: &Path) -> SuiteResult<Self> {
        let suite: Suite = read_json(path)?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn validate(&self) -> SuiteResult<()> {
        if self.case_count() == 0 {
            return Err(SuiteError::Invalid(format!("suite '{}' has no cases", self.name)));
        }
        for entry in &self.sequence {
            let (label, steps) = match entry {
                Entry::Setup(block) => (block.name.as_str(), &block.steps),
                Entry::Case(case) => (case.info.expected.as_str(), &case.steps),
            };
            if steps.is_empty() {
                return Err(SuiteError::Invalid(format!("'{}' has no steps", label)));
            }
        }
        Ok(())
    }

    pub fn case_count(&self) -> usize {
        self.sequence
            .iter()
            .filter(|e| matches!(e, Entry::Case(_)))
            .count()
    }

    pub fn app_name(&self) -> &str {
        self.app_name.as_deref().unwrap_or(&self.name)
    }
}

/// Load a JSON array of device configurations
pub fn load_devices(path: &Path) -> SuiteResult<Vec<DeviceConfig>> {
    let devices: Vec<DeviceConfig> = read_json(path)?;
    if devices.is_empty() {
        return Err(SuiteError::Invalid(format!("{} lists no devices", path.display())));
    }
    let mut servers = HashSet::new();
    let mut labels = HashSet::new();
    for device in &devices {
        if !servers.insert((device.host.as_str(), device.port)) {
            return Err(SuiteError::Invalid(format!(
                "server {}:{} is used by more than one device",
                device.host, device.port
            )));
        }
        // labels key report columns and artifact names
        if !labels.insert(device.label.as_str()) {
            return Err(SuiteError::Invalid(format!(
                "device label '{}' is used more than once",
                device.label
            )));
        }
    }
    Ok(devices)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> SuiteResult<T> {
    let text = fs::read_to_string(path).map_err(|source| SuiteError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SuiteError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"{
        "name": "daum-search",
        "app_name": "Daum",
        "sequence": [
            { "setup": { "name": "walkthrough", "steps": [
                { "action": "swipe", "from": {"x": 958, "y": 1065}, "to": {"x": 213, "y": 1069} },
                { "action": "wait_visible", "locator": {"xpath": "//android.widget.TextView[@text=\"홈 탭\"]"}, "optional": true }
            ] } },
            { "case": {
                "category": "Entry page",
                "depths": ["Recent searches", "History"],
                "expected": "Notice text is shown",
                "steps": [
                    { "action": "tap", "locator": {"accessibility_id": "전체삭제"}, "timeout": "long" },
                    { "action": "type", "locator": {"xpath": "//android.widget.EditText"}, "text": "날씨" },
                    { "action": "back" }
                ]
            } }
        ]
    }"#;

    #[test]
    fn test_parse_suite() {
        let suite: Suite = serde_json::from_str(SUITE).unwrap();
        suite.validate().unwrap();
        assert_eq!(suite.case_count(), 1);
        assert_eq!(suite.app_name(), "Daum");

        let Entry::Setup(setup) = &suite.sequence[0] else { panic!("expected setup") };
        assert_eq!(setup.steps.len(), 2);
        assert!(setup.steps[1].optional);
        assert!(matches!(setup.steps[0].action, Action::Swipe { duration_ms: 300, .. }));

        let Entry::Case(case) = &suite.sequence[1] else { panic!("expected case") };
        assert_eq!(case.info.depth(1), "History");
        assert_eq!(
            case.steps[0].action,
            Action::Tap { locator: Locator::accessibility_id("전체삭제"), timeout: Tier::Long }
        );
        assert!(matches!(case.steps[1].action, Action::Type { clear: true, timeout: Tier::Short, .. }));
        assert_eq!(case.steps[2].action, Action::Back);
    }

    #[test]
    fn test_suite_without_cases_is_invalid() {
        let suite = Suite {
            name: "empty".into(),
            app_name: None,
            app_package: None,
            sequence: vec![],
        };
        assert!(matches!(suite.validate(), Err(SuiteError::Invalid(_))));
    }

    #[test]
    fn test_describe() {
        let action = Action::WaitInvisible { locator: Locator::xpath("//a"), timeout: Tier::Short };
        assert_eq!(action.describe(), "wait invisible xpath=//a");

        let action: Action = serde_json::from_str(
            r#"{"action": "wait_image", "image": "avatar.jpg", "within": {"xpath": "//android.widget.ImageView"}}"#,
        )
        .unwrap();
        assert_eq!(action.describe(), "wait image avatar.jpg within xpath=//android.widget.ImageView");
    }

    #[test]
    fn test_load_devices_rejects_duplicate_ports() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("devices.json");
        fs::write(
            &path,
            r#"[
                {"label": "a", "port": 4723, "platform_version": "15.0", "device_name": "A"},
                {"label": "b", "port": 4723, "platform_version": "13.0", "device_name": "B"}
            ]"#,
        )
        .unwrap();
        assert!(matches!(load_devices(&path), Err(SuiteError::Invalid(_))));
    }

    #[test]
    fn test_load_devices_rejects_duplicate_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("devices.json");
        fs::write(
            &path,
            r#"[
                {"label": "S23", "port": 4723, "platform_version": "15.0", "device_name": "A"},
                {"label": "S23", "port": 4724, "platform_version": "15.0", "device_name": "B"}
            ]"#,
        )
        .unwrap();
        let err = load_devices(&path).unwrap_err();
        assert!(err.to_string().contains("device label 'S23'"), "{}", err);
    }

    #[test]
    fn test_load_devices() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("devices.json");
        fs::write(
            &path,
            r#"[
                {"label": "S20", "port": 4723, "platform_version": "13.0", "device_name": "A"},
                {"label": "S23", "port": 4724, "platform_version": "15.0", "device_name": "B"}
            ]"#,
        )
        .unwrap();
        let devices = load_devices(&path).unwrap();
        assert_eq!(devices.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Suite::load(Path::new("/nonexistent/suite.json")).unwrap_err();
        assert!(matches!(err, SuiteError::Read { .. }));
    }
}
