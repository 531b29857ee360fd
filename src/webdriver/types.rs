use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::time::Duration;
use thiserror::Error;

/// How an element is located on screen.
///
/// Serialized as a single-key object, e.g. `{"xpath": "//android.widget.Button"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    Xpath(String),
    AccessibilityId(String),
    Id(String),
    ClassName(String),
    /// Android UiSelector expression
    Uiautomator(String),
    /// CSS selector (mobile web targets)
    Css(String),
    /// Path to a template image, matched on screen by the server
    Image(String),
}

impl Locator {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::Xpath(expr.into())
    }

    pub fn accessibility_id(id: impl Into<String>) -> Self {
        Locator::AccessibilityId(id.into())
    }

    /// `//android.widget.TextView[@text="..."]`, the most common check in the suites
    pub fn text_view(text: &str) -> Self {
        Locator::Xpath(format!("//android.widget.TextView[@text=\"{}\"]", text))
    }

    /// Strategy name used on the wire
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Xpath(_) => "xpath",
            Locator::AccessibilityId(_) => "accessibility id",
            Locator::Id(_) => "id",
            Locator::ClassName(_) => "class name",
            Locator::Uiautomator(_) => "-android uiautomator",
            Locator::Css(_) => "css selector",
            Locator::Image(_) => "-image",
        }
    }

    /// Value sent to the server. Image templates are read and base64-encoded here.
    pub fn wire_value(&self) -> DriverResult<Cow<'_, str>> {
        match self {
            Locator::Image(path) => {
                let bytes = fs::read(path).map_err(|source| DriverError::Template {
                    path: path.clone(),
                    source,
                })?;
                Ok(Cow::Owned(base64::engine::general_purpose::STANDARD.encode(bytes)))
            }
            other => Ok(Cow::Borrowed(other.value())),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Xpath(v)
            | Locator::AccessibilityId(v)
            | Locator::Id(v)
            | Locator::ClassName(v)
            | Locator::Uiautomator(v)
            | Locator::Css(v)
            | Locator::Image(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

/// Opaque element reference returned by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

/// Screen coordinate in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

/// Element bounds in device pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Element state a wait can block on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Present,
    Visible,
    Invisible,
    Clickable,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Condition::Present => "presence",
            Condition::Visible => "visibility",
            Condition::Invisible => "invisibility",
            Condition::Clickable => "clickability",
        };
        f.write_str(name)
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by the automation session
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {}s waiting for {condition} of {locator}", .waited.as_secs())]
    Timeout {
        condition: Condition,
        locator: Locator,
        waited: Duration,
    },

    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("session could not be started: {0}")]
    SessionStart(String),

    #[error("webdriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cannot read template image {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("not supported by this driver: {0}")]
    Unsupported(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("screenshot decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl DriverError {
    /// Errors a wait keeps polling through
    pub fn is_transient(&self) -> bool {
        matches!(self, DriverError::NoSuchElement(_) | DriverError::StaleElement(_))
    }
}

/// The device session seam: everything the runner needs from an automation backend.
///
/// `WebDriverSession` is the production implementation. Methods take `&self`
/// so a recorder can grab a screenshot while the runner still holds the session.
pub trait UiDriver: Send + Sync {
    fn find(&self, locator: &Locator) -> DriverResult<ElementId>;

    fn is_displayed(&self, element: &ElementId) -> DriverResult<bool>;

    fn is_enabled(&self, element: &ElementId) -> DriverResult<bool>;

    fn click(&self, element: &ElementId) -> DriverResult<()>;

    fn clear(&self, element: &ElementId) -> DriverResult<()>;

    fn send_keys(&self, element: &ElementId, text: &str) -> DriverResult<()>;

    /// PNG (or JPEG) bytes of the current screen
    fn screenshot(&self) -> DriverResult<Vec<u8>>;

    /// Single-finger swipe between two points
    fn swipe(&self, from: Point, to: Point, duration: Duration) -> DriverResult<()>;

    /// Single-finger tap at a point
    fn tap(&self, at: Point) -> DriverResult<()>;

    /// Android key event (4 = BACK)
    fn press_keycode(&self, _keycode: u32) -> DriverResult<()> {
        Err(DriverError::Unsupported("press_keycode"))
    }

    /// `adb shell` through the server's `mobile: shell` extension
    fn shell(&self, _command: &str) -> DriverResult<String> {
        Err(DriverError::Unsupported("mobile: shell"))
    }

    /// Load a URL (browser targets)
    fn navigate(&self, _url: &str) -> DriverResult<()> {
        Err(DriverError::Unsupported("navigate"))
    }

    fn rect(&self, _element: &ElementId) -> DriverResult<Rect> {
        Err(DriverError::Unsupported("element rect"))
    }

    /// Merge `settings` into the server's session settings
    fn update_settings(&self, _settings: Value) -> DriverResult<()> {
        Err(DriverError::Unsupported("settings"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_wire_format() {
        let loc = Locator::accessibility_id("검색");
        assert_eq!(loc.strategy(), "accessibility id");
        assert_eq!(loc.value(), "검색");
        assert_eq!(loc.to_string(), "accessibility id=검색");
    }

    #[test]
    fn test_locator_deserialize() {
        let loc: Locator = serde_json::from_str(r#"{"xpath": "//android.widget.EditText"}"#).unwrap();
        assert_eq!(loc, Locator::xpath("//android.widget.EditText"));
        let loc: Locator = serde_json::from_str(r#"{"uiautomator": "new UiSelector().text(\"OK\")"}"#).unwrap();
        assert_eq!(loc.strategy(), "-android uiautomator");
    }

    #[test]
    fn test_image_locator_encodes_template() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("avatar.jpg");
        fs::write(&path, b"tmpl").unwrap();

        let json = format!(r#"{{"image": "{}"}}"#, path.display());
        let loc: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(loc.strategy(), "-image");
        assert_eq!(loc.wire_value().unwrap(), "dG1wbA==");
        assert_eq!(Locator::xpath("//a").wire_value().unwrap(), "//a");

        let missing = Locator::Image("/nonexistent/avatar.jpg".into());
        assert!(matches!(missing.wire_value(), Err(DriverError::Template { .. })));
    }

    #[test]
    fn test_text_view_locator() {
        assert_eq!(
            Locator::text_view("홈 탭").value(),
            "//android.widget.TextView[@text=\"홈 탭\"]"
        );
    }

    #[test]
    fn test_timeout_message() {
        let err = DriverError::Timeout {
            condition: Condition::Visible,
            locator: Locator::xpath("//a"),
            waited: Duration::from_secs(15),
        };
        assert_eq!(err.to_string(), "timed out after 15s waiting for visibility of xpath=//a");
        assert!(!err.is_transient());
        assert!(DriverError::NoSuchElement("x".into()).is_transient());
    }
}
