use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// One device under test and the automation server it is attached to.
///
/// Ports and `device_name` must be unique across a parallel run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Label used in logs, artifact names and report columns
    pub label: String,

    #[serde(default = "default_host")]
    pub host: String,

    pub port: u16,

    /// Base path of the server (`/wd/hub` for Appium 1)
    #[serde(default)]
    pub base_path: String,

    #[serde(default = "default_platform")]
    pub platform_name: String,

    pub platform_version: String,

    /// Device serial / UDID
    pub device_name: String,

    #[serde(default)]
    pub app_package: Option<String>,

    #[serde(default)]
    pub app_activity: Option<String>,

    /// Set for mobile web targets instead of a package/activity
    #[serde(default)]
    pub browser_name: Option<String>,

    /// Merged over the generated capabilities, keys verbatim
    #[serde(default)]
    pub extra_capabilities: Map<String, Value>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_platform() -> String {
    "Android".to_string()
}

impl DeviceConfig {
    pub fn server_url(&self) -> String {
        let path = self.base_path.trim_end_matches('/');
        if path.is_empty() || path.starts_with('/') {
            format!("http://{}:{}{}", self.host, self.port, path)
        } else {
            format!("http://{}:{}/{}", self.host, self.port, path)
        }
    }

    /// Session capabilities: target app plus the fixed session options
    pub fn capabilities(&self) -> Value {
        let mut caps = Map::new();
        caps.insert("platformName".into(), json!(self.platform_name));
        caps.insert("appium:platformVersion".into(), json!(self.platform_version));
        caps.insert("appium:deviceName".into(), json!(self.device_name));
        caps.insert("appium:automationName".into(), json!("UiAutomator2"));
        caps.insert("appium:ensureWebviewsHavePages".into(), json!(true));
        caps.insert("appium:newCommandTimeout".into(), json!(3600));
        caps.insert("appium:connectHardwareKeyboard".into(), json!(false));
        caps.insert("appium:nativeWebScreenshot".into(), json!(true));
        caps.insert("appium:noReset".into(), json!(false));

        if let Some(browser) = &self.browser_name {
            caps.insert("browserName".into(), json!(browser));
        }
        if let Some(package) = &self.app_package {
            caps.insert("appium:appPackage".into(), json!(package));
        }
        if let Some(activity) = &self.app_activity {
            caps.insert("appium:appActivity".into(), json!(activity));
        }

        for (key, value) in &self.extra_capabilities {
            caps.insert(key.clone(), value.clone());
        }
        Value::Object(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn galaxy() -> DeviceConfig {
        serde_json::from_value(json!({
            "label": "S21 Ultra (15)",
            "port": 4723,
            "platform_version": "15.0",
            "device_name": "R3CR10ZHBZP",
            "app_package": "net.daum.android.daum",
            "app_activity": "net.daum.android.daum.DaumActivity",
            "extra_capabilities": { "appium:noReset": true }
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let device = galaxy();
        assert_eq!(device.host, "127.0.0.1");
        assert_eq!(device.platform_name, "Android");
        assert_eq!(device.server_url(), "http://127.0.0.1:4723");
    }

    #[test]
    fn test_capabilities_include_session_options() {
        let caps = galaxy().capabilities();
        assert_eq!(caps["appium:automationName"], "UiAutomator2");
        assert_eq!(caps["appium:newCommandTimeout"], 3600);
        assert_eq!(caps["appium:appPackage"], "net.daum.android.daum");
        assert!(caps.get("browserName").is_none());
    }

    #[test]
    fn test_extra_capabilities_override() {
        let caps = galaxy().capabilities();
        assert_eq!(caps["appium:noReset"], true);
    }

    #[test]
    fn test_server_url_with_base_path() {
        let mut device = galaxy();
        device.base_path = "wd/hub".into();
        assert_eq!(device.server_url(), "http://127.0.0.1:4723/wd/hub");
        device.base_path = "/wd/hub/".into();
        assert_eq!(device.server_url(), "http://127.0.0.1:4723/wd/hub");
    }
}
