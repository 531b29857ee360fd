//! Blocking W3C WebDriver client with the Appium extensions the suites use.

use base64::Engine;
use reqwest::Method;
use reqwest::blocking::{Client, Response};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{DriverError, DriverResult, ElementId, Locator, Point, Rect, UiDriver};

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Pause between pointer down and up for taps
const TAP_HOLD: Duration = Duration::from_millis(100);

/// A live session against one automation server.
///
/// The session is deleted on `quit()`, or on drop if `quit()` was never called.
#[derive(Debug)]
pub struct WebDriverSession {
    http: Client,
    server_url: String,
    id: String,
    closed: bool,
}

impl WebDriverSession {
    /// Start a new session at `server_url` (e.g. `http://127.0.0.1:4723`)
    pub fn start(server_url: &str, capabilities: Value, command_timeout: Duration) -> DriverResult<Self> {
        let http = Client::builder().timeout(command_timeout).build()?;
        let server_url = server_url.trim_end_matches('/').to_string();

        info!(server = %server_url, "starting automation session");
        let body = json!({
            "capabilities": {
                "alwaysMatch": capabilities,
                "firstMatch": [{}],
            }
        });
        let resp = http.post(format!("{}/session", server_url)).json(&body).send()?;
        let value = match parse_response(resp) {
            Ok(value) => value,
            Err(DriverError::Protocol { error, message }) => {
                return Err(DriverError::SessionStart(format!("{}: {}", error, message)));
            }
            Err(e) => return Err(e),
        };

        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::SessionStart("response has no sessionId".to_string()))?
            .to_string();
        info!(session = %id, "automation session started");

        Ok(Self {
            http,
            server_url,
            id,
            closed: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Delete the session. Idempotent.
    pub fn quit(&mut self) -> DriverResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let url = format!("{}/session/{}", self.server_url, self.id);
        let resp = self.http.delete(url).send()?;
        parse_response(resp).map(|_| ())
    }

    fn command(&self, method: Method, path: &str, body: Option<Value>) -> DriverResult<Value> {
        let url = format!("{}/session/{}{}", self.server_url, self.id, path);
        debug!(%method, %url, "webdriver command");
        let mut req = self.http.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        parse_response(req.send()?)
    }

    fn element_command(&self, method: Method, element: &ElementId, suffix: &str, body: Option<Value>) -> DriverResult<Value> {
        self.command(method, &format!("/element/{}{}", element.0, suffix), body)
    }

    fn pointer_actions(&self, id: &str, steps: Vec<Value>) -> DriverResult<()> {
        let body = json!({
            "actions": [{
                "type": "pointer",
                "id": id,
                "parameters": { "pointerType": "touch" },
                "actions": steps,
            }]
        });
        self.command(Method::POST, "/actions", Some(body))?;
        Ok(())
    }
}

impl UiDriver for WebDriverSession {
    fn find(&self, locator: &Locator) -> DriverResult<ElementId> {
        let body = json!({ "using": locator.strategy(), "value": locator.wire_value()? });
        let value = self.command(Method::POST, "/element", Some(body))?;
        element_from_value(&value)
    }

    fn is_displayed(&self, element: &ElementId) -> DriverResult<bool> {
        let value = self.element_command(Method::GET, element, "/displayed", None)?;
        value
            .as_bool()
            .ok_or_else(|| DriverError::InvalidResponse(format!("displayed: {}", value)))
    }

    fn is_enabled(&self, element: &ElementId) -> DriverResult<bool> {
        let value = self.element_command(Method::GET, element, "/enabled", None)?;
        value
            .as_bool()
            .ok_or_else(|| DriverError::InvalidResponse(format!("enabled: {}", value)))
    }

    fn click(&self, element: &ElementId) -> DriverResult<()> {
        self.element_command(Method::POST, element, "/click", Some(json!({})))?;
        Ok(())
    }

    fn clear(&self, element: &ElementId) -> DriverResult<()> {
        self.element_command(Method::POST, element, "/clear", Some(json!({})))?;
        Ok(())
    }

    fn send_keys(&self, element: &ElementId, text: &str) -> DriverResult<()> {
        self.element_command(Method::POST, element, "/value", Some(json!({ "text": text })))?;
        Ok(())
    }

    fn screenshot(&self) -> DriverResult<Vec<u8>> {
        let value = self.command(Method::GET, "/screenshot", None)?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DriverError::InvalidResponse("screenshot is not a string".to_string()))?;
        // Some servers wrap the base64 payload
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
    }

    fn swipe(&self, from: Point, to: Point, duration: Duration) -> DriverResult<()> {
        self.pointer_actions(
            "touch_swipe",
            vec![
                json!({ "type": "pointerMove", "duration": 0, "x": from.x, "y": from.y, "origin": "viewport" }),
                json!({ "type": "pointerDown", "button": 0 }),
                json!({ "type": "pointerMove", "duration": duration.as_millis() as u64, "x": to.x, "y": to.y, "origin": "viewport" }),
                json!({ "type": "pointerUp", "button": 0 }),
            ],
        )
    }

    fn tap(&self, at: Point) -> DriverResult<()> {
        self.pointer_actions(
            "touch_tap",
            vec![
                json!({ "type": "pointerMove", "duration": 0, "x": at.x, "y": at.y, "origin": "viewport" }),
                json!({ "type": "pointerDown", "button": 0 }),
                json!({ "type": "pause", "duration": TAP_HOLD.as_millis() as u64 }),
                json!({ "type": "pointerUp", "button": 0 }),
            ],
        )
    }

    fn press_keycode(&self, keycode: u32) -> DriverResult<()> {
        self.command(
            Method::POST,
            "/appium/device/press_keycode",
            Some(json!({ "keycode": keycode })),
        )?;
        Ok(())
    }

    fn shell(&self, command: &str) -> DriverResult<String> {
        let body = json!({
            "script": "mobile: shell",
            "args": [{ "command": command }],
        });
        let value = self.command(Method::POST, "/execute/sync", Some(body))?;
        match value {
            Value::String(s) => Ok(s),
            Value::Object(ref map) => Ok(map
                .get("stdout")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()),
            other => Err(DriverError::InvalidResponse(format!("shell output: {}", other))),
        }
    }

    fn navigate(&self, url: &str) -> DriverResult<()> {
        self.command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn rect(&self, element: &ElementId) -> DriverResult<Rect> {
        let value = self.element_command(Method::GET, element, "/rect", None)?;
        serde_json::from_value(value.clone())
            .map_err(|_| DriverError::InvalidResponse(format!("rect: {}", value)))
    }

    fn update_settings(&self, settings: Value) -> DriverResult<()> {
        self.command(Method::POST, "/appium/settings", Some(json!({ "settings": settings })))?;
        Ok(())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.quit() {
                warn!(session = %self.id, "failed to delete session on drop: {}", e);
            }
        }
    }
}

/// Unwrap the `value` member, mapping W3C error payloads to `DriverError`
fn parse_response(resp: Response) -> DriverResult<Value> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .map_err(|e| DriverError::InvalidResponse(format!("HTTP {}: {}", status, e)))?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        // W3C puts sessionId inside value; older servers put it at the top level
        if let (Some(id), Value::Object(mut map)) = (body.get("sessionId"), value.clone()) {
            if !map.contains_key("sessionId") {
                map.insert("sessionId".to_string(), id.clone());
                return Ok(Value::Object(map));
            }
        }
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Err(match error.as_str() {
        "no such element" => DriverError::NoSuchElement(message),
        "stale element reference" => DriverError::StaleElement(message),
        _ => DriverError::Protocol { error, message },
    })
}

fn element_from_value(value: &Value) -> DriverResult<ElementId> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(|id| ElementId(id.to_string()))
        .ok_or_else(|| DriverError::InvalidResponse(format!("not an element reference: {}", value)))
}
