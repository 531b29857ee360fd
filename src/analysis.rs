//! Generative-model failure analysis.
//!
//! Sends the failure screenshot plus the error trace to a Gemini
//! `generateContent` endpoint and returns a short root-cause guess.
//!
//! # Configuration
//!
//! - `GEMINI_API_KEY`: API key (analysis is skipped with a placeholder when unset)
//! - `MOBILE_QA_ANALYSIS_ENDPOINT`: API base URL
//! - `MOBILE_QA_ANALYSIS_MODEL`: model name

use base64::Engine;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config;

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API key missing")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("empty response")]
    Empty,
}

/// Produces a natural-language root-cause guess for a failed step
pub trait FailureAnalyzer: Send + Sync {
    fn analyze(&self, screenshot: &[u8], error_trace: &str) -> AnalysisResult<String>;
}

/// Configuration for the Gemini client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API base, e.g. `https://generativelanguage.googleapis.com/v1beta`
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        let cfg = &config::get().analysis;
        Self {
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            api_key: cfg.api_key.clone(),
            timeout: cfg.timeout,
        }
    }
}

impl GeminiConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct GeminiAnalyzer {
    config: GeminiConfig,
    http: Client,
}

impl GeminiAnalyzer {
    pub fn new(config: GeminiConfig) -> AnalysisResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

impl FailureAnalyzer for GeminiAnalyzer {
    fn analyze(&self, screenshot: &[u8], error_trace: &str) -> AnalysisResult<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(AnalysisError::MissingApiKey)?;

        let mime = image::guess_format(screenshot)
            .map(|f| f.to_mime_type())
            .unwrap_or("image/png");
        let request = json!({
            "contents": [{
                "parts": [
                    { "text": build_analysis_prompt(error_trace) },
                    {
                        "inline_data": {
                            "mime_type": mime,
                            "data": base64::engine::general_purpose::STANDARD.encode(screenshot),
                        }
                    }
                ]
            }]
        });

        info!(model = %self.config.model, "requesting failure analysis");
        let resp = self
            .http
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(AnalysisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: Value = resp
            .json()
            .map_err(|e| AnalysisError::InvalidResponse(e.to_string()))?;
        extract_text(&response)
    }
}

/// Concatenate the text parts of the first candidate
fn extract_text(response: &Value) -> AnalysisResult<String> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| AnalysisError::InvalidResponse("no candidate parts".to_string()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        Err(AnalysisError::Empty)
    } else {
        Ok(text.to_string())
    }
}

/// Build the QA-engineer prompt around an error trace
pub fn build_analysis_prompt(error_trace: &str) -> String {
    format!(
        "You are a professional QA engineer. Look at the error log and the screenshot and answer briefly.\n\
         1. [Cause]: explain in one sentence why the step failed.\n\
         2. [Fix]: suggest in one sentence how to fix it.\n\n\
         [Error log]\n{}",
        error_trace
    )
}

/// Run an analyzer, degrading any failure to a placeholder string
pub fn analyze_or_placeholder(analyzer: &dyn FailureAnalyzer, screenshot: &[u8], error_trace: &str) -> String {
    match analyzer.analyze(screenshot, error_trace) {
        Ok(text) => text,
        Err(AnalysisError::MissingApiKey) => {
            warn!("analysis API key not configured");
            "analysis skipped: API key missing".to_string()
        }
        Err(AnalysisError::Empty) => "no analysis content returned".to_string(),
        Err(e) => {
            warn!("failure analysis failed: {}", e);
            format!("analysis failed: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_trace() {
        let prompt = build_analysis_prompt("timed out after 15s");
        assert!(prompt.contains("[Error log]\ntimed out after 15s"));
        assert!(prompt.contains("[Cause]"));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "Cause: popup. " }, { "text": "Fix: dismiss it." }] } }]
        });
        assert_eq!(extract_text(&response).unwrap(), "Cause: popup. Fix: dismiss it.");
    }

    #[test]
    fn test_extract_text_empty() {
        let response = json!({ "candidates": [{ "content": { "parts": [{ "text": "  " }] } }] });
        assert!(matches!(extract_text(&response), Err(AnalysisError::Empty)));
        assert!(matches!(extract_text(&json!({})), Err(AnalysisError::InvalidResponse(_))));
    }

    #[test]
    fn test_missing_key_degrades_to_placeholder() {
        let analyzer = GeminiAnalyzer::new(GeminiConfig {
            endpoint: "http://127.0.0.1:9".into(),
            model: "m".into(),
            api_key: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        let text = analyze_or_placeholder(&analyzer, b"png", "trace");
        assert_eq!(text, "analysis skipped: API key missing");
    }

    #[test]
    fn test_config_builder() {
        let config = GeminiConfig::new("http://localhost:8080")
            .model("gemini-test")
            .api_key("k")
            .timeout(Duration::from_secs(5));
        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.model, "gemini-test");
        assert_eq!(config.api_key.as_deref(), Some("k"));
    }
}
