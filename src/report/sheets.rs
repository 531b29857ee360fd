//! Google Sheets sink.
//!
//! Opens the spreadsheet by name through Drive v3, adds one tab per run,
//! writes the summary block and the detail table in one values call, then
//! applies formatting. Formatting errors are logged and leave the data as is.
//!
//! # Authentication
//!
//! Either a pre-issued OAuth access token (`MOBILE_QA_SHEETS_TOKEN`) or a
//! service-account key file exchanged for a token with an RS256 JWT grant.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use super::format::{freeze_request, style_requests};
use super::table::ReportTable;
use crate::config;

pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4";
pub const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";

const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive";
const JWT_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Spare rows and columns added to a new tab
const GRID_PADDING_ROWS: usize = 50;
const GRID_PADDING_COLS: usize = 5;

/// Result type for report operations
pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("credentials file not found: {0}")]
    MissingCredentials(PathBuf),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("spreadsheet not found: {0}")]
    SpreadsheetNotFound(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Everything one report tab needs
#[derive(Debug, Clone)]
pub struct SheetReport {
    pub title: String,
    pub summary_rows: Vec<Vec<String>>,
    pub table: ReportTable,
}

impl SheetReport {
    /// 1-based row of the detail header
    pub fn detail_start_row(&self) -> usize {
        super::table::detail_start_row(self.summary_rows.len())
    }
}

/// Destination for a finished report
pub trait ReportSink: Send + Sync {
    /// Write the report; returns a link or name of what was written
    fn write(&self, report: &SheetReport) -> ReportResult<String>;
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub spreadsheet: String,
    pub credentials_path: PathBuf,
    pub access_token: Option<String>,
    pub sheets_api: String,
    pub drive_api: String,
    pub timeout: Duration,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        let cfg = &config::get().report;
        Self {
            spreadsheet: cfg.spreadsheet.clone(),
            credentials_path: cfg.credentials_path.clone(),
            access_token: cfg.access_token.clone(),
            sheets_api: SHEETS_API.to_string(),
            drive_api: DRIVE_API.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl SheetsConfig {
    pub fn spreadsheet(mut self, name: impl Into<String>) -> Self {
        self.spreadsheet = name.into();
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = path.into();
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Point both APIs at another base URL
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        let base = base.into();
        self.sheets_api = base.clone();
        self.drive_api = base;
        self
    }
}

/// Service-account key file fields we use
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn load(path: &std::path::Path) -> ReportResult<Self> {
        if !path.exists() {
            return Err(ReportError::MissingCredentials(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Signed JWT assertion for the bearer grant
    pub fn assertion(&self) -> ReportResult<String> {
        let iat = Utc::now().timestamp();
        let claims = GrantClaims {
            iss: &self.client_email,
            scope: SCOPES,
            aud: &self.token_uri,
            iat,
            exp: iat + 3600,
        };
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }
}

pub struct GoogleSheetsSink {
    config: SheetsConfig,
    http: Client,
}

impl GoogleSheetsSink {
    pub fn new(config: SheetsConfig) -> ReportResult<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn access_token(&self) -> ReportResult<String> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }
        let key = ServiceAccountKey::load(&self.config.credentials_path)?;
        let assertion = key.assertion()?;
        let resp = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_GRANT), ("assertion", assertion.as_str())])
            .send()?;
        let body = checked_json(resp)?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ReportError::Credentials("token response has no access_token".to_string()))
    }

    fn open_spreadsheet(&self, token: &str) -> ReportResult<String> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            self.config.spreadsheet.replace('\'', "\\'"),
            SPREADSHEET_MIME
        );
        let resp = self
            .http
            .get(format!("{}/files", self.config.drive_api))
            .bearer_auth(token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()?;
        let body = checked_json(resp)?;
        body["files"][0]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ReportError::SpreadsheetNotFound(self.config.spreadsheet.clone()))
    }

    fn batch_update(&self, token: &str, spreadsheet_id: &str, requests: Vec<Value>) -> ReportResult<Value> {
        let url = format!("{}/spreadsheets/{}:batchUpdate", self.config.sheets_api, spreadsheet_id);
        checked_json(self.http.post(url).bearer_auth(token).json(&json!({ "requests": requests })).send()?)
    }

    fn add_sheet(&self, token: &str, spreadsheet_id: &str, report: &SheetReport) -> ReportResult<i64> {
        let rows = report.detail_start_row() + report.table.rows.len() + GRID_PADDING_ROWS;
        let cols = report.table.width() + GRID_PADDING_COLS;
        let reply = self.batch_update(
            token,
            spreadsheet_id,
            vec![json!({
                "addSheet": {
                    "properties": {
                        "title": report.title,
                        "gridProperties": { "rowCount": rows, "columnCount": cols },
                    }
                }
            })],
        )?;
        reply["replies"][0]["addSheet"]["properties"]["sheetId"]
            .as_i64()
            .ok_or_else(|| ReportError::InvalidResponse("addSheet reply has no sheetId".to_string()))
    }

    fn write_values(&self, token: &str, spreadsheet_id: &str, report: &SheetReport) -> ReportResult<()> {
        let start = report.detail_start_row();
        let range = |cell: String| format!("'{}'!{}", report.title.replace('\'', "''"), cell);
        let body = json!({
            "valueInputOption": "USER_ENTERED",
            "data": [
                { "range": range("A1".into()), "majorDimension": "ROWS", "values": report.summary_rows },
                { "range": range(format!("A{}", start)), "majorDimension": "ROWS", "values": [report.table.headers] },
                { "range": range(format!("A{}", start + 1)), "majorDimension": "ROWS", "values": report.table.rows },
            ]
        });
        let url = format!("{}/spreadsheets/{}/values:batchUpdate", self.config.sheets_api, spreadsheet_id);
        checked_json(self.http.post(url).bearer_auth(token).json(&body).send()?)?;
        Ok(())
    }
}

impl ReportSink for GoogleSheetsSink {
    fn write(&self, report: &SheetReport) -> ReportResult<String> {
        let token = self.access_token()?;
        let spreadsheet_id = self.open_spreadsheet(&token)?;
        let sheet_id = self.add_sheet(&token, &spreadsheet_id, report)?;
        info!(sheet = %report.title, "sheet created");

        self.write_values(&token, &spreadsheet_id, report)?;
        info!(rows = report.table.rows.len(), "report rows written");

        let header_index = report.detail_start_row() - 1;
        let styles = style_requests(sheet_id, &report.table, &report.summary_rows, header_index);
        match self.batch_update(&token, &spreadsheet_id, styles) {
            Ok(_) => info!("report formatting applied"),
            Err(e) => error!("failed to apply report formatting: {}", e),
        }
        if let Err(e) = self.batch_update(
            &token,
            &spreadsheet_id,
            vec![freeze_request(sheet_id, report.detail_start_row())],
        ) {
            error!("failed to freeze header rows: {}", e);
        }

        Ok(format!(
            "https://docs.google.com/spreadsheets/d/{}/edit#gid={}",
            spreadsheet_id, sheet_id
        ))
    }
}

fn checked_json(resp: Response) -> ReportResult<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().unwrap_or_default();
        return Err(ReportError::Api {
            status: status.as_u16(),
            body,
        });
    }
    resp.json()
        .map_err(|e| ReportError::InvalidResponse(e.to_string()))
}
