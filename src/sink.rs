//! Append-only persistence sinks for the flattened session record.
//!
//! Two destinations: a local spreadsheet-style TSV file (always on) and an
//! optional remote sheet endpoint reached over HTTP. Append is
//! at-least-once; nothing here deduplicates, and a failure after another
//! sink already wrote is surfaced, not rolled back.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

/// The unit handed to every sink: ordered key/value pairs, one per column.
pub type FlatRecord = Vec<(String, String)>;

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &'static str;

    /// Append one record. The sink creates a header row from the record's
    /// keys if the destination is empty.
    async fn append_row(&self, record: &FlatRecord) -> Result<(), String>;
}

/// Local TSV destination. Creates the header row from the keys of the
/// first record if the file is empty or missing, then appends values.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path from SHEET_PATH, defaulting to ./session_records.tsv.
    pub fn from_env() -> Self {
        let path = std::env::var("SHEET_PATH").unwrap_or_else(|_| "session_records.tsv".into());
        Self::new(path)
    }
}

/// Keep one logical record per line: tabs and newlines inside a field are
/// escaped so the TSV stays rectangular.
fn escape_field(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\t', "\\t").replace('\r', "").replace('\n', "\\n")
}

#[async_trait]
impl RecordSink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    #[instrument(level = "info", skip(self, record), fields(path = %self.path.display(), columns = record.len()))]
    async fn append_row(&self, record: &FlatRecord) -> Result<(), String> {
        let existing = tokio::fs::metadata(&self.path).await.map(|m| m.len()).unwrap_or(0);

        let mut out = String::new();
        if existing == 0 {
            let header: Vec<String> = record.iter().map(|(k, _)| escape_field(k)).collect();
            out.push_str(&header.join("\t"));
            out.push('\n');
        }
        let values: Vec<String> = record.iter().map(|(_, v)| escape_field(v)).collect();
        out.push_str(&values.join("\t"));
        out.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| e.to_string())?;
        file.write_all(out.as_bytes()).await.map_err(|e| e.to_string())?;
        file.flush().await.map_err(|e| e.to_string())?;
        info!(target: "study", wrote_header = existing == 0, "Record appended to file sink");
        Ok(())
    }
}

/// Remote sheet destination: POSTs `{header, values}` JSON to a configured
/// endpoint (e.g. an Apps Script web app bound to the spreadsheet).
#[derive(Clone)]
pub struct SheetClient {
    client: reqwest::Client,
    endpoint: String,
}

impl SheetClient {
    /// Construct the client if we find SHEET_ENDPOINT; otherwise return None.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("SHEET_ENDPOINT").ok()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .ok()?;
        Some(Self { client, endpoint })
    }
}

#[async_trait]
impl RecordSink for SheetClient {
    fn name(&self) -> &'static str {
        "sheet"
    }

    #[instrument(level = "info", skip(self, record), fields(columns = record.len()))]
    async fn append_row(&self, record: &FlatRecord) -> Result<(), String> {
        let header: Vec<&str> = record.iter().map(|(k, _)| k.as_str()).collect();
        let values: Vec<&str> = record.iter().map(|(_, v)| v.as_str()).collect();
        let body = json!({ "header": header, "values": values });

        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("sheet endpoint HTTP {}: {}", status, body));
        }
        info!(target: "study", "Record appended to sheet sink");
        Ok(())
    }
}
