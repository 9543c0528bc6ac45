use std::thread;
use std::time::Duration;

use encoding_rs::WINDOWS_1252;
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::Serialize;

use crate::archive;
use crate::domain::{Environment, SourceDescriptor};
use crate::error::AnpError;
use crate::schema::{FIELD_HEADERS, WELL_HEADERS};
use crate::store::Store;
use crate::table::{RawTable, clean_header, locate_header_line, line_offset};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Bytes that have no mapping in Windows-1252.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

const DELIMITERS: [u8; 2] = [b',', b';'];

pub trait SourceClient: Send + Sync {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, AnpError>;
}

/// Back-off for transient portal failures.
///
/// The delay doubles per attempt from `base_delay`; a `Retry-After` header
/// given in seconds replaces it. Every delay is capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.base_delay.saturating_mul(1 << attempt.min(16));
        retry_after.unwrap_or(backoff).min(self.max_delay)
    }

    /// Gateway hiccups and throttling; other statuses are final.
    pub fn retries_status(status: u16) -> bool {
        matches!(status, 408 | 429 | 502 | 503 | 504)
    }

    fn retries_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Clone)]
pub struct AnpHttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl AnpHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, AnpError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("anp-wells/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AnpError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| AnpError::Http(err.to_string()))?;
        Ok(Self {
            client,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn get_with_retries(&self, url: &str) -> Result<Response, AnpError> {
        let mut attempt = 0u32;
        loop {
            let wait = match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if attempt >= self.retry.attempts || !RetryPolicy::retries_status(status) {
                        return Ok(response);
                    }
                    tracing::debug!(%url, status, attempt, "transient status, retrying");
                    self.retry.delay(attempt, retry_after(&response))
                }
                Err(err) => {
                    if attempt >= self.retry.attempts || !RetryPolicy::retries_error(&err) {
                        return Err(AnpError::Http(err.to_string()));
                    }
                    tracing::debug!(%url, %err, attempt, "request failed, retrying");
                    self.retry.delay(attempt, None)
                }
            };
            thread::sleep(wait);
            attempt += 1;
        }
    }
}

impl SourceClient for AnpHttpClient {
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, AnpError> {
        let response = self.get_with_retries(url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .map(|body| body.chars().take(200).collect())
                .unwrap_or_else(|_| "request failed".to_string());
            return Err(AnpError::Status { status, message });
        }
        let bytes = response
            .bytes()
            .map_err(|err| AnpError::Http(err.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    Windows1252,
    Utf8,
    Latin1,
}

impl SourceEncoding {
    pub const FALLBACK_ORDER: [SourceEncoding; 3] = [
        SourceEncoding::Windows1252,
        SourceEncoding::Utf8,
        SourceEncoding::Latin1,
    ];

    /// Strict decode: `None` when the bytes are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            SourceEncoding::Windows1252 => {
                if bytes.iter().any(|byte| CP1252_UNDEFINED.contains(byte)) {
                    return None;
                }
                WINDOWS_1252
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .map(|text| text.into_owned())
            }
            SourceEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            SourceEncoding::Latin1 => Some(bytes.iter().map(|byte| char::from(*byte)).collect()),
        }
    }
}

/// Decodes raw file bytes to text with the encoding fallback chain.
///
/// A UTF-8 byte-order mark short-circuits to UTF-8.
pub fn decode_text(bytes: &[u8]) -> Result<(String, SourceEncoding), AnpError> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        if let Some(text) = SourceEncoding::Utf8.decode(rest) {
            return Ok((text, SourceEncoding::Utf8));
        }
    }
    SourceEncoding::FALLBACK_ORDER
        .iter()
        .find_map(|encoding| encoding.decode(bytes).map(|text| (text, *encoding)))
        .ok_or_else(|| AnpError::Decode("no candidate encoding accepted the file".to_string()))
}

/// Parses decoded CSV text, trying comma then semicolon.
///
/// A delimiter is accepted when it yields a header of at least two columns.
/// Rows whose width differs from the header are skipped.
pub fn parse_table(text: &str, scan_lines: usize) -> Result<RawTable, AnpError> {
    let mut markers: Vec<&str> = FIELD_HEADERS.to_vec();
    markers.extend_from_slice(WELL_HEADERS);
    let start = locate_header_line(text, &markers, scan_lines)
        .map(|line| line_offset(text, line))
        .unwrap_or(0);
    let body = &text[start..];

    for delimiter in DELIMITERS {
        match parse_with_delimiter(body, delimiter) {
            Ok(table) if table.headers.len() > 1 => return Ok(table),
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(delimiter = %char::from(delimiter), %err, "delimiter rejected");
            }
        }
    }
    Err(AnpError::Decode(
        "no candidate delimiter produced a multi-column header".to_string(),
    ))
}

fn parse_with_delimiter(body: &str, delimiter: u8) -> Result<RawTable, AnpError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|err| AnpError::Decode(err.to_string()))?
        .iter()
        .map(clean_header)
        .collect::<Vec<_>>();

    let mut table = RawTable::new(headers);
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if record.len() != table.headers.len() {
            skipped += 1;
            continue;
        }
        table
            .rows
            .push(record.iter().map(|value| value.trim().to_string()).collect());
    }
    if skipped > 0 {
        tracing::debug!(skipped, "malformed rows skipped");
    }
    Ok(table)
}

/// Decodes one downloaded source (plain CSV or zip archive) into a table.
pub fn decode_source(bytes: Vec<u8>, scan_lines: usize) -> Result<RawTable, AnpError> {
    let bytes = archive::unwrap_source(bytes)?;
    let (text, encoding) = decode_text(&bytes)?;
    tracing::debug!(?encoding, "source decoded");
    parse_table(&text, scan_lines)
}

pub fn fetch_table(
    client: &dyn SourceClient,
    url: &str,
    scan_lines: usize,
) -> Result<RawTable, AnpError> {
    let bytes = client.get_bytes(url)?;
    decode_source(bytes, scan_lines)
}

/// Raw bytes of a source file, served from the local raw cache when present.
///
/// Every network download refreshes the cached copy.
pub fn fetch_cached(
    client: &dyn SourceClient,
    store: &Store,
    descriptor: &SourceDescriptor,
    refresh: bool,
) -> Result<Vec<u8>, AnpError> {
    let path = store.raw_file_path(descriptor);
    if !refresh && store.exists(&path) {
        match Store::read_bytes(&path) {
            Ok(bytes) => {
                tracing::debug!(%path, "raw cache hit");
                return Ok(bytes);
            }
            Err(err) => tracing::warn!(%path, %err, "raw cache entry unreadable, downloading"),
        }
    }
    let bytes = client.get_bytes(&descriptor.url)?;
    if let Err(err) = Store::write_bytes_atomic(&path, &bytes) {
        tracing::warn!(%path, %err, "could not cache raw download");
    }
    Ok(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Decode,
}

/// One source file that was excluded from a batch.
#[derive(Debug, Clone, Serialize)]
pub struct FetchFailure {
    pub url: String,
    pub year: Option<String>,
    pub environment: Option<Environment>,
    pub kind: FailureKind,
    pub message: String,
}

impl FetchFailure {
    pub fn from_error(descriptor: Option<&SourceDescriptor>, url: &str, err: &AnpError) -> Self {
        Self {
            url: url.to_string(),
            year: descriptor.map(|descriptor| descriptor.year.clone()),
            environment: descriptor.map(|descriptor| descriptor.environment),
            kind: if err.is_network() {
                FailureKind::Network
            } else {
                FailureKind::Decode
            },
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub tables: Vec<(String, RawTable)>,
    pub failures: Vec<FetchFailure>,
}

/// Fetches every URL in order; a failing URL is reported and skipped.
pub fn fetch_batch(client: &dyn SourceClient, urls: &[String], scan_lines: usize) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for url in urls {
        match fetch_table(client, url, scan_lines) {
            Ok(table) => outcome.tables.push((url.clone(), table)),
            Err(err) => {
                tracing::warn!(%url, %err, "source file excluded");
                outcome
                    .failures
                    .push(FetchFailure::from_error(None, url, &err));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn retry_delay_doubles_and_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0, None), Duration::from_millis(250));
        assert_eq!(policy.delay(1, None), Duration::from_millis(500));
        assert_eq!(policy.delay(2, None), Duration::from_secs(1));
        assert_eq!(policy.delay(10, None), Duration::from_secs(5));
        assert_eq!(policy.delay(40, None), Duration::from_secs(5));
    }

    #[test]
    fn retry_after_header_overrides_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.delay(0, Some(Duration::from_secs(120))),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn only_transient_statuses_are_retried() {
        for status in [408, 429, 502, 503, 504] {
            assert!(RetryPolicy::retries_status(status), "{status}");
        }
        for status in [200, 400, 403, 404, 500] {
            assert!(!RetryPolicy::retries_status(status), "{status}");
        }
    }

    #[test]
    fn windows_1252_is_tried_first() {
        let bytes = b"Po\xE7o,Campo\nA,B\n";
        let (text, encoding) = decode_text(bytes).unwrap();
        assert_eq!(encoding, SourceEncoding::Windows1252);
        assert!(text.starts_with("Poço"));
    }

    #[test]
    fn undefined_cp1252_bytes_fall_back_to_utf8() {
        // "Ý" in UTF-8 is C3 9D; 0x9D is unmapped in Windows-1252.
        let bytes = "Poço,Campo\nÝ,B\n".as_bytes();
        let (text, encoding) = decode_text(bytes).unwrap();
        assert_eq!(encoding, SourceEncoding::Utf8);
        assert!(text.contains('Ý'));
    }

    #[test]
    fn latin1_is_the_last_resort() {
        let bytes = b"a,b\n\x81\xFF,x\n";
        let (_, encoding) = decode_text(bytes).unwrap();
        assert_eq!(encoding, SourceEncoding::Latin1);
    }

    #[test]
    fn bom_selects_utf8() {
        let bytes = "\u{feff}[Poço],[Campo]\nA,B\n".as_bytes();
        let (text, encoding) = decode_text(bytes).unwrap();
        assert_eq!(encoding, SourceEncoding::Utf8);
        assert!(text.starts_with("[Poço]"));
    }

    #[test]
    fn semicolon_fallback_and_bracket_headers() {
        let table = parse_table("[Poço];[Campo];[Ano]\nP1;C1;2020\n", 100).unwrap();
        assert_eq!(table.headers, vec!["Poço", "Campo", "Ano"]);
        assert_eq!(table.rows, vec![vec!["P1", "C1", "2020"]]);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let table = parse_table("Poço,Campo\nP1,C1\nbroken\nP2,C2,extra\nP3,C3\n", 100).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec!["P3", "C3"]);
    }

    #[test]
    fn single_column_text_is_a_decode_failure() {
        assert_matches!(parse_table("just text\nmore\n", 100), Err(AnpError::Decode(_)));
    }
}
