use std::collections::BTreeSet;
use std::fs;

use serde::Serialize;

use crate::archive;
use crate::domain::{Environment, ScanMode, SourceCatalog};
use crate::error::AnpError;
use crate::fetcher::{FetchFailure, SourceClient, decode_text, fetch_cached};
use crate::schema::FIELD_MARKER;
use crate::store::Store;
use crate::table::{clean_header, infer_delimiter, line_offset, locate_header_line};

#[derive(Debug, Clone, Serialize)]
pub struct IndexBuild {
    pub environment: Environment,
    pub mode: ScanMode,
    pub fields: BTreeSet<String>,
    /// Field names this build added to the persisted index.
    pub added: usize,
    pub scanned: Vec<String>,
    pub failures: Vec<FetchFailure>,
}

/// Persisted per-environment set of known field names.
///
/// Builds only ever add names, so a quick scan followed by a full scan
/// leaves a superset of both.
#[derive(Debug, Clone)]
pub struct FieldIndexCache {
    store: Store,
}

impl FieldIndexCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Missing or unreadable index files read as empty.
    pub fn load_index(&self, environment: Environment) -> BTreeSet<String> {
        let path = self.store.field_index_path(environment);
        if !self.store.exists(&path) {
            return BTreeSet::new();
        }
        match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) => {
                tracing::warn!(%path, %err, "field index unreadable, treating as empty");
                BTreeSet::new()
            }
        }
    }

    pub fn store_index(
        &self,
        environment: Environment,
        fields: &BTreeSet<String>,
    ) -> Result<(), AnpError> {
        let mut content = String::new();
        for field in fields {
            content.push_str(field);
            content.push('\n');
        }
        Store::write_bytes_atomic(&self.store.field_index_path(environment), content.as_bytes())
    }

    /// Scans the environment's source files and merges their field names
    /// into the persisted index.
    ///
    /// Quick mode only looks at the `quick_sample` newest files. A file that
    /// cannot be downloaded or read is reported and skipped.
    pub fn build_index(
        &self,
        client: &dyn SourceClient,
        catalog: &SourceCatalog,
        environment: Environment,
        mode: ScanMode,
        quick_sample: usize,
        scan_lines: usize,
    ) -> Result<IndexBuild, AnpError> {
        let mut descriptors = catalog.descriptors_for(environment);
        if mode == ScanMode::Quick {
            descriptors.truncate(quick_sample);
        }

        let mut fields = self.load_index(environment);
        let before = fields.len();
        let mut scanned = Vec::new();
        let mut failures = Vec::new();

        for descriptor in &descriptors {
            let names = fetch_cached(client, &self.store, descriptor, false)
                .and_then(|bytes| extract_field_names(bytes, scan_lines));
            match names {
                Ok(names) => {
                    tracing::debug!(url = %descriptor.url, count = names.len(), "fields extracted");
                    fields.extend(names);
                    scanned.push(descriptor.url.clone());
                }
                Err(err) => {
                    tracing::warn!(url = %descriptor.url, %err, "file skipped while indexing");
                    failures.push(FetchFailure::from_error(
                        Some(descriptor),
                        &descriptor.url,
                        &err,
                    ));
                }
            }
        }

        self.store_index(environment, &fields)?;
        let added = fields.len() - before;
        tracing::info!(%environment, ?mode, added, total = fields.len(), "field index updated");

        Ok(IndexBuild {
            environment,
            mode,
            fields,
            added,
            scanned,
            failures,
        })
    }
}

/// Distinct values of the `Campo` column of one source file.
///
/// The header row is the first line within `scan_lines` that mentions the
/// marker; banner rows above it are ignored. The delimiter is inferred from
/// that line.
pub fn extract_field_names(bytes: Vec<u8>, scan_lines: usize) -> Result<BTreeSet<String>, AnpError> {
    let bytes = archive::unwrap_source(bytes)?;
    let (text, _) = decode_text(&bytes)?;
    let header_line = locate_header_line(&text, &[FIELD_MARKER], scan_lines).ok_or_else(|| {
        AnpError::Decode(format!(
            "no header mentioning {FIELD_MARKER} in the first {scan_lines} lines"
        ))
    })?;
    let line = text.lines().nth(header_line).unwrap_or_default();
    let delimiter = infer_delimiter(line);

    let body = &text[line_offset(&text, header_line)..];
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| AnpError::Decode(err.to_string()))?
        .iter()
        .map(clean_header)
        .collect();
    let column = headers
        .iter()
        .position(|header| header == FIELD_MARKER)
        .or_else(|| headers.iter().position(|header| header.contains(FIELD_MARKER)))
        .ok_or_else(|| AnpError::Decode(format!("{FIELD_MARKER} column not found")))?;

    let mut names = BTreeSet::new();
    for record in reader.records().flatten() {
        if let Some(value) = record.get(column).map(str::trim) {
            if !value.is_empty() {
                names.insert(value.to_string());
            }
        }
    }
    Ok(names)
}
