use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::classifier::classify_listing;
use crate::config::ResolvedConfig;
use crate::dataset::DatasetCache;
use crate::domain::{Environment, ScanMode, SourceCatalog};
use crate::error::AnpError;
use crate::fetcher::{FetchFailure, SourceClient};
use crate::field_index::{FieldIndexCache, IndexBuild};
use crate::schema::CanonicalRecord;
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>, elapsed: Option<Duration>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed,
    });
}

fn report_failures(sink: &dyn ProgressSink, failures: &[FetchFailure]) {
    for failure in failures {
        emit(
            sink,
            format!(
                "phase=Fetch; skipped {} ({:?}): {}",
                failure.url, failure.kind, failure.message
            ),
            None,
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Discovery {
    pub listing_url: String,
    pub catalog: SourceCatalog,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexResult {
    #[serde(flatten)]
    pub build: IndexBuild,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldList {
    pub environment: Environment,
    pub fields: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetOrigin {
    Cache,
    Rebuilt,
    /// Nothing could be fetched; records may be stale or empty.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct DatasetResult {
    pub origin: DatasetOrigin,
    pub records: Vec<CanonicalRecord>,
    pub failures: Vec<FetchFailure>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub origin: DatasetOrigin,
    pub records: usize,
    pub wells: usize,
    pub fields: usize,
    pub per_environment: BTreeMap<String, usize>,
    pub failures: Vec<FetchFailure>,
    pub diagnostics: Vec<String>,
}

impl DatasetResult {
    pub fn summary(&self) -> DatasetSummary {
        let wells: BTreeSet<&str> = self.records.iter().map(|r| r.well.as_str()).collect();
        let fields: BTreeSet<&str> = self
            .records
            .iter()
            .map(|r| r.field.as_str())
            .filter(|field| !field.is_empty())
            .collect();
        let mut per_environment = BTreeMap::new();
        for record in &self.records {
            let key = record
                .environment
                .map(|environment| environment.to_string())
                .unwrap_or_else(|| "untagged".to_string());
            *per_environment.entry(key).or_insert(0) += 1;
        }
        DatasetSummary {
            origin: self.origin,
            records: self.records.len(),
            wells: wells.len(),
            fields: fields.len(),
            per_environment,
            failures: self.failures.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    pub fn filtered(&self, filter: &RecordFilter) -> Vec<&CanonicalRecord> {
        filter.apply(&self.records)
    }
}

/// Field and well selection applied to dataset records.
///
/// An empty set selects everything. Fields are matched first, then wells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub fields: BTreeSet<String>,
    pub wells: BTreeSet<String>,
}

impl RecordFilter {
    pub fn new<F, W>(fields: F, wells: W) -> Self
    where
        F: IntoIterator<Item = String>,
        W: IntoIterator<Item = String>,
    {
        Self {
            fields: fields.into_iter().collect(),
            wells: wells.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.wells.is_empty()
    }

    pub fn matches(&self, record: &CanonicalRecord) -> bool {
        (self.fields.is_empty() || self.fields.contains(&record.field))
            && (self.wells.is_empty() || self.wells.contains(&record.well))
    }

    /// Matching records in dataset order.
    pub fn apply<'a>(&self, records: &'a [CanonicalRecord]) -> Vec<&'a CanonicalRecord> {
        records.iter().filter(|record| self.matches(record)).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

/// Discovery, indexing and dataset assembly over one source client and cache root.
#[derive(Clone)]
pub struct Pipeline<C: SourceClient> {
    store: Store,
    client: C,
    config: ResolvedConfig,
    field_index: FieldIndexCache,
    dataset: DatasetCache,
}

impl<C: SourceClient> Pipeline<C> {
    pub fn new(store: Store, client: C, config: ResolvedConfig) -> Self {
        Self {
            field_index: FieldIndexCache::new(store.clone()),
            dataset: DatasetCache::new(store.clone()),
            store,
            client,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Never fails: an unreachable listing yields an empty catalog and a diagnostic.
    pub fn discover(&self, sink: &dyn ProgressSink) -> Discovery {
        let listing_url = self.config.listing_url.clone();
        emit(sink, format!("phase=Discover; fetching {listing_url}"), None);
        let start = Instant::now();
        let mut diagnostics = Vec::new();

        let catalog = match self.client.get_bytes(&listing_url) {
            Ok(page) => classify_listing(&page, Some(&listing_url), &self.config.classifier),
            Err(err) => {
                tracing::warn!(%listing_url, %err, "listing page unavailable");
                diagnostics.push(format!("listing page unavailable: {err}"));
                SourceCatalog::new()
            }
        };
        if catalog.is_empty() && diagnostics.is_empty() {
            diagnostics.push("listing page has no recognizable source links".to_string());
        }
        if !catalog.unclassified.is_empty() {
            diagnostics.push(format!(
                "{} link(s) had no environment keyword and were left unclassified",
                catalog.unclassified.len()
            ));
        }
        emit(
            sink,
            format!("phase=Discover; {} source file(s)", catalog.len()),
            Some(start.elapsed()),
        );

        Discovery {
            listing_url,
            catalog,
            diagnostics,
        }
    }

    pub fn build_field_index(
        &self,
        environment: Environment,
        mode: ScanMode,
        sink: &dyn ProgressSink,
    ) -> Result<IndexResult, AnpError> {
        let discovery = self.discover(sink);
        emit(
            sink,
            format!("phase=Index; scanning {environment} sources ({mode:?})"),
            None,
        );
        let start = Instant::now();
        let build = self.field_index.build_index(
            &self.client,
            &discovery.catalog,
            environment,
            mode,
            self.config.quick_sample,
            self.config.header_scan_lines,
        )?;
        report_failures(sink, &build.failures);
        emit(
            sink,
            format!(
                "phase=Index; {} field(s), {} new",
                build.fields.len(),
                build.added
            ),
            Some(start.elapsed()),
        );
        Ok(IndexResult {
            build,
            diagnostics: discovery.diagnostics,
        })
    }

    /// Reads the persisted index only; no network access.
    pub fn field_index(&self, environment: Environment) -> FieldList {
        FieldList {
            environment,
            fields: self.field_index.load_index(environment),
        }
    }

    /// Cached dataset unless `force_refresh`; otherwise a full rebuild.
    ///
    /// An unreadable cache file counts as a miss. When discovery finds no
    /// sources the persisted dataset is left untouched and returned if readable.
    pub fn get_dataset(
        &self,
        force_refresh: bool,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetResult, AnpError> {
        let mut diagnostics = Vec::new();

        if !force_refresh {
            match self.dataset.load() {
                Ok(Some(records)) => {
                    emit(
                        sink,
                        format!("phase=Store; using cached dataset ({} records)", records.len()),
                        None,
                    );
                    return Ok(DatasetResult {
                        origin: DatasetOrigin::Cache,
                        records,
                        failures: Vec::new(),
                        diagnostics,
                    });
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%err, "cached dataset discarded");
                    diagnostics.push(format!("{err}; rebuilding"));
                }
            }
        }

        let discovery = self.discover(sink);
        diagnostics.extend(discovery.diagnostics);
        if discovery.catalog.is_empty() {
            let records = self.dataset.load().ok().flatten().unwrap_or_default();
            return Ok(DatasetResult {
                origin: DatasetOrigin::Unavailable,
                records,
                failures: Vec::new(),
                diagnostics,
            });
        }

        emit(
            sink,
            format!(
                "phase=Fetch; downloading {} source file(s)",
                discovery.catalog.len()
            ),
            None,
        );
        let start = Instant::now();
        let rebuild = self.dataset.rebuild(
            &self.client,
            &discovery.catalog,
            force_refresh,
            self.config.header_scan_lines,
        )?;
        report_failures(sink, &rebuild.failures);
        if rebuild.dropped_rows > 0 {
            diagnostics.push(format!(
                "{} row(s) without a well name were dropped",
                rebuild.dropped_rows
            ));
        }
        emit(
            sink,
            format!("phase=Transform; {} records", rebuild.records.len()),
            Some(start.elapsed()),
        );

        let origin = if rebuild.sources == 0 {
            DatasetOrigin::Unavailable
        } else {
            DatasetOrigin::Rebuilt
        };
        Ok(DatasetResult {
            origin,
            records: rebuild.records,
            failures: rebuild.failures,
            diagnostics,
        })
    }

    pub fn clear(&self, sink: &dyn ProgressSink) -> Result<ClearResult, AnpError> {
        emit(sink, "phase=Store; clearing cache", None);
        let cleared = self.store.clear()?;
        Ok(ClearResult { cleared })
    }
}
