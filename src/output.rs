use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    ClearResult, DatasetSummary, Discovery, FieldList, IndexResult, ProgressEvent, ProgressSink,
};
use crate::dataset::export_row;
use crate::domain::Environment;
use crate::schema::{CANONICAL_COLUMNS, CanonicalRecord};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_discovery(result: &Discovery) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_index(result: &IndexResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fields(result: &FieldList) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_dataset(result: &DatasetSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_records(records: &[&CanonicalRecord]) -> io::Result<()> {
        Self::print_json(records)
    }

    pub fn print_schema() -> io::Result<()> {
        Self::print_json(&CANONICAL_COLUMNS)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the tracing subscriber.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_discovery(result: &Discovery) {
        println!("Sources listed at {}", result.listing_url);
        for year in result.catalog.years() {
            for environment in Environment::ALL {
                for url in result.catalog.urls(year, environment) {
                    println!("  {year}  {:<8}  {url}", environment.as_str());
                }
            }
        }
        Self::print_diagnostics(&result.diagnostics);
    }

    pub fn print_index(result: &IndexResult) {
        let build = &result.build;
        println!(
            "{} field index ({:?} scan): {} field(s), {} new, {} file(s) scanned",
            build.environment,
            build.mode,
            build.fields.len(),
            build.added,
            build.scanned.len()
        );
        for failure in &build.failures {
            println!("  skipped {}: {}", failure.url, failure.message);
        }
        Self::print_diagnostics(&result.diagnostics);
    }

    pub fn print_fields(result: &FieldList) {
        if result.fields.is_empty() {
            println!(
                "no {} field index yet (run `anp-wells index build {}`)",
                result.environment, result.environment
            );
            return;
        }
        for field in &result.fields {
            println!("{field}");
        }
    }

    pub fn print_dataset(result: &DatasetSummary) {
        println!(
            "dataset ({:?}): {} record(s), {} well(s), {} field(s)",
            result.origin, result.records, result.wells, result.fields
        );
        for (environment, count) in &result.per_environment {
            println!("  {environment}: {count}");
        }
        for failure in &result.failures {
            println!("  skipped {}: {}", failure.url, failure.message);
        }
        Self::print_diagnostics(&result.diagnostics);
    }

    /// Records as CSV with the canonical header row.
    pub fn print_records(records: &[&CanonicalRecord]) -> io::Result<()> {
        write_records_csv(io::stdout().lock(), records)
    }

    pub fn print_schema() {
        for column in CANONICAL_COLUMNS {
            let nullable = if column.nullable { "nullable" } else { "" };
            println!("{:<28} {:<8} {nullable}", column.name, format!("{:?}", column.kind));
        }
    }

    pub fn print_clear(result: &ClearResult) {
        if result.cleared {
            println!("cache cleared");
        } else {
            println!("cache already empty");
        }
    }

    fn print_diagnostics(diagnostics: &[String]) {
        for diagnostic in diagnostics {
            eprintln!("warning: {diagnostic}");
        }
    }
}

pub fn write_records_csv<W: Write>(writer: W, records: &[&CanonicalRecord]) -> io::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CANONICAL_COLUMNS.iter().map(|column| column.name))
        .map_err(io::Error::other)?;
    for record in records {
        csv.write_record(export_row(record)).map_err(io::Error::other)?;
    }
    csv.flush()
}
