use std::fs;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::domain::{Environment, SourceCatalog};
use crate::error::AnpError;
use crate::fetcher::{FetchFailure, SourceClient, decode_source, fetch_cached};
use crate::schema::{
    CANONICAL_COLUMNS, CanonicalRecord, ColumnType, ENVIRONMENT_TAG, Measurement, Volumes,
    measurement_column,
};
use crate::store::Store;
use crate::table::RawTable;
use crate::transform::{normalize_source, transform_with_report};

const WRITE_BATCH_ROWS: usize = 64 * 1024;

pub fn arrow_schema() -> SchemaRef {
    let fields = CANONICAL_COLUMNS
        .iter()
        .map(|column| {
            let data_type = match column.kind {
                ColumnType::Text => DataType::Utf8,
                ColumnType::Integer => DataType::Int64,
                ColumnType::Float => DataType::Float64,
            };
            Field::new(column.name, data_type, column.nullable)
        })
        .collect::<Vec<_>>();
    Arc::new(Schema::new(fields))
}

fn text_cell<'a>(record: &'a CanonicalRecord, name: &str) -> Option<&'a str> {
    match name {
        "Environment" => record.environment.map(|environment| environment.as_str()),
        "Well" => Some(record.well.as_str()),
        "Field" => Some(record.field.as_str()),
        _ => None,
    }
}

fn integer_cell(record: &CanonicalRecord, name: &str) -> Option<i64> {
    match name {
        "Year" => record.year.map(i64::from),
        "Month" => record.month.map(i64::from),
        "ElapsedDays" => Some(record.elapsed_days),
        _ => None,
    }
}

fn float_cell(record: &CanonicalRecord, name: &str) -> Option<f64> {
    match name {
        "CumulativeOil" => Some(record.cumulative_oil),
        "GasOilRatio" => Some(record.gas_oil_ratio),
        "WaterOilRatio" => Some(record.water_oil_ratio),
        "LogOilRate" => record.log_oil_rate,
        other => Measurement::ALL
            .into_iter()
            .find(|measurement| measurement_column(*measurement) == other)
            .map(|measurement| record.volumes.get(measurement)),
    }
}

/// One record as text cells in `CANONICAL_COLUMNS` order; nulls are empty.
pub fn export_row(record: &CanonicalRecord) -> Vec<String> {
    CANONICAL_COLUMNS
        .iter()
        .map(|column| match column.kind {
            ColumnType::Text => text_cell(record, column.name)
                .map(str::to_string)
                .unwrap_or_default(),
            ColumnType::Integer => integer_cell(record, column.name)
                .map(|value| value.to_string())
                .unwrap_or_default(),
            ColumnType::Float => float_cell(record, column.name)
                .map(|value| value.to_string())
                .unwrap_or_default(),
        })
        .collect()
}

fn to_batch(schema: &SchemaRef, records: &[CanonicalRecord]) -> Result<RecordBatch, AnpError> {
    let arrays = CANONICAL_COLUMNS
        .iter()
        .map(|column| -> ArrayRef {
            match column.kind {
                ColumnType::Text => Arc::new(
                    records
                        .iter()
                        .map(|record| text_cell(record, column.name))
                        .collect::<StringArray>(),
                ),
                ColumnType::Integer => Arc::new(
                    records
                        .iter()
                        .map(|record| integer_cell(record, column.name))
                        .collect::<Int64Array>(),
                ),
                ColumnType::Float => Arc::new(
                    records
                        .iter()
                        .map(|record| float_cell(record, column.name))
                        .collect::<Float64Array>(),
                ),
            }
        })
        .collect::<Vec<_>>();
    RecordBatch::try_new(schema.clone(), arrays).map_err(|err| AnpError::Filesystem(err.to_string()))
}

fn typed_column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, AnpError> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<T>())
        .ok_or_else(|| AnpError::CacheCorruption(format!("column {name} missing or mistyped")))
}

fn append_batch(batch: &RecordBatch, out: &mut Vec<CanonicalRecord>) -> Result<(), AnpError> {
    let environment = typed_column::<StringArray>(batch, "Environment")?;
    let well = typed_column::<StringArray>(batch, "Well")?;
    let field = typed_column::<StringArray>(batch, "Field")?;
    let year = typed_column::<Int64Array>(batch, "Year")?;
    let month = typed_column::<Int64Array>(batch, "Month")?;
    let elapsed = typed_column::<Int64Array>(batch, "ElapsedDays")?;
    let cumulative = typed_column::<Float64Array>(batch, "CumulativeOil")?;
    let gor = typed_column::<Float64Array>(batch, "GasOilRatio")?;
    let wor = typed_column::<Float64Array>(batch, "WaterOilRatio")?;
    let log_rate = typed_column::<Float64Array>(batch, "LogOilRate")?;
    let measurements = Measurement::ALL
        .into_iter()
        .map(|measurement| {
            typed_column::<Float64Array>(batch, measurement_column(measurement))
                .map(|column| (measurement, column))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for row in 0..batch.num_rows() {
        let mut volumes = Volumes::default();
        for (measurement, column) in &measurements {
            volumes.set(*measurement, column.value(row));
        }
        out.push(CanonicalRecord {
            environment: (!environment.is_null(row))
                .then(|| environment.value(row))
                .and_then(|value| value.parse::<Environment>().ok()),
            well: well.value(row).to_string(),
            field: field.value(row).to_string(),
            year: (!year.is_null(row))
                .then(|| year.value(row))
                .and_then(|value| i32::try_from(value).ok()),
            month: (!month.is_null(row))
                .then(|| month.value(row))
                .and_then(|value| u32::try_from(value).ok()),
            volumes,
            elapsed_days: elapsed.value(row),
            cumulative_oil: cumulative.value(row),
            gas_oil_ratio: gor.value(row),
            water_oil_ratio: wor.value(row),
            log_oil_rate: (!log_rate.is_null(row)).then(|| log_rate.value(row)),
        });
    }
    Ok(())
}

fn corrupt(err: impl std::fmt::Display) -> AnpError {
    AnpError::CacheCorruption(err.to_string())
}

/// Result of a full rebuild from the remote sources.
#[derive(Debug, Default)]
pub struct Rebuild {
    pub records: Vec<CanonicalRecord>,
    pub sources: usize,
    pub failures: Vec<FetchFailure>,
    /// Rows dropped for lacking a well name.
    pub dropped_rows: usize,
}

/// Consolidated dataset persisted as one Parquet file, replaced wholesale.
#[derive(Debug, Clone)]
pub struct DatasetCache {
    store: Store,
}

impl DatasetCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// `Ok(None)` when nothing is cached; `CacheCorruption` when the file is unreadable.
    pub fn load(&self) -> Result<Option<Vec<CanonicalRecord>>, AnpError> {
        let path = self.store.dataset_path();
        if !self.store.exists(&path) {
            return Ok(None);
        }
        let file = fs::File::open(path.as_std_path()).map_err(corrupt)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(corrupt)?
            .build()
            .map_err(corrupt)?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch.map_err(corrupt)?;
            append_batch(&batch, &mut records)?;
        }
        Ok(Some(records))
    }

    pub fn save(&self, records: &[CanonicalRecord]) -> Result<(), AnpError> {
        let schema = arrow_schema();
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        Store::write_atomic(&self.store.dataset_path(), |file| {
            let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
                .map_err(|err| AnpError::Filesystem(err.to_string()))?;
            for chunk in records.chunks(WRITE_BATCH_ROWS) {
                let batch = to_batch(&schema, chunk)?;
                writer
                    .write(&batch)
                    .map_err(|err| AnpError::Filesystem(err.to_string()))?;
            }
            writer
                .close()
                .map_err(|err| AnpError::Filesystem(err.to_string()))?;
            Ok(())
        })
    }

    /// Downloads every catalogued source, transforms the union once and
    /// persists it.
    ///
    /// Raw files already in the cache are reused unless `refresh_raw` is set.
    /// When not a single source could be read the persisted file is kept.
    pub fn rebuild(
        &self,
        client: &dyn SourceClient,
        catalog: &SourceCatalog,
        refresh_raw: bool,
        scan_lines: usize,
    ) -> Result<Rebuild, AnpError> {
        let mut failures = Vec::new();
        let mut per_environment = Vec::new();
        let mut sources = 0usize;

        for environment in Environment::ALL {
            let mut tables = Vec::new();
            for descriptor in catalog.descriptors_for(environment) {
                let table = fetch_cached(client, &self.store, &descriptor, refresh_raw)
                    .and_then(|bytes| decode_source(bytes, scan_lines));
                match table {
                    Ok(table) => {
                        sources += 1;
                        tables.push(
                            normalize_source(table)
                                .with_constant_column(ENVIRONMENT_TAG, environment.as_str()),
                        );
                    }
                    Err(err) => {
                        tracing::warn!(url = %descriptor.url, %err, "source file excluded from dataset");
                        failures.push(FetchFailure::from_error(
                            Some(&descriptor),
                            &descriptor.url,
                            &err,
                        ));
                    }
                }
            }
            per_environment.push(RawTable::concat(tables));
        }

        let combined = RawTable::concat(per_environment);
        let (records, report) = transform_with_report(&combined);
        if report.rows_without_well > 0 {
            tracing::warn!(rows = report.rows_without_well, "rows without well name dropped");
        }
        if sources == 0 {
            tracing::warn!("no source file could be read; persisted dataset left untouched");
        } else {
            self.save(&records)?;
            tracing::info!(records = records.len(), sources, "dataset rebuilt");
        }

        Ok(Rebuild {
            records,
            sources,
            failures,
            dropped_rows: report.rows_without_well,
        })
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;

    use super::*;

    fn record(well: &str, oil: f64, log_oil_rate: Option<f64>) -> CanonicalRecord {
        CanonicalRecord {
            environment: Some(Environment::Offshore),
            well: well.to_string(),
            field: "MARLIM".to_string(),
            year: Some(2020),
            month: None,
            volumes: Volumes {
                oil,
                water: 2.5,
                ..Volumes::default()
            },
            elapsed_days: 31,
            cumulative_oil: oil,
            gas_oil_ratio: 0.0,
            water_oil_ratio: 0.0,
            log_oil_rate,
        }
    }

    #[test]
    fn parquet_preserves_nulls() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let cache = DatasetCache::new(Store::new_with_root(root));
        assert!(cache.load().unwrap().is_none());

        let records = vec![record("P1", 10.0, Some(10f64.ln())), record("P2", 0.0, None)];
        cache.save(&records).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded, records);
        assert_eq!(loaded[0].month, None);
    }

    #[test]
    fn schema_follows_export_columns() {
        let schema = arrow_schema();
        assert_eq!(schema.fields().len(), CANONICAL_COLUMNS.len());
        assert_eq!(schema.field(0).name(), "Environment");
        assert!(schema.field_with_name("LogOilRate").unwrap().is_nullable());
    }
}
