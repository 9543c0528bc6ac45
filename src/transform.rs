//! Raw table to canonical records, plus the per-well derived metrics.
//!
//! Stage order is fixed: month/year reconciliation, locale number parsing,
//! pruning, chronological sort, per-well accumulation, ratios, log rate.
//! Missing inputs degrade to zero columns instead of failing.

use chrono::NaiveDate;

use crate::domain::Environment;
use crate::schema::{
    CanonicalRecord, ENVIRONMENT_TAG, FIELD_HEADERS, MONTH_HEADERS, MONTH_YEAR_HEADERS,
    Measurement, PRUNED_HEADERS, Volumes, WELL_HEADERS, YEAR_HEADERS, measurement_column,
};
use crate::table::RawTable;

/// Gas volumes are published in thousands of m³.
const GAS_UNIT_FACTOR: f64 = 1000.0;

/// Schema drift observed while transforming a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    /// Canonical columns that had no source column and were zero-filled.
    pub missing: Vec<&'static str>,
    /// Administrative source columns that were dropped.
    pub pruned: Vec<String>,
    pub dates_available: bool,
    /// Rows dropped for lacking a well name.
    pub rows_without_well: usize,
}

/// Parses a number written as `1.234,56` (thousands `.` and decimal `,`).
///
/// Unparseable and non-finite input yields `0.0`.
pub fn parse_locale_number(raw: &str) -> f64 {
    let normalized = raw.trim().replace('.', "").replace(',', ".");
    finite_or_zero(normalized.parse::<f64>().ok())
}

fn finite_or_zero(value: Option<f64>) -> f64 {
    value.filter(|value| value.is_finite()).unwrap_or(0.0)
}

/// True when every non-empty cell is already a plain number.
fn column_is_numeric(table: &RawTable, column: usize) -> bool {
    table
        .rows
        .iter()
        .filter_map(|row| row.get(column))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .all(|value| !value.contains(',') && value.parse::<f64>().is_ok())
}

fn numeric_column(table: &RawTable, column: usize) -> Vec<f64> {
    let plain = column_is_numeric(table, column);
    table
        .rows
        .iter()
        .map(|row| {
            let value = row.get(column).map(String::as_str).unwrap_or_default();
            if plain {
                finite_or_zero(value.trim().parse::<f64>().ok())
            } else {
                parse_locale_number(value)
            }
        })
        .collect()
}

/// Prepares one source file for concatenation with files from other years.
///
/// Identifier and date headers are renamed to their primary spelling, a
/// combined `Mês/Ano` column is split into `Ano` and `Mês` when the file has
/// no discrete pair, and measurement cells are rewritten as plain decimals.
/// Number style is decided here, per file.
pub fn normalize_source(table: RawTable) -> RawTable {
    let mut table = rename_aliases(table);
    split_combined_date(&mut table);
    normalize_measurements(table)
}

fn rename_aliases(mut table: RawTable) -> RawTable {
    for aliases in [
        WELL_HEADERS,
        FIELD_HEADERS,
        YEAR_HEADERS,
        MONTH_HEADERS,
        MONTH_YEAR_HEADERS,
    ] {
        if let Some(index) = table.find_column(aliases) {
            table.headers[index] = aliases[0].to_string();
        }
    }
    table
}

fn split_combined_date(table: &mut RawTable) {
    if table.find_column(YEAR_HEADERS).is_some() && table.find_column(MONTH_HEADERS).is_some() {
        return;
    }
    let Some(combined) = table.find_column(MONTH_YEAR_HEADERS) else {
        return;
    };
    let parts: Vec<(String, String)> = table
        .rows
        .iter()
        .map(|row| {
            let (month, year) = row
                .get(combined)
                .map(|value| split_month_year(value))
                .unwrap_or((None, None));
            let text = |value: Option<i64>| value.map(|v| v.to_string()).unwrap_or_default();
            (text(year), text(month))
        })
        .collect();
    let year_column = column_or_append(table, YEAR_HEADERS);
    let month_column = column_or_append(table, MONTH_HEADERS);
    for (row, (year, month)) in table.rows.iter_mut().zip(parts) {
        if row.get(year_column).is_some_and(|cell| cell.trim().is_empty()) {
            row[year_column] = year;
        }
        if row.get(month_column).is_some_and(|cell| cell.trim().is_empty()) {
            row[month_column] = month;
        }
    }
}

/// Index of the column named by `aliases`, appending an empty primary one if absent.
fn column_or_append(table: &mut RawTable, aliases: &[&str]) -> usize {
    if let Some(index) = table.find_column(aliases) {
        return index;
    }
    table.headers.push(aliases[0].to_string());
    for row in &mut table.rows {
        row.push(String::new());
    }
    table.headers.len() - 1
}

fn normalize_measurements(mut table: RawTable) -> RawTable {
    for measurement in Measurement::ALL {
        let Some(index) = table.find_column(measurement.source_headers()) else {
            continue;
        };
        let values = numeric_column(&table, index);
        table.headers[index] = measurement.source_headers()[0].to_string();
        for (row, value) in table.rows.iter_mut().zip(values) {
            if let Some(cell) = row.get_mut(index) {
                *cell = value.to_string();
            }
        }
    }
    table
}

fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && value.fract() == 0.0)
        .map(|value| value as i64)
}

/// Splits a `MM/YYYY` cell into (month, year).
fn split_month_year(raw: &str) -> (Option<i64>, Option<i64>) {
    let mut parts = raw.trim().splitn(2, ['/', '-', '.']);
    let month = parts.next().and_then(parse_integer);
    let year = parts.next().and_then(parse_integer);
    (month, year)
}

/// Per-row (year, month), or `None` when the table has no usable date columns.
///
/// Discrete `Ano`/`Mês` cells win; a row whose discrete cells do not parse
/// falls back to the combined `Mês/Ano` column when the table has one.
fn reconcile_dates(table: &RawTable) -> Option<Vec<(Option<i64>, Option<i64>)>> {
    let year = table.find_column(YEAR_HEADERS);
    let month = table.find_column(MONTH_HEADERS);
    let combined = table.find_column(MONTH_YEAR_HEADERS);
    let discrete = year.zip(month);
    if discrete.is_none() && combined.is_none() {
        return None;
    }

    let integer = |row: &Vec<String>, column: usize| row.get(column).and_then(|value| parse_integer(value));
    Some(
        table
            .rows
            .iter()
            .map(|row| {
                let from_discrete = discrete
                    .map(|(year, month)| (integer(row, year), integer(row, month)))
                    .filter(|(year, month)| year.is_some() && month.is_some());
                from_discrete
                    .or_else(|| {
                        combined.and_then(|column| row.get(column)).map(|value| {
                            let (month, year) = split_month_year(value);
                            (year, month)
                        })
                    })
                    .unwrap_or((None, None))
            })
            .collect(),
    )
}

fn first_of_month(year: Option<i32>, month: Option<u32>) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year?, month?, 1)
}

struct Draft {
    record: CanonicalRecord,
    date: Option<NaiveDate>,
}

pub fn transform(table: &RawTable) -> Vec<CanonicalRecord> {
    transform_with_report(table).0
}

pub fn transform_with_report(table: &RawTable) -> (Vec<CanonicalRecord>, SchemaReport) {
    let mut report = SchemaReport::default();

    let dates = reconcile_dates(table);
    report.dates_available = dates.is_some();
    if dates.is_none() {
        report.missing.extend(["Year", "Month"]);
    }

    let mut columns: Vec<(Measurement, Vec<f64>)> = Vec::with_capacity(Measurement::ALL.len());
    for measurement in Measurement::ALL {
        match table.find_column(measurement.source_headers()) {
            Some(index) => columns.push((measurement, numeric_column(table, index))),
            None => report.missing.push(measurement_column(measurement)),
        }
    }

    report.pruned = PRUNED_HEADERS
        .iter()
        .filter(|header| table.has_column(header))
        .map(|header| header.to_string())
        .collect();

    let well_column = table.find_column(WELL_HEADERS);
    let field_column = table.find_column(FIELD_HEADERS);
    let environment_column = table.column_index(ENVIRONMENT_TAG);
    if well_column.is_none() {
        report.missing.push("Well");
    }
    if field_column.is_none() {
        report.missing.push("Field");
    }

    let mut drafts = Vec::with_capacity(table.len());
    for (index, row) in table.rows.iter().enumerate() {
        let cell = |column: Option<usize>| {
            column
                .and_then(|column| row.get(column))
                .map(|value| value.trim())
                .unwrap_or_default()
        };
        let well = cell(well_column);
        if well.is_empty() {
            report.rows_without_well += 1;
            continue;
        }

        let mut volumes = Volumes::default();
        for (measurement, values) in &columns {
            volumes.set(*measurement, values[index]);
        }

        let (year, month) = dates
            .as_ref()
            .map(|dates| dates[index])
            .unwrap_or((None, None));
        let year = year.and_then(|year| i32::try_from(year).ok());
        let month = month
            .and_then(|month| u32::try_from(month).ok())
            .filter(|month| (1..=12).contains(month));

        drafts.push(Draft {
            record: CanonicalRecord {
                environment: cell(environment_column).parse::<Environment>().ok(),
                well: well.to_string(),
                field: cell(field_column).to_string(),
                year,
                month,
                volumes,
                elapsed_days: 0,
                cumulative_oil: 0.0,
                gas_oil_ratio: 0.0,
                water_oil_ratio: 0.0,
                log_oil_rate: None,
            },
            date: first_of_month(year, month),
        });
    }

    // Stable: duplicate (well, date) rows keep file order. Undated rows go last.
    drafts.sort_by(|a, b| {
        a.record
            .well
            .cmp(&b.record.well)
            .then_with(|| a.date.is_none().cmp(&b.date.is_none()))
            .then_with(|| a.date.cmp(&b.date))
    });

    if report.dates_available {
        accumulate_per_well(&mut drafts);
    }

    let records = drafts
        .into_iter()
        .map(|draft| {
            let mut record = draft.record;
            apply_ratios(&mut record);
            record
        })
        .collect();

    if !report.missing.is_empty() || !report.pruned.is_empty() {
        tracing::debug!(
            missing = ?report.missing,
            pruned = ?report.pruned,
            "schema drift absorbed"
        );
    }
    (records, report)
}

/// Elapsed days and cumulative oil over each well's sorted run of records.
///
/// A well with any undated record gets zero elapsed days throughout.
fn accumulate_per_well(drafts: &mut [Draft]) {
    let mut start = 0;
    while start < drafts.len() {
        let end = drafts[start..]
            .iter()
            .position(|draft| draft.record.well != drafts[start].record.well)
            .map(|offset| start + offset)
            .unwrap_or(drafts.len());
        let group = &mut drafts[start..end];

        let all_dated = group.iter().all(|draft| draft.date.is_some());
        let earliest = group.first().and_then(|draft| draft.date);
        let mut cumulative = 0.0;
        for draft in group.iter_mut() {
            cumulative += draft.record.volumes.oil;
            draft.record.cumulative_oil = cumulative;
            draft.record.elapsed_days = match (all_dated, earliest, draft.date) {
                (true, Some(earliest), Some(date)) => (date - earliest).num_days(),
                _ => 0,
            };
        }

        start = end;
    }
}

fn apply_ratios(record: &mut CanonicalRecord) {
    let volumes = record.volumes;
    if volumes.oil > 0.0 {
        record.gas_oil_ratio = finite_or_zero(Some(GAS_UNIT_FACTOR * volumes.total_gas() / volumes.oil));
        record.water_oil_ratio = finite_or_zero(Some(volumes.water / volumes.oil));
        record.log_oil_rate = Some(volumes.oil.ln());
    } else {
        record.gas_oil_ratio = 0.0;
        record.water_oil_ratio = 0.0;
        record.log_oil_rate = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|v| v.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn locale_numbers() {
        assert_eq!(parse_locale_number("1.234,56"), 1234.56);
        assert_eq!(parse_locale_number("0,5"), 0.5);
        assert_eq!(parse_locale_number(""), 0.0);
        assert_eq!(parse_locale_number("n/d"), 0.0);
    }

    #[test]
    fn plain_numeric_columns_are_not_relocalized() {
        let input = table(
            &["Poço", "Ano", "Mês", "Produção de Óleo (m³)"],
            &[&["P", "2020", "1", "12.5"], &["P", "2020", "2", "3"]],
        );
        let records = transform(&input);
        assert_eq!(records[0].volumes.oil, 12.5);
        assert_eq!(records[1].cumulative_oil, 15.5);
    }

    #[test]
    fn month_year_column_is_split() {
        let input = table(
            &["Poço", "Mês/Ano", "Produção de Óleo (m³)"],
            &[&["P", "03/2021", "1,0"], &["P", "01/2021", "2,0"]],
        );
        let records = transform(&input);
        assert_eq!(records[0].year, Some(2021));
        assert_eq!(records[0].month, Some(1));
        assert_eq!(records[1].elapsed_days, 59);
    }

    #[test]
    fn undated_well_degrades_to_zero_elapsed_days() {
        let input = table(
            &["Poço", "Ano", "Mês", "Produção de Óleo (m³)"],
            &[&["P", "2020", "1", "1"], &["P", "2020", "13", "1"]],
        );
        let records = transform(&input);
        assert!(records.iter().all(|record| record.elapsed_days == 0));
        assert_eq!(records[1].cumulative_oil, 2.0);
    }

    #[test]
    fn missing_date_columns_short_circuit_accumulation() {
        let input = table(
            &["Poço", "Produção de Óleo (m³)"],
            &[&["P", "10"], &["P", "5"]],
        );
        let (records, report) = transform_with_report(&input);
        assert!(!report.dates_available);
        assert!(
            records
                .iter()
                .all(|record| record.elapsed_days == 0 && record.cumulative_oil == 0.0)
        );
        assert_eq!(records[0].log_oil_rate, Some(10f64.ln()));
    }

    #[test]
    fn pruned_and_missing_columns_are_reported() {
        let input = table(&["Poço", "Bacia", "Estado"], &[&["P", "Campos", "RJ"]]);
        let (records, report) = transform_with_report(&input);
        assert_eq!(records.len(), 1);
        assert_eq!(report.pruned, vec!["Bacia", "Estado"]);
        assert!(report.missing.contains(&"OilProduction"));
        assert_eq!(records[0].volumes, Volumes::default());
    }

    #[test]
    fn rows_without_well_are_dropped() {
        let input = table(&["Poço", "Campo"], &[&["", "X"], &["P", "X"]]);
        let (records, report) = transform_with_report(&input);
        assert_eq!(records.len(), 1);
        assert_eq!(report.rows_without_well, 1);
    }

    #[test]
    fn blank_discrete_date_falls_back_to_combined_column() {
        let input = table(
            &["Poço", "Ano", "Mês", "Mês/Ano", "Produção de Óleo (m³)"],
            &[&["P", "2020", "1", "", "1"], &["P", "", "", "03/2020", "1"]],
        );
        let records = transform(&input);
        assert_eq!((records[1].year, records[1].month), (Some(2020), Some(3)));
        assert_eq!(records[1].elapsed_days, 60);
    }

    #[test]
    fn source_aliases_are_renamed_to_primary_headers() {
        let input = table(
            &["Nome Poço ANP", "Field", "Month/Year", "Produção de Óleo (m³)"],
            &[&["P", "X", "02/2021", "1,5"]],
        );
        let normalized = normalize_source(input);
        assert_eq!(
            normalized.headers,
            vec!["Poço", "Campo", "Mês/Ano", "Produção de Óleo (m³)", "Ano", "Mês"]
        );
        assert_eq!(normalized.rows[0], vec!["P", "X", "02/2021", "1.5", "2021", "2"]);
    }
}
