//! CSV observation source

use crate::types::table::{ObservationTable, TIMESTAMP_COLUMN};
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDateTime};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Accepted timestamp layouts; `%.f` also matches no fractional part.
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Reads hourly observations from CSV.
///
/// The timestamp is the `date` column, or the first column when there is
/// none. Every other column is numeric; empty cells and `NaN` are missing.
pub struct ObservationReader;

impl ObservationReader {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ObservationTable> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open observations {}", path.display()))?;
        let table = Self::read(BufReader::new(file))
            .with_context(|| format!("Failed to read observations {}", path.display()))?;
        debug!(path = %path.display(), rows = table.len(), "Observations loaded");
        Ok(table)
    }

    pub fn read<R: Read>(input: R) -> Result<ObservationTable> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(input);
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            bail!("observation file has no header");
        }

        let ts_idx = headers
            .iter()
            .position(|h| h == TIMESTAMP_COLUMN)
            .unwrap_or(0);
        let names: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != ts_idx)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut timestamps = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); names.len()];

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            // header is line 1
            let line = line + 2;
            let raw_ts = record
                .get(ts_idx)
                .ok_or_else(|| anyhow!("line {}: missing timestamp", line))?;
            timestamps.push(parse_timestamp(raw_ts).with_context(|| format!("line {}", line))?);

            for ((idx, name), column) in names.iter().zip(values.iter_mut()) {
                let cell = record.get(*idx).unwrap_or("");
                column.push(
                    parse_value(cell)
                        .with_context(|| format!("line {}: column `{}`", line, name))?,
                );
            }
        }

        let columns = names.into_iter().map(|(_, n)| n).zip(values).collect();
        Ok(ObservationTable::new(timestamps, columns)?)
    }
}

/// Parse an hourly timestamp; an explicit offset is dropped, keeping local time.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .ok_or_else(|| anyhow!("invalid timestamp `{}`", raw))
}

fn parse_value(cell: &str) -> Result<Option<f64>> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    let v: f64 = cell
        .parse()
        .with_context(|| format!("invalid number `{}`", cell))?;
    Ok(v.is_finite().then_some(v))
}
