//! Row-aligned tables passed between pipeline stages.
//!
//! Tables are column-major and keyed by an hourly timestamp. Each stage takes
//! its input table by value and returns a new, wider table; nothing is edited
//! in place.

use crate::error::{PipelineError, PipelineResult};
use chrono::NaiveDateTime;
use std::collections::HashSet;

/// Name of the timestamp column in CSV input and output.
pub const TIMESTAMP_COLUMN: &str = "date";

/// Raw hourly observations. Individual measurements may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<(String, Vec<Option<f64>>)>,
}

impl ObservationTable {
    /// Build a table, validating shape and timestamp order.
    ///
    /// Non-finite values are stored as missing.
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> PipelineResult<Self> {
        validate_timestamps(&timestamps)?;

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if name == TIMESTAMP_COLUMN || !seen.insert(name.clone()) {
                return Err(PipelineError::DuplicateColumn(name));
            }
            if values.len() != timestamps.len() {
                return Err(PipelineError::ColumnLength {
                    column: name,
                    expected: timestamps.len(),
                    actual: values.len(),
                });
            }
            let values = values
                .into_iter()
                .map(|v| v.filter(|x| x.is_finite()))
                .collect();
            normalized.push((name, values));
        }

        Ok(Self {
            timestamps,
            columns: normalized,
        })
    }

    /// Build a table from fully observed columns; `NaN` marks a missing value.
    pub fn from_dense(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> PipelineResult<Self> {
        let columns = columns
            .into_iter()
            .map(|(name, values)| (name, values.into_iter().map(Some).collect()))
            .collect();
        Self::new(timestamps, columns)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[Option<f64>])> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// First `rows` observations.
    pub fn head(&self, rows: usize) -> Self {
        let rows = rows.min(self.len());
        Self {
            timestamps: self.timestamps[..rows].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|(n, v)| (n.clone(), v[..rows].to_vec()))
                .collect(),
        }
    }

    /// Return a new table with `newer` appended after the last hour.
    ///
    /// Columns present on only one side are missing on the other.
    pub fn append(&self, newer: &ObservationTable) -> PipelineResult<Self> {
        let mut timestamps = self.timestamps.clone();
        timestamps.extend_from_slice(&newer.timestamps);

        let mut names: Vec<String> = self.column_names().map(str::to_string).collect();
        for name in newer.column_names() {
            if self.column(name).is_none() {
                names.push(name.to_string());
            }
        }

        let columns = names
            .into_iter()
            .map(|name| {
                let mut values = match self.column(&name) {
                    Some(v) => v.to_vec(),
                    None => vec![None; self.len()],
                };
                match newer.column(&name) {
                    Some(v) => values.extend_from_slice(v),
                    None => values.extend(std::iter::repeat(None).take(newer.len())),
                }
                (name, values)
            })
            .collect();

        Self::new(timestamps, columns)
    }
}

/// One fully defined numeric column of a feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureColumn {
    pub name: String,
    pub values: Vec<f64>,
}

/// Engineered features, one row per observation hour, no missing values.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<FeatureColumn>,
}

impl FeatureTable {
    pub fn new(
        timestamps: Vec<NaiveDateTime>,
        columns: Vec<FeatureColumn>,
    ) -> PipelineResult<Self> {
        validate_timestamps(&timestamps)?;

        let mut seen = HashSet::new();
        for column in &columns {
            if column.name == TIMESTAMP_COLUMN || !seen.insert(column.name.as_str()) {
                return Err(PipelineError::DuplicateColumn(column.name.clone()));
            }
            if column.values.len() != timestamps.len() {
                return Err(PipelineError::ColumnLength {
                    column: column.name.clone(),
                    expected: timestamps.len(),
                    actual: column.values.len(),
                });
            }
        }

        Ok(Self {
            timestamps,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }
}

fn validate_timestamps(timestamps: &[NaiveDateTime]) -> PipelineResult<()> {
    match timestamps.windows(2).position(|w| w[0] >= w[1]) {
        Some(i) => Err(PipelineError::UnorderedTimestamps { row: i + 1 }),
        None => Ok(()),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::hours;
    use super::*;

    #[test]
    fn test_rejects_unordered_timestamps() {
        let mut ts = hours(3);
        // Hours 0, 2, 1: the first out-of-order row is the third.
        ts.swap(1, 2);
        let err = ObservationTable::new(ts, vec![]).unwrap_err();
        assert_eq!(err, PipelineError::UnorderedTimestamps { row: 2 });
    }

    #[test]
    fn test_rejects_duplicate_timestamps() {
        let mut ts = hours(3);
        ts[2] = ts[1];
        assert!(ObservationTable::new(ts, vec![]).is_err());
    }

    #[test]
    fn test_rejects_short_column() {
        let err = ObservationTable::new(
            hours(3),
            vec![("rain_sum".to_string(), vec![Some(1.0), None])],
        )
        .unwrap_err();
        assert_eq!(
            err,
            PipelineError::ColumnLength {
                column: "rain_sum".to_string(),
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_nan_is_stored_as_missing() {
        let table = ObservationTable::from_dense(
            hours(2),
            vec![("rain_sum".to_string(), vec![f64::NAN, 2.0])],
        )
        .unwrap();
        assert_eq!(table.column("rain_sum").unwrap(), &[None, Some(2.0)]);
    }

    #[test]
    fn test_append_preserves_order_and_fills_new_columns() {
        let ts = hours(4);
        let first = ObservationTable::from_dense(
            ts[..2].to_vec(),
            vec![("rain_sum".to_string(), vec![1.0, 2.0])],
        )
        .unwrap();
        let second = ObservationTable::from_dense(
            ts[2..].to_vec(),
            vec![
                ("rain_sum".to_string(), vec![3.0, 4.0]),
                ("wind_gust_max".to_string(), vec![30.0, 45.0]),
            ],
        )
        .unwrap();

        let joined = first.append(&second).unwrap();
        assert_eq!(joined.len(), 4);
        assert_eq!(
            joined.column("wind_gust_max").unwrap(),
            &[None, None, Some(30.0), Some(45.0)]
        );
        // The original is untouched.
        assert_eq!(first.len(), 2);

        // Appending overlapping hours is rejected.
        assert!(joined.append(&second).is_err());
    }
}
