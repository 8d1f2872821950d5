//! CSV result sink

use crate::types::alert::{AlertedTable, RiskAssessment};
use crate::types::table::TIMESTAMP_COLUMN;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column name of the aggregated alert.
pub const OVERALL_ALERT_COLUMN: &str = "overall_alert";

/// Writes alerted tables as CSV.
///
/// Columns are the timestamp, every feature, then per hazard its probability,
/// prediction and alert, then the overall alert. Undefined values are empty.
pub struct ResultWriter;

impl ResultWriter {
    pub fn to_path<P: AsRef<Path>>(path: P, table: &AlertedTable) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        Self::write(BufWriter::new(file), table)
            .with_context(|| format!("Failed to write results {}", path.display()))?;
        debug!(path = %path.display(), rows = table.len(), "Results written");
        Ok(())
    }

    pub fn write<W: Write>(output: W, table: &AlertedTable) -> Result<()> {
        let mut writer = csv::Writer::from_writer(output);
        writer.write_record(Self::header(table))?;

        let scored = table.scored();
        let features = scored.features();
        for (row, ts) in features.timestamps().iter().enumerate() {
            let mut record = Vec::with_capacity(1 + features.num_columns() + 3 * scored.scores().len() + 1);
            record.push(ts.format(TIMESTAMP_FORMAT).to_string());
            record.extend(features.columns().iter().map(|c| c.values[row].to_string()));
            for (scores, alerts) in scored.scores().iter().zip(table.hazard_alerts()) {
                record.push(optional(scores.probability[row]));
                record.push(optional(scores.prediction[row]));
                record.push(optional(alerts.alerts[row]));
            }
            record.push(table.overall()[row].to_string());
            writer.write_record(&record)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Output column names in write order
    pub fn header(table: &AlertedTable) -> Vec<String> {
        let scored = table.scored();
        let mut header = vec![TIMESTAMP_COLUMN.to_string()];
        header.extend(scored.features().column_names().map(str::to_string));
        for hazard in scored.hazards() {
            header.push(hazard.prob_column());
            header.push(hazard.pred_column());
            header.push(hazard.alert_column());
        }
        header.push(OVERALL_ALERT_COLUMN.to_string());
        header
    }

    /// Write the latest-hour assessment as pretty JSON
    pub fn latest_to_path<P: AsRef<Path>>(path: P, assessment: &RiskAssessment) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(assessment)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert_engine::AlertEngine;
    use crate::types::hazard::{Hazard, HazardScores, ScoredTable};
    use crate::types::table::test_support::hours;
    use crate::types::table::{FeatureColumn, FeatureTable};

    fn table() -> AlertedTable {
        let features = FeatureTable::new(
            hours(2),
            vec![FeatureColumn {
                name: "month".to_string(),
                values: vec![7.0, 7.0],
            }],
        )
        .unwrap();
        let scored = ScoredTable::new(
            features,
            vec![
                HazardScores::new(Hazard::new("flood"), vec![0.05, 0.75], vec![0, 1]),
                HazardScores::undefined(Hazard::new("storm"), 2, "failed"),
            ],
        )
        .unwrap();
        AlertEngine::new().apply(scored)
    }

    #[test]
    fn test_header_order() {
        assert_eq!(
            ResultWriter::header(&table()),
            vec![
                "date",
                "month",
                "flood_risk_prob",
                "flood_risk_pred",
                "flood_risk_alert",
                "storm_risk_prob",
                "storm_risk_pred",
                "storm_risk_alert",
                "overall_alert"
            ]
        );
    }

    #[test]
    fn test_undefined_cells_are_empty() {
        let mut out = Vec::new();
        ResultWriter::write(&mut out, &table()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "2024-07-01 00:00:00,7,0.05,0,Low,,,,Low");
        assert_eq!(lines[2], "2024-07-01 01:00:00,7,0.75,1,Severe,,,,Severe");
    }

    #[test]
    fn test_write_to_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("manila.csv");
        ResultWriter::to_path(&path, &table()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("date,month,"));
    }

    #[test]
    fn test_latest_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.json");
        let latest = table().latest().unwrap();
        ResultWriter::latest_to_path(&path, &latest).unwrap();

        let parsed: RiskAssessment =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed, latest);
    }
}
