//! End-to-end forecast cycles through the public API

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use hazard_pipeline::config::{AppConfig, FeatureConfig};
use hazard_pipeline::models::{InferenceEngine, ModelLoader};
use hazard_pipeline::sink::ResultWriter;
use hazard_pipeline::source::ObservationReader;
use hazard_pipeline::types::Hazard;
use hazard_pipeline::{FeatureEngine, HazardPipeline, ObservationTable, OverallAlert, Severity};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const COLUMNS: [&str; 8] = [
    "temperature_mean",
    "relative_humidity_mean",
    "rain_sum",
    "precipitation_sum",
    "wind_speed_max",
    "wind_gust_max",
    "soil_moisture_mean",
    "sea_level_pressure_mean",
];

fn hours(rows: usize) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2024, 7, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    (0..rows).map(|i| start + TimeDelta::hours(i as i64)).collect()
}

/// Twelve calm hours, with the rain gauge dropping out at hour 4.
fn observations() -> ObservationTable {
    let columns = COLUMNS
        .iter()
        .map(|&name| {
            let values = (0..12)
                .map(|i| match name {
                    "rain_sum" if i == 4 => None,
                    "rain_sum" => Some(i as f64),
                    "soil_moisture_mean" => Some(0.3),
                    "sea_level_pressure_mean" => Some(1010.0),
                    _ => Some(10.0 + i as f64),
                })
                .collect();
            (name.to_string(), values)
        })
        .collect();
    ObservationTable::new(hours(12), columns).unwrap()
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn pipeline(models_dir: &Path, hazards: &[&str]) -> HazardPipeline {
    let hazards: Vec<Hazard> = hazards.iter().map(|h| Hazard::new(*h)).collect();
    let registry = ModelLoader::new(models_dir).load_registry(&hazards).unwrap();
    HazardPipeline::new(
        FeatureEngine::new(FeatureConfig::default()).unwrap(),
        InferenceEngine::new(Arc::new(registry)),
    )
}

#[test]
fn test_cycle_with_degenerate_and_broken_models() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "rain.json",
        r#"{"kind": "logistic", "features": ["rain_sum", "rain_sum_roll3"], "coefficients": [0.5, 0.0], "intercept": -2.0}"#,
    );
    write(dir.path(), "landslide.json", r#"{"kind": "single_class", "class": 0}"#);
    write(dir.path(), "storm.json", r#"{"kind": "single_class", "class": 1}"#);
    // flood has no descriptor

    let cycle = pipeline(dir.path(), &["flood", "rain", "storm", "landslide"])
        .run("testville", &observations())
        .unwrap();
    let table = &cycle.table;

    assert_eq!(table.len(), 12);
    assert_eq!(table.scored().features().timestamps(), hours(12).as_slice());

    let flood = table.scored().hazard(&Hazard::new("flood")).unwrap();
    assert!(flood.is_undefined());
    assert_eq!(table.alerts_for(&Hazard::new("flood")).unwrap(), &[None; 12]);

    let storm = table.scored().hazard(&Hazard::new("storm")).unwrap();
    assert_eq!(storm.probability, vec![Some(1.0); 12]);
    let landslide = table.scored().hazard(&Hazard::new("landslide")).unwrap();
    assert_eq!(landslide.probability, vec![Some(0.0); 12]);

    // The storm model always predicts its only class, so every row is Severe.
    assert_eq!(table.overall(), &[OverallAlert::Risk(Severity::Severe); 12]);

    // Hour 4 is missing raw rain and is healed by backfill before scoring.
    let rain_sum = table.scored().features().column("rain_sum").unwrap();
    assert_eq!(rain_sum[4], 5.0);
    let rain = table.scored().hazard(&Hazard::new("rain")).unwrap();
    assert!(rain.probability.iter().all(|p| p.is_some()));
}

#[test]
fn test_results_csv_layout() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "flood.json", r#"{"kind": "single_class", "class": 0}"#);
    write(dir.path(), "storm.json", "{}");

    let cycle = pipeline(dir.path(), &["flood", "storm"])
        .run("testville", &observations())
        .unwrap();

    let out = dir.path().join("out").join("testville.csv");
    ResultWriter::to_path(&out, &cycle.table).unwrap();
    let text = fs::read_to_string(&out).unwrap();
    let mut lines = text.lines();
    let header: Vec<&str> = lines.next().unwrap().split(',').collect();

    assert_eq!(header[0], "date");
    assert_eq!(
        &header[header.len() - 7..],
        &[
            "flood_risk_prob",
            "flood_risk_pred",
            "flood_risk_alert",
            "storm_risk_prob",
            "storm_risk_pred",
            "storm_risk_alert",
            "overall_alert"
        ]
    );
    let first: Vec<&str> = lines.next().unwrap().split(',').collect();
    assert_eq!(first.len(), header.len());
    assert_eq!(&first[first.len() - 7..], &["0", "0", "Low", "", "", "", "Low"]);
    assert_eq!(lines.count(), 11);
}

#[test]
fn test_unknown_base_column_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "flood.json", r#"{"kind": "single_class", "class": 1}"#);

    let mut config = FeatureConfig::default();
    config.lag_columns.push("river_level".to_string());
    let registry = ModelLoader::new(dir.path())
        .load_registry(&[Hazard::new("flood")])
        .unwrap();
    let pipeline = HazardPipeline::new(
        FeatureEngine::new(config).unwrap(),
        InferenceEngine::new(Arc::new(registry)),
    );

    assert!(pipeline.run("testville", &observations()).is_err());
}

#[test]
fn test_shipped_configuration_and_models() {
    let config = AppConfig::load_from_path("config/config.toml").unwrap();
    assert_eq!(config.features, FeatureConfig::default());
    assert_eq!(config.locations.len(), 1);

    let registry = ModelLoader::new(&config.models.models_dir)
        .load_registry(&config.models.hazard_ids())
        .unwrap();
    assert_eq!(registry.available_count(), 4);

    let observations = ObservationReader::from_path(&config.locations[0].observations).unwrap();
    let pipeline = HazardPipeline::new(
        FeatureEngine::new(config.features.clone()).unwrap(),
        InferenceEngine::new(Arc::new(registry)),
    );
    let cycle = pipeline.run(&config.locations[0].name, &observations).unwrap();

    assert_eq!(cycle.table.len(), observations.len());
    assert_eq!(cycle.table.scored().failures().count(), 0);
    // The sample data ends in a storm episode.
    let storm = cycle.table.alerts_for(&Hazard::new("storm")).unwrap();
    assert!(storm.contains(&Some(Severity::Severe)));
    let latest = cycle.table.latest().unwrap();
    assert_eq!(latest.timestamp, *observations.timestamps().last().unwrap());
}
