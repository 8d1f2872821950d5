//! Hazard Risk Pipeline - Main Entry Point
//!
//! Loads the model store, runs one forecast cycle per configured location and
//! writes the alerted tables. Cycles run in parallel up to `pipeline.workers`.

use anyhow::{Context, Result};
use hazard_pipeline::{
    config::{AppConfig, LoggingConfig},
    metrics::PipelineMetrics,
    models::{ClipRanges, FeatureScaler, InferenceEngine, ModelLoader},
    sink::ResultWriter,
    source::ObservationReader,
    FeatureEngine, HazardPipeline,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("hazard_pipeline={}", logging.level)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)?;
    init_logging(&config.logging)?;

    info!("Starting Hazard Risk Pipeline");
    info!(path = %config_path, "Configuration loaded successfully");

    let metrics = Arc::new(PipelineMetrics::new());

    let feature_engine = FeatureEngine::new(config.features.clone())?;

    let loader = ModelLoader::with_threads(&config.models.models_dir, config.models.onnx_threads);
    let registry = Arc::new(loader.load_registry(&config.models.hazard_ids())?);
    info!(
        "Model registry initialized: {} of {} hazards available",
        registry.available_count(),
        registry.len()
    );

    let mut inference = InferenceEngine::new(registry).with_metrics(metrics.clone());
    if let Some(path) = &config.models.clip_ranges_path {
        let ranges = ClipRanges::load(path)?;
        info!(path = %path, features = ranges.len(), "Clip ranges loaded");
        inference = inference.with_clip_ranges(ranges);
    }
    if let Some(path) = &config.models.scaler_path {
        let scaler = FeatureScaler::load(path)?;
        info!(path = %path, features = scaler.len(), "Feature scaler loaded");
        inference = inference.with_scaler(scaler);
    }

    let pipeline = Arc::new(HazardPipeline::new(feature_engine, inference));

    if config.locations.is_empty() {
        warn!("No locations configured, nothing to do");
        return Ok(());
    }

    let num_workers = config.pipeline.workers.max(1);
    info!(
        locations = config.locations.len(),
        "Starting forecast cycles with {} parallel workers", num_workers
    );

    // Semaphore to limit concurrent cycles
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let output_dir = Arc::new(config.pipeline.output_dir.clone());
    let mut handles = Vec::with_capacity(config.locations.len());

    for location in config.locations.clone() {
        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let metrics = metrics.clone();
        let output_dir = output_dir.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let result = run_location(
                &pipeline,
                &metrics,
                &location.name,
                &location.observations,
                Path::new(output_dir.as_str()),
            );
            if let Err(e) = &result {
                error!(location = %location.name, error = %format!("{e:#}"), "Forecast cycle failed");
            }
            drop(permit);
            result
        });
        handles.push(handle);
    }

    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => failed += 1,
            Err(e) => {
                error!(error = %e, "Forecast task panicked");
                failed += 1;
            }
        }
    }

    info!("Pipeline shutting down...");
    metrics.print_summary();

    if failed > 0 {
        anyhow::bail!("{} of {} forecast cycles failed", failed, config.locations.len());
    }
    Ok(())
}

fn run_location(
    pipeline: &HazardPipeline,
    metrics: &PipelineMetrics,
    location: &str,
    observations: &str,
    output_dir: &Path,
) -> Result<()> {
    let table = ObservationReader::from_path(observations)?;
    let cycle = pipeline
        .run(location, &table)
        .with_context(|| format!("Forecast cycle for {} failed", location))?;
    metrics.record_cycle(cycle.elapsed, cycle.table.overall());

    for (hazard, cause) in cycle.table.scored().failures() {
        warn!(run_id = %cycle.run_id, location, hazard = %hazard, cause, "Hazard undefined for this cycle");
    }

    let output = output_dir.join(format!("{}.csv", location));
    ResultWriter::to_path(&output, &cycle.table)?;

    if let Some(latest) = cycle.table.latest() {
        ResultWriter::latest_to_path(output_dir.join(format!("{}_latest.json", location)), &latest)?;
        let hazards: Vec<String> = latest
            .hazards
            .iter()
            .map(|h| match (h.probability, h.alert) {
                (Some(p), Some(alert)) => format!("{}={:.3} ({})", h.hazard, p, alert),
                _ => format!("{}=undefined", h.hazard),
            })
            .collect();
        info!(
            run_id = %cycle.run_id,
            location,
            timestamp = %latest.timestamp,
            overall = %latest.overall,
            advice = latest.overall.severity().map(|s| s.advice()).unwrap_or("No Action"),
            "Latest risk: {}",
            hazards.join(", ")
        );
    }

    info!(run_id = %cycle.run_id, location, path = %output.display(), "Results written");
    Ok(())
}
