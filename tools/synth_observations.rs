//! Synthetic Observation Generator
//!
//! Writes an hourly weather observation CSV with a storm episode, for local
//! runs of the pipeline without live data.
//!
//! Usage: synth_observations [output.csv] [hours] [storm_start_hour] [gap_rate]

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use rand::Rng;
use serde::Serialize;
use tracing::info;

/// One observation row, matching the pipeline's input columns
#[derive(Debug, Clone, Serialize)]
struct Observation {
    date: String,
    temperature_mean: Option<f64>,
    relative_humidity_mean: Option<f64>,
    rain_sum: Option<f64>,
    precipitation_sum: Option<f64>,
    wind_speed_max: Option<f64>,
    wind_gust_max: Option<f64>,
    soil_moisture_mean: Option<f64>,
    sea_level_pressure_mean: Option<f64>,
}

/// Length of the storm episode in hours
const STORM_HOURS: usize = 18;

/// Observation generator for testing
struct ObservationGenerator {
    rng: rand::rngs::ThreadRng,
    soil_moisture: f64,
    gap_rate: f64,
}

impl ObservationGenerator {
    fn new(gap_rate: f64) -> Self {
        Self {
            rng: rand::thread_rng(),
            soil_moisture: 0.25,
            gap_rate,
        }
    }

    /// Fair-weather hour with a diurnal temperature cycle
    fn generate_calm(&mut self, ts: NaiveDateTime, hour: usize) -> Observation {
        let diurnal = ((hour % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
        let rain = if self.rng.gen_bool(0.1) {
            self.rng.gen_range(0.1..2.0)
        } else {
            0.0
        };
        self.soil_moisture = (self.soil_moisture - 0.002 + rain * 0.01).clamp(0.1, 0.5);

        let obs = Observation {
            date: ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            temperature_mean: Some(27.0 + 3.0 * diurnal + self.rng.gen_range(-0.5..0.5)),
            relative_humidity_mean: Some(self.rng.gen_range(65.0..85.0)),
            rain_sum: Some(rain),
            precipitation_sum: Some(rain + self.rng.gen_range(0.0..0.2)),
            wind_speed_max: Some(self.rng.gen_range(5.0..18.0)),
            wind_gust_max: Some(self.rng.gen_range(10.0..28.0)),
            soil_moisture_mean: Some(self.soil_moisture),
            sea_level_pressure_mean: Some(1010.0 + self.rng.gen_range(-2.0..2.0)),
        };
        self.with_gaps(obs)
    }

    /// Storm hour; `progress` runs from 0 to 1 across the episode
    fn generate_storm(&mut self, ts: NaiveDateTime, progress: f64) -> Observation {
        // Peaks mid-episode
        let intensity = (progress * std::f64::consts::PI).sin();
        let rain = 5.0 + 35.0 * intensity * self.rng.gen_range(0.7..1.3);
        self.soil_moisture = (self.soil_moisture + rain * 0.004).clamp(0.1, 0.55);

        let obs = Observation {
            date: ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            temperature_mean: Some(24.0 + self.rng.gen_range(-1.0..1.0)),
            relative_humidity_mean: Some(self.rng.gen_range(90.0..100.0)),
            rain_sum: Some(rain),
            precipitation_sum: Some(rain * self.rng.gen_range(1.0..1.1)),
            wind_speed_max: Some(20.0 + 45.0 * intensity),
            wind_gust_max: Some(30.0 + 70.0 * intensity * self.rng.gen_range(0.8..1.2)),
            soil_moisture_mean: Some(self.soil_moisture),
            sea_level_pressure_mean: Some(1008.0 - 25.0 * intensity),
        };
        self.with_gaps(obs)
    }

    /// Blank out single sensor readings at the configured rate
    fn with_gaps(&mut self, mut obs: Observation) -> Observation {
        let gap_rate = self.gap_rate;
        for field in [
            &mut obs.rain_sum,
            &mut obs.wind_gust_max,
            &mut obs.soil_moisture_mean,
        ] {
            if self.rng.gen_bool(gap_rate) {
                *field = None;
            }
        }
        obs
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("synth_observations=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let output = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("data/observations.csv");
    let hours: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(24 * 14);
    let storm_start: usize = args
        .get(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(hours.saturating_sub(STORM_HOURS / 2));
    let gap_rate: f64 = args
        .get(4)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.02_f64)
        .clamp(0.0, 1.0);

    info!(
        output = %output,
        hours = hours,
        storm_start = storm_start,
        gap_rate = gap_rate,
        "Configuration loaded"
    );

    if let Some(parent) = std::path::Path::new(output).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output))?;

    let start = NaiveDate::from_ymd_opt(2024, 7, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .context("invalid start date")?;
    let mut generator = ObservationGenerator::new(gap_rate);
    let mut storm_count = 0;

    for hour in 0..hours {
        let ts = start + TimeDelta::hours(hour as i64);
        let obs = if (storm_start..storm_start + STORM_HOURS).contains(&hour) {
            storm_count += 1;
            let progress = (hour - storm_start) as f64 / STORM_HOURS as f64;
            generator.generate_storm(ts, progress)
        } else {
            generator.generate_calm(ts, hour)
        };
        writer.serialize(&obs)?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} hours ({} storm hours) to {}",
        hours, storm_count, output
    );
    Ok(())
}
