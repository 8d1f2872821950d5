//! Performance metrics and statistics tracking for the hazard pipeline.

use crate::types::alert::OverallAlert;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by concurrent forecast cycles
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Total forecast cycles completed
    pub cycles_run: AtomicU64,
    /// Total rows scored across cycles
    pub rows_scored: AtomicU64,
    /// Scoring failures by hazard
    hazard_failures: RwLock<BTreeMap<String, u64>>,
    /// Rows by overall alert label
    alerts_by_level: RwLock<BTreeMap<String, u64>>,
    /// Cycle durations (in microseconds)
    cycle_times: RwLock<Vec<u64>>,
    /// Per-hazard scoring times (in microseconds)
    hazard_times: RwLock<HashMap<String, Vec<u64>>>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            cycles_run: AtomicU64::new(0),
            rows_scored: AtomicU64::new(0),
            hazard_failures: RwLock::new(BTreeMap::new()),
            alerts_by_level: RwLock::new(BTreeMap::new()),
            cycle_times: RwLock::new(Vec::with_capacity(64)),
            hazard_times: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a completed forecast cycle and the overall alert of each row
    pub fn record_cycle(&self, duration: Duration, overall: &[OverallAlert]) {
        self.cycles_run.fetch_add(1, Ordering::Relaxed);
        self.rows_scored
            .fetch_add(overall.len() as u64, Ordering::Relaxed);

        if let Ok(mut times) = self.cycle_times.write() {
            times.push(duration.as_micros() as u64);
            // Keep only last 10000
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        if let Ok(mut by_level) = self.alerts_by_level.write() {
            for alert in overall {
                *by_level.entry(alert.to_string()).or_insert(0) += 1;
            }
        }
    }

    /// Record a hazard whose scoring failed
    pub fn record_hazard_failure(&self, hazard: &str) {
        if let Ok(mut failures) = self.hazard_failures.write() {
            *failures.entry(hazard.to_string()).or_insert(0) += 1;
        }
    }

    /// Record the time taken to score one hazard
    pub fn record_hazard_time(&self, hazard: &str, duration: Duration) {
        if let Ok(mut times) = self.hazard_times.write() {
            let hazard_times = times.entry(hazard.to_string()).or_default();
            hazard_times.push(duration.as_micros() as u64);
            if hazard_times.len() > 1000 {
                hazard_times.drain(0..500);
            }
        }
    }

    /// Get cycle duration statistics
    pub fn get_cycle_stats(&self) -> CycleStats {
        let Some(mut sorted) = self.cycle_times.read().ok().map(|t| t.clone()) else {
            return CycleStats::default();
        };
        if sorted.is_empty() {
            return CycleStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        CycleStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    /// Get per-hazard scoring stats
    pub fn get_hazard_stats(&self) -> BTreeMap<String, HazardStats> {
        let Ok(times) = self.hazard_times.read() else {
            return BTreeMap::new();
        };

        times
            .iter()
            .filter(|(_, t)| !t.is_empty())
            .map(|(hazard, hazard_times)| {
                let mut sorted = hazard_times.clone();
                sorted.sort_unstable();
                let count = sorted.len();
                let sum: u64 = sorted.iter().sum();
                (
                    hazard.clone(),
                    HazardStats {
                        calls: count as u64,
                        mean_us: sum / count as u64,
                        p50_us: sorted[count / 2],
                    },
                )
            })
            .collect()
    }

    pub fn get_hazard_failures(&self) -> BTreeMap<String, u64> {
        self.hazard_failures
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Get row counts by overall alert label
    pub fn get_alerts_by_level(&self) -> BTreeMap<String, u64> {
        self.alerts_by_level
            .read()
            .map(|a| a.clone())
            .unwrap_or_default()
    }

    /// Rows scored per second since start-up
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.rows_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let cycles = self.cycles_run.load(Ordering::Relaxed);
        let rows = self.rows_scored.load(Ordering::Relaxed);
        let timing = self.get_cycle_stats();
        let alerts_by_level = self.get_alerts_by_level();
        let failures = self.get_hazard_failures();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            HAZARD PIPELINE - METRICS SUMMARY                 ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Cycles Run: {:>8}  │  Rows Scored: {:>10}  ({:>8.1} rows/s) ║",
            cycles,
            rows,
            self.get_throughput()
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Cycle Time (μs): mean={:>7} p50={:>7} p95={:>7} max={:>7} ║",
            timing.mean_us, timing.p50_us, timing.p95_us, timing.max_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Rows by Overall Alert:                                       ║");
        for (level, count) in &alerts_by_level {
            let pct = if rows > 0 {
                (*count as f64 / rows as f64) * 100.0
            } else {
                0.0
            };
            info!("║   {:20}: {:>8} ({:>5.1}%)                    ║", level, count, pct);
        }
        if !failures.is_empty() {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Scoring Failures:                                            ║");
            for (hazard, count) in &failures {
                info!("║   {:20}: {:>8}                              ║", hazard, count);
            }
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        let hazard_stats = self.get_hazard_stats();
        if !hazard_stats.is_empty() {
            info!("Hazard Scoring Times (μs):");
            for (hazard, stats) in &hazard_stats {
                info!(
                    "  {}: mean={} p50={} (calls={})",
                    hazard, stats.mean_us, stats.p50_us, stats.calls
                );
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Cycle duration statistics
#[derive(Debug, Default, PartialEq)]
pub struct CycleStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub max_us: u64,
}

/// Hazard-specific scoring statistics
#[derive(Debug, PartialEq)]
pub struct HazardStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::alert::Severity;

    #[test]
    fn test_cycle_recording() {
        let metrics = PipelineMetrics::new();

        metrics.record_cycle(
            Duration::from_micros(100),
            &[
                OverallAlert::Risk(Severity::Low),
                OverallAlert::Risk(Severity::Severe),
            ],
        );
        metrics.record_cycle(
            Duration::from_micros(300),
            &[OverallAlert::NoRisksPredicted],
        );

        assert_eq!(metrics.cycles_run.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.rows_scored.load(Ordering::Relaxed), 3);

        let by_level = metrics.get_alerts_by_level();
        assert_eq!(by_level.get("Low"), Some(&1));
        assert_eq!(by_level.get("Severe"), Some(&1));
        assert_eq!(by_level.get("No Risks Predicted"), Some(&1));

        let stats = metrics.get_cycle_stats();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean_us, 200);
        assert_eq!(stats.max_us, 300);
    }

    #[test]
    fn test_hazard_failures_and_times() {
        let metrics = PipelineMetrics::new();
        metrics.record_hazard_failure("storm");
        metrics.record_hazard_failure("storm");
        metrics.record_hazard_time("flood", Duration::from_micros(40));

        assert_eq!(metrics.get_hazard_failures().get("storm"), Some(&2));
        let stats = metrics.get_hazard_stats();
        assert_eq!(stats["flood"].calls, 1);
        assert_eq!(stats["flood"].mean_us, 40);
    }

    #[test]
    fn test_empty_stats() {
        assert_eq!(PipelineMetrics::new().get_cycle_stats(), CycleStats::default());
    }
}
