//! Temporal feature engineering for hourly weather observations.
//!
//! Turns an `ObservationTable` into a `FeatureTable` carrying the original
//! columns plus lags, rolling aggregates, calendar encodings, threshold flags
//! and interaction terms, in that order. Every derived value at row `t` is
//! computed and resolved from rows `0..=t` only. Gaps in the original columns
//! are healed by backfill and are the one place a later row is read.

use crate::config::{FeatureConfig, RollingAggregate};
use crate::error::{PipelineError, PipelineResult};
use crate::types::table::{FeatureColumn, FeatureTable, ObservationTable};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::HashSet;
use std::f64::consts::PI;
use tracing::debug;

type Derived = (String, Vec<Option<f64>>);

/// Feature engine that derives model inputs from raw observations.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    /// Create a feature engine, rejecting zero lags and zero-width windows.
    pub fn new(config: FeatureConfig) -> PipelineResult<Self> {
        if config.lags.contains(&0) {
            return Err(PipelineError::InvalidFeatureConfig(
                "lag offsets must be at least 1 hour".to_string(),
            ));
        }
        if let Some(spec) = config.rolling.iter().find(|r| r.windows.contains(&0)) {
            return Err(PipelineError::InvalidFeatureConfig(format!(
                "rolling window for `{}` must be at least 1 hour",
                spec.column
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Derive the feature table for `observations`.
    ///
    /// Row count and order are preserved. Original columns are resolved with
    /// [`fill_backward_forward_zero`], derived columns with the causal
    /// [`fill_forward_zero`], so the output has no undefined values.
    pub fn engineer(&self, observations: &ObservationTable) -> PipelineResult<FeatureTable> {
        let mut derived: Vec<Derived> = Vec::new();
        self.add_lags(observations, &mut derived)?;
        self.add_rolling(observations, &mut derived)?;
        add_calendar(observations.timestamps(), self.config.hour_encoding, &mut derived);
        self.add_flags(observations, &mut derived)?;
        self.add_interactions(observations, &mut derived)?;

        let mut names: HashSet<&str> = observations.column_names().collect();
        for (name, _) in &derived {
            if !names.insert(name.as_str()) {
                return Err(PipelineError::DuplicateColumn(name.clone()));
            }
        }

        debug!(
            rows = observations.len(),
            observed = observations.column_names().count(),
            derived = derived.len(),
            "Features engineered"
        );

        let columns: Vec<FeatureColumn> = observations
            .columns()
            .map(|(name, values)| FeatureColumn {
                name: name.to_string(),
                values: fill_backward_forward_zero(values),
            })
            .chain(derived.into_iter().map(|(name, values)| FeatureColumn {
                values: fill_forward_zero(&values),
                name,
            }))
            .collect();

        FeatureTable::new(observations.timestamps().to_vec(), columns)
    }

    /// Resolve `column` for `feature`; `Ok(None)` means the feature is skipped.
    fn base<'a>(
        &self,
        observations: &'a ObservationTable,
        feature: &str,
        column: &str,
    ) -> PipelineResult<Option<&'a [Option<f64>]>> {
        match observations.column(column) {
            Some(values) => Ok(Some(values)),
            None if self.config.tolerate_missing_columns => {
                debug!(feature = %feature, column = %column, "Base column missing, feature omitted");
                Ok(None)
            }
            None => Err(PipelineError::MissingColumn {
                feature: feature.to_string(),
                column: column.to_string(),
            }),
        }
    }

    fn add_lags(&self, obs: &ObservationTable, out: &mut Vec<Derived>) -> PipelineResult<()> {
        for column in &self.config.lag_columns {
            for &k in &self.config.lags {
                let name = format!("{column}_lag{k}");
                if let Some(values) = self.base(obs, &name, column)? {
                    out.push((name, lag(values, k)));
                }
            }
        }
        Ok(())
    }

    fn add_rolling(&self, obs: &ObservationTable, out: &mut Vec<Derived>) -> PipelineResult<()> {
        for spec in &self.config.rolling {
            for &window in &spec.windows {
                let name = match spec.aggregate {
                    RollingAggregate::Mean => format!("{}_roll{window}", spec.column),
                    RollingAggregate::Sum => format!("{}_sum{window}", spec.column),
                };
                if let Some(values) = self.base(obs, &name, &spec.column)? {
                    out.push((name, rolling(values, window, spec.aggregate)));
                }
            }
        }
        Ok(())
    }

    fn add_flags(&self, obs: &ObservationTable, out: &mut Vec<Derived>) -> PipelineResult<()> {
        for flag in &self.config.flags {
            if let Some(values) = self.base(obs, &flag.name, &flag.column)? {
                let flagged = values
                    .iter()
                    .map(|v| v.map(|x| if x > flag.threshold { 1.0 } else { 0.0 }))
                    .collect();
                out.push((flag.name.clone(), flagged));
            }
        }
        Ok(())
    }

    fn add_interactions(
        &self,
        obs: &ObservationTable,
        out: &mut Vec<Derived>,
    ) -> PipelineResult<()> {
        for term in &self.config.interactions {
            let left = self.base(obs, &term.name, &term.left)?;
            let right = self.base(obs, &term.name, &term.right)?;
            if let (Some(left), Some(right)) = (left, right) {
                let product = left
                    .iter()
                    .zip(right)
                    .map(|(a, b)| Some((*a)? * (*b)?))
                    .collect();
                out.push((term.name.clone(), product));
            }
        }
        Ok(())
    }
}

/// Value of `values` `k` rows earlier.
///
/// Boundary and gap rows are resolved as if backward-fill, forward-fill and a
/// zero fallback had been applied to the prefix ending at the current row:
/// rows before the first `k` take the earliest available source value.
pub fn lag(values: &[Option<f64>], k: usize) -> Vec<Option<f64>> {
    let n = values.len();

    // next_defined[j]: first i >= j with a value; prev_defined[j]: last i <= j.
    let mut next_defined = vec![None; n];
    let mut next = None;
    for j in (0..n).rev() {
        if values[j].is_some() {
            next = Some(j);
        }
        next_defined[j] = next;
    }
    let mut prev_defined = vec![None; n];
    let mut prev = None;
    for j in 0..n {
        if values[j].is_some() {
            prev = Some(j);
        }
        prev_defined[j] = prev;
    }

    (0..n)
        .map(|t| {
            let j = t.saturating_sub(k);
            let source = match next_defined[j] {
                Some(i) if i <= t => Some(i),
                _ => prev_defined[j],
            };
            Some(source.and_then(|i| values[i]).unwrap_or(0.0))
        })
        .collect()
}

/// Trailing aggregate over `window` rows ending at and including each row.
///
/// The window shrinks at the start of the series. Missing values are
/// skipped; a window with nothing defined stays undefined.
pub fn rolling(values: &[Option<f64>], window: usize, aggregate: RollingAggregate) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            let start = (t + 1).saturating_sub(window.max(1));
            let (sum, count) = values[start..=t]
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            match (count, aggregate) {
                (0, _) => None,
                (_, RollingAggregate::Sum) => Some(sum),
                (c, RollingAggregate::Mean) => Some(sum / c as f64),
            }
        })
        .collect()
}

/// Resolve undefined values from earlier rows only: forward-fill, then 0.
///
/// Non-finite values count as undefined.
pub fn fill_forward_zero(values: &[Option<f64>]) -> Vec<f64> {
    let mut prev = 0.0;
    values
        .iter()
        .map(|v| {
            if let Some(x) = v.filter(|x| x.is_finite()) {
                prev = x;
            }
            prev
        })
        .collect()
}

/// Resolve undefined values: backward-fill, then forward-fill, then 0.
///
/// Non-finite values count as undefined.
pub fn fill_backward_forward_zero(values: &[Option<f64>]) -> Vec<f64> {
    let mut filled: Vec<Option<f64>> = values
        .iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect();

    let mut next = None;
    for v in filled.iter_mut().rev() {
        match v {
            Some(x) => next = Some(*x),
            None => *v = next,
        }
    }
    let mut prev = None;
    for v in filled.iter_mut() {
        match v {
            Some(x) => prev = Some(*x),
            None => *v = prev,
        }
    }

    filled.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

fn add_calendar(timestamps: &[NaiveDateTime], hour_encoding: bool, out: &mut Vec<Derived>) {
    let months: Vec<f64> = timestamps.iter().map(|t| t.month() as f64).collect();
    let (sin, cos) = cyclical(&months, 12.0);
    out.push(("month".to_string(), months.into_iter().map(Some).collect()));
    out.push(("month_sin".to_string(), sin));
    out.push(("month_cos".to_string(), cos));

    if hour_encoding {
        let hours: Vec<f64> = timestamps.iter().map(|t| t.hour() as f64).collect();
        let (sin, cos) = cyclical(&hours, 24.0);
        out.push(("hour_sin".to_string(), sin));
        out.push(("hour_cos".to_string(), cos));
    }
}

/// Sine/cosine encoding with the given period, so `period` wraps onto 0.
fn cyclical(values: &[f64], period: f64) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let angle = |v: f64| 2.0 * PI * v / period;
    let sin = values.iter().map(|&v| Some(angle(v).sin())).collect();
    let cos = values.iter().map(|&v| Some(angle(v).cos())).collect();
    (sin, cos)
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self {
            config: FeatureConfig::default(),
        }
    }
}
