//! Step-response characteristics and baseline-relative improvement.
//!
//! The steady value is the last sample of the response. Degenerate responses
//! (empty, non-finite samples, zero or non-finite steady value) yield `NaN`
//! for every characteristic instead of an error, and the percentage fields
//! divide by the baseline without guarding against zero.

use serde::{Deserialize, Serialize};

use super::history::{History, HistoryEntry};
use super::GainSet;
use crate::sim::StepResponseSample;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepInfoOptions {
    /// Fractions of the steady value bounding the rise interval.
    #[serde(default = "default_rise_time_limits")]
    pub rise_time_limits: (f64, f64),
    /// Half-width of the settling band, as a fraction of the steady value.
    #[serde(default = "default_settling_threshold")]
    pub settling_threshold: f64,
}

fn default_rise_time_limits() -> (f64, f64) {
    (0.1, 0.9)
}

fn default_settling_threshold() -> f64 {
    0.02
}

impl Default for StepInfoOptions {
    fn default() -> Self {
        Self {
            rise_time_limits: default_rise_time_limits(),
            settling_threshold: default_settling_threshold(),
        }
    }
}

/// Raw characteristics of one step response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepInfo {
    pub rise_time: f64,
    pub overshoot: f64,
    pub settling_time: f64,
}

impl StepInfo {
    pub fn undefined() -> Self {
        Self {
            rise_time: f64::NAN,
            overshoot: f64::NAN,
            settling_time: f64::NAN,
        }
    }
}

/// Characteristics of a recorded iteration. The `_pct` fields compare against
/// the first entry of the run's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub rise_time: f64,
    pub overshoot: f64,
    pub settling_time: f64,
    pub rise_time_pct: f64,
    pub overshoot_pct: f64,
    pub settling_time_pct: f64,
    pub early_stop: bool,
}

pub fn step_info(time: &[f64], response: &[f64], options: &StepInfoOptions) -> StepInfo {
    if time.is_empty() || time.len() != response.len() {
        return StepInfo::undefined();
    }
    if response.iter().any(|y| !y.is_finite()) {
        return StepInfo::undefined();
    }

    let steady = response[response.len() - 1];
    if steady == 0.0 {
        return StepInfo::undefined();
    }
    let sign = steady.signum();
    let (low, high) = options.rise_time_limits;

    let first_reaching = |fraction: f64| {
        response
            .iter()
            .position(|y| sign * (y - fraction * steady) >= 0.0)
    };
    let rise_time = match (first_reaching(low), first_reaching(high)) {
        (Some(lo), Some(hi)) => time[hi] - time[lo],
        _ => f64::NAN,
    };

    let band = steady.abs() * options.settling_threshold;
    let settling_time = match response.iter().rposition(|y| (y - steady).abs() >= band) {
        Some(last_outside) if last_outside + 1 < time.len() => time[last_outside + 1] - time[0],
        Some(_) => f64::NAN,
        None => 0.0,
    };

    let peak = response
        .iter()
        .map(|y| sign * y)
        .fold(f64::NEG_INFINITY, f64::max);
    let excess = peak.abs() - steady.abs();
    let overshoot = if excess > 0.0 {
        (100.0 * excess / steady).abs()
    } else {
        0.0
    };

    StepInfo {
        rise_time,
        overshoot,
        settling_time,
    }
}

/// `(current - baseline) / baseline * 100`. No guard for a zero baseline.
pub fn percent_change(current: f64, baseline: f64) -> f64 {
    (current - baseline) / baseline * 100.0
}

/// Measures `sample`, scores it against the run baseline, and appends the
/// result to `history` together with the gains that produced the sample.
pub fn compute(
    sample: &StepResponseSample,
    gains: &GainSet,
    history: &mut History,
    options: &StepInfoOptions,
) -> PerformanceMetrics {
    let info = step_info(&sample.time, &sample.response, options);

    let (rise_time_pct, overshoot_pct, settling_time_pct) = match history.baseline() {
        Some(base) => (
            percent_change(info.rise_time, base.metrics.rise_time),
            percent_change(info.overshoot, base.metrics.overshoot),
            percent_change(info.settling_time, base.metrics.settling_time),
        ),
        None => (0.0, 0.0, 0.0),
    };

    let metrics = PerformanceMetrics {
        rise_time: info.rise_time,
        overshoot: info.overshoot,
        settling_time: info.settling_time,
        rise_time_pct,
        overshoot_pct,
        settling_time_pct,
        early_stop: false,
    };

    history.append(HistoryEntry {
        parameters: *gains,
        metrics,
    });

    metrics
}
