//! Goal check run after every measurement.
//!
//! `goal` is a (normally negative) percentage change relative to the
//! baseline; reaching it or going below it stops the run. `NaN` never
//! compares as reached.

use super::history::History;
use super::metrics::PerformanceMetrics;
use super::TuningMode;

pub const DEFAULT_GOAL: f64 = -50.0;

pub fn should_stop(mode: TuningMode, metrics: &PerformanceMetrics, goal: f64) -> bool {
    match mode {
        TuningMode::Speedup => metrics.rise_time_pct <= goal,
        TuningMode::ReduceOvershoot => metrics.overshoot_pct <= goal,
        TuningMode::Balanced => metrics.overshoot_pct <= goal || metrics.rise_time_pct <= goal,
    }
}

/// Evaluates the newest history entry and raises its `early_stop` flag when
/// the goal is met. Returns the flag.
pub fn apply(history: &mut History, mode: TuningMode, goal: f64) -> bool {
    let reached = history
        .latest()
        .map(|entry| should_stop(mode, &entry.metrics, goal))
        .unwrap_or(false);
    if reached {
        history.mark_latest_early_stop();
    }
    reached
}
