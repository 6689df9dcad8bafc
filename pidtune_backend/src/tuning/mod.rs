//! Iterative PID tuning: measurement, bookkeeping, stopping, and advisory
//! round-trips.

pub mod advisory;
pub mod history;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod stopping;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use history::{History, HistoryEntry};
pub use metrics::{PerformanceMetrics, StepInfo, StepInfoOptions};
pub use orchestrator::{LoopSettings, RunSummary, Termination, TuningOrchestrator};
pub use session::TuningSession;

/// PID gains in ideal form: proportional gain, integral time, derivative time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainSet {
    #[serde(rename = "Kp")]
    pub kp: f64,
    #[serde(rename = "Ti")]
    pub ti: f64,
    #[serde(rename = "Td")]
    pub td: f64,
}

impl GainSet {
    pub fn new(kp: f64, ti: f64, td: f64) -> Self {
        Self { kp, ti, td }
    }
}

impl Default for GainSet {
    fn default() -> Self {
        Self::new(1.0, 1.0, 0.0)
    }
}

impl fmt::Display for GainSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kp={:.3}, Ti={:.3}, Td={:.3}", self.kp, self.ti, self.td)
    }
}

/// Which metric the run is trying to improve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TuningMode {
    Speedup,
    ReduceOvershoot,
    #[default]
    Balanced,
}

impl TuningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TuningMode::Speedup => "speedup",
            TuningMode::ReduceOvershoot => "reduce_overshoot",
            TuningMode::Balanced => "balanced",
        }
    }
}

impl fmt::Display for TuningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TuningMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "speedup" => Ok(TuningMode::Speedup),
            "reduce_overshoot" => Ok(TuningMode::ReduceOvershoot),
            "balanced" => Ok(TuningMode::Balanced),
            other => anyhow::bail!(
                "unknown tuning mode '{}' (expected speedup, reduce_overshoot or balanced)",
                other
            ),
        }
    }
}

/// How large a step the advisory service is asked to take per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    Aggressive,
    #[default]
    Moderate,
    Fine,
}

impl Aggressiveness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggressiveness::Aggressive => "aggressive",
            Aggressiveness::Moderate => "moderate",
            Aggressiveness::Fine => "fine",
        }
    }

    /// Allowed relative change per step, in percent.
    pub fn change_range(&self) -> (u32, u32) {
        match self {
            Aggressiveness::Aggressive => (40, 50),
            Aggressiveness::Moderate => (10, 30),
            Aggressiveness::Fine => (1, 5),
        }
    }
}

impl fmt::Display for Aggressiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggressiveness {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Ok(Aggressiveness::Aggressive),
            "moderate" => Ok(Aggressiveness::Moderate),
            "fine" => Ok(Aggressiveness::Fine),
            other => anyhow::bail!(
                "unknown aggressiveness '{}' (expected aggressive, moderate or fine)",
                other
            ),
        }
    }
}
