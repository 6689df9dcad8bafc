use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::advisory::Transcript;
use super::history::History;
use super::stopping::DEFAULT_GOAL;
use super::{Aggressiveness, GainSet, TuningMode};
use crate::config::TunerConfig;

/// State of one tuning run, owned by the caller and advanced by the
/// orchestrator one iteration at a time.
#[derive(Debug, Clone, Serialize)]
pub struct TuningSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub mode: TuningMode,
    pub aggressiveness: Aggressiveness,
    pub goal: f64,
    pub gains: GainSet,
    pub history: History,
    pub transcript: Transcript,
    pub advisory_calls: usize,
    pub advisory_fallbacks: usize,
}

impl TuningSession {
    pub fn new(initial_gains: GainSet, mode: TuningMode, aggressiveness: Aggressiveness) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            mode,
            aggressiveness,
            goal: DEFAULT_GOAL,
            gains: initial_gains,
            history: History::new(),
            transcript: Transcript::new(),
            advisory_calls: 0,
            advisory_fallbacks: 0,
        }
    }

    pub fn from_config(config: &TunerConfig) -> Self {
        Self::new(config.initial_gains, config.mode, config.aggressiveness).with_goal(config.goal)
    }

    pub fn with_goal(mut self, goal: f64) -> Self {
        self.goal = goal;
        self
    }

    /// Whether the newest history entry met the goal.
    pub fn stopped_early(&self) -> bool {
        self.history
            .latest()
            .map(|entry| entry.metrics.early_stop)
            .unwrap_or(false)
    }
}
