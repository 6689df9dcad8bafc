//! Flat per-iteration table and JSON run report.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::llm_client::Message;
use crate::tuning::{
    Aggressiveness, GainSet, History, HistoryEntry, RunSummary, TuningMode, TuningSession,
};

pub const COLUMNS: [&str; 9] = [
    "Kp",
    "Ti",
    "Td",
    "rise_time",
    "overshoot",
    "settling_time",
    "rise_time_pct",
    "overshoot_pct",
    "settling_time_pct",
];

/// One row per history entry, baseline first, values rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    pub rows: Vec<[f64; 9]>,
}

impl HistoryTable {
    pub fn from_history(history: &History) -> Self {
        Self {
            rows: history.iter().map(row).collect(),
        }
    }

    pub fn columns(&self) -> &'static [&'static str; 9] {
        &COLUMNS
    }

    pub fn to_csv(&self) -> String {
        let mut out = COLUMNS.join(",");
        out.push('\n');
        for r in &self.rows {
            let cells: Vec<String> = r.iter().map(|v| v.to_string()).collect();
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_csv())
            .with_context(|| format!("Failed to write history table to {:?}", path))?;
        tracing::info!("Wrote {} rows to {:?}", self.rows.len(), path);
        Ok(())
    }
}

fn row(entry: &HistoryEntry) -> [f64; 9] {
    let p = &entry.parameters;
    let m = &entry.metrics;
    [
        p.kp,
        p.ti,
        p.td,
        m.rise_time,
        m.overshoot,
        m.settling_time,
        m.rise_time_pct,
        m.overshoot_pct,
        m.settling_time_pct,
    ]
    .map(round2)
}

/// Rounds to 2 decimals; NaN and infinities pass through.
pub fn round2(v: f64) -> f64 {
    if !v.is_finite() {
        return v;
    }
    (v * 100.0).round() / 100.0
}

/// Everything worth keeping from a finished run.
#[derive(Debug, Serialize)]
pub struct SessionReport<'a> {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: TuningMode,
    pub aggressiveness: Aggressiveness,
    pub goal: f64,
    pub summary: &'a RunSummary,
    pub final_gains: GainSet,
    pub history: &'a History,
    pub transcript: &'a [Message],
}

impl<'a> SessionReport<'a> {
    pub fn new(session: &'a TuningSession, summary: &'a RunSummary) -> Self {
        Self {
            id: session.id,
            started_at: session.started_at,
            finished_at: Utc::now(),
            mode: session.mode,
            aggressiveness: session.aggressiveness,
            goal: session.goal,
            summary,
            final_gains: session.gains,
            history: &session.history,
            transcript: session.transcript.messages(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report to {:?}", path))?;
        tracing::info!("Wrote session report to {:?}", path);
        Ok(())
    }
}
