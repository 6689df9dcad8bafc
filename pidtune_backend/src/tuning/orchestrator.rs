use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::advisory::request_new_gains;
use super::metrics::{self, StepInfoOptions};
use super::session::TuningSession;
use super::stopping;
use super::GainSet;
use crate::config::TunerConfig;
use crate::llm_client::AdvisoryService;
use crate::sim::{Simulator, StepResponseSample};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub max_iterations: usize,
    /// Pause after every iteration that continues the loop.
    pub pause: Duration,
    pub advisory_timeout: Duration,
    pub step_info: StepInfoOptions,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            pause: Duration::from_secs(1),
            advisory_timeout: Duration::from_secs(60),
            step_info: StepInfoOptions::default(),
        }
    }
}

impl LoopSettings {
    pub fn from_config(config: &TunerConfig) -> Self {
        Self {
            max_iterations: config.max_iterations,
            pause: config.iteration_pause(),
            advisory_timeout: config.advisory_timeout(),
            step_info: config.step_info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    StoppedEarly,
    ExhaustedIterations,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub iterations: usize,
    pub termination: Termination,
    pub final_gains: GainSet,
    pub advisory_calls: usize,
    pub advisory_fallbacks: usize,
}

/// Drives simulate → measure → record → stop check → advise, one iteration
/// at a time.
pub struct TuningOrchestrator<S> {
    simulator: S,
    advisor: Arc<dyn AdvisoryService>,
    settings: LoopSettings,
}

impl<S: Simulator> TuningOrchestrator<S> {
    pub fn new(simulator: S, advisor: Arc<dyn AdvisoryService>, settings: LoopSettings) -> Self {
        Self {
            simulator,
            advisor,
            settings,
        }
    }

    /// Runs one iteration and reports whether the goal was met.
    pub async fn step(&self, session: &mut TuningSession, iteration: usize) -> bool {
        let simulated = session.gains;
        let sample = match self.simulator.simulate(&simulated) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(
                    "Iteration {}: simulation failed for {} ({}); recording undefined metrics",
                    iteration,
                    simulated,
                    e
                );
                StepResponseSample::default()
            }
        };

        let m = metrics::compute(
            &sample,
            &simulated,
            &mut session.history,
            &self.settings.step_info,
        );
        tracing::info!(
            "Iteration {}: {}, tr: {:.2}s ({:.2}%), o: {:.2}% ({:.2}%), ts: {:.2}s ({:.2}%)",
            iteration,
            simulated,
            m.rise_time,
            m.rise_time_pct,
            m.overshoot,
            m.overshoot_pct,
            m.settling_time,
            m.settling_time_pct
        );

        if stopping::apply(&mut session.history, session.mode, session.goal) {
            tracing::info!(
                "Iteration {}: goal {:.2}% reached in '{}' mode",
                iteration,
                session.goal,
                session.mode
            );
            return true;
        }

        let next = request_new_gains(
            session,
            self.advisor.as_ref(),
            self.settings.advisory_timeout,
        )
        .await;
        if next == simulated {
            tracing::debug!("Iteration {}: gains unchanged", iteration);
        }
        false
    }

    pub async fn run(&self, session: &mut TuningSession) -> RunSummary {
        tracing::info!(
            "Tuning run {} started: mode={}, aggressiveness={}, goal={:.2}%, max_iterations={}",
            session.id,
            session.mode,
            session.aggressiveness,
            session.goal,
            self.settings.max_iterations
        );

        let mut iterations = 0;
        let mut termination = Termination::ExhaustedIterations;

        for iteration in 0..self.settings.max_iterations {
            iterations = iteration + 1;
            if self.step(session, iteration).await {
                termination = Termination::StoppedEarly;
                break;
            }
            if !self.settings.pause.is_zero() {
                tokio::time::sleep(self.settings.pause).await;
            }
        }

        match termination {
            Termination::StoppedEarly => tracing::info!("Early stop after {} iterations", iterations),
            Termination::ExhaustedIterations => {
                tracing::info!("Reached iteration limit ({})", iterations)
            }
        }

        RunSummary {
            iterations,
            termination,
            final_gains: session.gains,
            advisory_calls: session.advisory_calls,
            advisory_fallbacks: session.advisory_fallbacks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::Message;
    use crate::sim::SimulationError;
    use crate::tuning::{Aggressiveness, TuningMode};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSimulator(StepResponseSample);

    impl Simulator for FixedSimulator {
        fn simulate(&self, _gains: &GainSet) -> Result<StepResponseSample, SimulationError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSimulator;

    impl Simulator for FailingSimulator {
        fn simulate(&self, _gains: &GainSet) -> Result<StepResponseSample, SimulationError> {
            Err(SimulationError::NonFiniteCoefficients)
        }
    }

    #[derive(Default)]
    struct CountingAdvisor {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdvisoryService for CountingAdvisor {
        async fn complete(&self, _messages: &[Message]) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{{\"Kp\": {}, \"Ti\": 1.0, \"Td\": 0.0}}", n + 1))
        }
    }

    fn settings(max_iterations: usize) -> LoopSettings {
        LoopSettings {
            max_iterations,
            pause: Duration::ZERO,
            ..LoopSettings::default()
        }
    }

    fn sample() -> StepResponseSample {
        StepResponseSample::new(vec![0.0, 1.0, 3.0, 4.0], vec![0.0, 0.1, 0.9, 1.0])
    }

    #[tokio::test]
    async fn unchanged_response_exhausts_iterations() {
        let advisor = Arc::new(CountingAdvisor::default());
        let orchestrator =
            TuningOrchestrator::new(FixedSimulator(sample()), advisor.clone(), settings(4));
        let mut session =
            TuningSession::new(GainSet::default(), TuningMode::Speedup, Aggressiveness::Moderate);

        let summary = orchestrator.run(&mut session).await;

        assert_eq!(summary.termination, Termination::ExhaustedIterations);
        assert_eq!(summary.iterations, 4);
        assert_eq!(session.history.len(), 4);
        // Every iteration asks for new gains, including the last one.
        assert_eq!(advisor.calls.load(Ordering::SeqCst), 4);
        assert_eq!(summary.final_gains.kp, 5.0);
        // History records the gains that were simulated, not the next proposal.
        let kps: Vec<f64> = session.history.iter().map(|e| e.parameters.kp).collect();
        assert_eq!(kps, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn simulation_failure_records_nan_and_continues() {
        let advisor = Arc::new(CountingAdvisor::default());
        let orchestrator = TuningOrchestrator::new(FailingSimulator, advisor.clone(), settings(2));
        let mut session =
            TuningSession::new(GainSet::default(), TuningMode::Balanced, Aggressiveness::Fine);

        let summary = orchestrator.run(&mut session).await;

        assert_eq!(summary.termination, Termination::ExhaustedIterations);
        assert_eq!(session.history.len(), 2);
        let second = session.history.entries()[1].metrics;
        assert!(second.rise_time.is_nan());
        assert!(second.rise_time_pct.is_nan());
        assert!(!second.early_stop);
    }

    #[tokio::test]
    async fn zero_iterations_does_nothing() {
        let advisor = Arc::new(CountingAdvisor::default());
        let orchestrator =
            TuningOrchestrator::new(FixedSimulator(sample()), advisor.clone(), settings(0));
        let mut session =
            TuningSession::new(GainSet::default(), TuningMode::Speedup, Aggressiveness::Moderate);

        let summary = orchestrator.run(&mut session).await;
        assert_eq!(summary.iterations, 0);
        assert!(session.history.is_empty());
        assert_eq!(advisor.calls.load(Ordering::SeqCst), 0);
    }
}
