//! Closed-loop plant simulation used by the tuning loop.

pub mod pid;
pub mod state_space;
pub mod transfer_function;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PlantConfig;
use crate::tuning::GainSet;

pub use pid::PidController;
pub use state_space::StateSpace;
pub use transfer_function::{pade, TransferFunction};

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("transfer function denominator is zero")]
    ZeroDenominator,
    #[error("transfer function has non-finite coefficients")]
    NonFiniteCoefficients,
    #[error("transfer function is improper (numerator degree {num} > denominator degree {den})")]
    Improper { num: usize, den: usize },
    #[error("time base needs at least two samples and a positive horizon")]
    InvalidTimeBase,
}

/// One simulated step response. `reference` is the unit step the loop tracks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepResponseSample {
    pub time: Vec<f64>,
    pub response: Vec<f64>,
    pub reference: Vec<f64>,
}

impl StepResponseSample {
    pub fn new(time: Vec<f64>, response: Vec<f64>) -> Self {
        let reference = vec![1.0; time.len()];
        Self {
            time,
            response,
            reference,
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

/// Evenly spaced simulation horizon `[0, t_final]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBase {
    #[serde(default = "default_t_final")]
    pub t_final: f64,
    #[serde(default = "default_samples")]
    pub samples: usize,
}

fn default_t_final() -> f64 {
    30.0
}

fn default_samples() -> usize {
    1000
}

impl Default for TimeBase {
    fn default() -> Self {
        Self {
            t_final: default_t_final(),
            samples: default_samples(),
        }
    }
}

impl TimeBase {
    pub fn times(&self) -> Result<Vec<f64>, SimulationError> {
        if self.samples < 2 || !(self.t_final > 0.0) || !self.t_final.is_finite() {
            return Err(SimulationError::InvalidTimeBase);
        }
        let last = (self.samples - 1) as f64;
        Ok((0..self.samples)
            .map(|i| self.t_final * i as f64 / last)
            .collect())
    }
}

/// Produces the step response of the loop closed around a given gain set.
pub trait Simulator {
    fn simulate(&self, gains: &GainSet) -> Result<StepResponseSample, SimulationError>;
}

/// Unity negative feedback of a PID controller around a fixed plant.
#[derive(Debug, Clone)]
pub struct ClosedLoopSimulator {
    plant: TransferFunction,
    time_base: TimeBase,
}

impl ClosedLoopSimulator {
    pub fn new(plant: TransferFunction, time_base: TimeBase) -> Self {
        Self { plant, time_base }
    }

    /// Builds the plant from its polynomial description, multiplying in a Padé
    /// delay when `dead_time` is positive.
    pub fn from_plant_config(
        plant: &PlantConfig,
        time_base: TimeBase,
    ) -> Result<Self, SimulationError> {
        let mut tf = TransferFunction::new(plant.numerator.clone(), plant.denominator.clone())?;
        if !tf.is_finite() {
            return Err(SimulationError::NonFiniteCoefficients);
        }
        if plant.dead_time > 0.0 {
            tf = tf.series(&pade(plant.dead_time, plant.pade_order));
        }
        time_base.times()?;
        Ok(Self::new(tf, time_base))
    }

    pub fn plant(&self) -> &TransferFunction {
        &self.plant
    }

    pub fn close_loop(&self, gains: &GainSet) -> TransferFunction {
        PidController::new(*gains)
            .transfer_function()
            .series(&self.plant)
            .feedback()
    }
}

impl Simulator for ClosedLoopSimulator {
    fn simulate(&self, gains: &GainSet) -> Result<StepResponseSample, SimulationError> {
        let closed_loop = self.close_loop(gains);
        let ss = StateSpace::from_transfer_function(&closed_loop)?;
        let time = self.time_base.times()?;
        let response = ss.step_response(&time);
        Ok(StepResponseSample::new(time, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn third_order_lag() -> PlantConfig {
        PlantConfig {
            numerator: vec![1.0],
            denominator: vec![1.0, 3.0, 3.0, 1.0],
            dead_time: 0.0,
            pade_order: 5,
        }
    }

    #[test]
    fn closed_loop_with_integral_action_tracks_the_step() {
        let sim = ClosedLoopSimulator::from_plant_config(
            &third_order_lag(),
            TimeBase {
                t_final: 60.0,
                samples: 600,
            },
        )
        .unwrap();

        let sample = sim.simulate(&GainSet::new(1.0, 3.0, 0.0)).unwrap();
        assert_eq!(sample.len(), 600);
        assert_eq!(sample.reference, vec![1.0; 600]);
        let last = *sample.response.last().unwrap();
        assert!((last - 1.0).abs() < 0.02, "final value {last}");
    }

    #[test]
    fn dead_time_raises_plant_order() {
        let mut plant = third_order_lag();
        plant.dead_time = 0.5;
        let sim = ClosedLoopSimulator::from_plant_config(&plant, TimeBase::default()).unwrap();
        assert_eq!(sim.plant().degrees(), (5, 8));
    }

    #[test]
    fn zero_integral_time_fails_to_simulate() {
        let sim =
            ClosedLoopSimulator::from_plant_config(&third_order_lag(), TimeBase::default())
                .unwrap();
        assert_eq!(
            sim.simulate(&GainSet::new(1.0, 0.0, 0.0)).unwrap_err(),
            SimulationError::NonFiniteCoefficients
        );
    }

    #[test]
    fn degenerate_time_base_is_rejected() {
        let tb = TimeBase {
            t_final: 0.0,
            samples: 10,
        };
        assert_eq!(tb.times().unwrap_err(), SimulationError::InvalidTimeBase);
    }
}
