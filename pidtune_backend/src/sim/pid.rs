use crate::tuning::GainSet;

use super::transfer_function::TransferFunction;

/// Ideal (non-proper) PID controller `Kp (1 + 1/(Ti s) + Td s)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidController {
    pub gains: GainSet,
}

impl PidController {
    pub fn new(gains: GainSet) -> Self {
        Self { gains }
    }

    /// `(Kp*Td*s^2 + Kp*s + Kp/Ti) / s`
    ///
    /// `Ti == 0` produces a non-finite coefficient; the simulator rejects it.
    pub fn transfer_function(&self) -> TransferFunction {
        let GainSet { kp, ti, td } = self.gains;
        TransferFunction {
            num: vec![kp * td, kp, kp / ti],
            den: vec![1.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coefficients_follow_ideal_form() {
        let pid = PidController::new(GainSet::new(2.0, 4.0, 0.5));
        let tf = pid.transfer_function();
        assert_eq!(tf.num, vec![1.0, 2.0, 0.5]);
        assert_eq!(tf.den, vec![1.0, 0.0]);
        assert!(!tf.is_proper());
    }

    #[test]
    fn zero_integral_time_is_not_finite() {
        let pid = PidController::new(GainSet::new(1.0, 0.0, 0.0));
        assert!(!pid.transfer_function().is_finite());
    }
}
