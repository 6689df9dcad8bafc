//! Controllable canonical realisation and fixed-step integration.

use super::transfer_function::TransferFunction;
use super::SimulationError;

/// Internal RK4 steps taken between two output samples.
const SUBSTEPS: usize = 8;

/// `x' = A x + B u`, `y = C x + D u` with `A` in companion form.
///
/// Only the characteristic coefficients `a1..an` are stored; `B` is the last
/// unit vector.
#[derive(Debug, Clone)]
pub struct StateSpace {
    a: Vec<f64>,
    c: Vec<f64>,
    d: f64,
}

impl StateSpace {
    pub fn from_transfer_function(tf: &TransferFunction) -> Result<Self, SimulationError> {
        if !tf.is_finite() {
            return Err(SimulationError::NonFiniteCoefficients);
        }
        if !tf.is_proper() {
            let (num, den) = tf.degrees();
            return Err(SimulationError::Improper { num, den });
        }

        let lead = tf.den[0];
        if lead == 0.0 {
            return Err(SimulationError::ZeroDenominator);
        }
        let n = tf.den.len() - 1;
        let den: Vec<f64> = tf.den.iter().map(|v| v / lead).collect();

        let mut num = vec![0.0; n + 1 - tf.num.len()];
        num.extend(tf.num.iter().map(|v| v / lead));

        let d = num[0];
        // c_i = b_i - b0 * a_i for i = 1..n, stored highest power first.
        let c: Vec<f64> = (1..=n).map(|i| num[i] - d * den[i]).collect();

        Ok(Self {
            a: den[1..].to_vec(),
            c,
            d,
        })
    }

    pub fn order(&self) -> usize {
        self.a.len()
    }

    fn derivative(&self, x: &[f64], u: f64, out: &mut [f64]) {
        let n = self.order();
        for k in 0..n.saturating_sub(1) {
            out[k] = x[k + 1];
        }
        if n > 0 {
            // x_n' = -a_n x_1 - a_{n-1} x_2 - ... - a_1 x_n + u
            let mut acc = u;
            for k in 0..n {
                acc -= self.a[n - 1 - k] * x[k];
            }
            out[n - 1] = acc;
        }
    }

    fn output(&self, x: &[f64], u: f64) -> f64 {
        let n = self.order();
        let mut y = self.d * u;
        for k in 0..n {
            y += self.c[n - 1 - k] * x[k];
        }
        y
    }

    /// Unit-step response sampled at `times`, starting from rest.
    pub fn step_response(&self, times: &[f64]) -> Vec<f64> {
        let n = self.order();
        let u = 1.0;
        let mut x = vec![0.0; n];
        let mut k1 = vec![0.0; n];
        let mut k2 = vec![0.0; n];
        let mut k3 = vec![0.0; n];
        let mut k4 = vec![0.0; n];
        let mut tmp = vec![0.0; n];

        let mut out = Vec::with_capacity(times.len());
        let mut prev_t = times.first().copied().unwrap_or(0.0);

        for &t in times {
            let span = t - prev_t;
            if span > 0.0 && n > 0 {
                let h = span / SUBSTEPS as f64;
                for _ in 0..SUBSTEPS {
                    self.derivative(&x, u, &mut k1);
                    for i in 0..n {
                        tmp[i] = x[i] + 0.5 * h * k1[i];
                    }
                    self.derivative(&tmp, u, &mut k2);
                    for i in 0..n {
                        tmp[i] = x[i] + 0.5 * h * k2[i];
                    }
                    self.derivative(&tmp, u, &mut k3);
                    for i in 0..n {
                        tmp[i] = x[i] + h * k3[i];
                    }
                    self.derivative(&tmp, u, &mut k4);
                    for i in 0..n {
                        x[i] += h / 6.0 * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]);
                    }
                }
            }
            prev_t = t;
            out.push(self.output(&x, u));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(end: f64, samples: usize) -> Vec<f64> {
        (0..samples)
            .map(|i| end * i as f64 / (samples - 1) as f64)
            .collect()
    }

    #[test]
    fn first_order_lag_matches_exponential() {
        // 1 / (s + 1)  ->  y(t) = 1 - e^{-t}
        let tf = TransferFunction::new(vec![1.0], vec![1.0, 1.0]).unwrap();
        let ss = StateSpace::from_transfer_function(&tf).unwrap();
        let t = linspace(5.0, 51);
        let y = ss.step_response(&t);
        for (ti, yi) in t.iter().zip(&y) {
            assert!((yi - (1.0 - (-ti).exp())).abs() < 1e-6, "t={ti} y={yi}");
        }
    }

    #[test]
    fn biproper_system_has_direct_feedthrough() {
        // (2s + 1) / (s + 1): y(0+) = 2, y(inf) = 1
        let tf = TransferFunction::new(vec![2.0, 1.0], vec![1.0, 1.0]).unwrap();
        let ss = StateSpace::from_transfer_function(&tf).unwrap();
        let y = ss.step_response(&linspace(20.0, 201));
        assert!((y[0] - 2.0).abs() < 1e-12);
        assert!((y[200] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn static_gain_has_no_states() {
        let ss = StateSpace::from_transfer_function(&TransferFunction::gain(3.0)).unwrap();
        assert_eq!(ss.order(), 0);
        assert_eq!(ss.step_response(&[0.0, 1.0]), vec![3.0, 3.0]);
    }

    #[test]
    fn improper_transfer_function_is_rejected() {
        let tf = TransferFunction::new(vec![1.0, 0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(matches!(
            StateSpace::from_transfer_function(&tf),
            Err(SimulationError::Improper { num: 2, den: 1 })
        ));
    }

    #[test]
    fn non_finite_coefficients_are_rejected() {
        let tf = TransferFunction {
            num: vec![1.0, f64::INFINITY],
            den: vec![1.0, 0.0],
        };
        assert!(matches!(
            StateSpace::from_transfer_function(&tf),
            Err(SimulationError::NonFiniteCoefficients)
        ));
    }
}
