//! SISO transfer functions as ratios of polynomials.
//!
//! Coefficients are stored highest power first, so `[1.0, 3.0, 2.0]` is
//! `s^2 + 3s + 2`.

use serde::{Deserialize, Serialize};

use super::SimulationError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFunction {
    pub num: Vec<f64>,
    pub den: Vec<f64>,
}

impl TransferFunction {
    pub fn new(num: Vec<f64>, den: Vec<f64>) -> Result<Self, SimulationError> {
        let num = trim_leading_zeros(num);
        let den = trim_leading_zeros(den);
        if den.iter().all(|c| *c == 0.0) {
            return Err(SimulationError::ZeroDenominator);
        }
        Ok(Self { num, den })
    }

    /// Static gain `k`.
    pub fn gain(k: f64) -> Self {
        Self {
            num: vec![k],
            den: vec![1.0],
        }
    }

    /// Series connection `self * other`.
    pub fn series(&self, other: &TransferFunction) -> TransferFunction {
        TransferFunction {
            num: trim_leading_zeros(poly_mul(&self.num, &other.num)),
            den: trim_leading_zeros(poly_mul(&self.den, &other.den)),
        }
    }

    /// Unity negative feedback around `self`: `G / (1 + G)`.
    pub fn feedback(&self) -> TransferFunction {
        TransferFunction {
            num: self.num.clone(),
            den: trim_leading_zeros(poly_add(&self.den, &self.num)),
        }
    }

    /// Polynomial degree of the numerator and denominator.
    pub fn degrees(&self) -> (usize, usize) {
        (
            self.num.len().saturating_sub(1),
            self.den.len().saturating_sub(1),
        )
    }

    pub fn is_proper(&self) -> bool {
        let (n, d) = self.degrees();
        n <= d
    }

    pub fn is_finite(&self) -> bool {
        self.num.iter().chain(self.den.iter()).all(|c| c.is_finite())
    }
}

/// Padé approximation of a pure delay `e^{-sT}` of the given order.
pub fn pade(delay: f64, order: usize) -> TransferFunction {
    if delay <= 0.0 || order == 0 {
        return TransferFunction::gain(1.0);
    }

    let n = order;
    let mut num = vec![0.0; n + 1];
    let mut den = vec![0.0; n + 1];
    num[n] = 1.0;
    den[n] = 1.0;

    let mut c = 1.0;
    for k in 1..=n {
        c = delay * c * (n - k + 1) as f64 / (2 * n - k + 1) as f64 / k as f64;
        num[n - k] = if k % 2 == 0 { c } else { -c };
        den[n - k] = c;
    }

    let lead = den[0];
    TransferFunction {
        num: num.into_iter().map(|v| v / lead).collect(),
        den: den.into_iter().map(|v| v / lead).collect(),
    }
}

pub(crate) fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return vec![0.0];
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

pub(crate) fn poly_add(a: &[f64], b: &[f64]) -> Vec<f64> {
    let len = a.len().max(b.len());
    let mut out = vec![0.0; len];
    for (i, x) in a.iter().rev().enumerate() {
        out[len - 1 - i] += x;
    }
    for (i, y) in b.iter().rev().enumerate() {
        out[len - 1 - i] += y;
    }
    out
}

fn trim_leading_zeros(mut coeffs: Vec<f64>) -> Vec<f64> {
    let first = coeffs.iter().position(|c| *c != 0.0);
    match first {
        Some(0) => coeffs,
        Some(idx) => coeffs.split_off(idx),
        None => vec![0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `G(0)`
    fn dc_gain(tf: &TransferFunction) -> f64 {
        tf.num[tf.num.len() - 1] / tf.den[tf.den.len() - 1]
    }

    #[test]
    fn series_multiplies_numerators_and_denominators() {
        let a = TransferFunction::new(vec![1.0], vec![1.0, 1.0]).unwrap();
        let b = TransferFunction::new(vec![2.0], vec![1.0, 2.0]).unwrap();
        let g = a.series(&b);
        assert_eq!(g.num, vec![2.0]);
        assert_eq!(g.den, vec![1.0, 3.0, 2.0]);
    }

    #[test]
    fn unity_feedback_adds_numerator_to_denominator() {
        let g = TransferFunction::new(vec![2.0], vec![1.0, 3.0, 2.0]).unwrap();
        let cl = g.feedback();
        assert_eq!(cl.num, vec![2.0]);
        assert_eq!(cl.den, vec![1.0, 3.0, 4.0]);
        assert!((dc_gain(&cl) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_zero_denominator() {
        assert!(matches!(
            TransferFunction::new(vec![1.0], vec![0.0, 0.0]),
            Err(SimulationError::ZeroDenominator)
        ));
    }

    #[test]
    fn leading_zeros_are_trimmed() {
        let g = TransferFunction::new(vec![0.0, 0.0, 1.0], vec![0.0, 1.0, 1.0]).unwrap();
        assert_eq!(g.num, vec![1.0]);
        assert_eq!(g.den, vec![1.0, 1.0]);
        assert_eq!(g.degrees(), (0, 1));
    }

    #[test]
    fn first_order_pade_matches_closed_form() {
        // (1 - sT/2) / (1 + sT/2), normalised by the leading denominator term.
        let d = pade(2.0, 1);
        assert_eq!(d.num, vec![-1.0, 1.0]);
        assert_eq!(d.den, vec![1.0, 1.0]);
    }

    #[test]
    fn pade_has_unit_dc_gain() {
        let d = pade(0.7, 5);
        assert_eq!(d.num.len(), 6);
        assert_eq!(d.den.len(), 6);
        assert!((dc_gain(&d) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_delay_is_identity() {
        assert_eq!(pade(0.0, 5), TransferFunction::gain(1.0));
    }
}
