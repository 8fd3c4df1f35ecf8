use serde::{Deserialize, Serialize};
/// Cubic polynomial mapping a raw reading to physical units.
///
/// Coefficients are stored lowest degree first: `a0 + a1*x + a2*x^2 + a3*x^3`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub coeffs: [f64; 4],
}
impl Calibration {
    pub fn new(coeffs: [f64; 4]) -> Self {
        Self { coeffs }
    }
    pub fn identity() -> Self {
        Self::new([0.0, 1.0, 0.0, 0.0])
    }
    /// Builds from highest-degree-first coefficients, the order measurement files use.
    ///
    /// Shorter lists are padded with zero high-order terms. Returns `None` for
    /// more than four coefficients or non-finite values.
    pub fn from_descending(coeffs: &[f64]) -> Option<Self> {
        if coeffs.is_empty() || coeffs.len() > 4 || coeffs.iter().any(|c| !c.is_finite()) {
            return None;
        }
        let mut ascending = [0.0; 4];
        for (slot, value) in ascending.iter_mut().zip(coeffs.iter().rev()) {
            *slot = *value;
        }
        Some(Self::new(ascending))
    }
    pub fn apply(&self, raw: f64) -> f64 {
        let [a0, a1, a2, a3] = self.coeffs;
        ((a3 * raw + a2) * raw + a1) * raw + a0
    }
    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }
}
/// Evaluates a polynomial of any degree given lowest degree first.
pub fn polyval_ascending(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn identity_returns_input() {
        let cal = Calibration::new([0.0, 1.0, 0.0, 0.0]);
        for x in [-1.0e6, -3.25, 0.0, 1.0e-9, 42.5, 7.0e5] {
            assert_eq!(cal.apply(x), x);
        }
        assert_eq!(Calibration::identity(), cal);
    }
    #[test]
    fn all_zero_maps_everything_to_zero() {
        let cal = Calibration::new([0.0; 4]);
        assert_eq!(cal.apply(123.0), 0.0);
        assert_eq!(cal.apply(-0.5), 0.0);
    }
    #[test]
    fn cubic_matches_expanded_form() {
        let cal = Calibration::new([1.5, -2.0, 0.25, 0.01]);
        for x in [-4.0, -1.0, 0.0, 2.0, 10.0] {
            let expected = 1.5 - 2.0 * x + 0.25 * x * x + 0.01 * x * x * x;
            assert!((cal.apply(x) - expected).abs() < 1e-9);
        }
    }
    #[test]
    fn descending_order_is_reversed_and_padded() {
        let cal = Calibration::from_descending(&[3.0, 2.0, 1.0, 0.5]).unwrap();
        assert_eq!(cal.coeffs, [0.5, 1.0, 2.0, 3.0]);
        let linear = Calibration::from_descending(&[2.0, 1.0]).unwrap();
        assert_eq!(linear.coeffs, [1.0, 2.0, 0.0, 0.0]);
        assert!(Calibration::from_descending(&[1.0; 5]).is_none());
        assert!(Calibration::from_descending(&[]).is_none());
        assert!(Calibration::from_descending(&[f64::NAN]).is_none());
    }
    #[test]
    fn polyval_handles_high_degree() {
        // 1 + 2x + 3x^2 at x = 2
        assert_eq!(polyval_ascending(&[1.0, 2.0, 3.0], 2.0), 17.0);
        assert_eq!(polyval_ascending(&[], 5.0), 0.0);
    }
}
