use serde::{Deserialize, Serialize};

/// Absolute and relative tolerances for residuals that should vanish.
///
/// A residual passes if it is within `abs_tol`, or within `rel_tol` of a
/// characteristic magnitude of the quantity it was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    pub abs_tol: f64,
    pub rel_tol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs_tol: 1e-9,
            rel_tol: 1e-6,
        }
    }
}

impl Tolerances {
    pub fn new(rel_tol: f64, abs_tol: f64) -> Self {
        Self { rel_tol, abs_tol }
    }

    /// Largest residual accepted for a quantity of size `scale`.
    pub fn allowed(&self, scale: f64) -> f64 {
        self.abs_tol.max(self.rel_tol * scale.abs())
    }

    /// True if a non-negative residual (e.g. a distance between two points that
    /// should coincide) is acceptable relative to the characteristic length `scale`.
    pub fn check_residual(&self, residual: f64, scale: f64) -> bool {
        residual.is_finite() && residual <= self.allowed(scale)
    }
}
