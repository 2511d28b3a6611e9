//! Stopping criteria evaluated by the solve loop once per iteration.

use crate::error::{BatchCgError, Result};
use crate::stop::StoppingMask;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_MAX_ITERATIONS: usize = 1000;
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// What the tolerance is relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Baseline {
    /// `||r|| <= tol`
    Absolute,
    /// `||r|| <= tol * ||b||`
    #[default]
    RhsNorm,
    /// `||r|| <= tol * ||r_0||`
    InitialResidual,
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Baseline::Absolute => "absolute",
            Baseline::RhsNorm => "rhs",
            Baseline::InitialResidual => "initial",
        };
        f.write_str(s)
    }
}

impl FromStr for Baseline {
    type Err = BatchCgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "absolute" => Ok(Baseline::Absolute),
            "rhs" => Ok(Baseline::RhsNorm),
            "initial" => Ok(Baseline::InitialResidual),
            other => Err(BatchCgError::Config(format!(
                "unknown baseline '{other}' (expected absolute, rhs or initial)"
            ))),
        }
    }
}

/// Which residual measure is compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResidualKind {
    /// `||r||_2` of the recursively updated residual.
    #[default]
    Explicit,
    /// `sqrt(|<r, M^{-1} r>|)`, the preconditioned norm. Free, since `rho`
    /// is computed anyway.
    Implicit,
}

/// Per-column convergence test plus the global iteration budget.
#[derive(Debug, Clone, PartialEq)]
pub struct StopCriteria {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub baseline: Baseline,
    pub residual: ResidualKind,
}

impl Default for StopCriteria {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            baseline: Baseline::default(),
            residual: ResidualKind::default(),
        }
    }
}

/// Columns that changed state during one `check`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub converged: Vec<usize>,
    pub diverged: Vec<usize>,
}

impl StopCriteria {
    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(BatchCgError::Config(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Absolute per-column thresholds for the chosen baseline.
    pub fn thresholds(&self, rhs_norms: &[f64], initial_norms: &[f64]) -> Vec<f64> {
        match self.baseline {
            Baseline::Absolute => vec![self.tolerance; rhs_norms.len()],
            Baseline::RhsNorm => rhs_norms.iter().map(|n| self.tolerance * n).collect(),
            Baseline::InitialResidual => initial_norms.iter().map(|n| self.tolerance * n).collect(),
        }
    }

    /// Mark running columns whose measure reached their threshold as
    /// converged, and columns with a non-finite measure as diverged.
    pub fn check(&self, measured: &[f64], thresholds: &[f64], mask: &mut StoppingMask) -> CheckOutcome {
        assert_eq!(measured.len(), mask.cols(), "measured norms width mismatch");
        assert_eq!(thresholds.len(), mask.cols(), "thresholds width mismatch");
        let mut outcome = CheckOutcome::default();
        for (j, (&m, &t)) in measured.iter().zip(thresholds).enumerate() {
            if mask.has_stopped(j) {
                continue;
            }
            if !m.is_finite() {
                mask.diverge(j);
                outcome.diverged.push(j);
            } else if m <= t {
                mask.converge(j);
                outcome.converged.push(j);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stop::StoppingStatus;

    #[test]
    fn thresholds_follow_baseline() {
        let mut c = StopCriteria {
            tolerance: 0.5,
            ..Default::default()
        };
        assert_eq!(c.thresholds(&[2.0, 4.0], &[8.0, 0.0]), vec![1.0, 2.0]);
        c.baseline = Baseline::InitialResidual;
        assert_eq!(c.thresholds(&[2.0, 4.0], &[8.0, 0.0]), vec![4.0, 0.0]);
        c.baseline = Baseline::Absolute;
        assert_eq!(c.thresholds(&[2.0, 4.0], &[8.0, 0.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn check_marks_converged_and_diverged() {
        let c = StopCriteria::default();
        let mut mask = StoppingMask::new(4);
        mask.converge(3);
        let outcome = c.check(&[0.0, f64::NAN, 1.0, 0.0], &[0.0, 1.0, 0.5, 1.0], &mut mask);
        assert_eq!(outcome.converged, vec![0]);
        assert_eq!(outcome.diverged, vec![1]);
        assert_eq!(mask.status(2), StoppingStatus::Running);
        assert_eq!(mask.status(3), StoppingStatus::Converged);
    }

    #[test]
    fn validate_rejects_bad_tolerance() {
        let mut c = StopCriteria::default();
        assert!(c.validate().is_ok());
        c.tolerance = -1.0;
        assert!(c.validate().is_err());
        c.tolerance = f64::INFINITY;
        let err = c.validate().unwrap_err().to_string();
        assert!(err.contains("tolerance"), "got: {err}");
    }

    #[test]
    fn baseline_names() {
        for b in [Baseline::Absolute, Baseline::RhsNorm, Baseline::InitialResidual] {
            assert_eq!(b.to_string().parse::<Baseline>().unwrap(), b);
        }
        assert!("relative".parse::<Baseline>().is_err());
    }
}
