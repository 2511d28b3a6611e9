//! Solver configuration.

use crate::error::{BatchCgError, Result};
use crate::solver::criteria::{Baseline, ResidualKind, StopCriteria};
use crate::solver::executor::{Executor, ExecutorKind};

/// Consecutive zero-length steps after which a running column is marked
/// diverged.
pub const DEFAULT_MAX_STALLS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct CgConfig {
    pub criteria: StopCriteria,
    pub max_stalls: usize,
    pub executor: ExecutorKind,
    /// Dedicated pool size for the parallel executor; `None` uses rayon's
    /// global pool.
    pub threads: Option<usize>,
}

impl Default for CgConfig {
    fn default() -> Self {
        Self {
            criteria: StopCriteria::default(),
            max_stalls: DEFAULT_MAX_STALLS,
            executor: ExecutorKind::default(),
            threads: None,
        }
    }
}

impl CgConfig {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.criteria.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.criteria.max_iterations = max_iterations;
        self
    }

    pub fn with_baseline(mut self, baseline: Baseline) -> Self {
        self.criteria.baseline = baseline;
        self
    }

    pub fn with_residual(mut self, residual: ResidualKind) -> Self {
        self.criteria.residual = residual;
        self
    }

    pub fn with_max_stalls(mut self, max_stalls: usize) -> Self {
        self.max_stalls = max_stalls;
        self
    }

    pub fn with_executor(mut self, executor: ExecutorKind) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.criteria.validate()?;
        if self.max_stalls == 0 {
            return Err(BatchCgError::Config("max_stalls must be at least 1".into()));
        }
        if self.threads == Some(0) {
            return Err(BatchCgError::Config("thread count must be non-zero".into()));
        }
        Ok(())
    }

    /// Validate and build the execution context this configuration selects.
    pub fn build_executor(&self) -> Result<Executor> {
        self.validate()?;
        Executor::new(self.executor, self.threads)
    }
}
