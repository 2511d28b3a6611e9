//! Batched preconditioned Conjugate Gradient.
//!
//! Drives the kernels in `cg_kernels` for every column of a block at once.
//! Columns converge, diverge or stall independently; the stopping mask is
//! what lets one batched call keep working on the columns still running.
//!
//! Per iteration:
//!
//! ```text
//! z = M^{-1} r
//! rho = <r, z>                 (per column)
//! check criteria, update mask
//! p = z + (rho / prev_rho) p   (step_1)
//! q = A p
//! beta = <p, q>
//! x += (rho / beta) p          (step_2)
//! r -= (rho / beta) q
//! prev_rho = rho
//! ```

use std::time::Instant;

use crate::config::CgConfig;
use crate::dense::{Block, BlockView, BlockViewMut, ScalarRow};
use crate::error::{BatchCgError, Result};
use crate::scalar::Scalar;
use crate::stats::{record, Phase, Stats};
use crate::stop::{StoppingMask, StoppingStatus};

use super::cg_kernels::{self, step_length};
use super::criteria::{Baseline, ResidualKind};
use super::dense_kernels;
use super::executor::Executor;
use super::preconditioner::{Identity, Preconditioner};
use super::LinearOperator;

/// Overall outcome of a batched solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every column converged.
    Converged,
    /// No column is running and at least one diverged.
    Diverged,
    /// The iteration budget ran out with columns still running.
    Exhausted,
}

/// Result of `Cg::apply`.
#[derive(Debug, Clone, PartialEq)]
pub struct CgReport {
    pub iterations: usize,
    pub statuses: Vec<StoppingStatus>,
    /// Final `||r||_2` per column.
    pub residual_norms: Vec<f64>,
    pub verdict: Verdict,
}

impl CgReport {
    pub fn converged(&self) -> bool {
        self.verdict == Verdict::Converged
    }
}

/// Buffers owned by the solve loop for the lifetime of one solve.
///
/// Reusable across solves of the same shape via `Cg::apply_in`.
#[derive(Debug, Clone)]
pub struct CgWorkspace<T> {
    pub r: Block<T>,
    pub z: Block<T>,
    pub p: Block<T>,
    pub q: Block<T>,
    pub rho: ScalarRow<T>,
    pub prev_rho: ScalarRow<T>,
    pub beta: ScalarRow<T>,
    pub stop: StoppingMask,
    stalls: Vec<usize>,
}

impl<T: Scalar> CgWorkspace<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            r: Block::zeros(rows, cols),
            z: Block::zeros(rows, cols),
            p: Block::zeros(rows, cols),
            q: Block::zeros(rows, cols),
            rho: ScalarRow::zeros(cols),
            prev_rho: ScalarRow::zeros(cols),
            beta: ScalarRow::zeros(cols),
            stop: StoppingMask::new(cols),
            stalls: vec![0; cols],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.r.rows(), self.r.cols())
    }
}

/// Batched CG solver over a shared operator.
pub struct Cg<A, P = Identity> {
    operator: A,
    preconditioner: P,
    config: CgConfig,
    exec: Executor,
}

impl<A> Cg<A, Identity> {
    /// Unpreconditioned solver. Fails if the configuration is invalid.
    pub fn new(operator: A, config: CgConfig) -> Result<Self> {
        let exec = config.build_executor()?;
        Ok(Self {
            operator,
            preconditioner: Identity,
            config,
            exec,
        })
    }
}

impl<A, P> Cg<A, P> {
    pub fn with_preconditioner<Q>(self, preconditioner: Q) -> Cg<A, Q> {
        Cg {
            operator: self.operator,
            preconditioner,
            config: self.config,
            exec: self.exec,
        }
    }

    /// Execution context built from the configuration.
    pub fn executor(&self) -> &Executor {
        &self.exec
    }

    /// Solve `A X = B` for every column of `b`, using `x` as the initial guess.
    pub fn apply<T>(&self, b: BlockView<'_, T>, x: &mut BlockViewMut<'_, T>) -> Result<CgReport>
    where
        T: Scalar,
        A: LinearOperator<T>,
        P: Preconditioner<T>,
    {
        let mut ws = CgWorkspace::new(b.rows(), b.cols());
        self.apply_in(&mut ws, b, x, None)
    }

    /// `apply` with phase timings collected into `stats`.
    pub fn apply_with_stats<T>(
        &self,
        b: BlockView<'_, T>,
        x: &mut BlockViewMut<'_, T>,
        stats: Option<&mut Stats>,
    ) -> Result<CgReport>
    where
        T: Scalar,
        A: LinearOperator<T>,
        P: Preconditioner<T>,
    {
        let mut ws = CgWorkspace::new(b.rows(), b.cols());
        self.apply_in(&mut ws, b, x, stats)
    }

    /// Solve using caller-owned workspace buffers.
    pub fn apply_in<T>(
        &self,
        ws: &mut CgWorkspace<T>,
        b: BlockView<'_, T>,
        x: &mut BlockViewMut<'_, T>,
        mut stats: Option<&mut Stats>,
    ) -> Result<CgReport>
    where
        T: Scalar,
        A: LinearOperator<T>,
        P: Preconditioner<T>,
    {
        let (n_rows, n_cols) = self.operator.size();
        if n_rows != n_cols {
            return Err(BatchCgError::Shape(format!(
                "operator must be square, got {n_rows}x{n_cols}"
            )));
        }
        if b.rows() != n_rows {
            return Err(BatchCgError::Shape(format!(
                "right-hand side has {} rows, operator is {n_rows}x{n_cols}",
                b.rows()
            )));
        }
        if x.shape() != b.shape() {
            return Err(BatchCgError::Shape(format!(
                "solution block is {:?}, right-hand side is {:?}",
                x.shape(),
                b.shape()
            )));
        }
        if ws.shape() != b.shape() {
            return Err(BatchCgError::Shape(format!(
                "workspace is {:?}, right-hand side is {:?}",
                ws.shape(),
                b.shape()
            )));
        }

        let exec = &self.exec;
        let criteria = &self.config.criteria;
        let cols = b.cols();
        let _span = tracing::debug_span!(
            "batch_cg",
            n = n_rows,
            rhs = cols,
            executor = %exec.kind()
        )
        .entered();

        let t = Instant::now();
        cg_kernels::initialize(
            exec,
            b,
            &mut ws.r.view_mut(),
            &mut ws.z.view_mut(),
            &mut ws.p.view_mut(),
            &mut ws.q.view_mut(),
            &mut ws.prev_rho,
            &mut ws.rho,
            &mut ws.stop,
        );
        ws.stalls.fill(0);
        record(&mut stats, Phase::Initialize, t);

        // r = b - A x for the initial guess; q is scratch until the first step.
        let t = Instant::now();
        self.operator.apply(exec, x.as_view(), &mut ws.q.view_mut());
        dense_kernels::sub_assign(exec, &mut ws.r.view_mut(), ws.q.view());
        ws.q.fill(T::zero());
        record(&mut stats, Phase::Operator, t);

        let t = Instant::now();
        let (rhs_norms, initial_norms) = match (criteria.residual, criteria.baseline) {
            (ResidualKind::Explicit, _) | (ResidualKind::Implicit, Baseline::Absolute) => (
                dense_kernels::compute_norm2(exec, b),
                dense_kernels::compute_norm2(exec, ws.r.view()),
            ),
            // The baseline has to be in the norm being measured.
            (ResidualKind::Implicit, Baseline::RhsNorm) => {
                let rhs = self.preconditioned_norms(b, &mut ws.z, &mut ws.rho);
                (rhs, vec![0.0; cols])
            }
            (ResidualKind::Implicit, Baseline::InitialResidual) => {
                let initial = self.preconditioned_norms(ws.r.view(), &mut ws.z, &mut ws.rho);
                (vec![0.0; cols], initial)
            }
        };
        ws.z.fill(T::zero());
        ws.rho.fill(T::zero());
        let thresholds = criteria.thresholds(&rhs_norms, &initial_norms);
        record(&mut stats, Phase::Reduction, t);

        let mut iter = 0;
        loop {
            let t = Instant::now();
            self.preconditioner.apply(exec, ws.r.view(), &mut ws.z.view_mut());
            record(&mut stats, Phase::Preconditioner, t);

            let t = Instant::now();
            dense_kernels::compute_conj_dot(exec, ws.r.view(), ws.z.view(), &mut ws.rho);
            let measured = match criteria.residual {
                ResidualKind::Explicit => dense_kernels::compute_norm2(exec, ws.r.view()),
                ResidualKind::Implicit => ws
                    .rho
                    .as_slice()
                    .iter()
                    .map(|v| v.abs_val().sqrt())
                    .collect(),
            };
            record(&mut stats, Phase::Reduction, t);

            let outcome = criteria.check(&measured, &thresholds, &mut ws.stop);
            for &j in &outcome.converged {
                tracing::debug!(column = j, iteration = iter, residual = measured[j], "column converged");
            }
            for &j in &outcome.diverged {
                tracing::warn!(column = j, iteration = iter, "column diverged: non-finite residual");
            }
            tracing::trace!(iteration = iter, running = ws.stop.running_count(), "CG iteration");

            if ws.stop.all_stopped() || iter >= criteria.max_iterations {
                break;
            }

            let t = Instant::now();
            cg_kernels::step_1(
                exec,
                &mut ws.p.view_mut(),
                ws.z.view(),
                &ws.rho,
                &ws.prev_rho,
                &ws.stop,
            );
            record(&mut stats, Phase::DirectionUpdate, t);

            let t = Instant::now();
            self.operator.apply(exec, ws.p.view(), &mut ws.q.view_mut());
            record(&mut stats, Phase::Operator, t);

            let t = Instant::now();
            dense_kernels::compute_conj_dot(exec, ws.p.view(), ws.q.view(), &mut ws.beta);
            record(&mut stats, Phase::Reduction, t);

            let t = Instant::now();
            cg_kernels::step_2(
                exec,
                x,
                &mut ws.r.view_mut(),
                ws.p.view(),
                ws.q.view(),
                &ws.beta,
                &ws.rho,
                &ws.stop,
            );
            record(&mut stats, Phase::SolutionUpdate, t);

            let stalled = self.track_stalls(ws, iter);
            if let Some(s) = stats.as_deref_mut() {
                s.stalls += stalled;
            }

            std::mem::swap(&mut ws.prev_rho, &mut ws.rho);
            iter += 1;
        }

        let residual_norms = dense_kernels::compute_norm2(exec, ws.r.view());
        let verdict = if ws.stop.all_converged() {
            Verdict::Converged
        } else if ws.stop.all_stopped() {
            Verdict::Diverged
        } else {
            Verdict::Exhausted
        };
        if let Some(s) = stats.as_deref_mut() {
            s.iterations += iter;
            s.solves += 1;
        }
        tracing::info!(iterations = iter, verdict = ?verdict, "batched CG finished");

        Ok(CgReport {
            iterations: iter,
            statuses: ws.stop.statuses().to_vec(),
            residual_norms,
            verdict,
        })
    }

    /// `sqrt(|<v, M^{-1} v>|)` per column, the norm `ResidualKind::Implicit`
    /// measures. `z` and `dots` are scratch.
    fn preconditioned_norms<T>(&self, v: BlockView<'_, T>, z: &mut Block<T>, dots: &mut ScalarRow<T>) -> Vec<f64>
    where
        T: Scalar,
        P: Preconditioner<T>,
    {
        self.preconditioner.apply(&self.exec, v, &mut z.view_mut());
        dense_kernels::compute_conj_dot(&self.exec, v, z.view(), dots);
        dots.as_slice().iter().map(|d| d.abs_val().sqrt()).collect()
    }

    /// Count zero-length steps on running columns and mark a column
    /// diverged once it stalls `max_stalls` times in a row. Returns the
    /// number of columns that stalled this iteration.
    fn track_stalls<T: Scalar>(&self, ws: &mut CgWorkspace<T>, iter: usize) -> usize {
        let mut stalled = 0;
        for j in 0..ws.stop.cols() {
            if ws.stop.has_stopped(j) {
                continue;
            }
            if step_length(ws.rho.at(j), ws.beta.at(j)).is_nonzero() {
                ws.stalls[j] = 0;
                continue;
            }
            stalled += 1;
            ws.stalls[j] += 1;
            if ws.stalls[j] >= self.config.max_stalls {
                ws.stop.diverge(j);
                tracing::warn!(
                    column = j,
                    iteration = iter,
                    stalls = ws.stalls[j],
                    "CG breakdown: zero step length"
                );
            }
        }
        stalled
    }
}
