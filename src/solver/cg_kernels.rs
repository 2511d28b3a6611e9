//! Batched CG update kernels.
//!
//! Each kernel advances every running column of a block by one step of
//! the conjugate gradient recurrence. Work happens in two stages: the
//! per-column scalar (`rho / prev_rho` or `rho / beta`) is resolved into a
//! small plan first, then the plan is applied to the rows. Only the second
//! stage depends on the executor.
//!
//! Shape mismatches between the blocks of one call are caller bugs and
//! panic.

use crate::dense::{BlockView, BlockViewMut, ScalarRow};
use crate::scalar::Scalar;
use crate::stop::StoppingMask;

use super::executor::{Executor, ExecutorKind, LANES};

/// Ratio `rho / prev_rho` used by step 1, or zero when either operand is
/// zero. Zero means "restart the direction from `z`".
pub fn direction_scale<T: Scalar>(rho: T, prev_rho: T) -> T {
    let mut val = T::zero();
    if prev_rho.is_nonzero() && rho.is_nonzero() {
        val = rho / prev_rho;
    }
    val
}

/// Step length `rho / beta` used by step 2, or zero when either operand is
/// zero. Zero means the column does not move this iteration.
pub fn step_length<T: Scalar>(rho: T, beta: T) -> T {
    let mut val = T::zero();
    if rho.is_nonzero() && beta.is_nonzero() {
        val = rho / beta;
    }
    val
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DirectionStep<T> {
    Frozen,
    Restart,
    Accumulate,
    Scale(T),
}

impl<T: Scalar> DirectionStep<T> {
    fn resolve(rho: T, prev_rho: T, stopped: bool) -> Self {
        if stopped {
            return DirectionStep::Frozen;
        }
        let val = direction_scale(rho, prev_rho);
        if val.is_zero() {
            DirectionStep::Restart
        } else if val == T::one() {
            DirectionStep::Accumulate
        } else {
            DirectionStep::Scale(val)
        }
    }

    #[inline(always)]
    fn apply(self, p: &mut T, z: T) {
        match self {
            DirectionStep::Frozen => {}
            DirectionStep::Restart => *p = z,
            DirectionStep::Accumulate => *p += z,
            DirectionStep::Scale(val) => *p = z + val * *p,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SolutionStep<T> {
    Skip,
    Unit,
    Scale(T),
}

impl<T: Scalar> SolutionStep<T> {
    fn resolve(rho: T, beta: T, stopped: bool) -> Self {
        if stopped {
            return SolutionStep::Skip;
        }
        let val = step_length(rho, beta);
        if val.is_zero() {
            SolutionStep::Skip
        } else if val == T::one() {
            SolutionStep::Unit
        } else {
            SolutionStep::Scale(val)
        }
    }

    #[inline(always)]
    fn apply(self, x: &mut T, r: &mut T, p: T, q: T) {
        match self {
            SolutionStep::Skip => {}
            SolutionStep::Unit => {
                *x += p;
                *r -= q;
            }
            SolutionStep::Scale(val) => {
                *x += val * p;
                *r -= val * q;
            }
        }
    }
}

/// A `LANES`-wide group of columns. Uniform groups carry a single
/// branch-free loop body; anything else falls back to per-lane dispatch.
#[derive(Debug, Clone, Copy)]
enum DirectionTile<T> {
    Frozen,
    Restart,
    Accumulate,
    Scale([T; LANES]),
    Mixed,
}

#[derive(Debug, Clone, Copy)]
enum SolutionTile<T> {
    Skip,
    Unit,
    Scale([T; LANES]),
    Mixed,
}

fn direction_tiles<T: Scalar>(plan: &[DirectionStep<T>]) -> Vec<DirectionTile<T>> {
    plan.chunks_exact(LANES)
        .map(|steps| {
            let first = steps[0];
            match first {
                DirectionStep::Scale(_) => {
                    let mut vals = [T::zero(); LANES];
                    for (v, step) in vals.iter_mut().zip(steps) {
                        match step {
                            DirectionStep::Scale(s) => *v = *s,
                            _ => return DirectionTile::Mixed,
                        }
                    }
                    DirectionTile::Scale(vals)
                }
                _ if steps.iter().any(|s| *s != first) => DirectionTile::Mixed,
                DirectionStep::Frozen => DirectionTile::Frozen,
                DirectionStep::Restart => DirectionTile::Restart,
                DirectionStep::Accumulate => DirectionTile::Accumulate,
            }
        })
        .collect()
}

fn solution_tiles<T: Scalar>(plan: &[SolutionStep<T>]) -> Vec<SolutionTile<T>> {
    plan.chunks_exact(LANES)
        .map(|steps| {
            let first = steps[0];
            match first {
                SolutionStep::Scale(_) => {
                    let mut vals = [T::zero(); LANES];
                    for (v, step) in vals.iter_mut().zip(steps) {
                        match step {
                            SolutionStep::Scale(s) => *v = *s,
                            _ => return SolutionTile::Mixed,
                        }
                    }
                    SolutionTile::Scale(vals)
                }
                _ if steps.iter().any(|s| *s != first) => SolutionTile::Mixed,
                SolutionStep::Skip => SolutionTile::Skip,
                SolutionStep::Unit => SolutionTile::Unit,
            }
        })
        .collect()
}

fn direction_row<T: Scalar>(plan: &[DirectionStep<T>], p: &mut [T], z: &[T]) {
    for ((step, p), &z) in plan.iter().zip(p.iter_mut()).zip(z) {
        step.apply(p, z);
    }
}

fn solution_row<T: Scalar>(plan: &[SolutionStep<T>], x: &mut [T], r: &mut [T], p: &[T], q: &[T]) {
    for ((((step, x), r), &p), &q) in plan
        .iter()
        .zip(x.iter_mut())
        .zip(r.iter_mut())
        .zip(p)
        .zip(q)
    {
        step.apply(x, r, p, q);
    }
}

#[allow(clippy::needless_range_loop)]
fn direction_row_tiled<T: Scalar>(
    plan: &[DirectionStep<T>],
    tiles: &[DirectionTile<T>],
    p: &mut [T],
    z: &[T],
) {
    let body = tiles.len() * LANES;
    for (t, tile) in tiles.iter().enumerate() {
        let cols = t * LANES..(t + 1) * LANES;
        let (p, z) = (&mut p[cols.clone()], &z[cols.clone()]);
        match tile {
            DirectionTile::Frozen => {}
            DirectionTile::Restart => p.copy_from_slice(z),
            DirectionTile::Accumulate => {
                for l in 0..LANES {
                    p[l] += z[l];
                }
            }
            DirectionTile::Scale(vals) => {
                for l in 0..LANES {
                    p[l] = z[l] + vals[l] * p[l];
                }
            }
            DirectionTile::Mixed => direction_row(&plan[cols], p, z),
        }
    }
    direction_row(&plan[body..], &mut p[body..], &z[body..]);
}

#[allow(clippy::needless_range_loop)]
fn solution_row_tiled<T: Scalar>(
    plan: &[SolutionStep<T>],
    tiles: &[SolutionTile<T>],
    x: &mut [T],
    r: &mut [T],
    p: &[T],
    q: &[T],
) {
    let body = tiles.len() * LANES;
    for (t, tile) in tiles.iter().enumerate() {
        let cols = t * LANES..(t + 1) * LANES;
        let (x, r) = (&mut x[cols.clone()], &mut r[cols.clone()]);
        let (p, q) = (&p[cols.clone()], &q[cols.clone()]);
        match tile {
            SolutionTile::Skip => {}
            SolutionTile::Unit => {
                for l in 0..LANES {
                    x[l] += p[l];
                    r[l] -= q[l];
                }
            }
            SolutionTile::Scale(vals) => {
                for l in 0..LANES {
                    x[l] += vals[l] * p[l];
                    r[l] -= vals[l] * q[l];
                }
            }
            SolutionTile::Mixed => solution_row(&plan[cols], x, r, p, q),
        }
    }
    solution_row(&plan[body..], &mut x[body..], &mut r[body..], &p[body..], &q[body..]);
}

fn assert_shape(name: &str, got: (usize, usize), want: (usize, usize)) {
    assert_eq!(got, want, "{name} is {got:?}, expected {want:?}");
}

fn assert_width(name: &str, got: usize, want: usize) {
    assert_eq!(got, want, "{name} has {got} columns, expected {want}");
}

/// Establish the CG starting state.
///
/// Sets `r = b`, zeroes `z`, `p` and `q`, sets `rho = 0` and
/// `prev_rho = 1` for every column and resets the stopping mask. With
/// `prev_rho = 1` the first `step_1` resolves to a restart, so `p = z`
/// falls out of the general recurrence.
#[allow(clippy::too_many_arguments)]
pub fn initialize<T: Scalar>(
    exec: &Executor,
    b: BlockView<'_, T>,
    r: &mut BlockViewMut<'_, T>,
    z: &mut BlockViewMut<'_, T>,
    p: &mut BlockViewMut<'_, T>,
    q: &mut BlockViewMut<'_, T>,
    prev_rho: &mut ScalarRow<T>,
    rho: &mut ScalarRow<T>,
    stop: &mut StoppingMask,
) {
    let shape = b.shape();
    assert_shape("r", r.shape(), shape);
    assert_shape("z", z.shape(), shape);
    assert_shape("p", p.shape(), shape);
    assert_shape("q", q.shape(), shape);
    assert_width("rho", rho.cols(), shape.1);
    assert_width("prev_rho", prev_rho.cols(), shape.1);
    assert_width("stopping mask", stop.cols(), shape.1);

    rho.fill(T::zero());
    prev_rho.fill(T::one());
    stop.reset();

    if b.is_empty() {
        return;
    }

    match exec.kind() {
        ExecutorKind::Sequential => {
            for j in 0..shape.1 {
                for i in 0..shape.0 {
                    *r.at_mut(i, j) = b.at(i, j);
                    *z.at_mut(i, j) = T::zero();
                    *p.at_mut(i, j) = T::zero();
                    *q.at_mut(i, j) = T::zero();
                }
            }
        }
        ExecutorKind::Parallel => {
            use rayon::prelude::*;
            exec.install(|| {
                r.par_rows_mut()
                    .zip(z.par_rows_mut())
                    .zip(p.par_rows_mut())
                    .zip(q.par_rows_mut())
                    .zip(b.par_rows())
                    .for_each(|((((r, z), p), q), b)| {
                        r.copy_from_slice(b);
                        z.fill(T::zero());
                        p.fill(T::zero());
                        q.fill(T::zero());
                    });
            });
        }
        ExecutorKind::Vectorized => {
            r.copy_from(b);
            z.fill(T::zero());
            p.fill(T::zero());
            q.fill(T::zero());
        }
    }
}

/// Step 1: update the search direction.
///
/// For every running column `j`, with `val = rho[j] / prev_rho[j]`
/// (zero if either is zero):
/// - `val == 0`: `p = z`
/// - `val == 1`: `p += z`
/// - otherwise: `p = z + val * p`
///
/// Stopped columns are not touched.
pub fn step_1<T: Scalar>(
    exec: &Executor,
    p: &mut BlockViewMut<'_, T>,
    z: BlockView<'_, T>,
    rho: &ScalarRow<T>,
    prev_rho: &ScalarRow<T>,
    stop: &StoppingMask,
) {
    let shape = p.shape();
    assert_shape("z", z.shape(), shape);
    assert_width("rho", rho.cols(), shape.1);
    assert_width("prev_rho", prev_rho.cols(), shape.1);
    assert_width("stopping mask", stop.cols(), shape.1);

    let plan: Vec<DirectionStep<T>> = (0..shape.1)
        .map(|j| DirectionStep::resolve(rho.at(j), prev_rho.at(j), stop.has_stopped(j)))
        .collect();
    if p.is_empty() || plan.iter().all(|s| *s == DirectionStep::Frozen) {
        return;
    }

    match exec.kind() {
        ExecutorKind::Sequential => {
            for (j, step) in plan.iter().enumerate() {
                if let DirectionStep::Frozen = step {
                    continue;
                }
                for i in 0..shape.0 {
                    step.apply(p.at_mut(i, j), z.at(i, j));
                }
            }
        }
        ExecutorKind::Parallel => {
            use rayon::prelude::*;
            let plan = &plan;
            exec.install(|| {
                p.par_rows_mut()
                    .zip(z.par_rows())
                    .for_each(|(p, z)| direction_row(plan, p, z));
            });
        }
        ExecutorKind::Vectorized => {
            let tiles = direction_tiles(&plan);
            for (p, z) in p.rows_mut().zip(z.row_iter()) {
                direction_row_tiled(&plan, &tiles, p, z);
            }
        }
    }
}

/// Step 2: advance the solution and the residual.
///
/// For every running column `j`, with `val = rho[j] / beta[j]` (zero if
/// either is zero):
/// - `val == 0`: nothing changes; the column stalls this iteration
/// - `val == 1`: `x += p`, `r -= q`
/// - otherwise: `x += val * p`, `r -= val * q`
///
/// Stopped columns are not touched. A stall is never reported here; the
/// solve loop decides what repeated stalls mean.
#[allow(clippy::too_many_arguments)]
pub fn step_2<T: Scalar>(
    exec: &Executor,
    x: &mut BlockViewMut<'_, T>,
    r: &mut BlockViewMut<'_, T>,
    p: BlockView<'_, T>,
    q: BlockView<'_, T>,
    beta: &ScalarRow<T>,
    rho: &ScalarRow<T>,
    stop: &StoppingMask,
) {
    let shape = x.shape();
    assert_shape("r", r.shape(), shape);
    assert_shape("p", p.shape(), shape);
    assert_shape("q", q.shape(), shape);
    assert_width("beta", beta.cols(), shape.1);
    assert_width("rho", rho.cols(), shape.1);
    assert_width("stopping mask", stop.cols(), shape.1);

    let plan: Vec<SolutionStep<T>> = (0..shape.1)
        .map(|j| SolutionStep::resolve(rho.at(j), beta.at(j), stop.has_stopped(j)))
        .collect();
    if x.is_empty() || plan.iter().all(|s| *s == SolutionStep::Skip) {
        return;
    }

    match exec.kind() {
        ExecutorKind::Sequential => {
            for (j, step) in plan.iter().enumerate() {
                if let SolutionStep::Skip = step {
                    continue;
                }
                for i in 0..shape.0 {
                    let (pv, qv) = (p.at(i, j), q.at(i, j));
                    let mut xv = x.at(i, j);
                    let mut rv = r.at(i, j);
                    step.apply(&mut xv, &mut rv, pv, qv);
                    *x.at_mut(i, j) = xv;
                    *r.at_mut(i, j) = rv;
                }
            }
        }
        ExecutorKind::Parallel => {
            use rayon::prelude::*;
            let plan = &plan;
            exec.install(|| {
                x.par_rows_mut()
                    .zip(r.par_rows_mut())
                    .zip(p.par_rows())
                    .zip(q.par_rows())
                    .for_each(|(((x, r), p), q)| solution_row(plan, x, r, p, q));
            });
        }
        ExecutorKind::Vectorized => {
            let tiles = solution_tiles(&plan);
            for (((x, r), p), q) in x
                .rows_mut()
                .zip(r.rows_mut())
                .zip(p.row_iter())
                .zip(q.row_iter())
            {
                solution_row_tiled(&plan, &tiles, x, r, p, q);
            }
        }
    }
}
