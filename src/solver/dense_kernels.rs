//! Column-wise reductions and elementwise helpers used by the solve loop.
//!
//! Every column is reduced over its rows in index order on every
//! executor, so results do not depend on the traversal.

use crate::dense::{BlockView, BlockViewMut, ScalarRow};
use crate::scalar::Scalar;
use rayon::prelude::*;

use super::executor::{Executor, ExecutorKind};

fn conj_dot_column<T: Scalar>(a: BlockView<'_, T>, b: BlockView<'_, T>, j: usize) -> T {
    let mut acc = T::zero();
    for i in 0..a.rows() {
        acc += a.at(i, j).conj() * b.at(i, j);
    }
    acc
}

fn norm2_column<T: Scalar>(a: BlockView<'_, T>, j: usize) -> f64 {
    let mut acc = 0.0f64;
    for i in 0..a.rows() {
        let v = a.at(i, j).abs_val();
        acc += v * v;
    }
    acc.sqrt()
}

/// `out[j] = sum_i conj(a[i, j]) * b[i, j]`.
pub fn compute_conj_dot<T: Scalar>(
    exec: &Executor,
    a: BlockView<'_, T>,
    b: BlockView<'_, T>,
    out: &mut ScalarRow<T>,
) {
    assert_eq!(a.shape(), b.shape(), "conj_dot shape mismatch");
    assert_eq!(out.cols(), a.cols(), "conj_dot output width mismatch");

    match exec.kind() {
        ExecutorKind::Sequential => {
            for (j, o) in out.as_mut_slice().iter_mut().enumerate() {
                *o = conj_dot_column(a, b, j);
            }
        }
        ExecutorKind::Parallel => exec.install(|| {
            out.as_mut_slice()
                .par_iter_mut()
                .enumerate()
                .for_each(|(j, o)| *o = conj_dot_column(a, b, j));
        }),
        ExecutorKind::Vectorized => {
            let acc = out.as_mut_slice();
            acc.fill(T::zero());
            for (a_row, b_row) in a.row_iter().zip(b.row_iter()) {
                for ((o, &av), &bv) in acc.iter_mut().zip(a_row).zip(b_row) {
                    *o += av.conj() * bv;
                }
            }
        }
    }
}

/// Euclidean norm of every column.
pub fn compute_norm2<T: Scalar>(exec: &Executor, a: BlockView<'_, T>) -> Vec<f64> {
    match exec.kind() {
        ExecutorKind::Sequential => (0..a.cols()).map(|j| norm2_column(a, j)).collect(),
        ExecutorKind::Parallel => exec.install(|| {
            (0..a.cols())
                .into_par_iter()
                .map(|j| norm2_column(a, j))
                .collect()
        }),
        ExecutorKind::Vectorized => {
            let mut acc = vec![0.0f64; a.cols()];
            for row in a.row_iter() {
                for (o, &v) in acc.iter_mut().zip(row) {
                    let m = v.abs_val();
                    *o += m * m;
                }
            }
            acc.iter_mut().for_each(|v| *v = v.sqrt());
            acc
        }
    }
}

/// `a -= b`, elementwise.
pub fn sub_assign<T: Scalar>(exec: &Executor, a: &mut BlockViewMut<'_, T>, b: BlockView<'_, T>) {
    assert_eq!(a.shape(), b.shape(), "sub_assign shape mismatch");
    if a.is_empty() {
        return;
    }
    match exec.kind() {
        ExecutorKind::Parallel => exec.install(|| {
            a.par_rows_mut().zip(b.par_rows()).for_each(|(a, b)| {
                for (a, &b) in a.iter_mut().zip(b) {
                    *a -= b;
                }
            });
        }),
        _ => {
            for (a, b) in a.rows_mut().zip(b.row_iter()) {
                for (a, &b) in a.iter_mut().zip(b) {
                    *a -= b;
                }
            }
        }
    }
}

/// `dst = src`.
pub fn copy<T: Scalar>(exec: &Executor, src: BlockView<'_, T>, dst: &mut BlockViewMut<'_, T>) {
    assert_eq!(src.shape(), dst.shape(), "copy shape mismatch");
    if src.is_empty() {
        return;
    }
    match exec.kind() {
        ExecutorKind::Parallel => exec.install(|| {
            dst.par_rows_mut()
                .zip(src.par_rows())
                .for_each(|(d, s)| d.copy_from_slice(s));
        }),
        _ => dst.copy_from(src),
    }
}
