//! Preconditioners applied to the residual block: `z = M^{-1} r`.

use crate::dense::{BlockView, BlockViewMut};
use crate::scalar::Scalar;
use crate::sparse::CsrMatrix;
use rayon::prelude::*;

use super::dense_kernels;
use super::executor::{Executor, ExecutorKind};

/// Application of `M^{-1}` to every column of a block.
pub trait Preconditioner<T: Scalar>: Sync {
    fn apply(&self, exec: &Executor, r: BlockView<'_, T>, z: &mut BlockViewMut<'_, T>);
}

/// `M = I`; the preconditioned residual is the residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl<T: Scalar> Preconditioner<T> for Identity {
    fn apply(&self, exec: &Executor, r: BlockView<'_, T>, z: &mut BlockViewMut<'_, T>) {
        dense_kernels::copy(exec, r, z);
    }
}

/// Diagonal (Jacobi) preconditioner: `z[i, :] = r[i, :] / A[i, i]`.
#[derive(Debug, Clone)]
pub struct Jacobi<T> {
    inv_diag: Vec<T>,
}

impl<T: Scalar> Jacobi<T> {
    /// Rows with a zero diagonal entry are passed through unscaled.
    pub fn new(a: &CsrMatrix<T>) -> Self {
        let inv_diag = a
            .diagonal()
            .into_iter()
            .map(|d| if d.is_zero() { T::one() } else { T::one() / d })
            .collect();
        Self { inv_diag }
    }

    pub fn inv_diag(&self) -> &[T] {
        &self.inv_diag
    }
}

impl<T: Scalar> Preconditioner<T> for Jacobi<T> {
    fn apply(&self, exec: &Executor, r: BlockView<'_, T>, z: &mut BlockViewMut<'_, T>) {
        assert_eq!(r.shape(), z.shape(), "preconditioner shape mismatch");
        assert_eq!(r.rows(), self.inv_diag.len(), "preconditioner size mismatch");
        if r.is_empty() {
            return;
        }
        match exec.kind() {
            ExecutorKind::Parallel => exec.install(|| {
                self.inv_diag
                    .par_iter()
                    .zip(z.par_rows_mut().zip(r.par_rows()))
                    .for_each(|(&d, (z, r))| scale_row(d, z, r));
            }),
            _ => {
                for (&d, (z, r)) in self.inv_diag.iter().zip(z.rows_mut().zip(r.row_iter())) {
                    scale_row(d, z, r);
                }
            }
        }
    }
}

fn scale_row<T: Scalar>(d: T, z: &mut [T], r: &[T]) {
    for (z, &r) in z.iter_mut().zip(r) {
        *z = d * r;
    }
}
