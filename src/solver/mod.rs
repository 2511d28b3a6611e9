//! Batched CG solver: kernels, execution contexts and the solve loop.

pub mod cg;
pub mod cg_kernels;
pub mod criteria;
pub mod dense_kernels;
pub mod direct;
pub mod executor;
pub mod preconditioner;

use crate::dense::{BlockView, BlockViewMut};
use crate::scalar::Scalar;

use self::executor::Executor;

/// A linear operator applied to every column of a block: `Y = A X`.
pub trait LinearOperator<T: Scalar>: Sync {
    /// `(rows, cols)` of the operator.
    fn size(&self) -> (usize, usize);

    /// Overwrite `y` with `A x`.
    fn apply(&self, exec: &Executor, x: BlockView<'_, T>, y: &mut BlockViewMut<'_, T>);
}

impl<T: Scalar, A: LinearOperator<T> + ?Sized> LinearOperator<T> for &A {
    fn size(&self) -> (usize, usize) {
        (**self).size()
    }

    fn apply(&self, exec: &Executor, x: BlockView<'_, T>, y: &mut BlockViewMut<'_, T>) {
        (**self).apply(exec, x, y)
    }
}
