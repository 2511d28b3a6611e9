//! Compressed Sparse Row (CSR) matrix.
//!
//! The shared operator every column of a batched solve is multiplied by.
//! Generic over value type to support both real and complex systems.

use crate::dense::{BlockView, BlockViewMut};
use crate::scalar::Scalar;
use crate::solver::executor::{Executor, ExecutorKind};
use crate::solver::LinearOperator;
use rayon::prelude::*;

/// Sparse matrix in Compressed Sparse Row format.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    pub nrows: usize,
    pub ncols: usize,
    /// Non-zero values, stored row by row.
    pub values: Vec<T>,
    /// Column index for each non-zero value.
    pub col_indices: Vec<usize>,
    /// `row_pointers[i]` is the index into values/col_indices where row i starts.
    /// `row_pointers[nrows]` = total number of non-zeros.
    pub row_pointers: Vec<usize>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// Create an empty matrix with no non-zero entries.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_pointers: vec![0; nrows + 1],
        }
    }

    /// Identity matrix of size n.
    pub fn identity(n: usize) -> Self {
        let triplets: Vec<(usize, usize, T)> = (0..n).map(|i| (i, i, T::one())).collect();
        Self::from_triplets(n, n, &triplets)
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Build CSR matrix from (row, col, value) triplets.
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, T)]) -> Self {
        if triplets.is_empty() {
            return Self::new(nrows, ncols);
        }

        // Sort indices by (row, col) without requiring T: Ord
        let mut indices: Vec<usize> = (0..triplets.len()).collect();
        indices.sort_by_key(|&i| (triplets[i].0, triplets[i].1));

        let mut values = Vec::with_capacity(triplets.len());
        let mut col_indices = Vec::with_capacity(triplets.len());
        let mut row_pointers = vec![0usize; nrows + 1];

        let first = indices[0];
        let (mut cur_row, mut cur_col, mut cur_val) = triplets[first];

        for &idx in &indices[1..] {
            let (row, col, val) = triplets[idx];
            if row == cur_row && col == cur_col {
                cur_val += val;
            } else {
                values.push(cur_val);
                col_indices.push(cur_col);
                row_pointers[cur_row + 1] += 1;
                cur_row = row;
                cur_col = col;
                cur_val = val;
            }
        }
        values.push(cur_val);
        col_indices.push(cur_col);
        row_pointers[cur_row + 1] += 1;

        // Convert per-row counts to cumulative offsets
        for i in 1..=nrows {
            row_pointers[i] += row_pointers[i - 1];
        }

        Self {
            nrows,
            ncols,
            values,
            col_indices,
            row_pointers,
        }
    }

    /// Convert to dense matrix (row-major). For testing and small matrices only.
    pub fn to_dense(&self) -> Vec<Vec<T>> {
        let mut dense = vec![vec![T::zero(); self.ncols]; self.nrows];
        for (row, dense_row) in dense.iter_mut().enumerate() {
            for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
                dense_row[self.col_indices[idx]] = self.values[idx];
            }
        }
        dense
    }

    /// Main diagonal; missing entries are zero.
    pub fn diagonal(&self) -> Vec<T> {
        let n = self.nrows.min(self.ncols);
        let mut diag = vec![T::zero(); n];
        for (row, d) in diag.iter_mut().enumerate() {
            for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
                if self.col_indices[idx] == row {
                    *d = self.values[idx];
                }
            }
        }
        diag
    }

    /// Sparse matrix-vector multiply: y = A * x
    pub fn spmv(&self, x: &[T]) -> Vec<T> {
        assert_eq!(x.len(), self.ncols, "spmv dimension mismatch");
        let mut y = vec![T::zero(); self.nrows];
        for (row, y) in y.iter_mut().enumerate() {
            let mut sum = T::zero();
            for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *y = sum;
        }
        y
    }

    /// One output row of the block product: `y_row = sum_k A[row, k] * X[k, :]`.
    fn block_row(&self, row: usize, x: BlockView<'_, T>, y_row: &mut [T]) {
        y_row.fill(T::zero());
        for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
            let a = self.values[idx];
            let x_row = x.row(self.col_indices[idx]);
            for (y, &xv) in y_row.iter_mut().zip(x_row) {
                *y += a * xv;
            }
        }
    }
}

impl<T: Scalar> LinearOperator<T> for CsrMatrix<T> {
    fn size(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    fn apply(&self, exec: &Executor, x: BlockView<'_, T>, y: &mut BlockViewMut<'_, T>) {
        assert_eq!(x.rows(), self.ncols, "operator apply: x has {} rows, expected {}", x.rows(), self.ncols);
        assert_eq!(y.rows(), self.nrows, "operator apply: y has {} rows, expected {}", y.rows(), self.nrows);
        assert_eq!(x.cols(), y.cols(), "operator apply: column count mismatch");
        if y.is_empty() {
            return;
        }
        match exec.kind() {
            ExecutorKind::Parallel => exec.install(|| {
                y.par_rows_mut()
                    .enumerate()
                    .for_each(|(row, y_row)| self.block_row(row, x, y_row));
            }),
            _ => {
                for (row, y_row) in y.rows_mut().enumerate() {
                    self.block_row(row, x, y_row);
                }
            }
        }
    }
}

/// Tridiagonal `[-1, 2, -1]` matrix of size n (1-D Poisson problem).
pub fn laplacian_1d<T: Scalar>(n: usize) -> CsrMatrix<T> {
    let mut triplets = Vec::with_capacity(3 * n);
    for i in 0..n {
        triplets.push((i, i, T::from_f64(2.0)));
        if i > 0 {
            triplets.push((i, i - 1, T::from_f64(-1.0)));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, T::from_f64(-1.0)));
        }
    }
    CsrMatrix::from_triplets(n, n, &triplets)
}

/// Five-point Laplacian on a `k x k` grid (size `k * k`).
pub fn laplacian_2d<T: Scalar>(k: usize) -> CsrMatrix<T> {
    let n = k * k;
    let mut triplets = Vec::with_capacity(5 * n);
    for gy in 0..k {
        for gx in 0..k {
            let i = gy * k + gx;
            triplets.push((i, i, T::from_f64(4.0)));
            if gx > 0 {
                triplets.push((i, i - 1, T::from_f64(-1.0)));
            }
            if gx + 1 < k {
                triplets.push((i, i + 1, T::from_f64(-1.0)));
            }
            if gy > 0 {
                triplets.push((i, i - k, T::from_f64(-1.0)));
            }
            if gy + 1 < k {
                triplets.push((i, i + k, T::from_f64(-1.0)));
            }
        }
    }
    CsrMatrix::from_triplets(n, n, &triplets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::Block;
    use num_complex::Complex64;

    #[test]
    fn test_empty_matrix() {
        let m: CsrMatrix<f64> = CsrMatrix::new(3, 3);
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.row_pointers, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_from_triplets_duplicates_summed() {
        let triplets = vec![(0, 0, 1.0), (0, 0, 2.0), (1, 1, 3.0)];
        let m = CsrMatrix::from_triplets(2, 2, &triplets);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.to_dense(), vec![vec![3.0, 0.0], vec![0.0, 3.0]]);
    }

    #[test]
    fn test_spmv() {
        // [[2, 1], [0, 3]] * [1, 2] = [4, 6]
        let triplets = vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 3.0)];
        let m = CsrMatrix::from_triplets(2, 2, &triplets);
        assert_eq!(m.spmv(&[1.0, 2.0]), vec![4.0, 6.0]);
    }

    #[test]
    fn test_complex_spmv() {
        let i = Complex64::new(0.0, 1.0);
        let m = CsrMatrix::from_triplets(1, 1, &[(0, 0, i)]);
        assert_eq!(m.spmv(&[i]), vec![Complex64::new(-1.0, 0.0)]);
    }

    #[test]
    fn test_block_apply_matches_spmv_per_column() {
        let m: CsrMatrix<f64> = laplacian_1d(5);
        let cols = vec![
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![0.5, -1.0, 0.0, 2.0, 1.0],
        ];
        let x = Block::from_columns(&cols);
        for exec in [Executor::sequential(), Executor::parallel(), Executor::vectorized()] {
            let mut y = Block::zeros(5, 2);
            m.apply(&exec, x.view(), &mut y.view_mut());
            assert_eq!(y.column(0), m.spmv(&cols[0]));
            assert_eq!(y.column(1), m.spmv(&cols[1]));
        }
    }

    #[test]
    fn test_diagonal_and_identity() {
        let m: CsrMatrix<f64> = laplacian_2d(3);
        assert_eq!(m.diagonal(), vec![4.0; 9]);
        // corner has two neighbours, centre has four
        assert_eq!(m.row_pointers[1] - m.row_pointers[0], 3);
        assert_eq!(m.row_pointers[5] - m.row_pointers[4], 5);
        let id: CsrMatrix<f64> = CsrMatrix::identity(3);
        assert_eq!(id.spmv(&[1.0, 2.0, 3.0]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_missing_diagonal_is_zero() {
        let m = CsrMatrix::from_triplets(2, 2, &[(0, 1, 1.0), (1, 1, 2.0)]);
        assert_eq!(m.diagonal(), vec![0.0, 2.0]);
    }
}
