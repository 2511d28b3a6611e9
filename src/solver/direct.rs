//! Reference solutions via sparse LU factorization.
//!
//! Used to check iterative results (`--verify`), not inside the CG loop.

use crate::dense::{Block, BlockView};
use crate::error::{BatchCgError, Result};
use crate::sparse::CsrMatrix;
use faer::prelude::*;
use faer::sparse::{SparseColMat, Triplet};

/// Solve `A X = B` for every column of `b` with one sparse LU factorization.
pub fn solve_reference(a: &CsrMatrix<f64>, b: BlockView<'_, f64>) -> Result<Block<f64>> {
    let n = a.nrows;
    if a.ncols != n || b.rows() != n {
        return Err(BatchCgError::Shape(format!(
            "dimension mismatch: matrix is {}x{}, rhs has {} rows",
            a.nrows,
            a.ncols,
            b.rows()
        )));
    }
    let m = b.cols();
    if n == 0 || m == 0 {
        return Ok(Block::zeros(n, m));
    }

    let mut triplets = Vec::with_capacity(a.values.len());
    for row in 0..n {
        for idx in a.row_pointers[row]..a.row_pointers[row + 1] {
            let val = a.values[idx];
            if !val.is_finite() {
                return Err(BatchCgError::Solve(
                    "sparse LU input contains NaN/Inf".into(),
                ));
            }
            triplets.push(Triplet::new(row, a.col_indices[idx], val));
        }
    }

    let a_sp = SparseColMat::<usize, f64>::try_new_from_triplets(n, n, &triplets)
        .map_err(|e| BatchCgError::Solve(format!("sparse matrix build failed: {e:?}")))?;

    let lu = a_sp
        .sp_lu()
        .map_err(|e| BatchCgError::Solve(format!("sparse LU factorization failed: {e:?}")))?;

    let rhs = faer::Mat::<f64>::from_fn(n, m, |i, j| b.at(i, j));
    let x = lu.solve(rhs);

    let mut out = Block::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            let xij = x[(i, j)];
            if !xij.is_finite() {
                return Err(BatchCgError::Solve(
                    "sparse LU produced NaN/Inf solution".into(),
                ));
            }
            *out.at_mut(i, j) = xij;
        }
    }

    Ok(out)
}

/// Largest absolute entrywise difference between two blocks of equal shape.
pub fn max_deviation(a: BlockView<'_, f64>, b: BlockView<'_, f64>) -> f64 {
    assert_eq!(a.shape(), b.shape(), "max_deviation shape mismatch");
    a.row_iter()
        .zip(b.row_iter())
        .flat_map(|(ra, rb)| ra.iter().zip(rb).map(|(x, y)| (x - y).abs()))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::laplacian_1d;

    #[test]
    fn sparse_lu_solves_known_2x2() {
        let a = CsrMatrix::from_triplets(
            2,
            2,
            &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 5.0), (1, 1, 7.0)],
        );
        let b = Block::from_columns(&[vec![11.0, 13.0], vec![2.0, 5.0]]);
        let x = solve_reference(&a, b.view()).expect("sparse LU should solve");
        assert!((x.at(0, 0) - 64.0 / 9.0).abs() < 1e-10);
        assert!((x.at(1, 0) + 29.0 / 9.0).abs() < 1e-10);
        assert!((x.at(0, 1) - 1.0).abs() < 1e-10);
        assert!(x.at(1, 1).abs() < 1e-10);
    }

    #[test]
    fn sparse_lu_reports_singular() {
        let a = CsrMatrix::from_triplets(2, 2, &[(0, 0, 1.0), (1, 0, 1.0)]);
        let b = Block::from_columns(&[vec![1.0, 1.0]]);
        let err = solve_reference(&a, b.view()).expect_err("matrix should be singular");
        assert!(format!("{err}").contains("Solve error"));
    }

    #[test]
    fn dimension_mismatch_is_shape_error() {
        let a = laplacian_1d::<f64>(3);
        let b: Block<f64> = Block::zeros(4, 1);
        let err = solve_reference(&a, b.view()).unwrap_err();
        assert!(err.to_string().contains("Shape error"));
    }

    #[test]
    fn max_deviation_of_blocks() {
        let a = Block::from_columns(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = Block::from_columns(&[vec![1.0, 2.5], vec![2.0, 4.0]]);
        assert_eq!(max_deviation(a.view(), b.view()), 1.0);
        assert_eq!(max_deviation(a.view(), a.view()), 0.0);
    }
}
