//! End-to-end tests for the batched CG kernels and solve loop.

use approx::assert_abs_diff_eq;
use batchcg::config::CgConfig;
use batchcg::dense::{Block, BlockView, BlockViewMut, ScalarRow};
use batchcg::output;
use batchcg::solver::cg::{Cg, Verdict};
use batchcg::solver::cg_kernels::{initialize, step_1, step_2};
use batchcg::solver::dense_kernels::{compute_conj_dot, compute_norm2};
use batchcg::solver::direct;
use batchcg::solver::executor::{Executor, ExecutorKind};
use batchcg::solver::preconditioner::Jacobi;
use batchcg::solver::LinearOperator;
use batchcg::sparse::{laplacian_1d, laplacian_2d, CsrMatrix};
use batchcg::stop::{StoppingMask, StoppingStatus};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Operator that applies `inner` and then zeroes one column of the result,
/// forcing `beta = 0` for that column on every iteration.
struct ZeroColumn<'a> {
    inner: &'a CsrMatrix<f64>,
    column: usize,
}

impl LinearOperator<f64> for ZeroColumn<'_> {
    fn size(&self) -> (usize, usize) {
        self.inner.size()
    }

    fn apply(&self, exec: &Executor, x: BlockView<'_, f64>, y: &mut BlockViewMut<'_, f64>) {
        self.inner.apply(exec, x, y);
        for i in 0..y.rows() {
            *y.at_mut(i, self.column) = 0.0;
        }
    }
}

fn random_block(rng: &mut StdRng, rows: usize, cols: usize) -> Block<f64> {
    let data = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Block::from_row_major(rows, cols, data)
}

/// Random coefficients with exact zeros and ones mixed in, so every branch
/// of the per-column plans is hit.
fn random_coefficients(rng: &mut StdRng, cols: usize) -> ScalarRow<f64> {
    let values = (0..cols)
        .map(|_| match rng.gen_range(0..5) {
            0 => 0.0,
            1 => 1.0,
            _ => rng.gen_range(0.5..2.0),
        })
        .collect();
    ScalarRow::from_vec(values)
}

fn random_mask(rng: &mut StdRng, cols: usize) -> StoppingMask {
    let mut mask = StoppingMask::new(cols);
    for j in 0..cols {
        if rng.gen_bool(0.3) {
            mask.converge(j);
        }
    }
    mask
}

#[test]
fn test_identity_four_by_two_one_iteration() {
    let exec = Executor::sequential();
    let (n, m) = (4, 2);
    let b = Block::from_row_major(4, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    let mut x: Block<f64> = Block::zeros(n, m);
    let mut r = Block::zeros(n, m);
    let mut z = Block::zeros(n, m);
    let mut p = Block::zeros(n, m);
    let mut q = Block::zeros(n, m);
    let mut prev_rho = ScalarRow::zeros(m);
    let mut rho = ScalarRow::zeros(m);
    let mut beta = ScalarRow::zeros(m);
    let mut stop = StoppingMask::new(m);
    stop.diverge(0);

    initialize(
        &exec,
        b.view(),
        &mut r.view_mut(),
        &mut z.view_mut(),
        &mut p.view_mut(),
        &mut q.view_mut(),
        &mut prev_rho,
        &mut rho,
        &mut stop,
    );
    assert_eq!(r, b);
    assert_eq!(prev_rho.as_slice(), &[1.0, 1.0]);
    assert_eq!(rho.as_slice(), &[0.0, 0.0]);
    assert_eq!(stop.running_count(), m);

    // z = M r with M = I, then rho = <r, z>.
    z.view_mut().copy_from(r.view());
    compute_conj_dot(&exec, r.view(), z.view(), &mut rho);

    step_1(&exec, &mut p.view_mut(), z.view(), &rho, &prev_rho, &stop);
    assert_eq!(p, z);

    // q = A p with A = I, then beta = <p, q>.
    q.view_mut().copy_from(p.view());
    compute_conj_dot(&exec, p.view(), q.view(), &mut beta);

    step_2(
        &exec,
        &mut x.view_mut(),
        &mut r.view_mut(),
        p.view(),
        q.view(),
        &beta,
        &rho,
        &stop,
    );

    for i in 0..n {
        for j in 0..m {
            assert_abs_diff_eq!(x.at(i, j), b.at(i, j), epsilon = 1e-12);
        }
    }
    let residual = compute_norm2(&exec, r.view());
    assert_eq!(residual.len(), m);
    for (j, norm) in residual.iter().enumerate() {
        assert!(*norm < 1e-12, "column {j} residual {norm}");
    }
}

#[test]
fn test_zero_beta_column_is_left_alone_by_step_2() {
    let exec = Executor::sequential();
    let mut rng = StdRng::seed_from_u64(7);
    let (n, m) = (6, 3);
    let p = random_block(&mut rng, n, m);
    let q = random_block(&mut rng, n, m);
    let x0 = random_block(&mut rng, n, m);
    let r0 = random_block(&mut rng, n, m);
    let rho = ScalarRow::from_vec(vec![0.7, 1.3, 2.1]);
    let beta = ScalarRow::from_vec(vec![1.9, 0.0, 0.4]);
    let stop = StoppingMask::new(m);

    let mut x = x0.clone();
    let mut r = r0.clone();
    step_2(&exec, &mut x.view_mut(), &mut r.view_mut(), p.view(), q.view(), &beta, &rho, &stop);

    assert_eq!(x.column(1), x0.column(1));
    assert_eq!(r.column(1), r0.column(1));

    // Each remaining column matches a standalone single-column update.
    for j in [0, 2] {
        let single = |blk: &Block<f64>| Block::from_columns(&[blk.column(j)]);
        let mut xs = single(&x0);
        let mut rs = single(&r0);
        step_2(
            &exec,
            &mut xs.view_mut(),
            &mut rs.view_mut(),
            single(&p).view(),
            single(&q).view(),
            &ScalarRow::from_vec(vec![beta.at(j)]),
            &ScalarRow::from_vec(vec![rho.at(j)]),
            &StoppingMask::new(1),
        );
        assert_eq!(xs.column(0), x.column(j));
        assert_eq!(rs.column(0), r.column(j));
    }
}

#[test]
fn test_breakdown_column_does_not_disturb_others() {
    let n = 16;
    let a = laplacian_1d::<f64>(n);
    let columns: Vec<Vec<f64>> = (0..3)
        .map(|j| (0..n).map(|i| 1.0 + ((i * (j + 2)) % 5) as f64).collect())
        .collect();
    let b = Block::from_columns(&columns);
    let config = CgConfig::default().with_tolerance(1e-12);

    let op = ZeroColumn { inner: &a, column: 1 };
    let mut x = Block::zeros(n, 3);
    let report = Cg::new(&op, config.clone())
        .unwrap()
        .apply(b.view(), &mut x.view_mut())
        .unwrap();

    assert_eq!(report.statuses[0], StoppingStatus::Converged);
    assert_eq!(report.statuses[1], StoppingStatus::Diverged);
    assert_eq!(report.statuses[2], StoppingStatus::Converged);
    assert_eq!(report.verdict, Verdict::Diverged);

    for j in [0, 2] {
        let bj = Block::from_columns(&[columns[j].clone()]);
        let mut xj = Block::zeros(n, 1);
        let single = Cg::new(&a, config.clone())
            .unwrap()
            .apply(bj.view(), &mut xj.view_mut())
            .unwrap();
        assert!(single.converged());
        assert_eq!(xj.column(0), x.column(j), "column {j} differs from standalone solve");
        assert_eq!(single.residual_norms[0], report.residual_norms[j]);
    }
}

#[test]
fn test_kernels_agree_across_executors_on_random_input() {
    let mut rng = StdRng::seed_from_u64(42);
    let (n, m) = (37, 19);
    let p0 = random_block(&mut rng, n, m);
    let z = random_block(&mut rng, n, m);
    let q = random_block(&mut rng, n, m);
    let x0 = random_block(&mut rng, n, m);
    let r0 = random_block(&mut rng, n, m);
    let rho = random_coefficients(&mut rng, m);
    let prev_rho = random_coefficients(&mut rng, m);
    let beta = random_coefficients(&mut rng, m);
    let stop = random_mask(&mut rng, m);

    let mut results = Vec::new();
    for kind in ExecutorKind::ALL {
        let exec = Executor::new(kind, None).unwrap();
        let mut p = p0.clone();
        let mut x = x0.clone();
        let mut r = r0.clone();
        step_1(&exec, &mut p.view_mut(), z.view(), &rho, &prev_rho, &stop);
        step_2(&exec, &mut x.view_mut(), &mut r.view_mut(), p.view(), q.view(), &beta, &rho, &stop);
        results.push((kind, p, x, r));
    }
    let (_, p_ref, x_ref, r_ref) = &results[0];
    for (kind, p, x, r) in &results[1..] {
        assert_eq!(p, p_ref, "{kind} step_1 differs");
        assert_eq!(x, x_ref, "{kind} step_2 x differs");
        assert_eq!(r, r_ref, "{kind} step_2 r differs");
    }
}

#[test]
fn test_cg_matches_sparse_lu_reference() {
    let a = laplacian_2d::<f64>(6);
    let n = a.nrows;
    let columns: Vec<Vec<f64>> = (0..3)
        .map(|j| (0..n).map(|i| ((i + j) % 4) as f64 - 1.5).collect())
        .collect();
    let b = Block::from_columns(&columns);
    let mut x = Block::zeros(n, 3);

    let cg = Cg::new(&a, CgConfig::default().with_tolerance(1e-13))
        .unwrap()
        .with_preconditioner(Jacobi::new(&a));
    let report = cg.apply(b.view(), &mut x.view_mut()).unwrap();
    assert!(report.converged(), "{report:?}");

    let reference = direct::solve_reference(&a, b.view()).unwrap();
    assert!(direct::max_deviation(x.view(), reference.view()) < 1e-8);
}

#[test]
fn test_report_csv_end_to_end() {
    let a = laplacian_1d::<f64>(10);
    let b = Block::from_columns(&[vec![1.0; 10], vec![0.0; 10]]);
    let mut x = Block::zeros(10, 2);
    let report = Cg::new(&a, CgConfig::default().with_executor(ExecutorKind::Parallel))
        .unwrap()
        .apply(b.view(), &mut x.view_mut())
        .unwrap();

    let mut buf = Vec::new();
    output::write_report_csv(&report, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("column,status,residual"));
    assert!(lines.next().unwrap().starts_with("0,converged,"));
    assert_eq!(lines.next(), Some("1,converged,0e0"));
    assert_eq!(lines.next(), None);
}

mod prop {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn stopped_columns_are_never_written(
            rows in 0usize..12,
            cols in 1usize..20,
            seed in any::<u64>(),
            kind_idx in 0usize..3,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let exec = Executor::new(ExecutorKind::ALL[kind_idx], None).unwrap();
            let p0 = random_block(&mut rng, rows, cols);
            let z = random_block(&mut rng, rows, cols);
            let q = random_block(&mut rng, rows, cols);
            let x0 = random_block(&mut rng, rows, cols);
            let r0 = random_block(&mut rng, rows, cols);
            let rho = random_coefficients(&mut rng, cols);
            let prev_rho = random_coefficients(&mut rng, cols);
            let beta = random_coefficients(&mut rng, cols);
            let stop = random_mask(&mut rng, cols);

            let mut p = p0.clone();
            let mut x = x0.clone();
            let mut r = r0.clone();
            step_1(&exec, &mut p.view_mut(), z.view(), &rho, &prev_rho, &stop);
            step_2(&exec, &mut x.view_mut(), &mut r.view_mut(), p.view(), q.view(), &beta, &rho, &stop);

            for j in 0..cols {
                if stop.has_stopped(j) {
                    prop_assert_eq!(p.column(j), p0.column(j));
                    prop_assert_eq!(x.column(j), x0.column(j));
                    prop_assert_eq!(r.column(j), r0.column(j));
                }
            }
        }
    }
}
