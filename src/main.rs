use batchcg::config::CgConfig;
use batchcg::dense::Block;
use batchcg::output;
use batchcg::solver::cg::{Cg, CgReport, Verdict};
use batchcg::solver::criteria::{Baseline, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use batchcg::solver::direct;
use batchcg::solver::executor::ExecutorKind;
use batchcg::solver::preconditioner::{Jacobi, Preconditioner};
use batchcg::sparse::{laplacian_1d, laplacian_2d, CsrMatrix};
use batchcg::stats::Stats;
use clap::{Parser, ValueEnum};
use std::io;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Problem {
    /// 1-D Dirichlet Laplacian, `size` unknowns
    Laplace1d,
    /// 2-D 5-point Laplacian on a `size` x `size` grid
    Laplace2d,
}

/// Batched conjugate gradient solver for multiple right-hand sides
#[derive(Parser)]
#[command(name = "batchcg", version)]
struct Cli {
    /// Problem dimension (unknowns for laplace1d, grid side for laplace2d)
    #[arg(long, default_value_t = 64)]
    size: usize,

    /// Number of right-hand sides solved together
    #[arg(long, default_value_t = 4)]
    rhs: usize,

    #[arg(long, value_enum, default_value_t = Problem::Laplace1d)]
    problem: Problem,

    /// Execution backend: sequential, parallel or vectorized
    #[arg(long, default_value_t = ExecutorKind::Sequential)]
    executor: ExecutorKind,

    /// Worker threads for the parallel backend
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    tolerance: f64,

    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Tolerance scale: absolute, rhs or initial
    #[arg(long, default_value_t = Baseline::RhsNorm)]
    baseline: Baseline,

    /// Use a Jacobi preconditioner
    #[arg(long)]
    jacobi: bool,

    /// Compare against a sparse LU reference solve
    #[arg(long)]
    verify: bool,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,
}

fn build_problem(problem: Problem, size: usize) -> CsrMatrix<f64> {
    match problem {
        Problem::Laplace1d => laplacian_1d(size),
        Problem::Laplace2d => laplacian_2d(size),
    }
}

/// Deterministic right-hand sides, distinct per column.
fn build_rhs(n: usize, m: usize) -> Block<f64> {
    let mut b = Block::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            *b.at_mut(i, j) = 1.0 + ((i + 3 * j) % 7) as f64;
        }
    }
    b
}

fn solve<P: Preconditioner<f64>>(
    cg: &Cg<&CsrMatrix<f64>, P>,
    b: &Block<f64>,
    x: &mut Block<f64>,
    stats: Option<&mut Stats>,
) -> CgReport {
    cg.apply_with_stats(b.view(), &mut x.view_mut(), stats)
        .unwrap_or_else(|e| {
            eprintln!("Solve error: {}", e);
            std::process::exit(1);
        })
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut stats = if cli.stats { Some(Stats::new()) } else { None };

    let mut config = CgConfig::default()
        .with_tolerance(cli.tolerance)
        .with_max_iterations(cli.max_iterations)
        .with_baseline(cli.baseline)
        .with_executor(cli.executor);
    if let Some(threads) = cli.threads {
        config = config.with_threads(threads);
    }

    let a = build_problem(cli.problem, cli.size);
    let n = a.nrows;
    let b = build_rhs(n, cli.rhs);
    let mut x = Block::zeros(n, cli.rhs);

    let cg = Cg::new(&a, config).unwrap_or_else(|e| {
        eprintln!("Config error: {}", e);
        std::process::exit(1);
    });

    let backend = cg.executor().kind();
    let report = if cli.jacobi {
        let cg = cg.with_preconditioner(Jacobi::new(&a));
        solve(&cg, &b, &mut x, stats.as_mut())
    } else {
        solve(&cg, &b, &mut x, stats.as_mut())
    };

    let mut stdout = io::stdout();
    output::write_report_csv(&report, &mut stdout).unwrap_or_else(|e| {
        eprintln!("Output error: {}", e);
        std::process::exit(1);
    });

    eprintln!(
        "{} after {} iterations ({} x {}, {} backend)",
        match report.verdict {
            Verdict::Converged => "converged",
            Verdict::Diverged => "diverged",
            Verdict::Exhausted => "iteration budget exhausted",
        },
        report.iterations,
        n,
        cli.rhs,
        backend
    );

    if cli.verify {
        let reference = direct::solve_reference(&a, b.view()).unwrap_or_else(|e| {
            eprintln!("Reference solve error: {}", e);
            std::process::exit(1);
        });
        let deviation = direct::max_deviation(x.view(), reference.view());
        eprintln!("max deviation from sparse LU: {:e}", deviation);
    }

    if let Some(ref stats) = stats {
        stats.display();
    }
}
