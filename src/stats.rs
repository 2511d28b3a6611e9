//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Solve phase a duration is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Preconditioner,
    Reduction,
    DirectionUpdate,
    Operator,
    SolutionUpdate,
}

/// Collects performance counters and phase timings.
///
/// Created when `--stats` is passed, threaded as `Option<&mut Stats>`.
/// Zero cost when `None`: no counter increments, no accumulation.
pub struct Stats {
    total_start: Instant,
    pub initialize: Duration,
    pub preconditioner: Duration,
    pub reduction: Duration,
    pub direction_update: Duration,
    pub operator: Duration,
    pub solution_update: Duration,
    pub iterations: usize,
    /// Zero-length steps observed on running columns.
    pub stalls: usize,
    pub solves: usize,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            initialize: Duration::ZERO,
            preconditioner: Duration::ZERO,
            reduction: Duration::ZERO,
            direction_update: Duration::ZERO,
            operator: Duration::ZERO,
            solution_update: Duration::ZERO,
            iterations: 0,
            stalls: 0,
            solves: 0,
        }
    }

    /// Charge the time elapsed since `start` to `phase`.
    pub fn add(&mut self, phase: Phase, start: Instant) {
        let elapsed = start.elapsed();
        let slot = match phase {
            Phase::Initialize => &mut self.initialize,
            Phase::Preconditioner => &mut self.preconditioner,
            Phase::Reduction => &mut self.reduction,
            Phase::DirectionUpdate => &mut self.direction_update,
            Phase::Operator => &mut self.operator,
            Phase::SolutionUpdate => &mut self.solution_update,
        };
        *slot += elapsed;
    }

    pub fn kernel_time(&self) -> Duration {
        self.initialize + self.direction_update + self.solution_update
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== batchcg Performance Stats ===");
        eprintln!("  Solves:                 {}", self.solves);
        eprintln!("  Iterations:             {}", self.iterations);
        eprintln!("  Stalled steps:          {}", self.stalls);
        eprintln!("  Initialize:             {:>8.3}s", self.initialize.as_secs_f64());
        eprintln!("  Preconditioner:         {:>8.3}s", self.preconditioner.as_secs_f64());
        eprintln!("  Reductions:             {:>8.3}s", self.reduction.as_secs_f64());
        eprintln!("  Direction update:       {:>8.3}s", self.direction_update.as_secs_f64());
        eprintln!("  Operator apply:         {:>8.3}s", self.operator.as_secs_f64());
        eprintln!("  Solution update:        {:>8.3}s", self.solution_update.as_secs_f64());
        eprintln!("  ─────────────────────────────────");
        eprintln!("  Kernels:                {:>8.3}s", self.kernel_time().as_secs_f64());
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}

/// Record into `stats` if present.
pub(crate) fn record(stats: &mut Option<&mut Stats>, phase: Phase, start: Instant) {
    if let Some(s) = stats.as_deref_mut() {
        s.add(phase, start);
    }
}
