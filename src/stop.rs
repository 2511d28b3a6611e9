//! Per-column stopping state.
//!
//! The update kernels only ask whether a column has stopped. Why it
//! stopped is recorded for the solve loop and the final report.

use std::fmt;

/// Lifecycle state of one right-hand side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoppingStatus {
    #[default]
    Running,
    Converged,
    Diverged,
}

impl StoppingStatus {
    pub fn has_stopped(self) -> bool {
        self != StoppingStatus::Running
    }

    pub fn has_converged(self) -> bool {
        self == StoppingStatus::Converged
    }
}

impl fmt::Display for StoppingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoppingStatus::Running => "running",
            StoppingStatus::Converged => "converged",
            StoppingStatus::Diverged => "diverged",
        };
        f.write_str(s)
    }
}

/// One `StoppingStatus` per column.
///
/// A column leaves `Running` only through `converge`/`diverge` and returns
/// to it only through `reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppingMask {
    status: Vec<StoppingStatus>,
}

impl StoppingMask {
    pub fn new(cols: usize) -> Self {
        Self {
            status: vec![StoppingStatus::Running; cols],
        }
    }

    pub fn cols(&self) -> usize {
        self.status.len()
    }

    pub fn has_stopped(&self, j: usize) -> bool {
        self.status[j].has_stopped()
    }

    pub fn status(&self, j: usize) -> StoppingStatus {
        self.status[j]
    }

    pub fn statuses(&self) -> &[StoppingStatus] {
        &self.status
    }

    /// Put every column back into `Running`.
    pub fn reset(&mut self) {
        self.status.fill(StoppingStatus::Running);
    }

    /// Mark column `j` converged. Returns false if it had already stopped.
    pub fn converge(&mut self, j: usize) -> bool {
        self.stop(j, StoppingStatus::Converged)
    }

    /// Mark column `j` diverged. Returns false if it had already stopped.
    pub fn diverge(&mut self, j: usize) -> bool {
        self.stop(j, StoppingStatus::Diverged)
    }

    fn stop(&mut self, j: usize, to: StoppingStatus) -> bool {
        if self.status[j].has_stopped() {
            return false;
        }
        self.status[j] = to;
        true
    }

    pub fn running_count(&self) -> usize {
        self.status.iter().filter(|s| !s.has_stopped()).count()
    }

    pub fn all_stopped(&self) -> bool {
        self.status.iter().all(|s| s.has_stopped())
    }

    pub fn all_converged(&self) -> bool {
        self.status.iter().all(|s| s.has_converged())
    }

    pub fn any_diverged(&self) -> bool {
        self.status.contains(&StoppingStatus::Diverged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mask_is_running() {
        let mask = StoppingMask::new(3);
        assert_eq!(mask.running_count(), 3);
        assert!(!mask.all_stopped());
        assert!((0..3).all(|j| !mask.has_stopped(j)));
    }

    #[test]
    fn stopped_column_keeps_first_reason() {
        let mut mask = StoppingMask::new(2);
        assert!(mask.converge(1));
        assert!(!mask.diverge(1));
        assert_eq!(mask.status(1), StoppingStatus::Converged);
        assert_eq!(mask.running_count(), 1);
    }

    #[test]
    fn reset_restarts_every_column() {
        let mut mask = StoppingMask::new(2);
        mask.converge(0);
        mask.diverge(1);
        assert!(mask.all_stopped());
        assert!(mask.any_diverged());
        assert!(!mask.all_converged());
        mask.reset();
        assert_eq!(mask.running_count(), 2);
    }

    #[test]
    fn empty_mask_counts_as_stopped() {
        let mask = StoppingMask::new(0);
        assert!(mask.all_stopped());
        assert!(mask.all_converged());
    }

    #[test]
    fn display_names() {
        assert_eq!(StoppingStatus::Diverged.to_string(), "diverged");
        assert_eq!(StoppingStatus::default().to_string(), "running");
    }
}
