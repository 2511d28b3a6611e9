//! Execution contexts for the block kernels.
//!
//! Every kernel is written once. The `Executor` only decides how the
//! cells of a block are traversed:
//!
//! - `Sequential`: column by column, rows innermost.
//! - `Parallel`: rows partitioned across a rayon pool, all columns per row.
//! - `Vectorized`: row by row on one thread, columns processed in fixed
//!   `LANES`-wide tiles so uniform tiles run branch-free.
//!
//! Each cell is updated by the same scalar expression on every path, so
//! all three produce bit-identical blocks.

use crate::error::{BatchCgError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Tile width used by the vectorized traversal.
pub const LANES: usize = 8;

/// Traversal strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorKind {
    #[default]
    Sequential,
    Parallel,
    Vectorized,
}

impl ExecutorKind {
    pub const ALL: [ExecutorKind; 3] = [
        ExecutorKind::Sequential,
        ExecutorKind::Parallel,
        ExecutorKind::Vectorized,
    ];
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutorKind::Sequential => "sequential",
            ExecutorKind::Parallel => "parallel",
            ExecutorKind::Vectorized => "vectorized",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutorKind {
    type Err = BatchCgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" | "seq" => Ok(ExecutorKind::Sequential),
            "parallel" | "par" => Ok(ExecutorKind::Parallel),
            "vectorized" | "simd" => Ok(ExecutorKind::Vectorized),
            other => Err(BatchCgError::Config(format!(
                "unknown executor '{other}' (expected sequential, parallel or vectorized)"
            ))),
        }
    }
}

/// Execution context handed to every kernel call.
///
/// Cheap to clone; a dedicated thread pool is shared between clones.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    kind: ExecutorKind,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Executor {
    pub fn sequential() -> Self {
        Self {
            kind: ExecutorKind::Sequential,
            pool: None,
        }
    }

    /// Parallel executor on rayon's global pool.
    pub fn parallel() -> Self {
        Self {
            kind: ExecutorKind::Parallel,
            pool: None,
        }
    }

    pub fn vectorized() -> Self {
        Self {
            kind: ExecutorKind::Vectorized,
            pool: None,
        }
    }

    /// Build an executor of the given kind. `threads` only applies to
    /// `Parallel`, where it creates a dedicated pool of that size.
    pub fn new(kind: ExecutorKind, threads: Option<usize>) -> Result<Self> {
        let pool = match (kind, threads) {
            (ExecutorKind::Parallel, Some(0)) => {
                return Err(BatchCgError::Config("thread count must be non-zero".into()));
            }
            (ExecutorKind::Parallel, Some(n)) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("batchcg-{i}"))
                    .build()
                    .map_err(|e| BatchCgError::Config(format!("failed to build thread pool: {e}")))?;
                Some(Arc::new(pool))
            }
            _ => None,
        };
        Ok(Self { kind, pool })
    }

    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    /// Number of worker threads kernels may use.
    pub fn threads(&self) -> usize {
        match (self.kind, &self.pool) {
            (ExecutorKind::Parallel, Some(pool)) => pool.current_num_threads(),
            (ExecutorKind::Parallel, None) => rayon::current_num_threads(),
            _ => 1,
        }
    }

    /// Run `op` inside this executor's pool, if it has one.
    pub(crate) fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kind_names() {
        assert_eq!("parallel".parse::<ExecutorKind>().unwrap(), ExecutorKind::Parallel);
        assert_eq!("SIMD".parse::<ExecutorKind>().unwrap(), ExecutorKind::Vectorized);
        assert_eq!("seq".parse::<ExecutorKind>().unwrap(), ExecutorKind::Sequential);
        let err = "gpu".parse::<ExecutorKind>().unwrap_err().to_string();
        assert!(err.contains("unknown executor"), "got: {err}");
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for kind in ExecutorKind::ALL {
            assert_eq!(kind.to_string().parse::<ExecutorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn dedicated_pool_has_requested_size() {
        let exec = Executor::new(ExecutorKind::Parallel, Some(2)).unwrap();
        assert_eq!(exec.threads(), 2);
        assert_eq!(exec.install(rayon::current_num_threads), 2);
    }

    #[test]
    fn zero_threads_rejected() {
        assert!(Executor::new(ExecutorKind::Parallel, Some(0)).is_err());
    }

    #[test]
    fn threads_ignored_for_sequential() {
        let exec = Executor::new(ExecutorKind::Sequential, Some(4)).unwrap();
        assert_eq!(exec.threads(), 1);
        assert_eq!(exec.kind(), ExecutorKind::Sequential);
    }
}
