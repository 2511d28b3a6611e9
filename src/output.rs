//! Results output formatting (CSV).

use crate::error::Result;
use crate::solver::cg::CgReport;
use std::io::Write;

/// Write the per-column outcome of a batched solve as CSV.
///
/// Format:
/// ```csv
/// column,status,residual
/// 0,converged,3.1e-11
/// 1,diverged,inf
/// ```
pub fn write_report_csv<W: Write>(report: &CgReport, writer: &mut W) -> Result<()> {
    writeln!(writer, "column,status,residual")?;
    for (j, (status, residual)) in report
        .statuses
        .iter()
        .zip(&report.residual_norms)
        .enumerate()
    {
        writeln!(writer, "{},{},{:e}", j, status, residual)?;
    }
    Ok(())
}
