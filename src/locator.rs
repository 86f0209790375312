// 🧭 Structural table locator
//
// Upstream sheets move their data region by a row or so between releases
// (e.g. an occasionally missing header line). The locator probes a small
// set of candidate base rows and picks the first one whose marker cells
// carry the expected text.

use crate::errors::{Error, Result};
use crate::grid::{Col, Grid};

/// One marker: the cell at `base + row_offset`, `col` must contain `expected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub row_offset: usize,
    pub col: Col,
    pub expected: &'static str,
}

impl Probe {
    pub const fn new(row_offset: usize, col: Col, expected: &'static str) -> Self {
        Probe {
            row_offset,
            col,
            expected,
        }
    }

    pub fn matches(&self, grid: &Grid, base: usize) -> bool {
        grid.text(base + self.row_offset, self.col)
            .contains(self.expected)
    }
}

/// Resolve the base row of a table.
///
/// Candidates are tried in order; the first whose probes all match wins.
/// When none match, processing of the file must stop.
pub fn locate_base_row(grid: &Grid, candidates: &[usize], probes: &[Probe]) -> Result<usize> {
    for &base in candidates {
        if probes.iter().all(|p| p.matches(grid, base)) {
            tracing::debug!(file = grid.name(), base, "located table base row");
            return Ok(base);
        }
    }

    // Report what the first probe saw at each candidate
    let probe = probes.first();
    let expected = probe.map(|p| p.expected).unwrap_or_default();
    let actual = candidates
        .iter()
        .map(|&base| match probe {
            Some(p) => format!(
                "row {} {}: {:?}",
                base + p.row_offset,
                p.col,
                grid.text(base + p.row_offset, p.col)
            ),
            None => format!("row {}", base),
        })
        .collect::<Vec<_>>()
        .join("; ");

    Err(Error::structural(
        grid.name(),
        format!("base row (candidates {:?})", candidates),
        expected,
        actual,
    ))
}
