// ✅ Per-file structural validation
//
// After the base row is located, a battery of marker cells must carry the
// labels the extractor expects. A mismatch names the file, the check and
// both texts, and stops processing of that file. No repair is attempted.

use crate::errors::{Error, Result};
use crate::grid::{Col, Grid};
use crate::locale;
use chrono::{Locale, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    Contains(&'static str),
    Equals(&'static str),
}

/// A named marker relative to the base row
#[derive(Debug, Clone, Copy)]
pub struct MarkerCheck {
    pub label: &'static str,
    pub row_offset: usize,
    pub col: Col,
    pub expect: Expect,
}

impl MarkerCheck {
    pub const fn contains(label: &'static str, row_offset: usize, col: Col, text: &'static str) -> Self {
        MarkerCheck {
            label,
            row_offset,
            col,
            expect: Expect::Contains(text),
        }
    }

    pub const fn equals(label: &'static str, row_offset: usize, col: Col, text: &'static str) -> Self {
        MarkerCheck {
            label,
            row_offset,
            col,
            expect: Expect::Equals(text),
        }
    }
}

pub struct StructuralValidator<'a> {
    grid: &'a Grid,
    base: usize,
}

impl<'a> StructuralValidator<'a> {
    pub fn new(grid: &'a Grid, base: usize) -> Self {
        StructuralValidator { grid, base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    fn mismatch(&self, label: &str, row: usize, col: Col, expected: &str, actual: String) -> Error {
        Error::structural(
            self.grid.name(),
            format!("{} (row {} {})", label, row, col),
            expected,
            actual,
        )
    }

    /// Cell text must contain `needle`
    pub fn expect_contains(&self, label: &str, row_offset: usize, col: Col, needle: &str) -> Result<()> {
        let row = self.base + row_offset;
        let actual = self.grid.text(row, col);
        if actual.contains(needle) {
            Ok(())
        } else {
            Err(self.mismatch(label, row, col, needle, actual))
        }
    }

    /// Cell text must equal `expected` (surrounding whitespace ignored)
    pub fn expect_equals(&self, label: &str, row_offset: usize, col: Col, expected: &str) -> Result<()> {
        let row = self.base + row_offset;
        let actual = self.grid.text(row, col);
        if actual == expected.trim() {
            Ok(())
        } else {
            Err(self.mismatch(label, row, col, expected, actual))
        }
    }

    /// Run a whole battery; the first failing marker is reported
    pub fn check_all(&self, checks: &[MarkerCheck]) -> Result<()> {
        for check in checks {
            match check.expect {
                Expect::Contains(text) => {
                    self.expect_contains(check.label, check.row_offset, check.col, text)?
                }
                Expect::Equals(text) => {
                    self.expect_equals(check.label, check.row_offset, check.col, text)?
                }
            }
        }
        Ok(())
    }

    /// The printed period label must match `period` formatted in the
    /// publisher's locale, e.g. "März 2024" for a German source.
    ///
    /// The locale override covers only this comparison.
    pub fn expect_period_label(
        &self,
        label: &str,
        row_offset: usize,
        col: Col,
        period: NaiveDate,
        fmt: &str,
        publisher_locale: Locale,
    ) -> Result<()> {
        locale::with_locale(publisher_locale, || {
            let expected = locale::format_date(period, fmt);
            self.expect_equals(label, row_offset, col, &expected)
        })
    }
}
