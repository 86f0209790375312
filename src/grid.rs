// 📋 Cell grid - raw 2-D view of a spreadsheet sheet
//
// Coordinates are absolute sheet positions (row 0 = sheet row 1, col 0 = "A"),
// regardless of where the used range of the sheet starts.

use crate::errors::{Error, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

// ============================================================================
// CELL
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

static EMPTY: Cell = Cell::Empty;

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Int(i) => write!(f, "{}", i),
            Cell::Float(v) => write!(f, "{}", v),
            Cell::Text(s) => f.write_str(s),
            Cell::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::Int(i) => Cell::Int(*i),
            Data::Float(v) => Cell::Float(*v),
            Data::String(s) => Cell::Text(s.clone()),
            Data::Bool(b) => Cell::Bool(*b),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Int(i)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Float(v)
    }
}

// ============================================================================
// COLUMN ADDRESSING
// ============================================================================

/// Column reference, either from the left edge or from the right edge.
///
/// `FromEnd(1)` is the last column of the sheet, `FromEnd(2)` the one before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Col {
    At(usize),
    FromEnd(usize),
}

impl fmt::Display for Col {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Col::At(c) => write!(f, "col {}", c),
            Col::FromEnd(n) => write!(f, "col -{}", n),
        }
    }
}

// ============================================================================
// GRID
// ============================================================================

#[derive(Debug, Clone)]
pub struct Grid {
    /// File (and sheet) name, used in every error message
    name: String,
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl Grid {
    pub fn from_rows(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        Grid {
            name: name.into(),
            rows,
            width,
        }
    }

    /// Convert a calamine range, re-anchoring it at A1
    pub fn from_range(name: impl Into<String>, range: &Range<Data>) -> Self {
        let (row0, col0) = range
            .start()
            .map(|(r, c)| (r as usize, c as usize))
            .unwrap_or((0, 0));

        let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); row0];
        for row in range.rows() {
            let mut cells = vec![Cell::Empty; col0];
            cells.extend(row.iter().map(Cell::from));
            rows.push(cells);
        }

        Grid::from_rows(name, rows)
    }

    /// Open a workbook (xlsx, xls, ods) and read one sheet
    pub fn open_sheet(path: &Path, sheet: &str) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.xlsx")
            .to_string();

        let mut workbook = open_workbook_auto(path)?;
        if !workbook.sheet_names().iter().any(|s| s == sheet) {
            return Err(Error::structural(
                file_name,
                "sheet name",
                sheet,
                workbook.sheet_names().join(", "),
            ));
        }

        let range = workbook.worksheet_range(sheet)?;
        tracing::debug!(file = %file_name, sheet, size = ?range.get_size(), "loaded sheet");
        Ok(Grid::from_range(format!("{} [{}]", file_name, sheet), &range))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn resolve_col(&self, col: Col) -> Option<usize> {
        match col {
            Col::At(c) => Some(c),
            Col::FromEnd(n) if n >= 1 && n <= self.width => Some(self.width - n),
            Col::FromEnd(_) => None,
        }
    }

    /// Out-of-range positions read as empty cells
    pub fn cell(&self, row: usize, col: Col) -> &Cell {
        self.resolve_col(col)
            .and_then(|c| self.rows.get(row).and_then(|r| r.get(c)))
            .unwrap_or(&EMPTY)
    }

    /// Trimmed text of a cell (numbers rendered as written)
    pub fn text(&self, row: usize, col: Col) -> String {
        self.cell(row, col).to_string().trim().to_string()
    }

    pub fn row(&self, row: usize) -> &[Cell] {
        self.rows.get(row).map(|r| r.as_slice()).unwrap_or(&[])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Map header labels of a row to column indices
    pub fn header_index(&self, row: usize) -> HashMap<String, usize> {
        self.row(row)
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_empty())
            .map(|(i, c)| (c.to_string().trim().to_string(), i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Grid {
        Grid::from_rows(
            "sample.xlsx",
            vec![
                vec![Cell::from("a"), Cell::from(1i64)],
                vec![Cell::Empty, Cell::from(2.5), Cell::from("last")],
            ],
        )
    }

    #[test]
    fn test_width_is_widest_row() {
        let grid = sample();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.height(), 2);
    }

    #[test]
    fn test_from_end_addressing() {
        let grid = sample();
        assert_eq!(grid.text(1, Col::FromEnd(1)), "last");
        assert_eq!(grid.text(1, Col::FromEnd(2)), "2.5");
        assert_eq!(grid.cell(0, Col::FromEnd(1)), &Cell::Empty);
        assert_eq!(grid.resolve_col(Col::FromEnd(4)), None);
    }

    #[test]
    fn test_out_of_range_is_empty() {
        let grid = sample();
        assert!(grid.cell(10, Col::At(0)).is_empty());
        assert!(grid.cell(0, Col::At(10)).is_empty());
        assert!(grid.row(10).is_empty());
    }

    #[test]
    fn test_header_index() {
        let grid = Grid::from_rows(
            "h.xlsx",
            vec![vec![Cell::from("region_country"), Cell::Empty, Cell::from(" value ")]],
        );
        let idx = grid.header_index(0);
        assert_eq!(idx.get("region_country"), Some(&0));
        assert_eq!(idx.get("value"), Some(&2));
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn test_from_range_reanchors_at_a1() {
        let mut range: Range<Data> = Range::new((2, 1), (3, 2));
        range.set_value((2, 1), Data::String("Fahrzeugklasse".to_string()));
        range.set_value((3, 2), Data::Float(42.0));

        let grid = Grid::from_range("r.xlsx", &range);
        assert_eq!(grid.text(2, Col::At(1)), "Fahrzeugklasse");
        assert_eq!(grid.cell(3, Col::At(2)), &Cell::Float(42.0));
        assert!(grid.cell(0, Col::At(0)).is_empty());
    }
}
