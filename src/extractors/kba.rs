// 🇩🇪 KBA FZ 28.1 - monthly new registrations by vehicle class and powertrain
//
// One workbook per month (fz28_<year>_<month>.xlsx). The data region moves
// by one row in some months because a header line is missing, so the base
// row is located by marker text rather than a fixed offset.

use super::{file_name, list_files, SourceExtractor, SourceType};
use crate::coerce::Scalar;
use crate::errors::{Error, Result};
use crate::grid::{Col, Grid};
use crate::locator::{locate_base_row, Probe};
use crate::period::{month_start, Granularity};
use crate::power_type::PowerType;
use crate::schema::{EntityType, Fragment, Metric};
use crate::validate::{MarkerCheck, StructuralValidator};
use chrono::{Locale, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const SHEET_NAME: &str = "FZ 28.1";

/// Entity the passenger-car figures are reported for
pub const ENTITY: &str = "Germany";

static FILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^fz28_([0-9]{4})_([0-9]{1,2})\.xlsx$").expect("valid pattern"));

// ============================================================================
// SHEET LAYOUT
// ============================================================================

/// Rows tried for the "Fahrzeugklasse" header, in order
const BASE_ROW_CANDIDATES: [usize; 2] = [7, 6];

const BASE_PROBES: [Probe; 1] = [Probe::new(0, Col::At(1), "Fahrzeugklasse")];

const HEADER_CHECKS: [MarkerCheck; 8] = [
    MarkerCheck::equals("vehicle class header", 0, Col::At(1), "Fahrzeugklasse"),
    MarkerCheck::contains("BEV column", 4, Col::At(7), "Elektro"),
    MarkerCheck::contains("FCEV column", 4, Col::At(8), "Brennstoffzelle"),
    MarkerCheck::contains("PHEV column", 4, Col::At(9), "Plug-in-Hybrid"),
    MarkerCheck::contains("hybrid column", 2, Col::At(10), "Hybrid"),
    MarkerCheck::contains("hybrid total column", 3, Col::At(10), "insgesamt"),
    MarkerCheck::contains("gas column", 2, Col::FromEnd(2), "Gas"),
    MarkerCheck::contains("hydrogen column", 2, Col::FromEnd(1), "Wasserstoff"),
];

const PERIOD_ROW_OFFSET: usize = 5;
const FIRST_CLASS_ROW_OFFSET: usize = 6;

const COL_LABEL: Col = Col::At(1);
const COL_TOTAL: Col = Col::At(2);
/// Printed sum of all alternative powertrains
const COL_ALT_TOTAL: Col = Col::At(3);

const POWER_COLUMNS: [(PowerType, Col); 6] = [
    (PowerType::BEV, Col::At(7)),
    (PowerType::FCEV, Col::At(8)),
    (PowerType::PHEV, Col::At(9)),
    (PowerType::HEV, Col::At(10)),
    (PowerType::CNG, Col::FromEnd(2)),
    (PowerType::HCE, Col::FromEnd(1)),
];

// ============================================================================
// VEHICLE CLASSES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VehicleClass {
    Motorcycles,
    PassengerCars,
    Buses,
    Trucks,
    Tractors,
    SemiTrailerTractors,
    Other,
}

impl VehicleClass {
    /// Row order in the sheet
    pub const ALL: [VehicleClass; 7] = [
        VehicleClass::Motorcycles,
        VehicleClass::PassengerCars,
        VehicleClass::Buses,
        VehicleClass::Trucks,
        VehicleClass::Tractors,
        VehicleClass::SemiTrailerTractors,
        VehicleClass::Other,
    ];

    /// Row label as printed by KBA
    pub fn label(&self) -> &'static str {
        match self {
            VehicleClass::Motorcycles => "Krafträder",
            VehicleClass::PassengerCars => "Personenkraftwagen",
            VehicleClass::Buses => "Kraftomnibusse",
            VehicleClass::Trucks => "Lastkraftwagen",
            VehicleClass::Tractors => "Zugmaschinen insgesamt",
            VehicleClass::SemiTrailerTractors => "Sattelzugmaschinen",
            VehicleClass::Other => "Sonstige Kfz",
        }
    }
}

// ============================================================================
// FILE DISCOVERY
// ============================================================================

/// Month covered by a file named `fz28_<year>_<month>.xlsx`
pub fn parse_file_name(name: &str) -> Option<NaiveDate> {
    let caps = FILE_PATTERN.captures(name)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    month_start(year, month)
}

/// Monthly files in `dir`, sorted by month
pub fn discover(dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let mut files: Vec<(NaiveDate, PathBuf)> = list_files(dir, |n| parse_file_name(n).is_some())?
        .into_iter()
        .filter_map(|p| parse_file_name(&file_name(&p)).map(|month| (month, p)))
        .collect();
    files.sort();
    Ok(files)
}

// ============================================================================
// SINGLE MONTH
// ============================================================================

pub type MonthCounts = BTreeMap<(VehicleClass, PowerType), i64>;

/// KBA prints "-" (or leaves the cell blank) for "none registered"
fn count(grid: &Grid, row: usize, col: Col, what: &str) -> Result<i64> {
    let cell = grid.cell(row, col);
    if let Some(n) = cell.to_int() {
        return Ok(n);
    }
    let text = cell.to_string();
    if text.trim().is_empty() || text.trim() == "-" {
        return Ok(0);
    }
    Err(Error::structural(
        grid.name(),
        format!("{} count (row {} {})", what, row, col),
        "a number or \"-\"",
        text,
    ))
}

/// Validate one monthly sheet and read its counts.
///
/// ICE is not printed; it is derived as total minus the alternative total,
/// after checking that the itemized alternatives add up to that total.
pub fn parse_month(grid: &Grid, period: NaiveDate) -> Result<MonthCounts> {
    let base = locate_base_row(grid, &BASE_ROW_CANDIDATES, &BASE_PROBES)?;
    let validator = StructuralValidator::new(grid, base);
    validator.check_all(&HEADER_CHECKS)?;
    validator.expect_period_label(
        "period label",
        PERIOD_ROW_OFFSET,
        COL_LABEL,
        period,
        "%B %Y",
        Locale::de_DE,
    )?;

    let mut counts = MonthCounts::new();

    for (j, class) in VehicleClass::ALL.iter().enumerate() {
        let offset = FIRST_CLASS_ROW_OFFSET + j;
        validator.expect_contains("vehicle class row", offset, COL_LABEL, class.label())?;

        let row = base + offset;
        let total = count(grid, row, COL_TOTAL, class.label())?;
        let alt_total = count(grid, row, COL_ALT_TOTAL, class.label())?;

        let mut itemized = 0;
        for (power_type, col) in POWER_COLUMNS {
            let n = count(grid, row, col, class.label())?;
            counts.insert((*class, power_type), n);
            itemized += n;
        }

        if itemized != alt_total {
            return Err(Error::invariant(
                grid.name(),
                format!(
                    "{} {}: alternative powertrains sum to {} but the printed total is {}",
                    class.label(),
                    period.format("%Y-%m"),
                    itemized,
                    alt_total
                ),
            ));
        }

        let ice = total - alt_total;
        if ice < 0 {
            return Err(Error::invariant(
                grid.name(),
                format!(
                    "{} {}: alternative total {} exceeds class total {}",
                    class.label(),
                    period.format("%Y-%m"),
                    alt_total,
                    total
                ),
            ));
        }
        counts.insert((*class, PowerType::ICE), ice);
    }

    Ok(counts)
}

// ============================================================================
// AGGREGATED TABLE
// ============================================================================

/// Wide table: one row per month, one column per (vehicle class, powertrain)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KbaTable {
    rows: BTreeMap<NaiveDate, MonthCounts>,
}

impl KbaTable {
    pub fn new() -> Self {
        KbaTable::default()
    }

    pub fn months(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, month: NaiveDate, class: VehicleClass, power_type: PowerType) -> Option<i64> {
        self.rows.get(&month)?.get(&(class, power_type)).copied()
    }

    /// Sum over every powertrain of a class (equals the printed class total)
    pub fn class_total(&self, month: NaiveDate, class: VehicleClass) -> Option<i64> {
        let counts = self.rows.get(&month)?;
        Some(
            counts
                .iter()
                .filter(|((c, _), _)| *c == class)
                .map(|(_, n)| *n)
                .sum(),
        )
    }

    /// Write as CSV with one `<class>/<powertrain>` column per pair
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let columns: Vec<(VehicleClass, PowerType)> = VehicleClass::ALL
            .iter()
            .flat_map(|c| PowerType::V1.iter().map(move |p| (*c, *p)))
            .collect();

        let mut header = vec!["month".to_string()];
        header.extend(columns.iter().map(|(c, p)| format!("{}/{}", c.label(), p)));
        wtr.write_record(&header)?;

        for (month, counts) in &self.rows {
            let mut row = vec![month.format("%Y-%m-%d").to_string()];
            row.extend(
                columns
                    .iter()
                    .map(|key| counts.get(key).map(|n| n.to_string()).unwrap_or_default()),
            );
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    /// Canonical monthly sales fragment for German passenger cars
    pub fn to_fragment(&self) -> Fragment {
        let mut fragment = Fragment::new(SourceType::Kba.code(), Granularity::Monthly);
        let class = VehicleClass::PassengerCars;

        for month in self.months() {
            let get = |p: PowerType| self.get(month, class, p).map(|n| n as f64);
            let record = fragment.entry(ENTITY, month, EntityType::Country);

            record.set_opt(Metric::SalesTotal, self.class_total(month, class).map(|n| n as f64));
            record.set_opt(Metric::SalesIce, get(PowerType::ICE));
            record.set_opt(Metric::SalesBevs, get(PowerType::BEV));
            record.set_opt(Metric::SalesPhevs, get(PowerType::PHEV));
            record.set_opt(Metric::SalesFcevs, get(PowerType::FCEV));
            record.set_opt(
                Metric::SalesEvs,
                crate::coerce::sum_known([get(PowerType::BEV), get(PowerType::PHEV)]),
            );
            record.derive_shares();
        }

        fragment
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct KbaAggregator;

impl KbaAggregator {
    /// Validate and accumulate already-loaded monthly sheets.
    ///
    /// Any structural or invariant failure stops the whole aggregation.
    pub fn aggregate_grids<I>(sheets: I) -> Result<KbaTable>
    where
        I: IntoIterator<Item = (NaiveDate, Grid)>,
    {
        let mut table = KbaTable::new();

        for (month, grid) in sheets {
            if table.rows.contains_key(&month) {
                return Err(Error::structural(
                    grid.name(),
                    "unique month",
                    month.format("%Y-%m").to_string(),
                    "month already read from another file",
                ));
            }
            let counts = parse_month(&grid, month)?;
            tracing::debug!(file = grid.name(), month = %month, "parsed KBA month");
            table.rows.insert(month, counts);
        }

        Ok(table)
    }

    /// Read every `fz28_<year>_<month>.xlsx` in `dir`
    pub fn aggregate_dir(dir: &Path) -> Result<KbaTable> {
        let files = discover(dir)?;
        tracing::info!(dir = %dir.display(), files = files.len(), "aggregating KBA FZ 28.1");

        let mut sheets = Vec::with_capacity(files.len());
        for (month, path) in files {
            sheets.push((month, Grid::open_sheet(&path, SHEET_NAME)?));
        }
        Self::aggregate_grids(sheets)
    }
}

/// KBA extractor (German passenger cars, monthly)
pub struct KbaExtractor;

impl KbaExtractor {
    pub fn new() -> Self {
        KbaExtractor
    }
}

impl Default for KbaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for KbaExtractor {
    fn extract(&self, dir: &Path) -> Result<Fragment> {
        Ok(KbaAggregator::aggregate_dir(dir)?.to_fragment())
    }

    fn input_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(discover(dir)?.into_iter().map(|(_, p)| p).collect())
    }

    fn source_type(&self) -> SourceType {
        SourceType::Kba
    }
}

// ============================================================================
// TESTS
// ============================================================================
