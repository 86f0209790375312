// 🌐 IEA Global EV Outlook - EV Data Explorer workbook
//
// One long sheet; each row is (region, year, parameter, powertrain) -> value.
// Only historical passenger-car rows are used. Totals are not published and
// are reconstructed from the EV counts and the EV sales share.

use super::{list_files, SourceExtractor, SourceType};
use crate::coerce::{percent_to_fraction, ratio, Scalar};
use crate::errors::{Error, Result};
use crate::grid::{Col, Grid};
use crate::period::{parse_year, Granularity};
use crate::schema::{EntityType, Fragment, Metric};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const FILE_NAME: &str = "EVDataExplorer2025.xlsx";
pub const SHEET_NAME: &str = "GEVO_EV_2025";

const HEADER_ROW: usize = 0;

const COLUMNS: [&str; 7] = [
    "region_country",
    "category",
    "parameter",
    "mode",
    "powertrain",
    "year",
    "value",
];
const AGGREGATE_GROUP: &str = "Aggregate group";

/// Regions whose aggregate group is this are single countries
const COUNTRY_GROUP: &str = "Other";
const WORLD: &str = "World";

/// (powertrain, parameter) -> metric, and whether the value is a percentage
fn metric_for(powertrain: &str, parameter: &str) -> Option<(Metric, bool)> {
    let mapped = match (powertrain, parameter) {
        ("BEV", "EV stock") => (Metric::StockBevs, false),
        ("PHEV", "EV stock") => (Metric::StockPhevs, false),
        ("FCEV", "EV stock") => (Metric::StockFcevs, false),
        ("BEV", "EV sales") => (Metric::SalesBevs, false),
        ("PHEV", "EV sales") => (Metric::SalesPhevs, false),
        ("FCEV", "EV sales") => (Metric::SalesFcevs, false),
        ("EV", "EV sales share") => (Metric::SalesShareEvs, true),
        ("EV", "EV stock share") => (Metric::StockShareEvs, true),
        _ => return None,
    };
    Some(mapped)
}

pub struct IeaExtractor;

impl IeaExtractor {
    pub fn new() -> Self {
        IeaExtractor
    }

    pub fn extract_grid(&self, grid: &Grid) -> Result<Fragment> {
        let header = grid.header_index(HEADER_ROW);
        let col = |name: &str| -> Result<Col> {
            header.get(name).map(|c| Col::At(*c)).ok_or_else(|| Error::MissingColumn {
                file: grid.name().to_string(),
                column: name.to_string(),
            })
        };

        let [c_region, c_category, c_parameter, c_mode, c_powertrain, c_year, c_value] = [
            col(COLUMNS[0])?,
            col(COLUMNS[1])?,
            col(COLUMNS[2])?,
            col(COLUMNS[3])?,
            col(COLUMNS[4])?,
            col(COLUMNS[5])?,
            col(COLUMNS[6])?,
        ];
        let c_group = col(AGGREGATE_GROUP)?;

        let mut values: BTreeMap<(String, NaiveDate), BTreeMap<Metric, f64>> = BTreeMap::new();
        // Highest aggregate-group label seen per region
        let mut groups: BTreeMap<String, String> = BTreeMap::new();
        let mut seen: HashSet<(String, NaiveDate, Metric)> = HashSet::new();

        for row in HEADER_ROW + 1..grid.height() {
            if grid.text(row, c_category) != "Historical" || grid.text(row, c_mode) != "Cars" {
                continue;
            }
            let Some((metric, percent)) =
                metric_for(&grid.text(row, c_powertrain), &grid.text(row, c_parameter))
            else {
                continue;
            };

            let region = grid.text(row, c_region);
            let group = grid.text(row, c_group);
            let max = groups.entry(region.clone()).or_default();
            if group > *max {
                *max = group;
            }

            let year_cell = grid.cell(row, c_year);
            let year = parse_year(year_cell.to_int()).ok_or_else(|| {
                Error::structural(grid.name(), format!("year on row {}", row), "a year", year_cell.to_string())
            })?;

            if !seen.insert((region.clone(), year, metric)) {
                return Err(Error::structural(
                    grid.name(),
                    format!("row {}", row),
                    "one value per region, year, powertrain and parameter",
                    format!("repeated {} {} {}", region, year.format("%Y"), metric.name()),
                ));
            }

            let raw = grid.cell(row, c_value).to_float();
            let value = if percent { percent_to_fraction(raw) } else { raw };
            if let Some(v) = value {
                values.entry((region, year)).or_default().insert(metric, v);
            }
        }

        let mut fragment = Fragment::new(SourceType::Iea.code(), Granularity::Annual);

        for ((region, year), metrics) in values {
            let entity_type = if region == WORLD {
                EntityType::World
            } else if groups.get(&region).map(String::as_str) == Some(COUNTRY_GROUP) {
                EntityType::Country
            } else {
                EntityType::Group
            };

            let record = fragment.entry(&region, year, entity_type);
            record.metrics = metrics;

            let count = |m: Metric| record.get(m).unwrap_or(0.0);
            let ev_sales = count(Metric::SalesBevs) + count(Metric::SalesPhevs) + count(Metric::SalesFcevs);
            let bevs = count(Metric::SalesBevs);

            // A zero or unknown share leaves the total unknown
            if let Some(share) = record.get(Metric::SalesShareEvs).filter(|s| *s > 0.0) {
                let total = ev_sales / share;
                record.set(Metric::SalesTotal, total);
                record.set_opt(Metric::SalesShareBevs, ratio(Some(bevs), Some(total)));
            }
        }

        tracing::info!(file = grid.name(), records = fragment.len(), "extracted IEA EV data");
        Ok(fragment)
    }
}

impl Default for IeaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for IeaExtractor {
    fn extract(&self, dir: &Path) -> Result<Fragment> {
        let grid = Grid::open_sheet(&dir.join(FILE_NAME), SHEET_NAME)?;
        self.extract_grid(&grid)
    }

    fn input_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        list_files(dir, |name| name == FILE_NAME)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Iea
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Cell;

    fn row(region: &str, category: &str, parameter: &str, mode: &str, powertrain: &str, year: i64, value: f64, group: &str) -> Vec<Cell> {
        vec![
            Cell::from(region),
            Cell::from(category),
            Cell::from(parameter),
            Cell::from(mode),
            Cell::from(powertrain),
            Cell::Int(year),
            Cell::from("Vehicles"),
            Cell::Float(value),
            Cell::from(group),
        ]
    }

    fn header() -> Vec<Cell> {
        [
            "region_country",
            "category",
            "parameter",
            "mode",
            "powertrain",
            "year",
            "unit",
            "value",
            "Aggregate group",
        ]
        .iter()
        .map(|h| Cell::from(*h))
        .collect()
    }

    fn sample() -> Grid {
        Grid::from_rows(
            "EVDataExplorer2025.xlsx [GEVO_EV_2025]",
            vec![
                header(),
                row("Norway", "Historical", "EV sales", "Cars", "BEV", 2023, 104_000.0, "Other"),
                row("Norway", "Historical", "EV sales", "Cars", "PHEV", 2023, 11_000.0, "Other"),
                row("Norway", "Historical", "EV sales share", "Cars", "EV", 2023, 92.0, "Other"),
                row("Norway", "Historical", "EV stock share", "Cars", "EV", 2023, 29.0, "Other"),
                row("Norway", "Projection-STEPS", "EV sales", "Cars", "BEV", 2030, 150_000.0, "Other"),
                row("Norway", "Historical", "EV sales", "Buses", "BEV", 2023, 300.0, "Other"),
                row("Europe", "Historical", "EV sales", "Cars", "BEV", 2023, 1_500_000.0, "Europe"),
                row("Europe", "Historical", "EV sales share", "Cars", "EV", 2023, 0.0, "Europe"),
                row("World", "Historical", "EV stock", "Cars", "BEV", 2023, 28_000_000.0, "World"),
            ],
        )
    }

    fn year(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 1, 1).unwrap()
    }

    #[test]
    fn test_filters_and_maps_metrics() {
        let fragment = IeaExtractor::new().extract_grid(&sample()).unwrap();
        let norway = fragment.get("Norway", year(2023)).unwrap();

        assert_eq!(norway.get(Metric::SalesBevs), Some(104_000.0));
        assert_eq!(norway.get(Metric::SalesPhevs), Some(11_000.0));
        assert_eq!(norway.get(Metric::SalesShareEvs), Some(0.92));
        assert_eq!(norway.get(Metric::StockShareEvs), Some(0.29));
        assert!(fragment.get("Norway", year(2030)).is_none());
        assert_eq!(fragment.granularity, Granularity::Annual);
    }

    #[test]
    fn test_total_derived_from_share() {
        let fragment = IeaExtractor::new().extract_grid(&sample()).unwrap();
        let norway = fragment.get("Norway", year(2023)).unwrap();

        let total = 115_000.0 / 0.92;
        assert_eq!(norway.get(Metric::SalesTotal), Some(total));
        assert_eq!(norway.get(Metric::SalesShareBevs), Some(104_000.0 / total));

        // Zero share: no total rather than infinity
        let europe = fragment.get("Europe", year(2023)).unwrap();
        assert_eq!(europe.get(Metric::SalesTotal), None);
        assert!(fragment.validate().is_ok());
    }

    #[test]
    fn test_entity_types() {
        let fragment = IeaExtractor::new().extract_grid(&sample()).unwrap();
        let kind = |e: &str| fragment.get(e, year(2023)).unwrap().entity_type;
        assert_eq!(kind("Norway"), EntityType::Country);
        assert_eq!(kind("Europe"), EntityType::Group);
        assert_eq!(kind("World"), EntityType::World);
    }

    #[test]
    fn test_missing_column() {
        let mut rows = vec![header()];
        rows[0].truncate(8);
        let grid = Grid::from_rows("EVDataExplorer2025.xlsx [GEVO_EV_2025]", rows);
        let err = IeaExtractor::new().extract_grid(&grid).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref column, .. } if column == "Aggregate group"));
    }
}
