// 🌍 Our World in Data - electric car sales (IEA-derived, annual)

use super::{list_files, CsvTable, SourceExtractor, SourceType};
use crate::coerce::{percent_to_fraction, Scalar};
use crate::errors::{Error, Result};
use crate::period::{parse_year, Granularity};
use crate::schema::{EntityTags, Fragment, Metric};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const FILE_NAME: &str = "Electric car sales (IEA, 2025) - data.csv";

const TAGS: EntityTags = EntityTags {
    groups: &["European Union (27)", "Europe"],
    alternates: &[],
    world: &["World"],
};

/// Native column -> canonical metric, and whether it is given in percent
const COLUMNS: [(&str, Metric, bool); 12] = [
    ("ev_sales_share", Metric::SalesShareEvs, true),
    ("ev_stock_share", Metric::StockShareEvs, true),
    ("bev_share_car_sales", Metric::SalesShareBevs, true),
    ("phev_share_car_sales", Metric::SalesSharePhevs, true),
    ("bev_sales", Metric::SalesBevs, false),
    ("phev_sales", Metric::SalesPhevs, false),
    ("ev_sales", Metric::SalesEvs, false),
    ("bev_stock", Metric::StockBevs, false),
    ("phev_stock", Metric::StockPhevs, false),
    ("ev_stock", Metric::StockEvs, false),
    ("total_cars_sold", Metric::SalesTotal, false),
    ("non_ev_cars_sold", Metric::SalesIce, false),
];

pub struct OwidExtractor;

impl OwidExtractor {
    pub fn new() -> Self {
        OwidExtractor
    }

    pub fn extract_table(&self, table: &CsvTable) -> Result<Fragment> {
        let c_entity = table.column("Entity")?;
        let c_year = table.column("year")?;

        // Columns missing from a release simply leave their metric absent
        let mapped: Vec<(usize, Metric, bool)> = COLUMNS
            .iter()
            .filter_map(|(name, metric, percent)| {
                table.optional_column(name).map(|c| (c, *metric, *percent))
            })
            .collect();

        let mut fragment = Fragment::new(SourceType::Owid.code(), Granularity::Annual);
        let mut seen = HashSet::new();

        for (i, record) in table.records.iter().enumerate() {
            let entity = record.get(c_entity).unwrap_or("");
            let year_text = record.get(c_year).unwrap_or("");
            let year = parse_year(year_text.to_int()).ok_or_else(|| {
                Error::structural(
                    table.file.clone(),
                    format!("year on line {}", i + 2),
                    "a year",
                    year_text,
                )
            })?;

            if !seen.insert((entity, year)) {
                return Err(Error::structural(
                    table.file.clone(),
                    format!("line {}", i + 2),
                    "one row per entity and year",
                    format!("repeated {} {}", entity, year_text),
                ));
            }

            let row = fragment.entry(entity, year, TAGS.classify(entity));
            for (col, metric, percent) in &mapped {
                let value = record.get(*col).to_float();
                let value = if *percent { percent_to_fraction(value) } else { value };
                row.set_opt(*metric, value);
            }
        }

        tracing::info!(file = %table.file, records = fragment.len(), "extracted OWID car sales");
        Ok(fragment)
    }
}

impl Default for OwidExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for OwidExtractor {
    fn extract(&self, dir: &Path) -> Result<Fragment> {
        let table = CsvTable::open(&dir.join(FILE_NAME))?;
        self.extract_table(&table)
    }

    fn input_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        list_files(dir, |name| name == FILE_NAME)
    }

    fn source_type(&self) -> SourceType {
        SourceType::Owid
    }
}
