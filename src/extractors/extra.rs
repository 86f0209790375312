// ✍️ Manually collected per-country series
//
// `<country>_ev_sales_share.csv` with columns YYYYMM, bev_sales_share (percent).
// The collected countries have no meaningful plug-in hybrid sales, so the
// PHEV share is recorded as a reported zero and the EV share equals the BEV share.

use super::{file_name, list_files, CsvTable, SourceExtractor, SourceType};
use crate::coerce::{percent_to_fraction, Scalar};
use crate::errors::{Error, Result};
use crate::period::{parse_month, Granularity};
use crate::schema::{EntityType, Fragment, Metric};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static FILE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([a-z]+(?:_[a-z]+)*)_ev_sales_share\.csv$").expect("valid pattern")
});

/// Country named by a file such as `south_korea_ev_sales_share.csv` ("South Korea")
pub fn country_from_file_name(name: &str) -> Option<String> {
    let stem = FILE_PATTERN.captures(name)?.get(1)?.as_str();
    let words: Vec<String> = stem
        .split('_')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    Some(words.join(" "))
}

pub struct ExtraExtractor;

impl ExtraExtractor {
    pub fn new() -> Self {
        ExtraExtractor
    }

    /// Add one country's series to `fragment`
    pub fn extract_table(&self, country: &str, table: &CsvTable, fragment: &mut Fragment) -> Result<()> {
        let c_month = table.column("YYYYMM")?;
        let c_share = table.column("bev_sales_share")?;

        for (i, record) in table.records.iter().enumerate() {
            let label = record.get(c_month).unwrap_or("");
            let month = parse_month(label).ok_or_else(|| {
                Error::structural(
                    table.file.clone(),
                    format!("YYYYMM on line {}", i + 2),
                    "a month such as 202401",
                    label,
                )
            })?;

            // An empty cell says nothing about the month, not even the PHEV zero
            let Some(bev_share) = percent_to_fraction(record.get(c_share).to_float()) else {
                continue;
            };
            let row = fragment.entry(country, month, EntityType::Country);
            row.set(Metric::SalesShareBevs, bev_share);
            row.set(Metric::SalesSharePhevs, 0.0);
            row.set(Metric::SalesShareEvs, bev_share);
        }

        tracing::debug!(file = %table.file, country, rows = table.records.len(), "read extra series");
        Ok(())
    }
}

impl Default for ExtraExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for ExtraExtractor {
    fn extract(&self, dir: &Path) -> Result<Fragment> {
        let mut fragment = Fragment::new(SourceType::Extra.code(), Granularity::Monthly);

        for path in self.input_files(dir)? {
            let name = file_name(&path);
            let Some(country) = country_from_file_name(&name) else {
                continue;
            };
            let table = CsvTable::open(&path)?;
            self.extract_table(&country, &table, &mut fragment)?;
        }

        tracing::info!(dir = %dir.display(), records = fragment.len(), "extracted extra data");
        Ok(fragment)
    }

    fn input_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        list_files(dir, |name| country_from_file_name(name).is_some())
    }

    fn source_type(&self) -> SourceType {
        SourceType::Extra
    }
}
