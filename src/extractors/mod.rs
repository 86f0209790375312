// 🏗️ Extractor framework
// One extractor per upstream publisher, all producing canonical fragments

use crate::config::Config;
use crate::errors::{Error, Result};
use crate::schema::Fragment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

pub mod extra;
pub mod iea;
pub mod kba;
pub mod owid;
pub mod robbie_andrew;

pub use extra::ExtraExtractor;
pub use iea::IeaExtractor;
pub use kba::{KbaAggregator, KbaExtractor, KbaTable, VehicleClass};
pub use owid::OwidExtractor;
pub use robbie_andrew::RobbieAndrewExtractor;

// ============================================================================
// CORE TYPES
// ============================================================================

/// SourceType - which publisher a file or fragment comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Kraftfahrt-Bundesamt, table FZ 28 (monthly new registrations, Germany)
    Kba,
    /// Robbie Andrew's monthly car sales compilation
    RobbieAndrew,
    /// IEA Global EV Outlook data explorer
    Iea,
    /// Our World in Data, electric car sales
    Owid,
    /// Manually collected per-country series
    Extra,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::Kba,
        SourceType::RobbieAndrew,
        SourceType::Iea,
        SourceType::Owid,
        SourceType::Extra,
    ];

    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceType::Kba => "Kraftfahrt-Bundesamt FZ 28",
            SourceType::RobbieAndrew => "Robbie Andrew car sales",
            SourceType::Iea => "IEA EV Data Explorer",
            SourceType::Owid => "Our World in Data",
            SourceType::Extra => "Manual extra data",
        }
    }

    /// Short code, also used as the fragment source name
    pub fn code(&self) -> &'static str {
        match self {
            SourceType::Kba => "kba",
            SourceType::RobbieAndrew => "robbie_andrew",
            SourceType::Iea => "iea",
            SourceType::Owid => "owid",
            SourceType::Extra => "extra",
        }
    }

    pub fn from_code(code: &str) -> Option<SourceType> {
        Self::ALL.iter().copied().find(|s| s.code() == code)
    }

    /// Folder name below the data directory
    pub fn subdir(&self) -> &'static str {
        match self {
            SourceType::Kba => "de-kba",
            SourceType::RobbieAndrew => "robbieandrew",
            SourceType::Iea => "iea",
            SourceType::Owid => "owid",
            SourceType::Extra => "vietnam",
        }
    }
}

/// Policy for figures reported as "zero-emission vehicles", which may mix
/// battery-electric with other zero-emission types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZevPolicy {
    /// Count ZEV figures as battery-electric
    FoldIntoBev,
    /// Leave ZEV figures out of every powertrain bucket (they still count in totals)
    Drop,
}

impl ZevPolicy {
    pub fn parse(value: &str) -> Option<ZevPolicy> {
        match value.trim().to_lowercase().as_str() {
            "fold" | "fold_into_bev" | "bev" => Some(ZevPolicy::FoldIntoBev),
            "drop" => Some(ZevPolicy::Drop),
            _ => None,
        }
    }
}

// ============================================================================
// EXTRACTOR TRAIT
// ============================================================================

/// SourceExtractor - turns the raw files of one publisher into a fragment
///
/// Extractors are pure: the same input files always give the same fragment.
pub trait SourceExtractor: Send + Sync {
    /// Read every input file in `dir` and emit one canonical fragment
    fn extract(&self, dir: &Path) -> Result<Fragment>;

    /// Raw files in `dir` this extractor reads (used for cache freshness)
    fn input_files(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn source_type(&self) -> SourceType;

    /// Parser version (bump when output semantics change)
    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Cache entry name; must change whenever settings change the output
    fn cache_key(&self) -> String {
        format!("{}-{}", self.source_type().code(), self.version())
    }
}

/// Files in `dir` whose name satisfies `accept`, sorted by name
pub fn list_files(dir: &Path, accept: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if accept(name) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

/// A headed CSV file with columns looked up by name
pub struct CsvTable {
    pub file: String,
    headers: HashMap<String, usize>,
    pub records: Vec<csv::StringRecord>,
}

impl CsvTable {
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file_name(path), file)
    }

    pub fn from_reader<R: Read>(file: impl Into<String>, reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim_start_matches('\u{feff}').to_string(), i))
            .collect();

        let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CsvTable {
            file: file.into(),
            headers,
            records,
        })
    }

    /// Index of a column the extractor cannot work without
    pub fn column(&self, name: &str) -> Result<usize> {
        self.headers.get(name).copied().ok_or_else(|| Error::MissingColumn {
            file: self.file.clone(),
            column: name.to_string(),
        })
    }

    /// Index of a column that may be absent from some releases
    pub fn optional_column(&self, name: &str) -> Option<usize> {
        self.headers.get(name).copied()
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the publisher of a raw file from its name
pub fn detect_source(file_path: &Path) -> Result<SourceType> {
    let filename = file_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let lower = filename.to_lowercase();

    if kba::parse_file_name(filename).is_some() {
        return Ok(SourceType::Kba);
    }

    if lower == robbie_andrew::FILE_NAME.to_lowercase() {
        return Ok(SourceType::RobbieAndrew);
    }

    if lower.starts_with("evdataexplorer") {
        return Ok(SourceType::Iea);
    }

    if lower.starts_with("electric car sales") {
        return Ok(SourceType::Owid);
    }

    if extra::country_from_file_name(filename).is_some() {
        return Ok(SourceType::Extra);
    }

    Err(Error::Config(format!(
        "Could not detect source type from filename: {}",
        filename
    )))
}

/// Get the extractor for a source, configured with its per-source policies
pub fn get_extractor(source_type: SourceType, config: &Config) -> Box<dyn SourceExtractor> {
    match source_type {
        SourceType::Kba => Box::new(KbaExtractor::new()),
        SourceType::RobbieAndrew => Box::new(
            RobbieAndrewExtractor::new()
                .with_zev_policy(config.zev_policy)
                .with_drop_before_year(config.drop_before_year),
        ),
        SourceType::Iea => Box::new(IeaExtractor::new()),
        SourceType::Owid => Box::new(OwidExtractor::new()),
        SourceType::Extra => Box::new(ExtraExtractor::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_codes_roundtrip() {
        for s in SourceType::ALL {
            assert_eq!(SourceType::from_code(s.code()), Some(s));
        }
        assert_eq!(SourceType::from_code("acea"), None);
    }

    #[test]
    fn test_detect_source() {
        let cases = [
            ("fz28_2024_03.xlsx", SourceType::Kba),
            ("all_carsales_monthly.csv", SourceType::RobbieAndrew),
            ("EVDataExplorer2025.xlsx", SourceType::Iea),
            ("Electric car sales (IEA, 2025) - data.csv", SourceType::Owid),
            ("vietnam_ev_sales_share.csv", SourceType::Extra),
        ];
        for (name, expected) in cases {
            assert_eq!(detect_source(Path::new(name)).unwrap(), expected, "{}", name);
        }
    }

    #[test]
    fn test_detect_source_unknown() {
        assert!(detect_source(Path::new("fz28_aggregated.csv")).is_err());
        assert!(detect_source(Path::new("notes.txt")).is_err());
    }

    #[test]
    fn test_get_extractor_matches_source() {
        let config = Config::new("data");
        for s in SourceType::ALL {
            assert_eq!(get_extractor(s, &config).source_type(), s);
        }
    }

    #[test]
    fn test_zev_policy_parse() {
        assert_eq!(ZevPolicy::parse("Fold"), Some(ZevPolicy::FoldIntoBev));
        assert_eq!(ZevPolicy::parse("drop"), Some(ZevPolicy::Drop));
        assert_eq!(ZevPolicy::parse("average"), None);
    }

    #[test]
    fn test_csv_table_columns() {
        let data = "\u{feff}Country, YYYYMM ,Fuel,Value\nNorway,202401,BatteryElectric,7000\n";
        let table = CsvTable::from_reader("all_carsales_monthly.csv", data.as_bytes()).unwrap();
        assert_eq!(table.column("Country").unwrap(), 0);
        assert_eq!(table.column("YYYYMM").unwrap(), 1);
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].get(3), Some("7000"));

        match table.column("Region").unwrap_err() {
            Error::MissingColumn { file, column } => {
                assert_eq!(file, "all_carsales_monthly.csv");
                assert_eq!(column, "Region");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["fz28_2024_02.xlsx", "fz28_2024_01.xlsx", "readme.md"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("fz28_2024_03.xlsx")).unwrap();

        let files = list_files(dir.path(), |n| n.starts_with("fz28_")).unwrap();
        let names: Vec<String> = files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["fz28_2024_01.xlsx", "fz28_2024_02.xlsx"]);
    }
}
