// 📈 Robbie Andrew - monthly car sales by country and fuel
//
// Long CSV (Country, YYYYMM, Fuel, Value) pivoted to one record per
// country and month. Totals are the sum over all fuels.

use super::{list_files, CsvTable, SourceExtractor, SourceType, ZevPolicy};
use crate::coerce::{ratio, sum_known, Scalar};
use crate::errors::{Error, Result};
use crate::period::{parse_month, Granularity};
use crate::schema::{EntityTags, Fragment, Metric};
use chrono::{Datelike, NaiveDate};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const FILE_NAME: &str = "all_carsales_monthly.csv";

const TAGS: EntityTags = EntityTags {
    groups: &["EFTA", "EU + EFTA + UK", "EUROPEAN UNION"],
    alternates: &["California CNCDA", "United Kingdom SMMT"],
    world: &[],
};

/// Canonical bucket of a fuel label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Bev,
    Phev,
    /// Reported as "zero-emission"; handled per `ZevPolicy`
    Zev,
    /// Counted in the total only
    Other,
}

fn bucket(fuel: &str) -> Bucket {
    match fuel {
        "BatteryElectric" => Bucket::Bev,
        // Spelling changed between releases
        "PluginHybrid" | "Plug_inHybrid" => Bucket::Phev,
        "ZEV" => Bucket::Zev,
        _ => Bucket::Other,
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Pivot {
    bev: Option<f64>,
    phev: Option<f64>,
    zev: Option<f64>,
    total: Option<f64>,
}

fn accumulate(slot: &mut Option<f64>, value: f64) {
    *slot = Some(slot.unwrap_or(0.0) + value);
}

pub struct RobbieAndrewExtractor {
    zev_policy: ZevPolicy,
    drop_before_year: i32,
}

impl RobbieAndrewExtractor {
    pub fn new() -> Self {
        RobbieAndrewExtractor {
            zev_policy: ZevPolicy::FoldIntoBev,
            drop_before_year: 2005,
        }
    }

    /// Some countries only report ZEV figures; folding keeps them visible as BEV
    pub fn with_zev_policy(mut self, policy: ZevPolicy) -> Self {
        self.zev_policy = policy;
        self
    }

    pub fn with_drop_before_year(mut self, year: i32) -> Self {
        self.drop_before_year = year;
        self
    }

    pub fn extract_table(&self, table: &CsvTable) -> Result<Fragment> {
        let c_country = table.column("Country")?;
        let c_month = table.column("YYYYMM")?;
        let c_fuel = table.column("Fuel")?;
        let c_value = table.column("Value")?;

        let mut pivot: BTreeMap<(String, NaiveDate), Pivot> = BTreeMap::new();
        let mut seen: HashSet<(String, NaiveDate, String)> = HashSet::new();

        for (i, record) in table.records.iter().enumerate() {
            let line = i + 2;
            let country = record.get(c_country).unwrap_or("").to_string();
            let label = record.get(c_month).unwrap_or("");
            let fuel = record.get(c_fuel).unwrap_or("").to_string();

            let month = parse_month(label).ok_or_else(|| {
                Error::structural(
                    table.file.clone(),
                    format!("YYYYMM on line {}", line),
                    "a month such as 202401",
                    label,
                )
            })?;

            if !seen.insert((country.clone(), month, fuel.clone())) {
                return Err(Error::structural(
                    table.file.clone(),
                    format!("line {}", line),
                    "one value per country, month and fuel",
                    format!("repeated {} {} {}", country, label, fuel),
                ));
            }

            // Empty or non-numeric values stay unknown
            let Some(value) = record.get(c_value).to_float() else {
                continue;
            };

            let entry = pivot.entry((country, month)).or_default();
            accumulate(&mut entry.total, value);
            match bucket(&fuel) {
                Bucket::Bev => accumulate(&mut entry.bev, value),
                Bucket::Phev => accumulate(&mut entry.phev, value),
                Bucket::Zev => accumulate(&mut entry.zev, value),
                Bucket::Other => {}
            }
        }

        let mut fragment = Fragment::new(SourceType::RobbieAndrew.code(), Granularity::Monthly);
        let mut dropped_empty = 0usize;
        let mut dropped_early = 0usize;

        for ((country, month), row) in pivot {
            let total = match row.total {
                Some(t) if t != 0.0 => t,
                _ => {
                    dropped_empty += 1;
                    continue;
                }
            };
            if month.year() < self.drop_before_year {
                dropped_early += 1;
                continue;
            }

            let bevs = match self.zev_policy {
                ZevPolicy::FoldIntoBev => sum_known([row.bev, row.zev]),
                ZevPolicy::Drop => row.bev,
            };
            // BEV and EV shares are always present; an unreported BEV count reads as none sold
            let evs = bevs.unwrap_or(0.0) + row.phev.unwrap_or(0.0);

            let record = fragment.entry(&country, month, TAGS.classify(&country));
            record.set(Metric::SalesTotal, total);
            record.set_opt(Metric::SalesBevs, bevs);
            record.set_opt(Metric::SalesPhevs, row.phev);
            record.set(Metric::SalesEvs, evs);
            record.set_opt(Metric::SalesShareBevs, ratio(Some(bevs.unwrap_or(0.0)), Some(total)));
            record.derive_shares();
        }

        tracing::info!(
            file = %table.file,
            records = fragment.len(),
            dropped_empty,
            dropped_early,
            "extracted Robbie Andrew car sales"
        );
        Ok(fragment)
    }
}

impl Default for RobbieAndrewExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceExtractor for RobbieAndrewExtractor {
    fn extract(&self, dir: &Path) -> Result<Fragment> {
        let table = CsvTable::open(&dir.join(FILE_NAME))?;
        self.extract_table(&table)
    }

    fn input_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        list_files(dir, |name| name == FILE_NAME)
    }

    fn source_type(&self) -> SourceType {
        SourceType::RobbieAndrew
    }

    fn cache_key(&self) -> String {
        let policy = match self.zev_policy {
            ZevPolicy::FoldIntoBev => "zev-bev",
            ZevPolicy::Drop => "zev-drop",
        };
        format!(
            "{}-{}-{}-from{}",
            self.source_type().code(),
            self.version(),
            policy,
            self.drop_before_year
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::EntityType;

    const SAMPLE: &str = "\
Country,YYYYMM,Fuel,Value
Norway,202401,BatteryElectric,6000
Norway,202401,PluginHybrid,300
Norway,202401,Plug_inHybrid,100
Norway,202401,Petrol,400
Norway,202401,Diesel,200
Iceland,202401,ZEV,50
Iceland,202401,Petrol,150
EFTA,202401,BatteryElectric,7000
EFTA,202401,Petrol,3000
California CNCDA,202401,BatteryElectric,25000
California CNCDA,202401,Petrol,75000
Greece,202401,BatteryElectric,
Greece,202401,Petrol,0
Norway,200412,BatteryElectric,10
Norway,200412,Petrol,1000
";

    fn table(data: &str) -> CsvTable {
        CsvTable::from_reader(FILE_NAME, data.as_bytes()).unwrap()
    }

    fn jan_2024() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn test_pivot_and_plug_in_spellings() {
        let fragment = RobbieAndrewExtractor::new().extract_table(&table(SAMPLE)).unwrap();
        let norway = fragment.get("Norway", jan_2024()).unwrap();

        assert_eq!(norway.get(Metric::SalesTotal), Some(7000.0));
        assert_eq!(norway.get(Metric::SalesBevs), Some(6000.0));
        assert_eq!(norway.get(Metric::SalesPhevs), Some(400.0));
        assert_eq!(norway.get(Metric::SalesEvs), Some(6400.0));
        assert_eq!(norway.get(Metric::SalesShareEvs), Some(6400.0 / 7000.0));
        assert_eq!(fragment.granularity, Granularity::Monthly);
    }

    #[test]
    fn test_zev_fold_policy() {
        let folded = RobbieAndrewExtractor::new().extract_table(&table(SAMPLE)).unwrap();
        let iceland = folded.get("Iceland", jan_2024()).unwrap();
        assert_eq!(iceland.get(Metric::SalesBevs), Some(50.0));
        assert_eq!(iceland.get(Metric::SalesShareBevs), Some(0.25));

        let dropped = RobbieAndrewExtractor::new()
            .with_zev_policy(ZevPolicy::Drop)
            .extract_table(&table(SAMPLE))
            .unwrap();
        let iceland = dropped.get("Iceland", jan_2024()).unwrap();
        assert_eq!(iceland.get(Metric::SalesBevs), None);
        assert_eq!(iceland.get(Metric::SalesShareBevs), Some(0.0));
        // ZEV still counts toward the total
        assert_eq!(iceland.get(Metric::SalesTotal), Some(200.0));
        // Nothing was reported for plug-in hybrids
        assert_eq!(iceland.get(Metric::SalesSharePhevs), None);
    }

    #[test]
    fn test_empty_and_early_rows_dropped() {
        let fragment = RobbieAndrewExtractor::new().extract_table(&table(SAMPLE)).unwrap();
        assert!(fragment.get("Greece", jan_2024()).is_none());
        assert!(fragment
            .get("Norway", NaiveDate::from_ymd_opt(2004, 12, 1).unwrap())
            .is_none());

        let all = RobbieAndrewExtractor::new()
            .with_drop_before_year(2000)
            .extract_table(&table(SAMPLE))
            .unwrap();
        assert!(all
            .get("Norway", NaiveDate::from_ymd_opt(2004, 12, 1).unwrap())
            .is_some());
    }

    #[test]
    fn test_entity_tags() {
        let fragment = RobbieAndrewExtractor::new().extract_table(&table(SAMPLE)).unwrap();
        let kind = |e: &str| fragment.get(e, jan_2024()).unwrap().entity_type;
        assert_eq!(kind("EFTA"), EntityType::Group);
        assert_eq!(kind("California CNCDA"), EntityType::CountryAlt);
        assert_eq!(kind("Norway"), EntityType::Country);
    }

    #[test]
    fn test_missing_column() {
        let err = RobbieAndrewExtractor::new()
            .extract_table(&table("Country,YYYYMM,Fuel\nNorway,202401,Petrol\n"))
            .unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref column, .. } if column == "Value"));
    }

    #[test]
    fn test_bad_month_is_structural() {
        let err = RobbieAndrewExtractor::new()
            .extract_table(&table("Country,YYYYMM,Fuel,Value\nNorway,Jan 24,Petrol,1\n"))
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_repeated_value_is_structural() {
        let data = "Country,YYYYMM,Fuel,Value\nNorway,202401,Petrol,1\nNorway,202401,Petrol,2\n";
        assert!(RobbieAndrewExtractor::new()
            .extract_table(&table(data))
            .unwrap_err()
            .is_structural());
    }

    #[test]
    fn test_cache_key_follows_settings() {
        let default = RobbieAndrewExtractor::new();
        let dropped = RobbieAndrewExtractor::new().with_zev_policy(ZevPolicy::Drop);
        let later = RobbieAndrewExtractor::new().with_drop_before_year(2015);
        assert_eq!(default.cache_key(), "robbie_andrew-1.0.0-zev-bev-from2005");
        assert_ne!(default.cache_key(), dropped.cache_key());
        assert_ne!(default.cache_key(), later.cache_key());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let a = RobbieAndrewExtractor::new().extract_table(&table(SAMPLE)).unwrap();
        let b = RobbieAndrewExtractor::new().extract_table(&table(SAMPLE)).unwrap();
        assert_eq!(a.to_csv_bytes().unwrap(), b.to_csv_bytes().unwrap());
        assert!(a.validate().is_ok());
    }
}
