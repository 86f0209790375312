// 🚚 Pipeline - load every source (through the cache) and merge
//
// A source that fails to extract is reported to the caller; it is never
// dropped from the merge silently.

use crate::cache::FragmentCache;
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::extractors::{get_extractor, KbaAggregator, KbaTable, SourceType};
use crate::merge::{MergeEngine, MergeReport};
use crate::quality::{QualityEngine, QualityReport};
use crate::schema::Fragment;

pub struct Pipeline {
    config: Config,
    cache: FragmentCache,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let cache = FragmentCache::new(config.cache_dir.clone());
        Pipeline { config, cache }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &FragmentCache {
        &self.cache
    }

    /// Canonical fragment of one source; any failure is wrapped with the source name
    pub fn load_source(&self, source: SourceType) -> Result<Fragment> {
        self.try_load_source(source)
            .map_err(|e| Error::source_failed(source.code(), e))
    }

    fn try_load_source(&self, source: SourceType) -> Result<Fragment> {
        let extractor = get_extractor(source, &self.config);
        let dir = self.config.source_dir(source);
        tracing::info!(source = source.code(), dir = %dir.display(), "loading source");

        let extract = || extractor.extract(&dir).and_then(checked);
        if !self.config.use_cache {
            return extract();
        }

        let inputs = extractor.input_files(&dir)?;
        // Cache files written before a value went out of range are checked too
        self.cache
            .load_or_compute(&extractor.cache_key(), &inputs, extract)
            .and_then(checked)
    }

    /// Load sources in the given order, stopping at the first failure
    pub fn load_sources(&self, sources: &[SourceType]) -> Result<Vec<Fragment>> {
        sources.iter().map(|s| self.load_source(*s)).collect()
    }

    pub fn merge_sources(&self, sources: &[SourceType]) -> Result<MergeReport> {
        let fragments = self.load_sources(sources)?;
        let engine = MergeEngine::with_policy(self.config.merge.clone());
        Ok(engine.merge(&fragments))
    }

    /// Quality-check every source; a source that fails to load is collected, not skipped
    pub fn check_sources(&self, engine: &QualityEngine, sources: &[SourceType]) -> SourceChecks {
        let mut checks = SourceChecks::default();
        for source in sources {
            match self.load_source(*source) {
                Ok(fragment) => checks.reports.push(engine.check(&fragment)),
                Err(e) => checks.failures.push((*source, e)),
            }
        }
        checks
    }

    /// Full monthly KBA table (all vehicle classes), uncached
    pub fn kba_table(&self) -> Result<KbaTable> {
        KbaAggregator::aggregate_dir(&self.config.source_dir(SourceType::Kba))
            .map_err(|e| Error::source_failed(SourceType::Kba.code(), e))
    }
}

#[derive(Debug, Default)]
pub struct SourceChecks {
    pub reports: Vec<QualityReport>,
    pub failures: Vec<(SourceType, Error)>,
}

impl SourceChecks {
    pub fn all_loaded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reject a fragment that would put out-of-range values into the merge
fn checked(fragment: Fragment) -> Result<Fragment> {
    match fragment.validate() {
        Ok(()) => Ok(fragment),
        Err(errors) => Err(Error::InvalidFragment {
            source_name: fragment.source.clone(),
            count: errors.len(),
            first: errors.first().map(|e| e.to_string()).unwrap_or_default(),
        }),
    }
}

/// Merge all sources into one canonical table
pub fn merge_all_ev_data(config: &Config) -> Result<MergeReport> {
    Pipeline::new(config.clone()).merge_sources(&SourceType::ALL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{owid, robbie_andrew};
    use crate::schema::Metric;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;

    fn write_sources(root: &Path) {
        for source in [SourceType::RobbieAndrew, SourceType::Owid, SourceType::Extra] {
            fs::create_dir_all(root.join(source.subdir())).unwrap();
        }
        fs::write(
            root.join("robbieandrew").join(robbie_andrew::FILE_NAME),
            "Country,YYYYMM,Fuel,Value\nNorway,202301,BatteryElectric,8000\nNorway,202301,Petrol,400\n",
        )
        .unwrap();
        fs::write(
            root.join("owid").join(owid::FILE_NAME),
            "Entity,year,ev_sales_share,bev_sales,total_cars_sold,ev_stock\nNorway,2023,90.5,104000,126000,800000\n",
        )
        .unwrap();
        fs::write(
            root.join("vietnam").join("vietnam_ev_sales_share.csv"),
            "YYYYMM,bev_sales_share\n2024-01,12.5\n",
        )
        .unwrap();
    }

    const CSV_SOURCES: [SourceType; 3] = [SourceType::RobbieAndrew, SourceType::Owid, SourceType::Extra];

    #[test]
    fn test_merge_csv_sources() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        let pipeline = Pipeline::new(Config::new(dir.path()));

        let report = pipeline.merge_sources(&CSV_SOURCES).unwrap();
        let jan_2023 = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let jan_2024 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        // Monthly January figure wins over the annual one on the shared key
        assert_eq!(report.merged.value("Norway", jan_2023, Metric::SalesBevs), Some(8_000.0));
        assert_eq!(report.source_of("Norway", jan_2023, Metric::SalesBevs), Some("robbie_andrew"));
        assert_eq!(report.merged.value("Norway", jan_2023, Metric::SalesShareEvs), Some(8_000.0 / 8_400.0));
        // Metric only the annual source has fills in
        assert_eq!(report.merged.value("Norway", jan_2023, Metric::StockEvs), Some(800_000.0));
        assert_eq!(report.source_of("Norway", jan_2023, Metric::StockEvs), Some("owid"));
        assert_eq!(report.merged.value("Vietnam", jan_2024, Metric::SalesShareBevs), Some(0.125));
        assert!(report.merged.validate().is_ok());
    }

    #[test]
    fn test_cached_and_fresh_runs_agree() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());

        let cached = Pipeline::new(Config::new(dir.path()));
        let first = cached.load_source(SourceType::RobbieAndrew).unwrap();
        let second = cached.load_source(SourceType::RobbieAndrew).unwrap();

        let mut config = Config::new(dir.path());
        config.use_cache = false;
        let uncached = Pipeline::new(config).load_source(SourceType::RobbieAndrew).unwrap();

        assert_eq!(first.digest().unwrap(), second.digest().unwrap());
        assert_eq!(first.digest().unwrap(), uncached.digest().unwrap());
        assert!(cached
            .cache()
            .json_path("robbie_andrew-1.0.0-zev-bev-from2005")
            .is_file());
    }

    #[test]
    fn test_failing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        fs::write(
            dir.path().join("owid").join(owid::FILE_NAME),
            "Entity,ev_sales_share\nNorway,90\n",
        )
        .unwrap();

        let err = Pipeline::new(Config::new(dir.path()))
            .merge_sources(&CSV_SOURCES)
            .unwrap_err();
        match err {
            Error::SourceFailed { source_name, error } => {
                assert_eq!(source_name, "owid");
                assert!(matches!(*error, Error::MissingColumn { .. }));
            }
            other => panic!("expected SourceFailed, got {other}"),
        }
    }

    #[test]
    fn test_out_of_range_share_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        fs::write(
            dir.path().join("vietnam").join("vietnam_ev_sales_share.csv"),
            "YYYYMM,bev_sales_share\n2024-01,12.5\n2024-02,150\n",
        )
        .unwrap();
        let pipeline = Pipeline::new(Config::new(dir.path()));

        let err = pipeline.merge_sources(&[SourceType::Extra]).unwrap_err();
        match err {
            Error::SourceFailed { source_name, error } => {
                assert_eq!(source_name, "extra");
                match *error {
                    Error::InvalidFragment { count, first, .. } => {
                        assert_eq!(count, 2);
                        assert!(first.contains("Vietnam 2024-02-01"), "{first}");
                    }
                    other => panic!("expected InvalidFragment, got {other}"),
                }
            }
            other => panic!("expected SourceFailed, got {other}"),
        }
        // Nothing was cached for the rejected fragment
        let key = get_extractor(SourceType::Extra, pipeline.config()).cache_key();
        assert!(!pipeline.cache().json_path(&key).exists());
    }

    #[test]
    fn test_check_collects_failing_sources() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path());
        let pipeline = Pipeline::new(Config::new(dir.path()));

        let checks = pipeline.check_sources(&QualityEngine::new(), &[SourceType::Kba, SourceType::Owid]);
        assert!(!checks.all_loaded());
        assert_eq!(checks.reports.len(), 1);
        assert_eq!(checks.reports[0].source, "owid");
        assert_eq!(checks.failures.len(), 1);
        assert_eq!(checks.failures[0].0, SourceType::Kba);

        let checks = pipeline.check_sources(&QualityEngine::new(), &CSV_SOURCES);
        assert!(checks.all_loaded());
        assert_eq!(checks.reports.len(), 3);
    }

    #[test]
    fn test_missing_source_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Pipeline::new(Config::new(dir.path()))
            .load_source(SourceType::Kba)
            .unwrap_err();
        assert!(err.to_string().contains("kba"));
    }
}
