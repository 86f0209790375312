// 💾 Fragment cache
//
// One JSON file per source (plus a CSV export for inspection), reused only
// while it is newer than every raw file that contributed to it.

use crate::errors::Result;
use crate::schema::Fragment;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Fresh,
    Stale,
    Missing,
}

#[derive(Debug, Clone)]
pub struct FragmentCache {
    dir: PathBuf,
}

fn modified(path: &Path) -> Result<SystemTime> {
    Ok(fs::metadata(path)?.modified()?)
}

impl FragmentCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FragmentCache { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn json_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    pub fn csv_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name))
    }

    /// Fresh only if the cache file is strictly newer than the newest input.
    /// Without inputs there is nothing to compare against, so the cache is stale.
    pub fn status(&self, name: &str, inputs: &[PathBuf]) -> Result<CacheStatus> {
        let path = self.json_path(name);
        if !path.is_file() {
            return Ok(CacheStatus::Missing);
        }

        let cached_at = modified(&path)?;
        let mut newest_input: Option<SystemTime> = None;
        for input in inputs {
            let t = modified(input)?;
            newest_input = Some(newest_input.map_or(t, |n| n.max(t)));
        }

        match newest_input {
            Some(newest) if cached_at > newest => Ok(CacheStatus::Fresh),
            _ => Ok(CacheStatus::Stale),
        }
    }

    pub fn load(&self, name: &str) -> Result<Fragment> {
        let bytes = fs::read(self.json_path(name))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn store(&self, name: &str, fragment: &Fragment) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.csv_path(name), fragment.to_csv_bytes()?)?;
        // JSON last: its mtime marks the cache as complete
        fs::write(self.json_path(name), serde_json::to_vec(fragment)?)?;
        Ok(())
    }

    pub fn invalidate(&self, name: &str) -> Result<()> {
        for path in [self.json_path(name), self.csv_path(name)] {
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Return the cached fragment when fresh, otherwise compute and store it
    pub fn load_or_compute<F>(&self, name: &str, inputs: &[PathBuf], compute: F) -> Result<Fragment>
    where
        F: FnOnce() -> Result<Fragment>,
    {
        let status = self.status(name, inputs)?;
        if status == CacheStatus::Fresh {
            match self.load(name) {
                Ok(fragment) => {
                    tracing::debug!(name, "using cached fragment");
                    return Ok(fragment);
                }
                Err(e) => tracing::warn!(name, error = %e, "unreadable cache, recomputing"),
            }
        }

        tracing::info!(name, ?status, inputs = inputs.len(), "computing fragment");
        let fragment = compute()?;
        self.store(name, &fragment)?;
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Granularity;
    use crate::schema::{EntityType, Metric};
    use chrono::NaiveDate;
    use std::time::Duration;

    fn sample(bevs: f64) -> Fragment {
        let mut fragment = Fragment::new("robbie_andrew", Granularity::Monthly);
        let record = fragment.entry(
            "Norway",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            EntityType::Country,
        );
        record.set(Metric::SalesTotal, 7_000.0);
        record.set(Metric::SalesBevs, bevs);
        record.derive_shares();
        fragment
    }

    fn touch(path: &Path, offset_secs: i64) {
        let now = SystemTime::now();
        let t = if offset_secs >= 0 {
            now + Duration::from_secs(offset_secs as u64)
        } else {
            now - Duration::from_secs(offset_secs.unsigned_abs())
        };
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(t)
            .unwrap();
    }

    fn input(dir: &Path, offset_secs: i64) -> PathBuf {
        let path = dir.join("all_carsales_monthly.csv");
        fs::write(&path, "Country,YYYYMM,Fuel,Value\n").unwrap();
        touch(&path, offset_secs);
        path
    }

    #[test]
    fn test_missing_cache_is_computed_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path().join("cache"));
        let inputs = vec![input(dir.path(), -100)];

        let fragment = cache.load_or_compute("robbie_andrew", &inputs, || Ok(sample(6_000.0))).unwrap();
        assert_eq!(fragment, sample(6_000.0));
        assert!(cache.json_path("robbie_andrew").is_file());
        assert!(cache.csv_path("robbie_andrew").is_file());
        assert_eq!(cache.status("robbie_andrew", &inputs).unwrap(), CacheStatus::Fresh);
    }

    #[test]
    fn test_fresh_cache_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path());
        let inputs = vec![input(dir.path(), -100)];
        cache.store("robbie_andrew", &sample(6_000.0)).unwrap();

        let fragment = cache
            .load_or_compute("robbie_andrew", &inputs, || Ok(sample(1.0)))
            .unwrap();
        assert_eq!(fragment, sample(6_000.0));
        assert_eq!(fragment.digest().unwrap(), sample(6_000.0).digest().unwrap());
    }

    #[test]
    fn test_newer_input_triggers_recomputation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path());
        cache.store("robbie_andrew", &sample(6_000.0)).unwrap();
        let inputs = vec![input(dir.path(), 100)];

        assert_eq!(cache.status("robbie_andrew", &inputs).unwrap(), CacheStatus::Stale);
        let fragment = cache
            .load_or_compute("robbie_andrew", &inputs, || Ok(sample(6_500.0)))
            .unwrap();
        assert_eq!(fragment.value("Norway", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), Metric::SalesBevs), Some(6_500.0));
        assert_eq!(cache.load("robbie_andrew").unwrap(), sample(6_500.0));
    }

    #[test]
    fn test_no_inputs_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path());
        cache.store("extra", &sample(1.0)).unwrap();
        assert_eq!(cache.status("extra", &[]).unwrap(), CacheStatus::Stale);
    }

    #[test]
    fn test_corrupt_cache_is_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path());
        let inputs = vec![input(dir.path(), -100)];
        fs::write(cache.json_path("owid"), b"{not json").unwrap();

        let fragment = cache.load_or_compute("owid", &inputs, || Ok(sample(2.0))).unwrap();
        assert_eq!(fragment, sample(2.0));
    }

    #[test]
    fn test_failed_computation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path().join("cache"));
        let inputs = vec![input(dir.path(), -100)];

        let result = cache.load_or_compute("kba", &inputs, || {
            Err(crate::errors::Error::invariant("fz28_2024_01.xlsx", "sum mismatch"))
        });
        assert!(result.is_err());
        assert!(!cache.json_path("kba").exists());
    }

    #[test]
    fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FragmentCache::new(dir.path());
        cache.store("iea", &sample(1.0)).unwrap();
        cache.invalidate("iea").unwrap();
        assert_eq!(cache.status("iea", &[]).unwrap(), CacheStatus::Missing);
    }
}
