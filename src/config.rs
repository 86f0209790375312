// ⚙️ Configuration
//
// Paths and per-source policies, read from the environment (a `.env` file
// is honoured by the binary). Every setting has a default.

use crate::errors::{Error, Result};
use crate::extractors::{SourceType, ZevPolicy};
use crate::merge::MergePolicy;
use std::path::{Path, PathBuf};

pub const ENV_DATA_DIR: &str = "EV_DATA_DIR";
pub const ENV_CACHE_DIR: &str = "EV_CACHE_DIR";
pub const ENV_ZEV_POLICY: &str = "EV_ZEV_POLICY";
pub const ENV_DROP_BEFORE_YEAR: &str = "EV_DROP_BEFORE_YEAR";
pub const ENV_MERGE_PRIORITY: &str = "EV_MERGE_PRIORITY";
pub const ENV_PREFER_FINER: &str = "EV_PREFER_FINER";
pub const ENV_USE_CACHE: &str = "EV_USE_CACHE";

#[derive(Debug, Clone)]
pub struct Config {
    /// Root folder holding one subfolder per source
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub use_cache: bool,
    /// What to do with Robbie Andrew's ambiguous "ZEV" fuel bucket
    pub zev_policy: ZevPolicy,
    /// Robbie Andrew rows before this year are dropped
    pub drop_before_year: i32,
    pub merge: MergePolicy,
}

impl Config {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Config {
            cache_dir: data_dir.join("cache"),
            data_dir,
            use_cache: true,
            zev_policy: ZevPolicy::FoldIntoBev,
            drop_before_year: 2005,
            merge: MergePolicy::default(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (environment, test maps)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::new(lookup(ENV_DATA_DIR).unwrap_or_else(|| "data".to_string()));

        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            config.cache_dir = PathBuf::from(dir);
        }

        if let Some(flag) = lookup(ENV_USE_CACHE) {
            config.use_cache = parse_bool(ENV_USE_CACHE, &flag)?;
        }

        if let Some(policy) = lookup(ENV_ZEV_POLICY) {
            config.zev_policy = ZevPolicy::parse(&policy).ok_or_else(|| {
                Error::Config(format!("{} must be 'fold' or 'drop', got {:?}", ENV_ZEV_POLICY, policy))
            })?;
        }

        if let Some(year) = lookup(ENV_DROP_BEFORE_YEAR) {
            config.drop_before_year = year.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a year, got {:?}", ENV_DROP_BEFORE_YEAR, year))
            })?;
        }

        if let Some(list) = lookup(ENV_MERGE_PRIORITY) {
            let priority: Vec<String> = list
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
            for name in &priority {
                if SourceType::from_code(name).is_none() {
                    return Err(Error::Config(format!(
                        "{} lists unknown source {:?}",
                        ENV_MERGE_PRIORITY, name
                    )));
                }
            }
            config.merge.priority = priority;
        }

        if let Some(flag) = lookup(ENV_PREFER_FINER) {
            config.merge.prefer_finer = parse_bool(ENV_PREFER_FINER, &flag)?;
        }

        Ok(config)
    }

    /// Folder holding the raw files of one source
    pub fn source_dir(&self, source: SourceType) -> PathBuf {
        self.data_dir.join(source.subdir())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{} must be a boolean, got {:?}", key, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.cache_dir, PathBuf::from("data/cache"));
        assert_eq!(config.zev_policy, ZevPolicy::FoldIntoBev);
        assert_eq!(config.drop_before_year, 2005);
        assert!(config.use_cache);
        assert_eq!(
            config.source_dir(SourceType::Kba),
            PathBuf::from("data/de-kba")
        );
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_DATA_DIR, "/srv/ev"),
            (ENV_ZEV_POLICY, "drop"),
            (ENV_DROP_BEFORE_YEAR, "2010"),
            (ENV_MERGE_PRIORITY, "iea, owid"),
            (ENV_PREFER_FINER, "false"),
            (ENV_USE_CACHE, "no"),
        ]))
        .unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/srv/ev/cache"));
        assert_eq!(config.zev_policy, ZevPolicy::Drop);
        assert_eq!(config.drop_before_year, 2010);
        assert_eq!(config.merge.priority, vec!["iea".to_string(), "owid".to_string()]);
        assert!(!config.merge.prefer_finer);
        assert!(!config.use_cache);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[(ENV_ZEV_POLICY, "maybe")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_DROP_BEFORE_YEAR, "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_MERGE_PRIORITY, "iea,acea")])).is_err());
        assert!(Config::from_lookup(lookup(&[(ENV_PREFER_FINER, "2")])).is_err());
    }
}
