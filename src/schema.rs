// 📐 Canonical schema
//
// Long format: one record per (entity, period) with a sparse set of metrics
// from a fixed vocabulary. An absent metric is unknown; it is never zero.

use crate::errors::Result;
use crate::period::Granularity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

// ============================================================================
// METRIC VOCABULARY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    StockTotal,
    StockIce,
    StockBevs,
    StockPhevs,
    StockFcevs,
    StockEvs,
    StockShareIce,
    StockShareBevs,
    StockSharePhevs,
    StockShareFcevs,
    StockShareEvs,
    SalesTotal,
    SalesIce,
    SalesBevs,
    SalesPhevs,
    SalesFcevs,
    SalesEvs,
    SalesShareIce,
    SalesShareBevs,
    SalesSharePhevs,
    SalesShareFcevs,
    SalesShareEvs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Stock,
    Sales,
}

impl Metric {
    pub const ALL: [Metric; 22] = [
        Metric::StockTotal,
        Metric::StockIce,
        Metric::StockBevs,
        Metric::StockPhevs,
        Metric::StockFcevs,
        Metric::StockEvs,
        Metric::StockShareIce,
        Metric::StockShareBevs,
        Metric::StockSharePhevs,
        Metric::StockShareFcevs,
        Metric::StockShareEvs,
        Metric::SalesTotal,
        Metric::SalesIce,
        Metric::SalesBevs,
        Metric::SalesPhevs,
        Metric::SalesFcevs,
        Metric::SalesEvs,
        Metric::SalesShareIce,
        Metric::SalesShareBevs,
        Metric::SalesSharePhevs,
        Metric::SalesShareFcevs,
        Metric::SalesShareEvs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::StockTotal => "stock_total",
            Metric::StockIce => "stock_ice",
            Metric::StockBevs => "stock_bevs",
            Metric::StockPhevs => "stock_phevs",
            Metric::StockFcevs => "stock_fcevs",
            Metric::StockEvs => "stock_evs",
            Metric::StockShareIce => "stock_share_ice",
            Metric::StockShareBevs => "stock_share_bevs",
            Metric::StockSharePhevs => "stock_share_phevs",
            Metric::StockShareFcevs => "stock_share_fcevs",
            Metric::StockShareEvs => "stock_share_evs",
            Metric::SalesTotal => "sales_total",
            Metric::SalesIce => "sales_ice",
            Metric::SalesBevs => "sales_bevs",
            Metric::SalesPhevs => "sales_phevs",
            Metric::SalesFcevs => "sales_fcevs",
            Metric::SalesEvs => "sales_evs",
            Metric::SalesShareIce => "sales_share_ice",
            Metric::SalesShareBevs => "sales_share_bevs",
            Metric::SalesSharePhevs => "sales_share_phevs",
            Metric::SalesShareFcevs => "sales_share_fcevs",
            Metric::SalesShareEvs => "sales_share_evs",
        }
    }

    pub fn from_name(name: &str) -> Option<Metric> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    pub fn is_share(&self) -> bool {
        self.name().contains("_share_")
    }

    /// Absolute sales count; its size depends on the period length
    pub fn is_flow_count(&self) -> bool {
        self.measure() == Measure::Sales && !self.is_share()
    }

    pub fn measure(&self) -> Measure {
        if self.name().starts_with("stock") {
            Measure::Stock
        } else {
            Measure::Sales
        }
    }

    /// Share metric corresponding to an absolute metric (none for totals)
    pub fn share_of(&self) -> Option<Metric> {
        let share = match self {
            Metric::StockIce => Metric::StockShareIce,
            Metric::StockBevs => Metric::StockShareBevs,
            Metric::StockPhevs => Metric::StockSharePhevs,
            Metric::StockFcevs => Metric::StockShareFcevs,
            Metric::StockEvs => Metric::StockShareEvs,
            Metric::SalesIce => Metric::SalesShareIce,
            Metric::SalesBevs => Metric::SalesShareBevs,
            Metric::SalesPhevs => Metric::SalesSharePhevs,
            Metric::SalesFcevs => Metric::SalesShareFcevs,
            Metric::SalesEvs => Metric::SalesShareEvs,
            _ => return None,
        };
        Some(share)
    }

    /// Total the absolute metric is a part of
    pub fn total_of(&self) -> Option<Metric> {
        if self.is_share() || matches!(self, Metric::StockTotal | Metric::SalesTotal) {
            return None;
        }
        Some(match self.measure() {
            Measure::Stock => Metric::StockTotal,
            Measure::Sales => Metric::SalesTotal,
        })
    }
}

// ============================================================================
// ENTITY CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// A sovereign country reported through its standard statistic
    Country,
    /// A country reported under an alternative breakdown; never sum with `Country`
    CountryAlt,
    /// Supranational aggregate of countries; never sum with its members
    Group,
    World,
}

impl EntityType {
    pub fn name(&self) -> &'static str {
        match self {
            EntityType::Country => "Country",
            EntityType::CountryAlt => "CountryAlt",
            EntityType::Group => "Group",
            EntityType::World => "World",
        }
    }

    pub fn from_name(name: &str) -> Option<EntityType> {
        match name.trim() {
            "Country" => Some(EntityType::Country),
            "CountryAlt" => Some(EntityType::CountryAlt),
            "Group" => Some(EntityType::Group),
            "World" => Some(EntityType::World),
            _ => None,
        }
    }
}

/// Static membership lists for one source; unlisted entities are countries
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityTags {
    pub groups: &'static [&'static str],
    pub alternates: &'static [&'static str],
    pub world: &'static [&'static str],
}

impl EntityTags {
    pub fn classify(&self, entity: &str) -> EntityType {
        if self.world.contains(&entity) {
            EntityType::World
        } else if self.groups.contains(&entity) {
            EntityType::Group
        } else if self.alternates.contains(&entity) {
            EntityType::CountryAlt
        } else {
            EntityType::Country
        }
    }
}

// ============================================================================
// RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity_type: EntityType,
    pub metrics: BTreeMap<Metric, f64>,
}

impl Record {
    pub fn new(entity_type: EntityType) -> Self {
        Record {
            entity_type,
            metrics: BTreeMap::new(),
        }
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        self.metrics.get(&metric).copied()
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.metrics.insert(metric, value);
    }

    /// Store a value only when it is known; an unknown value leaves the metric absent
    pub fn set_opt(&mut self, metric: Metric, value: Option<f64>) {
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            self.metrics.insert(metric, v);
        }
    }

    /// Fill in absent share metrics as ratios of absolute metrics to their total
    pub fn derive_shares(&mut self) {
        for metric in Metric::ALL {
            let (Some(share), Some(total)) = (metric.share_of(), metric.total_of()) else {
                continue;
            };
            if self.metrics.contains_key(&share) {
                continue;
            }
            let value = crate::coerce::ratio(self.get(metric), self.get(total));
            self.set_opt(share, value);
        }
    }
}

// ============================================================================
// FRAGMENT
// ============================================================================

pub type Key = (String, NaiveDate);

/// Output of one extractor (or of the merge engine) in canonical schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub source: String,
    pub granularity: Granularity,
    #[serde(with = "records_as_rows")]
    pub records: BTreeMap<Key, Record>,
}

impl Fragment {
    pub fn new(source: impl Into<String>, granularity: Granularity) -> Self {
        Fragment {
            source: source.into(),
            granularity,
            records: BTreeMap::new(),
        }
    }

    /// Record for a key, created with the given classification when missing
    pub fn entry(&mut self, entity: &str, period: NaiveDate, entity_type: EntityType) -> &mut Record {
        self.records
            .entry((entity.to_string(), period))
            .or_insert_with(|| Record::new(entity_type))
    }

    pub fn get(&self, entity: &str, period: NaiveDate) -> Option<&Record> {
        self.records.get(&(entity.to_string(), period))
    }

    pub fn value(&self, entity: &str, period: NaiveDate, metric: Metric) -> Option<f64> {
        self.get(entity, period).and_then(|r| r.get(metric))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn entities(&self) -> BTreeSet<&str> {
        self.records.keys().map(|(e, _)| e.as_str()).collect()
    }

    pub fn periods(&self) -> BTreeSet<NaiveDate> {
        self.records.keys().map(|(_, p)| *p).collect()
    }

    /// Metrics populated in at least one record, in vocabulary order
    pub fn metrics_present(&self) -> Vec<Metric> {
        let present: BTreeSet<Metric> = self
            .records
            .values()
            .flat_map(|r| r.metrics.keys().copied())
            .collect();
        present.into_iter().collect()
    }

    /// Write as CSV: entity, period, entity_type, then one column per present metric
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let metrics = self.metrics_present();
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec!["entity", "period", "entity_type"];
        header.extend(metrics.iter().map(|m| m.name()));
        wtr.write_record(&header)?;

        for ((entity, period), record) in &self.records {
            let mut row = vec![
                entity.clone(),
                period.format("%Y-%m-%d").to_string(),
                record.entity_type.name().to_string(),
            ];
            row.extend(
                metrics
                    .iter()
                    .map(|m| record.get(*m).map(|v| v.to_string()).unwrap_or_default()),
            );
            wtr.write_record(&row)?;
        }

        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    /// SHA-256 of the canonical CSV rendering; equal fragments hash equal
    pub fn digest(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(self.granularity.name().as_bytes());
        hasher.update(self.to_csv_bytes()?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Check schema-level constraints on every record
    pub fn validate(&self) -> ValidationResult {
        let errors: Vec<ValidationError> = self
            .records
            .iter()
            .flat_map(|((entity, period), record)| {
                validate_record(record, &format!("{} {}", entity, period))
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

mod records_as_rows {
    use super::{EntityType, Key, Metric, Record};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize)]
    struct Row {
        entity: String,
        period: NaiveDate,
        entity_type: EntityType,
        metrics: BTreeMap<Metric, f64>,
    }

    pub fn serialize<S: Serializer>(
        records: &BTreeMap<Key, Record>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let rows: Vec<Row> = records
            .iter()
            .map(|((entity, period), record)| Row {
                entity: entity.clone(),
                period: *period,
                entity_type: record.entity_type,
                metrics: record.metrics.clone(),
            })
            .collect();
        rows.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Key, Record>, D::Error> {
        let rows = Vec::<Row>::deserialize(deserializer)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    (row.entity, row.period),
                    Record {
                        entity_type: row.entity_type,
                        metrics: row.metrics,
                    },
                )
            })
            .collect())
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Non-finite values and shares outside [0, 1] violate the schema
pub fn validate_record(record: &Record, context: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (metric, value) in &record.metrics {
        if !value.is_finite() {
            errors.push(ValidationError {
                field: metric.name().to_string(),
                message: format!("Value must be finite, got {}", value),
                context: context.to_string(),
            });
        } else if metric.is_share() && !(0.0..=1.0).contains(value) {
            errors.push(ValidationError {
                field: metric.name().to_string(),
                message: format!("Share must be a fraction in [0, 1], got {}", value),
                context: context.to_string(),
            });
        }
    }

    errors
}
