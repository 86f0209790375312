// 🔀 Merge Engine - combine fragments from all sources into one table
//
// Union of (entity, period) keys and of metrics. When several sources report
// the same metric for the same key, exactly one value is kept, chosen by a
// deterministic precedence order. Values are never averaged; disagreements
// are reported as conflicts.

use crate::period::Granularity;
use crate::schema::{Fragment, Metric};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Source name of the merged fragment
pub const MERGED_SOURCE: &str = "merged";

// ============================================================================
// POLICY
// ============================================================================

/// Precedence between sources reporting the same metric for the same key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    /// Monthly figures win over annual ones for the same key
    pub prefer_finer: bool,
    /// Source codes, highest priority first; unlisted sources rank after all listed ones
    pub priority: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            prefer_finer: true,
            priority: ["extra", "robbie_andrew", "kba", "iea", "owid"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl MergePolicy {
    /// Sort key of a fragment; lower ranks take precedence. Input order breaks ties.
    fn rank(&self, fragment: &Fragment, input_index: usize) -> (Granularity, usize, usize) {
        let granularity = if self.prefer_finer {
            fragment.granularity
        } else {
            Granularity::Monthly
        };
        let priority = self
            .priority
            .iter()
            .position(|s| *s == fragment.source)
            .unwrap_or(self.priority.len());
        (granularity, priority, input_index)
    }
}

// ============================================================================
// MERGE REPORT
// ============================================================================

/// Two sources of the same granularity disagree on a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub entity: String,
    pub period: NaiveDate,
    pub metric: Metric,
    pub kept_source: String,
    pub kept_value: f64,
    pub other_source: String,
    pub other_value: f64,
}

impl Conflict {
    pub fn difference(&self) -> f64 {
        self.other_value - self.kept_value
    }
}

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub merged: Fragment,
    /// Sources in the order they took precedence
    pub sources: Vec<String>,
    /// Which source each merged value came from
    pub provenance: BTreeMap<(String, NaiveDate, Metric), String>,
    pub conflicts: Vec<Conflict>,
    /// Values shadowed by a differing figure of finer granularity
    pub granularity_overrides: usize,
    /// Sales counts left out because the record already holds counts of
    /// another granularity for the same key
    pub mixed_counts_skipped: usize,
}

impl MergeReport {
    pub fn source_of(&self, entity: &str, period: NaiveDate, metric: Metric) -> Option<&str> {
        self.provenance
            .get(&(entity.to_string(), period, metric))
            .map(String::as_str)
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Merged {} sources ({}): {} records, {} entities, {} metrics | {} conflicts, {} granularity overrides, {} mixed counts skipped",
            self.sources.len(),
            self.sources.join(" > "),
            self.merged.len(),
            self.merged.entities().len(),
            self.merged.metrics_present().len(),
            self.conflicts.len(),
            self.granularity_overrides,
            self.mixed_counts_skipped
        )
    }
}

// ============================================================================
// MERGE ENGINE
// ============================================================================

pub struct MergeEngine {
    pub policy: MergePolicy,

    /// Relative tolerance below which two values count as equal (default: 1e-9)
    pub tolerance: f64,
}

impl MergeEngine {
    pub fn new() -> Self {
        MergeEngine {
            policy: MergePolicy::default(),
            tolerance: 1e-9,
        }
    }

    pub fn with_policy(policy: MergePolicy) -> Self {
        MergeEngine {
            policy,
            tolerance: 1e-9,
        }
    }

    fn differs(&self, a: f64, b: f64) -> bool {
        (a - b).abs() > self.tolerance * a.abs().max(b.abs()).max(1.0)
    }

    /// Merge fragments into one table.
    ///
    /// Annual figures are keyed on 1 January and so share a key with the
    /// January figure of a monthly source. A metric missing from a
    /// higher-ranked fragment never hides a value reported by a lower one.
    pub fn merge(&self, fragments: &[Fragment]) -> MergeReport {
        let mut order: Vec<usize> = (0..fragments.len()).collect();
        order.sort_by_key(|&i| self.policy.rank(&fragments[i], i));

        let granularity = fragments
            .iter()
            .map(|f| f.granularity)
            .min()
            .unwrap_or(Granularity::Annual);

        let mut merged = Fragment::new(MERGED_SOURCE, granularity);
        let mut provenance: BTreeMap<(String, NaiveDate, Metric), String> = BTreeMap::new();
        let mut kept_granularity: BTreeMap<(String, NaiveDate, Metric), Granularity> = BTreeMap::new();
        // Granularity of the sales counts already in each merged record
        let mut count_granularity: BTreeMap<(String, NaiveDate), Granularity> = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut granularity_overrides = 0;
        let mut mixed_counts_skipped = 0;

        for &i in &order {
            let fragment = &fragments[i];

            for ((entity, period), record) in &fragment.records {
                let period = fragment.granularity.period_start(*period);
                // The entity type of the first (highest-ranked) contributor sticks
                let target = merged.entry(entity, period, record.entity_type);

                for (metric, value) in &record.metrics {
                    let key = (entity.clone(), period, *metric);

                    if metric.is_flow_count() {
                        let counts_from = *count_granularity
                            .entry((entity.clone(), period))
                            .or_insert(fragment.granularity);
                        // A month's total is never completed with a year's component
                        if counts_from != fragment.granularity && !provenance.contains_key(&key) {
                            tracing::debug!(
                                entity = %entity,
                                period = %period,
                                metric = metric.name(),
                                source = %fragment.source,
                                "count of another granularity left out"
                            );
                            mixed_counts_skipped += 1;
                            continue;
                        }
                    }

                    let Some(kept_source) = provenance.get(&key) else {
                        target.set(*metric, *value);
                        provenance.insert(key.clone(), fragment.source.clone());
                        kept_granularity.insert(key, fragment.granularity);
                        continue;
                    };

                    let kept_value = target.get(*metric).unwrap_or(*value);
                    if !self.differs(kept_value, *value) {
                        continue;
                    }

                    let kept_is_finer = kept_granularity
                        .get(&key)
                        .is_some_and(|kept| *kept < fragment.granularity);
                    if kept_is_finer {
                        granularity_overrides += 1;
                        continue;
                    }

                    tracing::warn!(
                        entity = %entity,
                        period = %period,
                        metric = metric.name(),
                        kept = %kept_source,
                        other = %fragment.source,
                        "sources disagree"
                    );
                    conflicts.push(Conflict {
                        entity: entity.clone(),
                        period,
                        metric: *metric,
                        kept_source: kept_source.clone(),
                        kept_value,
                        other_source: fragment.source.clone(),
                        other_value: *value,
                    });
                }
            }
        }

        let sources = order.iter().map(|&i| fragments[i].source.clone()).collect();

        let report = MergeReport {
            merged,
            sources,
            provenance,
            conflicts,
            granularity_overrides,
            mixed_counts_skipped,
        };
        tracing::info!("{}", report.summary());
        report
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
