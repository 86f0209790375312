// ✅ Quality checks on canonical fragments
//
// Plausibility checks that go beyond the schema: counts that cannot be
// negative, components that exceed their total, entities whose
// classification changes between periods.

use crate::schema::{EntityType, Fragment, Metric};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// QUALITY REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Value is impossible and must not reach downstream charts
    Warning,  // Value is suspicious or inconsistent with related values
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub entity: String,
    pub period: Option<NaiveDate>,
    pub field: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub source: String,
    pub records_checked: usize,
    pub issues: Vec<QualityIssue>,
    /// Fraction of records without critical issues
    pub overall_quality: f64,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} records, quality {:.1}%, issues: {} ({} critical)",
            self.source,
            self.records_checked,
            self.overall_quality * 100.0,
            self.issues.len(),
            self.count(Severity::Critical)
        )
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn has_critical_issues(&self) -> bool {
        self.count(Severity::Critical) > 0
    }

    pub fn is_high_quality(&self) -> bool {
        !self.has_critical_issues() && self.overall_quality >= 0.99
    }
}

// ============================================================================
// QUALITY ENGINE
// ============================================================================

const COMPONENTS: [(Metric, [Metric; 4]); 2] = [
    (
        Metric::SalesTotal,
        [Metric::SalesIce, Metric::SalesBevs, Metric::SalesPhevs, Metric::SalesFcevs],
    ),
    (
        Metric::StockTotal,
        [Metric::StockIce, Metric::StockBevs, Metric::StockPhevs, Metric::StockFcevs],
    ),
];

pub struct QualityEngine {
    /// Relative slack before components exceeding the total are flagged (default: 0.5%)
    pub component_tolerance: f64,
}

impl QualityEngine {
    pub fn new() -> Self {
        QualityEngine {
            component_tolerance: 0.005,
        }
    }

    pub fn check(&self, fragment: &Fragment) -> QualityReport {
        let mut issues = Vec::new();
        let mut critical_records = 0;
        let mut entity_types: BTreeMap<&str, Vec<EntityType>> = BTreeMap::new();

        for ((entity, period), record) in &fragment.records {
            let before = issues.len();
            let at = |severity, field: &str, issue: String, recommendation: &str| QualityIssue {
                severity,
                entity: entity.clone(),
                period: Some(*period),
                field: field.to_string(),
                issue,
                recommendation: recommendation.to_string(),
            };

            for (metric, value) in &record.metrics {
                if !value.is_finite() {
                    issues.push(at(
                        Severity::Critical,
                        metric.name(),
                        format!("non-finite value {}", value),
                        "Check the division that produced it",
                    ));
                } else if metric.is_share() && !(0.0..=1.0).contains(value) {
                    issues.push(at(
                        Severity::Critical,
                        metric.name(),
                        format!("share {} outside [0, 1]", value),
                        "Percentages must be divided by 100",
                    ));
                } else if !metric.is_share() && *value < 0.0 {
                    issues.push(at(
                        Severity::Critical,
                        metric.name(),
                        format!("negative count {}", value),
                        "Check the remainder computation",
                    ));
                }
            }
            if issues[before..].iter().any(|i| i.severity == Severity::Critical) {
                critical_records += 1;
            }

            for (total_metric, parts) in COMPONENTS {
                let Some(total) = record.get(total_metric) else {
                    continue;
                };
                let sum: f64 = parts.iter().filter_map(|m| record.get(*m)).sum();
                if sum > total * (1.0 + self.component_tolerance) {
                    issues.push(at(
                        Severity::Warning,
                        total_metric.name(),
                        format!("powertrain counts sum to {} but total is {}", sum, total),
                        "Check for double-counted powertrains",
                    ));
                }
            }

            let types = entity_types.entry(entity.as_str()).or_default();
            if !types.contains(&record.entity_type) {
                types.push(record.entity_type);
            }
        }

        for (entity, types) in entity_types {
            if types.len() > 1 {
                issues.push(QualityIssue {
                    severity: Severity::Warning,
                    entity: entity.to_string(),
                    period: None,
                    field: "entity_type".to_string(),
                    issue: format!(
                        "classified as {} in different periods",
                        types.iter().map(|t| t.name()).collect::<Vec<_>>().join(" and ")
                    ),
                    recommendation: "Fix the static membership lists".to_string(),
                });
            }
        }

        let records_checked = fragment.len();
        let overall_quality = if records_checked == 0 {
            1.0
        } else {
            1.0 - critical_records as f64 / records_checked as f64
        };

        QualityReport {
            source: fragment.source.clone(),
            records_checked,
            issues,
            overall_quality,
        }
    }

    pub fn check_batch(&self, fragments: &[Fragment]) -> Vec<QualityReport> {
        fragments.iter().map(|f| self.check(f)).collect()
    }

    pub fn batch_summary(&self, reports: &[QualityReport]) -> BatchSummary {
        BatchSummary {
            sources: reports.len(),
            records_checked: reports.iter().map(|r| r.records_checked).sum(),
            high_quality_count: reports.iter().filter(|r| r.is_high_quality()).count(),
            critical_issues_count: reports.iter().map(|r| r.count(Severity::Critical)).sum(),
            warning_count: reports.iter().map(|r| r.count(Severity::Warning)).sum(),
        }
    }
}

impl Default for QualityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub sources: usize,
    pub records_checked: usize,
    pub high_quality_count: usize,
    pub critical_issues_count: usize,
    pub warning_count: usize,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} sources, {} records | {} high quality, {} critical issues, {} warnings",
            self.sources,
            self.records_checked,
            self.high_quality_count,
            self.critical_issues_count,
            self.warning_count
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::Granularity;

    fn jan(year: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap()
    }

    fn clean() -> Fragment {
        let mut fragment = Fragment::new("owid", Granularity::Annual);
        let record = fragment.entry("Germany", jan(2023), EntityType::Country);
        record.set(Metric::SalesTotal, 2_900_000.0);
        record.set(Metric::SalesBevs, 520_000.0);
        record.set(Metric::SalesPhevs, 180_000.0);
        record.set(Metric::SalesIce, 2_200_000.0);
        record.derive_shares();
        fragment
    }

    #[test]
    fn test_clean_fragment() {
        let report = QualityEngine::new().check(&clean());
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert!(report.is_high_quality());
        assert_eq!(report.overall_quality, 1.0);
    }

    #[test]
    fn test_percentage_share_is_critical() {
        let mut fragment = clean();
        fragment
            .entry("Vietnam", jan(2023), EntityType::Country)
            .set(Metric::SalesShareBevs, 12.5);

        let report = QualityEngine::new().check(&fragment);
        assert!(report.has_critical_issues());
        assert_eq!(report.issues[0].entity, "Vietnam");
        assert_eq!(report.overall_quality, 0.5);
    }

    #[test]
    fn test_negative_count_is_critical() {
        let mut fragment = clean();
        fragment
            .entry("Germany", jan(2023), EntityType::Country)
            .set(Metric::SalesIce, -5.0);
        let report = QualityEngine::new().check(&fragment);
        assert_eq!(report.count(Severity::Critical), 1);
        assert_eq!(report.issues[0].field, "sales_ice");
    }

    #[test]
    fn test_components_exceeding_total() {
        let mut fragment = clean();
        fragment
            .entry("Germany", jan(2023), EntityType::Country)
            .set(Metric::SalesBevs, 900_000.0);
        let report = QualityEngine::new().check(&fragment);
        assert_eq!(report.count(Severity::Warning), 1);
        assert!(!report.has_critical_issues());
    }

    #[test]
    fn test_inconsistent_entity_type() {
        let mut fragment = clean();
        fragment
            .entry("Germany", jan(2024), EntityType::Group)
            .set(Metric::SalesTotal, 1.0);
        let report = QualityEngine::new().check(&fragment);
        let issue = report.issues.iter().find(|i| i.field == "entity_type").unwrap();
        assert_eq!(issue.period, None);
        assert!(issue.issue.contains("Country and Group"));
    }

    #[test]
    fn test_batch_summary() {
        let engine = QualityEngine::new();
        let mut bad = clean();
        bad.entry("Norway", jan(2023), EntityType::Country)
            .set(Metric::StockShareEvs, 29.0);

        let reports = engine.check_batch(&[clean(), bad]);
        let summary = engine.batch_summary(&reports);
        assert_eq!(summary.sources, 2);
        assert_eq!(summary.records_checked, 3);
        assert_eq!(summary.high_quality_count, 1);
        assert_eq!(summary.critical_issues_count, 1);
    }
}
