// ⏰ Time periods
//
// A period is always identified by its first day: monthly data for March 2024
// is 2024-03-01, annual data for 2024 is 2024-01-01.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Granularity {
    // Declared finest first so that `Ord` sorts finer before coarser
    Monthly,
    Annual,
}

impl Granularity {
    pub fn name(&self) -> &'static str {
        match self {
            Granularity::Monthly => "monthly",
            Granularity::Annual => "annual",
        }
    }

    /// Start of the period of this granularity containing `date`
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Monthly => month_start(date.year(), date.month()).unwrap_or(date),
            Granularity::Annual => year_start(date.year()).unwrap_or(date),
        }
    }
}

pub fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

pub fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Parse a month label: `202403`, `2024-03`, `2024/03` or `2024-03-01`
pub fn parse_month(label: &str) -> Option<NaiveDate> {
    let label = label.trim();

    if label.len() == 6 && label.chars().all(|c| c.is_ascii_digit()) {
        let year = label[..4].parse().ok()?;
        let month = label[4..].parse().ok()?;
        return month_start(year, month);
    }

    let mut parts = label.split(|c| c == '-' || c == '/');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    match parts.next() {
        None => month_start(year, month),
        Some(day) if day == "01" || day == "1" => month_start(year, month),
        Some(_) => None,
    }
}

/// Parse a year cell value such as `2024` or `2024.0`
pub fn parse_year(value: Option<i64>) -> Option<NaiveDate> {
    value
        .filter(|y| (1900..=2200).contains(y))
        .and_then(|y| year_start(y as i32))
}
