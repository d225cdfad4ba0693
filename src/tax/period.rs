//! Tax period and platform filter resolution
//!
//! Query strings are resolved to a half-open `[start, end)` range.
//! Anything that cannot be resolved falls back to year-to-date.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::ledger::raw::parse_timestamp_str;
use crate::types::Platform;

/// Half-open UTC range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxPeriod {
    YearToDate,
    Year { year: i32 },
    Custom,
}

impl fmt::Display for TaxPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaxPeriod::YearToDate => write!(f, "ytd"),
            TaxPeriod::Year { year } => write!(f, "{}", year),
            TaxPeriod::Custom => write!(f, "custom"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFilter {
    #[default]
    All,
    Only(Platform),
}

impl PlatformFilter {
    /// Unrecognized input means no filtering
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(Platform::from_str)
            .map(PlatformFilter::Only)
            .unwrap_or(PlatformFilter::All)
    }

    pub fn matches(&self, platform: Platform) -> bool {
        match self {
            PlatformFilter::All => true,
            PlatformFilter::Only(p) => *p == platform,
        }
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformFilter::All => write!(f, "all"),
            PlatformFilter::Only(p) => write!(f, "{}", p.key()),
        }
    }
}

/// Raw tax query parameters (`period`, `start`, `end`, `platform`)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxQuery {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTaxQuery {
    pub period: TaxPeriod,
    pub range: DateRange,
    pub platform: PlatformFilter,
}

impl TaxQuery {
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedTaxQuery {
        let platform = PlatformFilter::parse(self.platform.as_deref());
        let requested = self
            .period
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .unwrap_or_default();

        let resolved = match requested.as_str() {
            "" | "ytd" => None,
            "custom" => self.custom_range().map(|range| (TaxPeriod::Custom, range)),
            year => year
                .parse::<i32>()
                .ok()
                .and_then(|y| year_range(y).map(|range| (TaxPeriod::Year { year: y }, range))),
        };

        let (period, range) = match resolved {
            Some(found) => found,
            None => {
                if !requested.is_empty() && requested != "ytd" {
                    debug!(period = %requested, "unresolvable tax period, using year to date");
                }
                (TaxPeriod::YearToDate, year_to_date(now))
            }
        };

        ResolvedTaxQuery {
            period,
            range,
            platform,
        }
    }

    fn custom_range(&self) -> Option<DateRange> {
        let start = parse_bound(self.start.as_deref()?, false)?;
        let end = parse_bound(self.end.as_deref()?, true)?;
        (start < end).then_some(DateRange { start, end })
    }
}

/// `[Jan 1 of now's year, now)`
pub fn year_to_date(now: DateTime<Utc>) -> DateRange {
    let start = Utc
        .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(now);
    DateRange { start, end: now }
}

fn year_range(year: i32) -> Option<DateRange> {
    if !(1970..=9998).contains(&year) {
        return None;
    }
    let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()?;
    let end = Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0).single()?;
    Some(DateRange { start, end })
}

/// Date-only values cover the whole day: an end bound moves to the next midnight
fn parse_bound(raw: &str, is_end: bool) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
        return if is_end {
            midnight.checked_add_signed(Duration::days(1))
        } else {
            Some(midnight)
        };
    }
    parse_timestamp_str(raw)
}
