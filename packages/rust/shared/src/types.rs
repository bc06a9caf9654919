//! Core domain types shared by every pipeline stage.

use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WeeklyPackError};

// ---------------------------------------------------------------------------
// PeriodKey
// ---------------------------------------------------------------------------

static PERIOD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-P(\d{2})$").expect("valid period regex"));

/// Identifier of one recurring unit of work: an ISO year and ISO week.
///
/// Ordering follows `(year, period)`, which matches the lexicographic order
/// of the [`token`](Self::token) because the period is zero-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeriodKey {
    pub year: i32,
    pub period: u32,
}

impl PeriodKey {
    /// Build a key, rejecting periods outside the ISO week range.
    pub fn new(year: i32, period: u32) -> Result<Self> {
        if !(1..=53).contains(&period) {
            return Err(WeeklyPackError::validation(format!(
                "period {period} is outside 1..=53"
            )));
        }
        Ok(Self { year, period })
    }

    /// The ISO (year, week) a calendar date falls in.
    pub fn from_date(date: NaiveDate) -> Self {
        let week = date.iso_week();
        Self {
            year: week.year(),
            period: week.week(),
        }
    }

    /// Sortable directory token, e.g. `2025-P07`.
    pub fn token(&self) -> String {
        format!("{}-P{:02}", self.year, self.period)
    }

    /// Parse a directory token produced by [`token`](Self::token).
    pub fn parse_token(token: &str) -> Option<Self> {
        let caps = PERIOD_TOKEN.captures(token)?;
        let year = caps[1].parse().ok()?;
        let period = caps[2].parse().ok()?;
        Self::new(year, period).ok()
    }

    /// Stable seed for pseudo-random choices made while building this period's bundle.
    pub fn seed(&self) -> u64 {
        (self.year as u64) * 100 + u64::from(self.period)
    }
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token())
    }
}

impl std::str::FromStr for PeriodKey {
    type Err = WeeklyPackError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_token(s).ok_or_else(|| {
            WeeklyPackError::validation(format!("'{s}' is not a period token like 2025-P07"))
        })
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// `meta.json`: written by the generate stage, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Human-readable bundle title.
    pub title: String,
    /// Calendar date the bundle was generated.
    #[serde(alias = "date")]
    pub generated_at: NaiveDate,
    /// File name of the primary markdown document.
    #[serde(alias = "md_name")]
    pub primary_filename: String,
    /// File name of the rendered PDF document.
    #[serde(alias = "pdf_name")]
    pub rendered_filename: String,
}

/// `drive_links.json`: written by the upload stage only after every remote step succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageLinksRecord {
    #[serde(alias = "md_url")]
    pub primary_url: String,
    #[serde(alias = "pdf_url")]
    pub rendered_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_url: Option<String>,
}

/// `notion_urls.json`: written by the publish stage for audit and replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishLinksRecord {
    #[serde(alias = "seo_url")]
    pub article_url: String,
}
