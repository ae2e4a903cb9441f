//! Core domain types for gareport
//!
//! These types mirror the four per-period collections kept by the period
//! store, plus the input records the aggregators consume.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Period** | A named reporting interval, usually a month (`"2023-04"`) |
//! | **"All" period** | Synthetic period holding each url's cumulative total |
//! | **Publisher** | An organizational group in the catalog hierarchy |
//! | **Package** | A dataset in the catalog; belongs to zero or one publisher |
//! | **Department** | Stored name for a url row's attributed publisher (legacy naming) |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Period name of the per-url cumulative rows.
pub const CUMULATIVE_PERIOD: &str = "All";

/// Sentinel accepted by purge to delete every period.
pub const PURGE_ALL: &str = "all";

// ============================================
// Stored rows
// ============================================

/// Traffic for one url in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlStat {
    /// Generated row id
    pub id: String,
    pub period_name: String,
    /// Day of month through which the period's data is complete (0 for "All")
    pub period_complete_day: u32,
    /// Request path exactly as received from the analytics source
    pub url: String,
    pub pageviews: u64,
    pub visits: u64,
    /// Attributed publisher name
    pub department_id: Option<String>,
    /// Attributed dataset id
    pub package_id: Option<String>,
}

/// A named sitewide metric value (browser share, OS share, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SitewideStat {
    pub id: String,
    pub period_name: String,
    pub stat_name: String,
    pub key: String,
    pub value: String,
}

/// Subtree traffic totals for a publisher in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublisherStat {
    pub id: String,
    pub period_name: String,
    pub publisher_name: String,
    /// Pageviews summed over the publisher and all its descendants
    pub views: u64,
    /// Visits summed over the publisher and all its descendants
    pub visits: u64,
    /// True when the publisher has no active parent publisher
    pub toplevel: bool,
    /// Number of descendants, excluding the publisher itself
    pub subpublishercount: u32,
    /// First active parent publisher, or empty
    pub parent: String,
}

/// Referral count from one source to one url in one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralStat {
    pub id: String,
    pub period_name: String,
    pub source: String,
    pub url: String,
    pub count: u64,
}

/// Which of the four collections a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Urls,
    Sitewide,
    Publishers,
    Referrals,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Urls,
        Collection::Sitewide,
        Collection::Publishers,
        Collection::Referrals,
    ];

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Urls => "ga_url",
            Collection::Sitewide => "ga_stat",
            Collection::Publishers => "ga_publisher",
            Collection::Referrals => "ga_referrer",
        }
    }
}

// ============================================
// Inputs
// ============================================

/// One `(url, pageviews, visits)` tuple from the analytics source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "(String, RawCount, RawCount)")]
pub struct UrlRecord {
    pub url: String,
    pub pageviews: u64,
    pub visits: u64,
}

impl UrlRecord {
    pub fn new(url: impl Into<String>, pageviews: u64, visits: u64) -> Self {
        Self {
            url: url.into(),
            pageviews,
            visits,
        }
    }
}

impl TryFrom<(String, RawCount, RawCount)> for UrlRecord {
    type Error = Error;

    fn try_from((url, pageviews, visits): (String, RawCount, RawCount)) -> Result<Self> {
        Ok(Self {
            url,
            pageviews: pageviews.into_count("pageviews")?,
            visits: visits.into_count("visits")?,
        })
    }
}

/// One `(source, count)` referral entry for a url.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "(String, RawCount)")]
pub struct Referral {
    pub source: String,
    pub count: u64,
}

impl Referral {
    pub fn new(source: impl Into<String>, count: u64) -> Self {
        Self {
            source: source.into(),
            count,
        }
    }
}

impl TryFrom<(String, RawCount)> for Referral {
    type Error = Error;

    fn try_from((source, count): (String, RawCount)) -> Result<Self> {
        Ok(Self {
            source,
            count: count.into_count("count")?,
        })
    }
}

/// A count as it appears in input files: a JSON number or numeric text.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawCount {
    Number(serde_json::Number),
    Text(String),
}

impl RawCount {
    fn into_count(self, field: &'static str) -> Result<u64> {
        match self {
            RawCount::Number(n) => n.as_u64().ok_or_else(|| Error::malformed(field, n)),
            RawCount::Text(s) => parse_count(field, &s),
        }
    }
}

/// Parse a non-negative whole number, rejecting anything else.
pub fn parse_count(field: &'static str, value: &str) -> Result<u64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed(field, value));
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| Error::malformed(field, value))
}

// ============================================
// Aggregation settings
// ============================================

/// Transaction boundary used by an aggregation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Commit after every input record; a failure keeps the committed prefix
    PerRow,
    /// One transaction per call; a failure rolls the whole call back
    #[default]
    PerBatch,
}

impl CommitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitMode::PerRow => "per_row",
            CommitMode::PerBatch => "per_batch",
        }
    }
}

impl std::str::FromStr for CommitMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "per_row" => Ok(CommitMode::PerRow),
            "per_batch" => Ok(CommitMode::PerBatch),
            _ => Err(format!("unknown commit mode: {}", s)),
        }
    }
}
