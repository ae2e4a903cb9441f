//! One scheduled reporting run for a period.

use super::{Aggregator, IngestSummary, PurgeSummary, RollupSummary};
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::period;
use crate::types::{Referral, UrlRecord};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Everything the analytics source produced for one period.
///
/// ```json
/// {
///   "period_name": "2023-04",
///   "period_complete_day": 30,
///   "urls": [["/dataset/abc", 120, 31]],
///   "social": { "/dataset/abc": [["twitter", 4]] },
///   "sitewide": { "Browser": { "Firefox": "12.5" } }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeriodBatch {
    /// Must sort chronologically as text, e.g. `YYYY-MM`. Cumulative rows
    /// take their attribution from the greatest period name.
    pub period_name: String,
    #[serde(default)]
    pub period_complete_day: u32,
    #[serde(default)]
    pub urls: Vec<UrlRecord>,
    /// url -> referral counts
    #[serde(default)]
    pub social: BTreeMap<String, Vec<Referral>>,
    /// stat name -> key -> value
    #[serde(default)]
    pub sitewide: BTreeMap<String, BTreeMap<String, MetricValue>>,
}

impl PeriodBatch {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a batch file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Sitewide values as stored text, per stat name
    fn sitewide_text(&self) -> BTreeMap<&str, BTreeMap<String, String>> {
        self.sitewide
            .iter()
            .map(|(stat, values)| {
                let text = values
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_string()))
                    .collect();
                (stat.as_str(), text)
            })
            .collect()
    }
}

/// A sitewide metric value; numbers are kept in their JSON spelling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(serde_json::Number),
    Text(String),
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Number(n) => write!(f, "{}", n),
            MetricValue::Text(s) => f.write_str(s),
        }
    }
}

/// What a full run did, step by step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub period_name: String,
    pub purged: PurgeSummary,
    /// Url rows removed by the pre-update step
    pub cleared_url_rows: usize,
    pub ingest: IngestSummary,
    /// Cumulative rows after the rebuild
    pub cumulative_rows: usize,
    pub referrals: usize,
    pub sitewide_values: usize,
    pub rollup: RollupSummary,
}

impl<C: Catalog + ?Sized> Aggregator<'_, C> {
    /// Replace `batch.period_name` with the batch's data and roll it up.
    ///
    /// Steps run in scheduler order and stop at the first error. Each step
    /// commits on its own, so a failed run should be re-run from the start.
    pub fn run_period(&self, batch: &PeriodBatch) -> Result<RunSummary> {
        self.run_period_with_progress(batch, |_, _, _| {})
    }

    /// Like [`run_period`](Self::run_period), reporting url ingest progress.
    pub fn run_period_with_progress<F>(&self, batch: &PeriodBatch, progress: F) -> Result<RunSummary>
    where
        F: FnMut(usize, usize, &str),
    {
        let period_name = batch.period_name.as_str();
        // Checked up front: "all" would otherwise purge the whole store.
        period::ensure_ingestible(period_name)?;
        if batch.period_complete_day > 31 {
            return Err(Error::malformed(
                "period_complete_day",
                batch.period_complete_day,
            ));
        }

        tracing::info!(
            period = period_name,
            urls = batch.urls.len(),
            social_urls = batch.social.len(),
            sitewide_stats = batch.sitewide.len(),
            "Starting period run"
        );

        let mut summary = RunSummary {
            period_name: period_name.to_string(),
            ..Default::default()
        };

        summary.purged = self.delete_period(period_name)?;
        summary.cleared_url_rows = self.pre_update_url_stats(period_name)?;
        summary.ingest = self.ingest_urls_with_progress(
            period_name,
            batch.period_complete_day,
            &batch.urls,
            progress,
        )?;
        summary.cumulative_rows = self.rebuild_cumulative()?;
        summary.referrals = self.update_social(period_name, &batch.social)?;
        for (stat_name, values) in batch.sitewide_text() {
            summary.sitewide_values += self.update_sitewide(period_name, stat_name, &values)?;
        }
        summary.rollup = self.rollup_publishers(period_name)?;

        tracing::info!(
            period = period_name,
            urls = summary.ingest.records,
            cumulative = summary.cumulative_rows,
            publishers = summary.rollup.publishers,
            "Period run complete"
        );

        Ok(summary)
    }
}
