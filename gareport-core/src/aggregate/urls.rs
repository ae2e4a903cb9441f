//! Per-url period totals and the cumulative "All" rows.

use super::Aggregator;
use crate::catalog::Catalog;
use crate::classify::classify;
use crate::db::{new_id, PeriodTx};
use crate::error::{Error, Result};
use crate::period;
use crate::types::{UrlRecord, UrlStat, CUMULATIVE_PERIOD};

/// Outcome of one `ingest_urls` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Input records processed
    pub records: usize,
    /// Period rows inserted
    pub rows_created: usize,
    /// Period rows that already existed and were added to
    pub rows_updated: usize,
    /// Cumulative rows written
    pub cumulative_rows: usize,
    /// Records attributed to a dataset
    pub classified_datasets: usize,
    /// Records attributed to a publisher
    pub classified_publishers: usize,
}

impl<C: Catalog + ?Sized> Aggregator<'_, C> {
    /// Add a batch of url totals to `period_name`.
    ///
    /// Totals are added to any existing row for the same url, so re-ingesting
    /// without purging first double counts. Urls that resolve to a dataset
    /// also get their cumulative row recomputed.
    pub fn ingest_urls(
        &self,
        period_name: &str,
        period_complete_day: u32,
        records: &[UrlRecord],
    ) -> Result<IngestSummary> {
        self.ingest_urls_with_progress(period_name, period_complete_day, records, |_, _, _| {})
    }

    /// Like [`ingest_urls`](Self::ingest_urls), reporting `(done, total, url)` after each record.
    pub fn ingest_urls_with_progress<F>(
        &self,
        period_name: &str,
        period_complete_day: u32,
        records: &[UrlRecord],
        mut progress: F,
    ) -> Result<IngestSummary>
    where
        F: FnMut(usize, usize, &str),
    {
        period::ensure_ingestible(period_name)?;

        let total = records.len();
        let mut summary = IngestSummary::default();

        tracing::info!(
            period = period_name,
            records = total,
            commit_mode = self.commit_mode.as_str(),
            "Ingesting url stats"
        );

        self.commit_each(
            |_| Ok(()),
            records.iter().enumerate(),
            |tx, (i, record)| {
                self.ingest_record(tx, period_name, period_complete_day, record, &mut summary)?;
                progress(i + 1, total, &record.url);
                Ok(())
            },
        )?;

        tracing::info!(
            period = period_name,
            created = summary.rows_created,
            updated = summary.rows_updated,
            cumulative = summary.cumulative_rows,
            "Url stats ingested"
        );

        Ok(summary)
    }

    fn ingest_record(
        &self,
        tx: &PeriodTx<'_>,
        period_name: &str,
        period_complete_day: u32,
        record: &UrlRecord,
        summary: &mut IngestSummary,
    ) -> Result<()> {
        let attribution = classify(self.catalog, &record.url)?;

        match tx.get_url_stat(period_name, &record.url)? {
            Some(mut existing) => {
                existing.pageviews = add_count("pageviews", existing.pageviews, record.pageviews)?;
                existing.visits = add_count("visits", existing.visits, record.visits)?;
                if is_unset(&existing.package_id) {
                    existing.package_id = attribution.package_id.clone();
                }
                if is_unset(&existing.department_id) {
                    existing.department_id = attribution.publisher.clone();
                }
                tx.update_url_stat(&existing)?;
                summary.rows_updated += 1;
            }
            None => {
                tx.insert_url_stat(&UrlStat {
                    id: new_id(),
                    period_name: period_name.to_string(),
                    period_complete_day,
                    url: record.url.clone(),
                    pageviews: record.pageviews,
                    visits: record.visits,
                    department_id: attribution.publisher.clone(),
                    package_id: attribution.package_id.clone(),
                })?;
                summary.rows_created += 1;
            }
        }

        summary.records += 1;
        if attribution.publisher.is_some() {
            summary.classified_publishers += 1;
        }

        if let Some(package_id) = attribution.package_id.as_deref() {
            summary.classified_datasets += 1;
            let (pageviews, visits) = tx.url_period_totals(&record.url)?;
            tx.upsert_cumulative(
                &record.url,
                pageviews,
                visits,
                attribution.publisher.as_deref(),
                Some(package_id),
            )?;
            summary.cumulative_rows += 1;
        }

        Ok(())
    }

    /// Recompute every cumulative row from the stored period rows.
    ///
    /// Needed after [`pre_update_url_stats`](Self::pre_update_url_stats),
    /// which drops the cumulative rows of urls the new batch may not mention.
    /// Returns the number of cumulative rows written.
    pub fn rebuild_cumulative(&self) -> Result<usize> {
        let written = self.db.in_transaction(|tx| {
            let sources = tx.cumulative_sources()?;
            tx.delete_url_period(CUMULATIVE_PERIOD)?;
            for source in &sources {
                tx.upsert_cumulative(
                    &source.url,
                    source.pageviews,
                    source.visits,
                    source.department_id.as_deref(),
                    Some(&source.package_id),
                )?;
            }
            Ok(sources.len())
        })?;

        tracing::info!(rows = written, "Cumulative url stats rebuilt");
        Ok(written)
    }
}

fn is_unset(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn add_count(field: &'static str, current: u64, extra: u64) -> Result<u64> {
    current
        .checked_add(extra)
        .ok_or_else(|| Error::malformed(field, format!("{} + {}", current, extra)))
}
