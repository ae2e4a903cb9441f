//! Period deletion.

use super::Aggregator;
use crate::catalog::Catalog;
use crate::db::RowCounts;
use crate::error::{Error, Result};
use crate::types::{Collection, CUMULATIVE_PERIOD, PURGE_ALL};

/// Rows removed from each collection.
pub type PurgeSummary = RowCounts;

impl<C: Catalog + ?Sized> Aggregator<'_, C> {
    /// Remove every row of `period_name` from all four collections.
    ///
    /// The sentinel `"all"` removes every row of every period. It is distinct
    /// from the cumulative period `"All"`, which is deleted like any other
    /// period name. Always one transaction.
    pub fn delete_period(&self, period_name: &str) -> Result<PurgeSummary> {
        if period_name.is_empty() {
            return Err(Error::ReservedPeriod(String::new()));
        }
        let scope = (period_name != PURGE_ALL).then_some(period_name);

        let summary = self.db.in_transaction(|tx| {
            let mut summary = PurgeSummary::default();
            for collection in Collection::ALL {
                summary.add(collection, tx.delete_rows(collection, scope)?);
            }
            Ok(summary)
        })?;

        tracing::info!(
            period = period_name,
            urls = summary.urls,
            sitewide = summary.sitewide,
            publishers = summary.publishers,
            referrals = summary.referrals,
            "Period purged"
        );
        Ok(summary)
    }

    /// Clear `period_name`'s url rows and every cumulative row before a re-run.
    ///
    /// Returns the number of url rows removed.
    pub fn pre_update_url_stats(&self, period_name: &str) -> Result<usize> {
        if period_name.is_empty() {
            return Err(Error::ReservedPeriod(String::new()));
        }

        let removed = self.db.in_transaction(|tx| {
            let period_rows = tx.delete_url_period(period_name)?;
            let cumulative_rows = tx.delete_url_period(CUMULATIVE_PERIOD)?;
            Ok(period_rows + cumulative_rows)
        })?;

        tracing::info!(period = period_name, removed, "Url stats cleared for update");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{test_db, tree_catalog};
    use super::*;
    use crate::types::{Referral, UrlRecord};
    use std::collections::BTreeMap;

    fn seed(agg: &Aggregator<'_, crate::catalog::StaticCatalog>, period: &str) {
        agg.ingest_urls(period, 30, &[UrlRecord::new("/dataset/r", 3, 1)])
            .unwrap();
        let mut social = BTreeMap::new();
        social.insert("/dataset/r".to_string(), vec![Referral::new("twitter", 2)]);
        agg.update_social(period, &social).unwrap();
        let mut os = BTreeMap::new();
        os.insert("Linux".to_string(), "7".to_string());
        agg.update_sitewide(period, "OS", &os).unwrap();
        agg.rollup_publishers(period).unwrap();
    }

    #[test]
    fn test_delete_single_period() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);
        seed(&agg, "2023-Q1");
        seed(&agg, "2023-Q2");

        let summary = agg.delete_period("2023-Q1").unwrap();
        assert_eq!(summary.urls, 1);
        assert_eq!(summary.sitewide, 1);
        assert_eq!(summary.publishers, 3);
        assert_eq!(summary.referrals, 1);

        assert_eq!(db.count_rows(Some("2023-Q1")).unwrap().total(), 0);
        assert!(db.count_rows(Some("2023-Q2")).unwrap().total() > 0);
        assert!(db.get_url_stat(CUMULATIVE_PERIOD, "/dataset/r").unwrap().is_some());
    }

    #[test]
    fn test_delete_all_sentinel_clears_store() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);
        seed(&agg, "2023-Q1");
        seed(&agg, "2023-Q2");

        let summary = agg.delete_period(PURGE_ALL).unwrap();
        assert!(summary.total() > 0);
        assert_eq!(db.count_rows(None).unwrap().total(), 0);
    }

    #[test]
    fn test_delete_cumulative_period_is_not_sentinel() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);
        seed(&agg, "2023-Q1");

        let summary = agg.delete_period(CUMULATIVE_PERIOD).unwrap();
        assert_eq!(summary.urls, 1);
        assert!(db.get_url_stat("2023-Q1", "/dataset/r").unwrap().is_some());
    }

    #[test]
    fn test_pre_update_clears_period_and_cumulative() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);
        seed(&agg, "2023-Q1");
        seed(&agg, "2023-Q2");

        assert_eq!(agg.pre_update_url_stats("2023-Q2").unwrap(), 2);
        assert!(db.get_url_stat("2023-Q2", "/dataset/r").unwrap().is_none());
        assert!(db.get_url_stat(CUMULATIVE_PERIOD, "/dataset/r").unwrap().is_none());
        assert!(db.get_url_stat("2023-Q1", "/dataset/r").unwrap().is_some());
        assert_eq!(db.list_referral_stats("2023-Q2").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_period_rejected() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);
        assert!(matches!(agg.delete_period(""), Err(Error::ReservedPeriod(_))));
    }
}
