//! Referral and sitewide metric writers.

use super::Aggregator;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::period;
use crate::types::Referral;
use std::collections::BTreeMap;

impl<C: Catalog + ?Sized> Aggregator<'_, C> {
    /// Replace the period's referral counts with `data` (url -> referrals).
    ///
    /// Repeated `(source, url)` pairs within `data` are added together.
    /// Returns the number of referral entries applied.
    pub fn update_social(
        &self,
        period_name: &str,
        data: &BTreeMap<String, Vec<Referral>>,
    ) -> Result<usize> {
        period::ensure_ingestible(period_name)?;

        let mut applied = 0;
        self.commit_each(
            |tx| {
                let removed = tx.delete_referrals(period_name)?;
                tracing::debug!(period = period_name, removed, "Cleared referral stats");
                Ok(())
            },
            data,
            |tx, (url, referrals)| {
                for referral in referrals {
                    tx.add_referral(period_name, &referral.source, url, referral.count)?;
                    applied += 1;
                }
                Ok(())
            },
        )?;

        tracing::info!(
            period = period_name,
            urls = data.len(),
            referrals = applied,
            "Referral stats updated"
        );
        Ok(applied)
    }

    /// Store one sitewide metric's `key -> value` pairs, overwriting earlier values.
    pub fn update_sitewide(
        &self,
        period_name: &str,
        stat_name: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<usize> {
        period::ensure_ingestible(period_name)?;

        self.commit_each(|_| Ok(()), data, |tx, (key, value)| {
            tx.upsert_sitewide(period_name, stat_name, key, value)
        })?;

        tracing::info!(
            period = period_name,
            stat = stat_name,
            keys = data.len(),
            "Sitewide stats updated"
        );
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{test_db, tree_catalog};
    use super::*;
    use crate::error::Error;

    fn social(entries: &[(&str, &[(&str, u64)])]) -> BTreeMap<String, Vec<Referral>> {
        entries
            .iter()
            .map(|(url, refs)| {
                (
                    url.to_string(),
                    refs.iter().map(|(s, c)| Referral::new(*s, *c)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_update_social_replaces_period() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);

        agg.update_social(
            "2023-01",
            &social(&[("/dataset/r", &[("twitter", 4), ("facebook", 1)])]),
        )
        .unwrap();
        agg.update_social("2023-01", &social(&[("/dataset/c1", &[("twitter", 2)])]))
            .unwrap();

        let rows = db.list_referral_stats("2023-01").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].url, "/dataset/c1");
        assert_eq!(rows[0].count, 2);
    }

    #[test]
    fn test_update_social_adds_repeated_sources() {
        let db = test_db();
        let catalog = tree_catalog();
        let applied = Aggregator::new(&db, &catalog)
            .update_social(
                "2023-01",
                &social(&[("/dataset/r", &[("twitter", 4), ("twitter", 3)])]),
            )
            .unwrap();

        assert_eq!(applied, 2);
        let rows = db.list_referral_stats("2023-01").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 7);
    }

    #[test]
    fn test_update_social_leaves_other_periods() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);

        agg.update_social("2023-01", &social(&[("/a", &[("t.co", 1)])]))
            .unwrap();
        agg.update_social("2023-02", &BTreeMap::new()).unwrap();

        assert_eq!(db.list_referral_stats("2023-01").unwrap().len(), 1);
        assert!(db.list_referral_stats("2023-02").unwrap().is_empty());
    }

    #[test]
    fn test_update_sitewide_overwrites() {
        let db = test_db();
        let catalog = tree_catalog();
        let agg = Aggregator::new(&db, &catalog);

        let mut browsers = BTreeMap::new();
        browsers.insert("Firefox".to_string(), "12".to_string());
        browsers.insert("Chrome".to_string(), "40".to_string());
        agg.update_sitewide("2023-01", "Browser", &browsers).unwrap();

        browsers.insert("Firefox".to_string(), "15".to_string());
        assert_eq!(agg.update_sitewide("2023-01", "Browser", &browsers).unwrap(), 2);

        let rows = db.list_sitewide_stats("2023-01", Some("Browser")).unwrap();
        let pairs: Vec<_> = rows.iter().map(|r| (r.key.as_str(), r.value.as_str())).collect();
        assert_eq!(pairs, vec![("Chrome", "40"), ("Firefox", "15")]);
    }

    #[test]
    fn test_sitewide_rejects_cumulative_period() {
        let db = test_db();
        let catalog = tree_catalog();
        let result = Aggregator::new(&db, &catalog).update_sitewide("All", "OS", &BTreeMap::new());
        assert!(matches!(result, Err(Error::ReservedPeriod(_))));
    }
}
