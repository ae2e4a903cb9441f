//! Publisher subtree rollups.

use super::Aggregator;
use crate::catalog::{Catalog, Publisher};
use crate::db::{new_id, PeriodTx};
use crate::error::{Error, Result};
use crate::hierarchy::walk_subtree;
use crate::types::{PublisherStat, PURGE_ALL};
use std::collections::HashSet;

/// Outcome of one `rollup_publishers` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollupSummary {
    /// Publisher rows written
    pub publishers: usize,
    /// How many of them are top-level
    pub toplevel: usize,
    /// Pageviews summed over the top-level publishers
    pub total_views: u64,
    /// Visits summed over the top-level publishers
    pub total_visits: u64,
}

impl<C: Catalog + ?Sized> Aggregator<'_, C> {
    /// Recompute every active publisher's subtree totals for `period_name`.
    ///
    /// Reads the period's url rows, so it runs after `ingest_urls`. Any
    /// catalog failure or hierarchy cycle aborts the rollup.
    pub fn rollup_publishers(&self, period_name: &str) -> Result<RollupSummary> {
        if period_name.is_empty() || period_name == PURGE_ALL {
            return Err(Error::ReservedPeriod(period_name.to_string()));
        }

        let top_level: HashSet<String> = self
            .catalog
            .top_level_publishers()?
            .into_iter()
            .map(|p| p.name)
            .collect();
        let publishers = self.catalog.active_publishers()?;

        tracing::info!(
            period = period_name,
            publishers = publishers.len(),
            toplevel = top_level.len(),
            "Rolling up publishers"
        );

        let mut summary = RollupSummary::default();
        self.commit_each(|_| Ok(()), publishers, |tx, publisher| {
            let toplevel = top_level.contains(&publisher.name);
            let stat = self.publisher_stat(tx, period_name, &publisher, toplevel)?;

            summary.publishers += 1;
            if toplevel {
                summary.toplevel += 1;
                summary.total_views = summary.total_views.saturating_add(stat.views);
                summary.total_visits = summary.total_visits.saturating_add(stat.visits);
            }

            tx.upsert_publisher_stat(&stat)
        })?;

        tracing::info!(
            period = period_name,
            publishers = summary.publishers,
            views = summary.total_views,
            visits = summary.total_visits,
            "Publisher rollup complete"
        );

        Ok(summary)
    }

    fn publisher_stat(
        &self,
        tx: &PeriodTx<'_>,
        period_name: &str,
        publisher: &Publisher,
        toplevel: bool,
    ) -> Result<PublisherStat> {
        let subtree = walk_subtree(self.catalog, publisher)?;

        let mut views: u64 = 0;
        let mut visits: u64 = 0;
        for name in subtree.names() {
            let (v, s) = tx.department_totals(period_name, name)?;
            views = views
                .checked_add(v)
                .ok_or_else(|| Error::malformed("views", format!("{} + {}", views, v)))?;
            visits = visits
                .checked_add(s)
                .ok_or_else(|| Error::malformed("visits", format!("{} + {}", visits, s)))?;
        }

        let parent = self
            .catalog
            .parent_publishers(&publisher.name)?
            .into_iter()
            .next()
            .map(|p| p.name)
            .unwrap_or_default();

        tracing::debug!(
            publisher = %publisher.name,
            views,
            visits,
            subpublishers = subtree.descendant_count(),
            "Publisher subtree totals"
        );

        Ok(PublisherStat {
            id: new_id(),
            period_name: period_name.to_string(),
            publisher_name: publisher.name.clone(),
            views,
            visits,
            toplevel,
            subpublishercount: subtree.descendant_count(),
            parent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{test_db, tree_catalog};
    use super::*;
    use crate::catalog::{CatalogFile, Dataset, PublisherEntry, StaticCatalog};
    use crate::types::{CommitMode, UrlRecord};

    fn seed_tree(db: &crate::db::Database, catalog: &StaticCatalog) {
        Aggregator::new(db, catalog)
            .ingest_urls(
                "2023-01",
                31,
                &[
                    UrlRecord::new("/dataset/r", 10, 2),
                    UrlRecord::new("/dataset/c1", 5, 1),
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_subtree_totals() {
        let db = test_db();
        let catalog = tree_catalog();
        seed_tree(&db, &catalog);

        let summary = Aggregator::new(&db, &catalog)
            .rollup_publishers("2023-01")
            .unwrap();
        assert_eq!(summary.publishers, 3);
        assert_eq!(summary.toplevel, 1);
        assert_eq!((summary.total_views, summary.total_visits), (15, 3));

        let root = db.get_publisher_stat("2023-01", "root").unwrap().unwrap();
        assert_eq!((root.views, root.visits), (15, 3));
        assert_eq!(root.subpublishercount, 2);
        assert!(root.toplevel);
        assert_eq!(root.parent, "");

        let child1 = db.get_publisher_stat("2023-01", "child1").unwrap().unwrap();
        assert_eq!((child1.views, child1.visits), (5, 1));
        assert_eq!(child1.subpublishercount, 0);
        assert!(!child1.toplevel);
        assert_eq!(child1.parent, "root");

        let child2 = db.get_publisher_stat("2023-01", "child2").unwrap().unwrap();
        assert_eq!((child2.views, child2.visits), (0, 0));
    }

    #[test]
    fn test_rerun_overwrites_rows() {
        let db = test_db();
        let catalog = tree_catalog();
        seed_tree(&db, &catalog);
        let agg = Aggregator::new(&db, &catalog);

        agg.rollup_publishers("2023-01").unwrap();
        agg.ingest_urls("2023-01", 31, &[UrlRecord::new("/dataset/c2", 4, 4)])
            .unwrap();
        agg.rollup_publishers("2023-01").unwrap();

        let rows = db.list_publisher_stats("2023-01").unwrap();
        assert_eq!(rows.len(), 3);
        let root = db.get_publisher_stat("2023-01", "root").unwrap().unwrap();
        assert_eq!((root.views, root.visits), (19, 7));
    }

    #[test]
    fn test_deleted_parent_makes_child_toplevel() {
        let db = test_db();
        let catalog = StaticCatalog::new(CatalogFile {
            publishers: vec![
                PublisherEntry::new("gone").deleted(),
                PublisherEntry::new("orphan").with_parent("gone"),
            ],
            datasets: vec![],
        })
        .unwrap();

        Aggregator::new(&db, &catalog)
            .rollup_publishers("2023-01")
            .unwrap();

        let orphan = db.get_publisher_stat("2023-01", "orphan").unwrap().unwrap();
        assert!(orphan.toplevel);
        assert_eq!(orphan.parent, "");
        assert!(db.get_publisher_stat("2023-01", "gone").unwrap().is_none());
    }

    #[test]
    fn test_diamond_counts_shared_child_once() {
        let db = test_db();
        let catalog = StaticCatalog::new(CatalogFile {
            publishers: vec![
                PublisherEntry::new("top"),
                PublisherEntry::new("left").with_parent("top"),
                PublisherEntry::new("right").with_parent("top"),
                PublisherEntry::new("shared")
                    .with_parent("left")
                    .with_parent("right"),
            ],
            datasets: vec![crate::catalog::DatasetEntry::new("s", Some("shared"))],
        })
        .unwrap();
        let agg = Aggregator::new(&db, &catalog);
        agg.ingest_urls("2023-01", 31, &[UrlRecord::new("/dataset/s", 8, 2)])
            .unwrap();
        agg.rollup_publishers("2023-01").unwrap();

        let top = db.get_publisher_stat("2023-01", "top").unwrap().unwrap();
        assert_eq!((top.views, top.visits), (8, 2));
        assert_eq!(top.subpublishercount, 3);
        let shared = db.get_publisher_stat("2023-01", "shared").unwrap().unwrap();
        assert_eq!(shared.parent, "left");
    }

    #[test]
    fn test_cycle_aborts_rollup() {
        let db = test_db();
        let catalog = StaticCatalog::new(CatalogFile {
            publishers: vec![
                PublisherEntry::new("a").with_parent("b"),
                PublisherEntry::new("b").with_parent("a"),
            ],
            datasets: vec![],
        })
        .unwrap();

        let result = Aggregator::new(&db, &catalog).rollup_publishers("2023-01");
        assert!(matches!(result, Err(Error::CycleDetected { .. })));
        assert_eq!(db.count_rows(None).unwrap().publishers, 0);
    }

    /// Delegates to the tree catalog but fails when asked for one publisher's children.
    struct FailingCatalog {
        inner: StaticCatalog,
        fail_on: &'static str,
    }

    impl Catalog for FailingCatalog {
        fn dataset(&self, id_or_name: &str) -> Result<Option<Dataset>> {
            self.inner.dataset(id_or_name)
        }

        fn publisher(&self, name: &str) -> Result<Option<Publisher>> {
            self.inner.publisher(name)
        }

        fn active_publishers(&self) -> Result<Vec<Publisher>> {
            self.inner.active_publishers()
        }

        fn parent_publishers(&self, name: &str) -> Result<Vec<Publisher>> {
            self.inner.parent_publishers(name)
        }

        fn child_publishers(&self, name: &str) -> Result<Vec<Publisher>> {
            if name == self.fail_on {
                return Err(Error::StorageUnavailable("catalog offline".into()));
            }
            self.inner.child_publishers(name)
        }
    }

    #[test]
    fn test_catalog_failure_rolls_back_per_batch() {
        let db = test_db();
        let catalog = FailingCatalog {
            inner: tree_catalog(),
            fail_on: "child2",
        };

        let result = Aggregator::new(&db, &catalog)
            .with_commit_mode(CommitMode::PerBatch)
            .rollup_publishers("2023-01");
        assert!(matches!(result, Err(Error::StorageUnavailable(_))));
        assert_eq!(db.count_rows(None).unwrap().publishers, 0);
    }

    #[test]
    fn test_catalog_failure_keeps_prefix_per_row() {
        let db = test_db();
        let catalog = FailingCatalog {
            inner: tree_catalog(),
            fail_on: "child2",
        };

        let result = Aggregator::new(&db, &catalog)
            .with_commit_mode(CommitMode::PerRow)
            .rollup_publishers("2023-01");
        assert!(result.is_err());
        // child1 is processed before child2 in name order
        assert!(db.get_publisher_stat("2023-01", "child1").unwrap().is_some());
        assert!(db.get_publisher_stat("2023-01", "root").unwrap().is_none());
    }

    #[test]
    fn test_rollup_rejects_purge_sentinel() {
        let db = test_db();
        let catalog = tree_catalog();
        assert!(matches!(
            Aggregator::new(&db, &catalog).rollup_publishers("all"),
            Err(Error::ReservedPeriod(_))
        ));
    }
}
