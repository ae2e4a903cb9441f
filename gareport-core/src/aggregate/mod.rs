//! Period aggregation
//!
//! The [`Aggregator`] turns one reporting run's inputs into stored rollups.
//! A scheduler calls it once per period, in this order:
//!
//! ```text
//! delete_period ─► pre_update_url_stats ─► ingest_urls ─► update_social
//!                                                              │
//!                       rollup_publishers ◄── update_sitewide ◄┘
//! ```
//!
//! [`Aggregator::run_period`] performs the whole sequence for a
//! [`PeriodBatch`].
//!
//! ## Commit boundaries
//!
//! Every write goes through [`Database::in_transaction`]. With
//! [`CommitMode::PerBatch`] one call is one transaction and any error rolls
//! the call back. With [`CommitMode::PerRow`] each input record commits on
//! its own, so a failure leaves the already-processed prefix in place and
//! the period must be purged before it is retried.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gareport_core::aggregate::{Aggregator, PeriodBatch};
//! use gareport_core::catalog::StaticCatalog;
//! use gareport_core::Database;
//! use std::path::Path;
//!
//! let db = Database::open(Path::new("gareport.db")).unwrap();
//! db.migrate().unwrap();
//! let catalog = StaticCatalog::load(Path::new("catalog.json")).unwrap();
//! let batch = PeriodBatch::load(Path::new("2023-04.json")).unwrap();
//!
//! let summary = Aggregator::new(&db, &catalog).run_period(&batch).unwrap();
//! println!("{} publishers rolled up", summary.rollup.publishers);
//! ```

mod publishers;
mod purge;
mod run;
mod social;
mod urls;

pub use publishers::RollupSummary;
pub use purge::PurgeSummary;
pub use run::{MetricValue, PeriodBatch, RunSummary};
pub use urls::IngestSummary;

use crate::catalog::Catalog;
use crate::config::AggregationConfig;
use crate::db::{Database, PeriodTx};
use crate::error::Result;
use crate::types::CommitMode;

/// Runs the period aggregations against one store and one catalog.
pub struct Aggregator<'a, C: Catalog + ?Sized> {
    db: &'a Database,
    catalog: &'a C,
    commit_mode: CommitMode,
}

impl<'a, C: Catalog + ?Sized> Aggregator<'a, C> {
    pub fn new(db: &'a Database, catalog: &'a C) -> Self {
        Self {
            db,
            catalog,
            commit_mode: CommitMode::default(),
        }
    }

    /// Aggregator using the configured commit mode
    pub fn from_config(db: &'a Database, catalog: &'a C, config: &AggregationConfig) -> Self {
        Self::new(db, catalog).with_commit_mode(config.commit_mode)
    }

    pub fn with_commit_mode(mut self, commit_mode: CommitMode) -> Self {
        self.commit_mode = commit_mode;
        self
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// Apply `setup` once and `apply` to every item, honouring the commit mode.
    fn commit_each<T>(
        &self,
        setup: impl FnOnce(&PeriodTx<'_>) -> Result<()>,
        items: impl IntoIterator<Item = T>,
        mut apply: impl FnMut(&PeriodTx<'_>, T) -> Result<()>,
    ) -> Result<()> {
        match self.commit_mode {
            CommitMode::PerBatch => self.db.in_transaction(|tx| {
                setup(tx)?;
                for item in items {
                    apply(tx, item)?;
                }
                Ok(())
            }),
            CommitMode::PerRow => {
                self.db.in_transaction(setup)?;
                for item in items {
                    self.db.in_transaction(|tx| apply(tx, item))?;
                }
                Ok(())
            }
        }
    }
}
