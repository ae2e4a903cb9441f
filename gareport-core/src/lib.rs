//! # gareport-core
//!
//! Core library for gareport - periodic web-analytics rollups for a data
//! catalog site.
//!
//! This library provides:
//! - Attribution of request urls to datasets and publishers
//! - Per-url period totals with a cumulative "All" row per url
//! - Publisher subtree rollups over the catalog hierarchy
//! - Referral and sitewide metric storage, and period purging
//! - SQLite storage, configuration and logging
//!
//! ## Data flow
//!
//! - **Inputs:** a [`PeriodBatch`](aggregate::PeriodBatch) from the analytics
//!   source and a [`Catalog`](catalog::Catalog) of datasets and publishers
//! - **Period rows:** `ga_url`, `ga_referrer` and `ga_stat`, replaced per run
//! - **Derived rows:** the "All" url rows and `ga_publisher`, recomputable
//!   from the period rows at any time
//!
//! ## Example
//!
//! ```rust,no_run
//! use gareport_core::{Aggregator, Config, Database};
//! use gareport_core::catalog::StaticCatalog;
//!
//! let config = Config::load().expect("failed to load config");
//!
//! let db = Database::open(&config.resolved_database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let catalog = StaticCatalog::load("catalog.json".as_ref()).expect("failed to load catalog");
//! let aggregator = Aggregator::from_config(&db, &catalog, &config.aggregation);
//! aggregator.rollup_publishers("2023-04").expect("rollup failed");
//! ```

// Re-export commonly used items at the crate root
pub use aggregate::Aggregator;
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod aggregate;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod logging;
pub mod period;
pub mod types;
