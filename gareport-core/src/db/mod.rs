//! Period store for gareport
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Transaction-scoped writes for the aggregators

pub mod repo;
pub mod schema;

pub use repo::{new_id, CumulativeSource, Database, PeriodTx, RowCounts};
