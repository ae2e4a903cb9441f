//! Host catalog lookups
//!
//! The aggregators never own dataset or publisher data. They ask a
//! [`Catalog`] for the handful of facts they need:
//! - which publisher a dataset belongs to
//! - which publishers are active
//! - each publisher's active parents and children
//!
//! Misses are reported as `None` / empty lists. An `Err` means the backing
//! store is unavailable and aborts the current run.

mod static_catalog;

pub use static_catalog::{CatalogFile, DatasetEntry, GroupState, PublisherEntry, StaticCatalog};

use crate::error::Result;
use serde::Serialize;

/// A dataset as seen by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    /// Name of the dataset's primary publisher group
    pub publisher: Option<String>,
}

/// An active publisher group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publisher {
    pub name: String,
    pub title: Option<String>,
}

/// Read-only view of the host catalog.
pub trait Catalog {
    /// Look up a dataset by id or name.
    fn dataset(&self, id_or_name: &str) -> Result<Option<Dataset>>;

    /// Look up an active publisher by name.
    fn publisher(&self, name: &str) -> Result<Option<Publisher>>;

    /// All active publishers, ordered by name.
    fn active_publishers(&self) -> Result<Vec<Publisher>>;

    /// Active parent publishers of `name`, first one is the primary parent.
    fn parent_publishers(&self, name: &str) -> Result<Vec<Publisher>>;

    /// Active direct children of `name`.
    fn child_publishers(&self, name: &str) -> Result<Vec<Publisher>>;

    /// Active publishers without an active parent, ordered by name.
    fn top_level_publishers(&self) -> Result<Vec<Publisher>> {
        let mut top = Vec::new();
        for publisher in self.active_publishers()? {
            if self.parent_publishers(&publisher.name)?.is_empty() {
                top.push(publisher);
            }
        }
        top.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(top)
    }
}
