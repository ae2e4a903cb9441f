//! File-backed catalog snapshot.
//!
//! The scheduler exports the host's publishers and datasets to JSON before a
//! run; this module loads that export and answers [`Catalog`] queries from it.
//!
//! ```json
//! {
//!   "publishers": [
//!     { "name": "cabinet-office", "title": "Cabinet Office" },
//!     { "name": "gds", "parents": ["cabinet-office"] },
//!     { "name": "old-unit", "state": "deleted" }
//!   ],
//!   "datasets": [
//!     { "id": "d1f0", "name": "fuel-prices", "publisher": "gds" }
//!   ]
//! }
//! ```

use super::{Catalog, Dataset, Publisher};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Group state as exported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupState {
    #[default]
    Active,
    Deleted,
}

/// A publisher group in the export.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherEntry {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub state: GroupState,
    /// Parent publisher names; the first is the primary parent
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PublisherEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            state: GroupState::Active,
            parents: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    pub fn deleted(mut self) -> Self {
        self.state = GroupState::Deleted;
        self
    }
}

/// A dataset in the export.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
}

impl DatasetEntry {
    pub fn new(id: impl Into<String>, publisher: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: None,
            publisher: publisher.map(str::to_string),
        }
    }
}

/// Top-level shape of a catalog export file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub publishers: Vec<PublisherEntry>,
    #[serde(default)]
    pub datasets: Vec<DatasetEntry>,
}

/// In-memory catalog built from a [`CatalogFile`].
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    publishers: BTreeMap<String, PublisherEntry>,
    /// Child names per parent, in export order
    children: HashMap<String, Vec<String>>,
    datasets: Vec<DatasetEntry>,
    dataset_index: HashMap<String, usize>,
}

impl StaticCatalog {
    /// Build a catalog, rejecting duplicate publisher names.
    pub fn new(file: CatalogFile) -> Result<Self> {
        let mut publishers = BTreeMap::new();
        let mut children: HashMap<String, Vec<String>> = HashMap::new();

        for entry in &file.publishers {
            for parent in &entry.parents {
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(entry.name.clone());
            }
        }

        for entry in file.publishers {
            if publishers.contains_key(&entry.name) {
                return Err(Error::Config(format!(
                    "duplicate publisher in catalog: {}",
                    entry.name
                )));
            }
            publishers.insert(entry.name.clone(), entry);
        }

        for (parent, kids) in &children {
            if !publishers.contains_key(parent) {
                tracing::warn!(
                    parent = %parent,
                    children = kids.len(),
                    "Catalog references unknown parent publisher"
                );
            }
        }

        let mut dataset_index = HashMap::new();
        for (i, dataset) in file.datasets.iter().enumerate() {
            dataset_index.insert(dataset.id.clone(), i);
        }
        // Names resolve only where they don't shadow an id.
        for (i, dataset) in file.datasets.iter().enumerate() {
            if let Some(name) = &dataset.name {
                dataset_index.entry(name.clone()).or_insert(i);
            }
        }

        tracing::debug!(
            publishers = publishers.len(),
            datasets = file.datasets.len(),
            "Catalog loaded"
        );

        Ok(Self {
            publishers,
            children,
            datasets: file.datasets,
            dataset_index,
        })
    }

    /// Parse a catalog export from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::new(file)
    }

    /// Load a catalog export from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read catalog {:?}: {}", path, e))
        })?;
        Self::from_json_str(&content)
    }

    fn active(&self, name: &str) -> Option<&PublisherEntry> {
        self.publishers
            .get(name)
            .filter(|entry| entry.state == GroupState::Active)
    }

    fn to_publisher(entry: &PublisherEntry) -> Publisher {
        Publisher {
            name: entry.name.clone(),
            title: entry.title.clone(),
        }
    }
}

impl Catalog for StaticCatalog {
    fn dataset(&self, id_or_name: &str) -> Result<Option<Dataset>> {
        let Some(&index) = self.dataset_index.get(id_or_name) else {
            return Ok(None);
        };
        let entry = &self.datasets[index];
        let publisher = entry
            .publisher
            .as_deref()
            .and_then(|name| self.active(name))
            .map(|p| p.name.clone());

        Ok(Some(Dataset {
            id: entry.id.clone(),
            name: entry.name.clone().unwrap_or_else(|| entry.id.clone()),
            publisher,
        }))
    }

    fn publisher(&self, name: &str) -> Result<Option<Publisher>> {
        Ok(self.active(name).map(Self::to_publisher))
    }

    fn active_publishers(&self) -> Result<Vec<Publisher>> {
        Ok(self
            .publishers
            .values()
            .filter(|entry| entry.state == GroupState::Active)
            .map(Self::to_publisher)
            .collect())
    }

    fn parent_publishers(&self, name: &str) -> Result<Vec<Publisher>> {
        let Some(entry) = self.active(name) else {
            return Ok(Vec::new());
        };
        Ok(entry
            .parents
            .iter()
            .filter_map(|parent| self.active(parent))
            .map(Self::to_publisher)
            .collect())
    }

    fn child_publishers(&self, name: &str) -> Result<Vec<Publisher>> {
        if self.active(name).is_none() {
            return Ok(Vec::new());
        }
        Ok(self
            .children
            .get(name)
            .map(|kids| {
                kids.iter()
                    .filter_map(|kid| self.active(kid))
                    .map(Self::to_publisher)
                    .collect()
            })
            .unwrap_or_default())
    }
}
