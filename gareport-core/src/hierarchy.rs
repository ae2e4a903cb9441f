//! Publisher subtree traversal.
//!
//! The walk is iterative and depth-first, yielding publishers in pre-order
//! (the root first, then each child followed by its own descendants). A
//! publisher reachable along two paths is yielded once. An edge back to a
//! publisher on the current path is a cycle and fails the walk.

use crate::catalog::{Catalog, Publisher};
use crate::error::{Error, Result};
use std::collections::HashSet;

struct Frame {
    children: std::vec::IntoIter<Publisher>,
}

/// A publisher together with every transitive child.
#[derive(Debug, Clone)]
pub struct Subtree {
    /// Pre-order, root first
    pub members: Vec<Publisher>,
}

impl Subtree {
    /// Number of descendants, excluding the root.
    pub fn descendant_count(&self) -> u32 {
        (self.members.len() - 1) as u32
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|p| p.name.as_str())
    }
}

/// Enumerate `root` and all of its transitive children.
pub fn walk_subtree<C: Catalog + ?Sized>(catalog: &C, root: &Publisher) -> Result<Subtree> {
    let mut members = vec![root.clone()];
    let mut seen: HashSet<String> = HashSet::from([root.name.clone()]);
    let mut path: Vec<String> = vec![root.name.clone()];
    let mut stack = vec![Frame {
        children: catalog.child_publishers(&root.name)?.into_iter(),
    }];

    loop {
        let next = match stack.last_mut() {
            Some(frame) => frame.children.next(),
            None => break,
        };

        let Some(child) = next else {
            stack.pop();
            path.pop();
            continue;
        };

        if path.contains(&child.name) {
            let mut cycle = path.clone();
            cycle.push(child.name.clone());
            tracing::error!(publisher = %child.name, path = ?cycle, "Publisher hierarchy cycle");
            return Err(Error::CycleDetected {
                publisher: child.name,
                path: cycle,
            });
        }

        if !seen.insert(child.name.clone()) {
            tracing::debug!(
                root = %root.name,
                publisher = %child.name,
                "Publisher reachable by more than one path, counted once"
            );
            continue;
        }

        let grandchildren = catalog.child_publishers(&child.name)?;
        path.push(child.name.clone());
        members.push(child);
        stack.push(Frame {
            children: grandchildren.into_iter(),
        });
    }

    Ok(Subtree { members })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogFile, PublisherEntry, StaticCatalog};

    fn catalog(entries: Vec<PublisherEntry>) -> StaticCatalog {
        StaticCatalog::new(CatalogFile {
            publishers: entries,
            datasets: vec![],
        })
        .unwrap()
    }

    fn walk_names(catalog: &StaticCatalog, root: &str) -> Result<Vec<String>> {
        let root = catalog.publisher(root)?.unwrap();
        let subtree = walk_subtree(catalog, &root)?;
        Ok(subtree.names().map(str::to_string).collect())
    }

    #[test]
    fn test_preorder_walk() {
        let catalog = catalog(vec![
            PublisherEntry::new("root"),
            PublisherEntry::new("a").with_parent("root"),
            PublisherEntry::new("a1").with_parent("a"),
            PublisherEntry::new("b").with_parent("root"),
        ]);
        assert_eq!(walk_names(&catalog, "root").unwrap(), ["root", "a", "a1", "b"]);
        assert_eq!(walk_names(&catalog, "a").unwrap(), ["a", "a1"]);
        assert_eq!(walk_names(&catalog, "b").unwrap(), ["b"]);
    }

    #[test]
    fn test_descendant_count() {
        let catalog = catalog(vec![
            PublisherEntry::new("root"),
            PublisherEntry::new("a").with_parent("root"),
            PublisherEntry::new("b").with_parent("root"),
        ]);
        let root = catalog.publisher("root").unwrap().unwrap();
        let subtree = walk_subtree(&catalog, &root).unwrap();
        assert_eq!(subtree.members[0].name, "root");
        assert_eq!(subtree.descendant_count(), 2);
    }

    #[test]
    fn test_shared_descendant_counted_once() {
        let catalog = catalog(vec![
            PublisherEntry::new("root"),
            PublisherEntry::new("a").with_parent("root"),
            PublisherEntry::new("b").with_parent("root"),
            PublisherEntry::new("shared").with_parent("a").with_parent("b"),
        ]);
        assert_eq!(
            walk_names(&catalog, "root").unwrap(),
            ["root", "a", "shared", "b"]
        );
    }

    #[test]
    fn test_cycle_detected() {
        let catalog = catalog(vec![
            PublisherEntry::new("a").with_parent("c"),
            PublisherEntry::new("b").with_parent("a"),
            PublisherEntry::new("c").with_parent("b"),
        ]);
        match walk_names(&catalog, "a") {
            Err(Error::CycleDetected { publisher, path }) => {
                assert_eq!(publisher, "a");
                assert_eq!(path, ["a", "b", "c", "a"]);
            }
            other => panic!("expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_self_parent_is_a_cycle() {
        let catalog = catalog(vec![PublisherEntry::new("loop").with_parent("loop")]);
        assert!(matches!(
            walk_names(&catalog, "loop"),
            Err(Error::CycleDetected { .. })
        ));
    }
}
