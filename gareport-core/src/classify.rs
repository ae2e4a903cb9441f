//! Attribution of request paths to datasets and publishers.
//!
//! Only the first two path segments matter:
//!
//! | path | package | publisher |
//! |------|---------|-----------|
//! | `/dataset/{id}[/...]` | `id` | dataset's publisher, if any |
//! | `/publisher/{name}[/...]` | - | `name` |
//! | anything else | - | - |

use crate::catalog::Catalog;
use crate::error::Result;

/// What a url is attributed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Dataset id, verbatim from the path
    pub package_id: Option<String>,
    /// Publisher name
    pub publisher: Option<String>,
}

impl Classification {
    fn dataset(id: &str, publisher: Option<String>) -> Self {
        Self {
            package_id: Some(id.to_string()),
            publisher,
        }
    }

    fn publisher(name: &str) -> Self {
        Self {
            package_id: None,
            publisher: Some(name.to_string()),
        }
    }
}

/// Path component of a url, without scheme, host, query or fragment.
///
/// The path is sliced from the raw text, so percent-escapes, non-ASCII
/// characters and dot segments come through unchanged.
pub fn request_path(raw: &str) -> &str {
    let path = match url::Url::parse(raw) {
        Ok(parsed) if !parsed.cannot_be_a_base() => after_authority(raw),
        _ => raw,
    };
    let end = path.find(|c: char| c == '?' || c == '#').unwrap_or(path.len());
    &path[..end]
}

/// Remainder of an absolute url after `scheme://host[:port]`.
fn after_authority(raw: &str) -> &str {
    let raw = raw.trim_start_matches(|c: char| c <= ' ');
    let rest = raw.find(':').map_or(raw, |colon| &raw[colon + 1..]);
    let Some(authority) = rest.strip_prefix("//") else {
        return rest;
    };
    let start = authority
        .find(|c: char| c == '/' || c == '?' || c == '#')
        .unwrap_or(authority.len());
    &authority[start..]
}

/// Attribute `url` to a dataset and/or publisher.
///
/// Unknown datasets keep their id with no publisher. Catalog errors propagate.
pub fn classify<C: Catalog + ?Sized>(catalog: &C, url: &str) -> Result<Classification> {
    let path = request_path(url);
    let Some(rest) = path.strip_prefix('/') else {
        return Ok(Classification::default());
    };

    let mut segments = rest.split('/');
    let kind = segments.next().unwrap_or_default();
    let Some(reference) = segments.next().filter(|s| !s.is_empty()) else {
        return Ok(Classification::default());
    };

    match kind {
        "dataset" => {
            let publisher = catalog
                .dataset(reference)?
                .and_then(|dataset| dataset.publisher);
            if publisher.is_none() {
                tracing::trace!(dataset = reference, "Dataset has no publisher");
            }
            Ok(Classification::dataset(reference, publisher))
        }
        "publisher" => Ok(Classification::publisher(reference)),
        _ => Ok(Classification::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogFile, DatasetEntry, PublisherEntry, StaticCatalog};

    fn catalog() -> StaticCatalog {
        StaticCatalog::new(CatalogFile {
            publishers: vec![PublisherEntry::new("dft")],
            datasets: vec![
                DatasetEntry::new("abc", Some("dft")),
                DatasetEntry::new("lonely", None),
            ],
        })
        .unwrap()
    }

    #[test]
    fn test_request_path() {
        assert_eq!(request_path("http://host/dataset/abc?x=1"), "/dataset/abc");
        assert_eq!(request_path("/publisher/foo#top"), "/publisher/foo");
        assert_eq!(request_path("/about"), "/about");
    }

    #[test]
    fn test_request_path_keeps_raw_segments() {
        assert_eq!(request_path("http://host/dataset/données"), "/dataset/données");
        assert_eq!(request_path("https://host:8443/dataset/a%20b#x"), "/dataset/a%20b");
        assert_eq!(request_path("http://host/dataset/../publisher/x"), "/dataset/../publisher/x");
        assert_eq!(request_path("http://host?q=1"), "");
        assert_eq!(request_path(" HTTP://Host/dataset/Abc"), "/dataset/Abc");
    }

    #[test]
    fn test_absolute_and_relative_urls_classify_alike() {
        let catalog = StaticCatalog::new(CatalogFile {
            publishers: vec![PublisherEntry::new("dft")],
            datasets: vec![DatasetEntry::new("données", Some("dft"))],
        })
        .unwrap();

        let relative = classify(&catalog, "/dataset/données").unwrap();
        let absolute = classify(&catalog, "http://host/dataset/données").unwrap();
        assert_eq!(relative, Classification::dataset("données", Some("dft".to_string())));
        assert_eq!(absolute, relative);

        let dotted = classify(&catalog, "http://host/dataset/../publisher/x").unwrap();
        assert_eq!(dotted, Classification::dataset("..", None));
    }

    #[test]
    fn test_absolute_dataset_url_with_resource() {
        let c = classify(&catalog(), "http://host/dataset/abc/resource/xyz").unwrap();
        assert_eq!(c.package_id.as_deref(), Some("abc"));
        assert_eq!(c.publisher.as_deref(), Some("dft"));
    }

    #[test]
    fn test_dataset_without_publisher() {
        let c = classify(&catalog(), "/dataset/lonely").unwrap();
        assert_eq!(c, Classification::dataset("lonely", None));
    }

    #[test]
    fn test_unknown_dataset_keeps_id() {
        let c = classify(&catalog(), "/dataset/nope/resource/1").unwrap();
        assert_eq!(c, Classification::dataset("nope", None));
    }

    #[test]
    fn test_publisher_path() {
        let c = classify(&catalog(), "/publisher/foo").unwrap();
        assert_eq!(c, Classification::publisher("foo"));
        let c = classify(&catalog(), "/publisher/foo/edit").unwrap();
        assert_eq!(c.publisher.as_deref(), Some("foo"));
    }

    #[test]
    fn test_unclassified_paths() {
        let catalog = catalog();
        for url in ["/about", "/", "", "/dataset", "/dataset/", "dataset/abc", "/data/set"] {
            assert_eq!(
                classify(&catalog, url).unwrap(),
                Classification::default(),
                "{}",
                url
            );
        }
    }
}
