//! Declared image catalog.
//!
//! # Source format
//!
//! ```yaml
//! docker.io:
//!   images:
//!     nginx: ["1.27", "latest"]
//!     bitnami/redis: ["7.2"]
//! ghcr.io/org:
//!   interval: 600
//!   images:
//!     app: ["v1"]
//! ```
//!
//! Catalog files live under a directory (default `sync.d/`), scanned
//! recursively for `*.yml` and `*.yaml`. A file may hold several YAML
//! documents. Files that fail to read or parse are skipped with a warning.
//!
//! # Namespace inference
//!
//! 1. Registry key has a path (`ghcr.io/org`): the path is the namespace and
//!    the image key is the bare name.
//! 2. Otherwise the image key is split on its last `/` (`bitnami/redis`).
//! 3. Otherwise the namespace is `library`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{io_err, CatalogError};
use crate::types::{CatalogEntry, ImageIdentity};

/// Namespace assumed when neither the registry key nor the image key has one.
pub const DEFAULT_NAMESPACE: &str = "library";

// ---------------------------------------------------------------------------
// 1. Raw declarations
// ---------------------------------------------------------------------------

/// One image key under one registry key, as written in a catalog document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredImage {
    pub registry_key: String,
    pub image_key: String,
    pub tags: Vec<String>,
    /// Per-registry staleness interval override, in seconds.
    pub interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RegistryBlock {
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    images: serde_yaml::Mapping,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagValue {
    Text(String),
    Number(serde_yaml::Number),
}

impl TagValue {
    /// YAML reads `3.10` as the float `3.1`; only integer numbers are tags.
    fn into_tag(self, key: &str) -> Result<String, CatalogError> {
        match self {
            TagValue::Text(s) => Ok(s),
            TagValue::Number(n) => match (n.as_u64(), n.as_i64()) {
                (Some(u), _) => Ok(u.to_string()),
                (None, Some(i)) => Ok(i.to_string()),
                (None, None) => Err(CatalogError::Malformed {
                    key: key.to_string(),
                    message: format!("tag {n} is not an integer; quote tags such as \"3.10\""),
                }),
            },
        }
    }
}

/// Parse every document in `source`. `origin` is only used for error context.
pub fn parse_documents(source: &str, origin: &Path) -> Result<Vec<DeclaredImage>, CatalogError> {
    let parse_err = |e: serde_yaml::Error| CatalogError::Parse {
        path: origin.to_path_buf(),
        source: e,
    };

    let mut declared = Vec::new();
    for document in serde_yaml::Deserializer::from_str(source) {
        let value = serde_yaml::Value::deserialize(document).map_err(parse_err)?;
        if value.is_null() {
            continue;
        }
        let registries: serde_yaml::Mapping = serde_yaml::from_value(value).map_err(parse_err)?;
        for (registry_key, block) in registries {
            let registry_key = scalar_key(registry_key)?;
            let block: RegistryBlock = serde_yaml::from_value(block).map_err(parse_err)?;
            for (image_key, tags) in block.images {
                let image_key = scalar_key(image_key)?;
                let key = format!("{registry_key}/{image_key}");
                let tags: Option<Vec<TagValue>> =
                    serde_yaml::from_value(tags).map_err(|e| CatalogError::Malformed {
                        key: key.clone(),
                        message: format!("tags must be a list of strings: {e}"),
                    })?;
                let tags = tags
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tag| tag.into_tag(&key))
                    .collect::<Result<Vec<_>, _>>()?;
                declared.push(DeclaredImage {
                    registry_key: registry_key.clone(),
                    image_key,
                    tags,
                    interval: block.interval,
                });
            }
        }
    }
    Ok(declared)
}

fn scalar_key(key: serde_yaml::Value) -> Result<String, CatalogError> {
    match key {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(CatalogError::Malformed {
            key: format!("{other:?}"),
            message: "keys must be strings".to_string(),
        }),
    }
}

/// Read and parse a single catalog file.
pub fn load_catalog_file(path: &Path) -> Result<Vec<DeclaredImage>, CatalogError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    parse_documents(&contents, path)
}

/// Declarations gathered from a catalog directory.
#[derive(Debug, Default)]
pub struct CatalogSource {
    pub declared: Vec<DeclaredImage>,
    pub files: Vec<PathBuf>,
    /// Files that were found but could not be read or parsed.
    pub skipped: Vec<PathBuf>,
}

/// Load every `*.yml` / `*.yaml` file below `dir`, in sorted path order.
///
/// Only a missing or unreadable `dir` itself is an error.
pub fn load_catalog_dir(dir: &Path) -> Result<CatalogSource, CatalogError> {
    let mut files = Vec::new();
    collect_catalog_files(dir, &mut files)?;
    files.sort();

    let mut source = CatalogSource::default();
    for file in files {
        match load_catalog_file(&file) {
            Ok(mut declared) => {
                tracing::debug!("catalog {}: {} image(s)", file.display(), declared.len());
                source.declared.append(&mut declared);
                source.files.push(file);
            }
            Err(err) => {
                tracing::warn!("skipping catalog {}: {err}", file.display());
                source.skipped.push(file);
            }
        }
    }
    Ok(source)
}

fn collect_catalog_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CatalogError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            collect_catalog_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yml" | "yaml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 2. Identity inference
// ---------------------------------------------------------------------------

/// Derive the canonical identity for one declared tag.
pub fn infer_identity(registry_key: &str, image_key: &str, tag: &str) -> ImageIdentity {
    let registry_key = registry_key.trim_matches('/');
    let image_key = image_key.trim_matches('/');

    if let Some((host, namespace)) = registry_key.split_once('/') {
        return ImageIdentity::new(host, namespace, image_key, tag);
    }
    if let Some((namespace, name)) = image_key.rsplit_once('/') {
        return ImageIdentity::new(registry_key, namespace, name, tag);
    }
    ImageIdentity::new(registry_key, DEFAULT_NAMESPACE, image_key, tag)
}

// ---------------------------------------------------------------------------
// 3. Catalog
// ---------------------------------------------------------------------------

/// Deduplicated, ordered working set for one run.
///
/// Both indices map a reference to a position in [`Catalog::entries`]; they
/// are built from first-seen entries only.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_source: HashMap<String, usize>,
    by_destination: HashMap<String, usize>,
    duplicates: Vec<String>,
}

impl Catalog {
    /// Flatten declarations into entries, dropping duplicate source
    /// references (first declaration wins).
    pub fn build(declared: &[DeclaredImage], destination_host: &str) -> Self {
        let mut catalog = Catalog::default();
        for image in declared {
            for tag in &image.tags {
                let identity = infer_identity(&image.registry_key, &image.image_key, tag);
                let mut entry = CatalogEntry::new(identity, destination_host);
                entry.interval = image.interval;
                catalog.push(entry);
            }
        }
        catalog
    }

    fn push(&mut self, entry: CatalogEntry) {
        let source = entry.source_reference();
        if self.by_source.contains_key(&source) {
            tracing::warn!("duplicate catalog entry {source}; keeping first declaration");
            self.duplicates.push(source);
            return;
        }
        let index = self.entries.len();
        self.by_source.insert(source, index);
        self.by_destination
            .insert(entry.destination_reference.clone(), index);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [CatalogEntry] {
        &mut self.entries
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }

    /// Source references that were declared more than once.
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }

    pub fn get_by_source(&self, source_reference: &str) -> Option<&CatalogEntry> {
        self.by_source
            .get(source_reference)
            .map(|&index| &self.entries[index])
    }

    pub fn get_by_destination(&self, destination_reference: &str) -> Option<&CatalogEntry> {
        self.by_destination
            .get(destination_reference)
            .map(|&index| &self.entries[index])
    }

    pub fn contains_destination(&self, destination_reference: &str) -> bool {
        self.by_destination.contains_key(destination_reference)
    }

    pub fn destination_references(&self) -> HashSet<&str> {
        self.by_destination.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "mirror.example.com";

    fn declared(registry: &str, image: &str, tags: &[&str]) -> DeclaredImage {
        DeclaredImage {
            registry_key: registry.to_string(),
            image_key: image.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            interval: None,
        }
    }

    #[test]
    fn namespace_defaults_to_library() {
        let id = infer_identity("docker.io", "nginx", "latest");
        assert_eq!(id, ImageIdentity::new("docker.io", "library", "nginx", "latest"));
    }

    #[test]
    fn namespace_from_image_key_splits_on_last_segment() {
        let id = infer_identity("quay.io", "org/team/tool", "v2");
        assert_eq!(id, ImageIdentity::new("quay.io", "org/team", "tool", "v2"));
    }

    #[test]
    fn namespace_from_registry_key_keeps_every_segment() {
        let id = infer_identity("ghcr.io/org/team", "app", "v1");
        assert_eq!(id, ImageIdentity::new("ghcr.io", "org/team", "app", "v1"));
        assert_eq!(id.source_full_reference(), "ghcr.io/org/team/app:v1");
    }

    #[test]
    fn registry_namespace_applies_to_every_image_in_block() {
        let catalog = Catalog::build(
            &[
                declared("ghcr.io/org", "a", &["1"]),
                declared("ghcr.io/org", "b", &["1"]),
            ],
            HOST,
        );
        let refs: Vec<_> = catalog
            .entries()
            .iter()
            .map(|e| e.source_reference())
            .collect();
        assert_eq!(refs, vec!["ghcr.io/org/a:1", "ghcr.io/org/b:1"]);
    }

    #[test]
    fn duplicates_keep_first_and_are_recorded() {
        let mut first = declared("docker.io", "nginx", &["latest"]);
        first.interval = Some(60);
        let catalog = Catalog::build(
            &[
                first,
                declared("docker.io", "library/nginx", &["latest", "1.27"]),
            ],
            HOST,
        );
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.duplicates(), ["docker.io/library/nginx:latest"]);
        let kept = catalog
            .get_by_source("docker.io/library/nginx:latest")
            .expect("entry");
        assert_eq!(kept.interval, Some(60), "first declaration must win");
    }

    #[test]
    fn destination_index_matches_entries() {
        let catalog = Catalog::build(&[declared("docker.io", "nginx", &["1"])], HOST);
        let dest = "mirror.example.com/docker.io/library/nginx:1";
        assert!(catalog.contains_destination(dest));
        assert_eq!(
            catalog.get_by_destination(dest).map(|e| e.source_reference()),
            Some("docker.io/library/nginx:1".to_string())
        );
    }

    #[test]
    fn parse_multi_document_with_numeric_tags() {
        let yaml = "\
docker.io:
  images:
    nginx: [\"1.27\", latest]
---
quay.io:
  interval: 120
  images:
    prometheus/node-exporter:
      - 18
      - v1.8.2
";
        let declared = parse_documents(yaml, Path::new("inline.yml")).expect("parse");
        assert_eq!(declared.len(), 2);
        assert_eq!(declared[0].tags, vec!["1.27", "latest"]);
        assert_eq!(declared[1].interval, Some(120));
        assert_eq!(declared[1].tags, vec!["18", "v1.8.2"]);
    }

    #[test]
    fn parse_refuses_fractional_tags() {
        let yaml = "docker.io:\n  images:\n    python: [3.10, 1.20]\n";
        let err = parse_documents(yaml, Path::new("python.yml")).unwrap_err();
        match err {
            CatalogError::Malformed { key, message } => {
                assert_eq!(key, "docker.io/python");
                assert!(message.contains("quote tags"), "got: {message}");
            }
            other => panic!("expected Malformed, got {other}"),
        }
    }

    #[test]
    fn parse_keeps_quoted_fractional_tags() {
        let yaml = "docker.io:\n  images:\n    python: ['3.10', \"1.20\"]\n";
        let declared = parse_documents(yaml, Path::new("python.yml")).expect("parse");
        assert_eq!(declared[0].tags, vec!["3.10", "1.20"]);
    }

    #[test]
    fn parse_empty_document_yields_nothing() {
        let declared = parse_documents("---\n", Path::new("empty.yml")).expect("parse");
        assert!(declared.is_empty());
    }

    #[test]
    fn parse_rejects_non_list_tags() {
        let yaml = "docker.io:\n  images:\n    nginx: {latest: true}\n";
        let err = parse_documents(yaml, Path::new("bad.yml")).unwrap_err();
        assert!(matches!(err, CatalogError::Malformed { .. }), "got: {err}");
    }
}
