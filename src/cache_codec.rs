//! TOML tabular persistence for a [`Tree`] (spec.md §4.5).
//!
//! The whole tree round-trips through one TOML document: a handful of
//! top-level scalars describing the build, and a `[dependencies]` table
//! keyed by node name holding one sub-table per node. `load` replaces a
//! tree wholesale — it is not a merge — so callers should only call it on
//! a freshly constructed tree, before any `add`/`resolve` calls populate it
//! from manifests (see [`Tree::load_cache`]).

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::FpmError;
use crate::node::{GitReference, Node, Origin};
use crate::tree::Tree;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    unit: String,
    verbosity: u8,
    #[serde(rename = "dep-dir")]
    dep_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<String>,
    ndep: usize,
    dependencies: BTreeMap<String, CacheEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    index: usize,
    origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(rename = "git-ref-kind", skip_serializing_if = "Option::is_none")]
    git_ref_kind: Option<String>,
    #[serde(rename = "git-ref", skip_serializing_if = "Option::is_none")]
    git_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(rename = "registry-name", skip_serializing_if = "Option::is_none")]
    registry_name: Option<String>,
    #[serde(rename = "requested-version", skip_serializing_if = "Option::is_none")]
    requested_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(rename = "proj-dir", skip_serializing_if = "Option::is_none")]
    proj_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    revision: Option<String>,
    done: bool,
    update: bool,
    cached: bool,
    #[serde(rename = "package-dep")]
    package_dep: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preprocess: Option<toml::Value>,
}

/// Serializes `tree` as the tabular TOML cache format.
pub fn dump(tree: &Tree, mut sink: impl Write) -> Result<(), FpmError> {
    let mut dependencies = BTreeMap::new();
    for (idx, node) in tree.nodes.iter().enumerate() {
        let key = if node.name.is_empty() {
            format!("UNNAMED_DEPENDENCY_{idx}")
        } else {
            node.name.clone()
        };
        let mut entry = to_entry(node);
        entry.index = idx;
        dependencies.insert(key, entry);
    }

    let file = CacheFile {
        unit: tree.nodes[0].name.clone(),
        verbosity: tree.verbosity,
        dep_dir: to_toml_path(&tree.build_dir),
        cache: tree.cache_path.as_ref().map(|p| to_toml_path(p)),
        ndep: tree.nodes.len().saturating_sub(1),
        dependencies,
    };

    let text = toml::to_string_pretty(&file).map_err(FpmError::TomlSerError)?;
    sink.write_all(text.as_bytes()).map_err(FpmError::Io)?;
    Ok(())
}

/// Parses a tree wholesale from a prior [`dump`]. Never partially applies a
/// malformed document — parse failure surfaces as [`FpmError::CacheParseError`]
/// with no change to the caller's state (the caller still has whatever
/// [`Tree`] it had before calling this).
pub fn load(mut source: impl Read) -> Result<Tree, FpmError> {
    let mut text = String::new();
    source.read_to_string(&mut text).map_err(FpmError::Io)?;

    let file: CacheFile = toml::from_str(&text).map_err(|source| FpmError::CacheParseError {
        path: PathBuf::from("<cache>"),
        source,
    })?;

    let mut indexed = Vec::with_capacity(file.dependencies.len());
    for (key, entry) in &file.dependencies {
        let mut node = from_entry(key, entry)?;
        if key == &file.unit {
            node.name = file.unit.clone();
        }
        indexed.push((entry.index, node));
    }
    // `file.dependencies` is a `BTreeMap` and iterates in alphabetical key
    // order, not the original tree's node order — each entry's own `index`
    // field (stamped by `dump`) is the only thing that preserves it.
    indexed.sort_by_key(|(index, _)| *index);
    let mut nodes: Vec<Node> = indexed.into_iter().map(|(_, node)| node).collect();
    if nodes.is_empty() || !nodes[0].origin.is_root() {
        let root_pos = nodes.iter().position(|n| n.origin.is_root());
        match root_pos {
            Some(pos) => {
                let root = nodes.remove(pos);
                nodes.insert(0, root);
            }
            None => nodes.insert(0, Node::root()),
        }
    }

    Ok(Tree {
        nodes,
        build_dir: PathBuf::from(file.dep_dir),
        cache_path: file.cache.map(PathBuf::from),
        verbosity: file.verbosity,
        output_sink: Box::new(std::io::sink()),
        config_override: None,
    })
}

fn to_toml_path(path: &std::path::Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn to_entry(node: &Node) -> CacheEntry {
    let (origin, path, url, git_ref_kind, git_ref, namespace, registry_name, registry_requested) =
        match &node.origin {
            Origin::Path { path } => ("path".to_string(), Some(path.clone()), None, None, None, None, None, None),
            Origin::Git { url, reference } => {
                let (kind, value) = match reference {
                    GitReference::Default => ("default".to_string(), None),
                    GitReference::Branch(b) => ("branch".to_string(), Some(b.clone())),
                    GitReference::Tag(t) => ("tag".to_string(), Some(t.clone())),
                    GitReference::Revision(r) => ("revision".to_string(), Some(r.clone())),
                };
                ("git".to_string(), None, Some(url.clone()), Some(kind), value, None, None, None)
            }
            Origin::Registry {
                namespace,
                name,
                requested_version,
            } => (
                "registry".to_string(),
                None,
                None,
                None,
                None,
                Some(namespace.clone()),
                Some(name.clone()),
                requested_version.clone(),
            ),
        };

    CacheEntry {
        index: 0,
        origin,
        path,
        url,
        git_ref_kind,
        git_ref,
        namespace,
        registry_name,
        requested_version: node
            .requested_version
            .as_ref()
            .map(|v| v.to_string())
            .or(registry_requested),
        version: node.resolved_version.as_ref().map(Version::to_string),
        proj_dir: node.proj_dir.as_deref().map(to_toml_path),
        revision: node.revision.clone(),
        done: node.done,
        update: node.update,
        cached: node.cached,
        package_dep: node.package_dep.iter().cloned().collect(),
        preprocess: node.preprocess_config.clone(),
    }
}

fn from_entry(name: &str, entry: &CacheEntry) -> Result<Node, FpmError> {
    let origin = match entry.origin.as_str() {
        "path" => Origin::Path {
            path: entry.path.clone().unwrap_or_default(),
        },
        "git" => {
            let url = entry.url.clone().unwrap_or_default();
            let reference = match entry.git_ref_kind.as_deref() {
                Some("branch") => GitReference::Branch(entry.git_ref.clone().unwrap_or_default()),
                Some("tag") => GitReference::Tag(entry.git_ref.clone().unwrap_or_default()),
                Some("revision") => GitReference::Revision(entry.git_ref.clone().unwrap_or_default()),
                _ => GitReference::Default,
            };
            Origin::Git { url, reference }
        }
        _ => Origin::Registry {
            namespace: entry.namespace.clone().unwrap_or_default(),
            name: entry.registry_name.clone().unwrap_or_default(),
            requested_version: entry.requested_version.clone(),
        },
    };

    let requested_version = match &origin {
        Origin::Registry { .. } => None,
        _ => entry
            .requested_version
            .as_deref()
            .map(|v| Version::parse(v))
            .transpose()
            .map_err(|source| FpmError::VersionParse {
                version: entry.requested_version.clone().unwrap_or_default(),
                source,
            })?,
    };
    let resolved_version = entry
        .version
        .as_deref()
        .map(Version::parse)
        .transpose()
        .map_err(|source| FpmError::VersionParse {
            version: entry.version.clone().unwrap_or_default(),
            source,
        })?;

    let mut node = Node::new(name, origin);
    node.requested_version = requested_version;
    node.resolved_version = resolved_version;
    node.proj_dir = entry.proj_dir.clone().map(PathBuf::from);
    node.revision = entry.revision.clone();
    node.done = entry.done;
    node.update = entry.update;
    node.cached = true;
    node.package_dep = entry.package_dep.iter().cloned().collect();
    node.preprocess_config = entry.preprocess.clone();
    Ok(node)
}
