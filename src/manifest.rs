//! Reading a package's own `fpm.toml` manifest.
//!
//! The resolver treats manifest *parsing* as a service with a narrow
//! interface ([`read_manifest`]); this module owns the glue that turns the
//! TOML document into the `Package` shape the resolver and graph builder
//! consume, per the teacher crate's pattern of owning its own TOML
//! deserialization types rather than exposing `toml::Value` directly.

use std::collections::BTreeMap;
use std::path::Path;

use semver::Version;
use serde::Deserialize;

use crate::core::FpmError;
use crate::node::{GitReference, Origin};

/// The manifest's own declared name, version, and dependency sections.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub version: Option<Version>,
    pub dependency: Vec<(String, DependencySpec)>,
    pub dev_dependency: Vec<(String, DependencySpec)>,
    pub executable: Vec<Target>,
    pub example: Vec<Target>,
    pub test: Vec<Target>,
    /// Opaque `[[preprocess]]` entries, compared verbatim for cache validity.
    pub preprocess: Vec<toml::Value>,
}

/// One `[[executable]]`/`[[example]]`/`[[test]]` entry and its own
/// dependency table, which is merged into the main set when `is_main` is
/// true.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub dependency: Vec<(String, DependencySpec)>,
}

impl Package {
    /// Declared dependencies to enqueue, per spec.md §4.1: runtime
    /// dependencies always; dev and per-target dependencies only when this
    /// package is the tree's own root (`is_main`).
    pub fn declared_dependencies(&self, is_main: bool) -> Vec<(&str, &DependencySpec)> {
        let mut out: Vec<(&str, &DependencySpec)> =
            self.dependency.iter().map(|(n, d)| (n.as_str(), d)).collect();
        if is_main {
            out.extend(self.dev_dependency.iter().map(|(n, d)| (n.as_str(), d)));
            for target in self.executable.iter().chain(&self.example).chain(&self.test) {
                out.extend(target.dependency.iter().map(|(n, d)| (n.as_str(), d)));
            }
        }
        out
    }
}

/// A single declared dependency, in either shorthand or detailed form.
///
/// ```toml
/// [dependencies]
/// a = "./a"                                              # Simple: path shorthand
/// b = { git = "https://example.com/b.git", branch = "main" }
/// c = { namespace = "ns", name = "pkg", version = "2.0.0" }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// A bare string is always a relative path.
    Simple(String),
    Detailed(Box<DetailedDependencySpec>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailedDependencySpec {
    pub path: Option<String>,
    pub git: Option<String>,
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub rev: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl DependencySpec {
    /// Converts the declared spec into the `(Origin, requested_version)`
    /// pair a [`crate::node::Node`] stores, given the name under which it
    /// was declared (used for registry coordinates that omit `name`).
    pub fn resolve(&self, declared_as: &str) -> Result<(Origin, Option<Version>), FpmError> {
        match self {
            DependencySpec::Simple(path) => Ok((
                Origin::Path {
                    path: path.clone(),
                },
                None,
            )),
            DependencySpec::Detailed(d) => {
                if let Some(path) = &d.path {
                    return Ok((
                        Origin::Path {
                            path: path.clone(),
                        },
                        None,
                    ));
                }
                if let Some(url) = &d.git {
                    let reference = if let Some(rev) = &d.rev {
                        GitReference::Revision(rev.clone())
                    } else if let Some(tag) = &d.tag {
                        GitReference::Tag(tag.clone())
                    } else if let Some(branch) = &d.branch {
                        GitReference::Branch(branch.clone())
                    } else {
                        GitReference::Default
                    };
                    return Ok((
                        Origin::Git {
                            url: url.clone(),
                            reference,
                        },
                        None,
                    ));
                }
                let namespace = d.namespace.clone().unwrap_or_default();
                let name = d.name.clone().unwrap_or_else(|| declared_as.to_string());
                let requested_version = d
                    .version
                    .as_deref()
                    .map(|v| Version::parse(v.trim_start_matches('v')))
                    .transpose()
                    .map_err(|source| FpmError::VersionParse {
                        version: d.version.clone().unwrap_or_default(),
                        source,
                    })?;
                Ok((
                    Origin::Registry {
                        namespace,
                        name,
                        requested_version: d.version.clone(),
                    },
                    requested_version,
                ))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    package: RawPackage,
    #[serde(default, rename = "dependencies")]
    dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default)]
    executable: Vec<RawTarget>,
    #[serde(default)]
    example: Vec<RawTarget>,
    #[serde(default)]
    test: Vec<RawTarget>,
    #[serde(default)]
    preprocess: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    name: String,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    name: String,
    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,
}

/// Reads and parses the `fpm.toml` manifest at `path`.
///
/// This is the "manifest interface consumed" of spec.md §6, implemented
/// directly rather than left as a stub: the resolver needs real name/version
/// comparison, not a mock.
pub fn read_manifest(path: &Path) -> Result<Package, FpmError> {
    let text = std::fs::read_to_string(path).map_err(|e| FpmError::io(path, e))?;
    let raw: RawManifest = toml::from_str(&text)?;

    let version = raw
        .package
        .version
        .as_deref()
        .map(|v| Version::parse(v.trim_start_matches('v')))
        .transpose()
        .map_err(|source| FpmError::VersionParse {
            version: raw.package.version.clone().unwrap_or_default(),
            source,
        })?;

    Ok(Package {
        name: raw.package.name,
        version,
        dependency: raw.dependencies.into_iter().collect(),
        dev_dependency: raw.dev_dependencies.into_iter().collect(),
        executable: raw.executable.into_iter().map(Target::from).collect(),
        example: raw.example.into_iter().map(Target::from).collect(),
        test: raw.test.into_iter().map(Target::from).collect(),
        preprocess: raw.preprocess,
    })
}

impl From<RawTarget> for Target {
    fn from(raw: RawTarget) -> Self {
        Target {
            name: raw.name,
            dependency: raw.dependencies.into_iter().collect(),
        }
    }
}
