//! A single resolved dependency.
//!
//! A [`Node`] is the unit the [`crate::tree::Tree`] accumulates: one package
//! participating in the build, identified by name, located by its [`Origin`],
//! and — once the resolver has visited it — pinned to a resolved version,
//! revision, and local directory.

use std::collections::BTreeSet;
use std::path::PathBuf;

use semver::Version;
use serde::{Deserialize, Serialize};

/// How a package's sources are located.
///
/// Exactly one variant is ever present on a [`Node`]; this is the
/// "polymorphic origin" the design notes ask for: a tagged variant instead
/// of a grab-bag of optional fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// A local directory, resolved relative to the enclosing project root.
    Path { path: String },
    /// A version-controlled Git repository.
    Git { url: String, reference: GitReference },
    /// Coordinates into a package registry.
    Registry {
        namespace: String,
        name: String,
        requested_version: Option<String>,
    },
}

impl Origin {
    /// The origin of the always-present root node: the current directory.
    pub fn root() -> Self {
        Origin::Path {
            path: ".".to_string(),
        }
    }

    /// True if this is the `Path(".")` root origin.
    pub fn is_root(&self) -> bool {
        matches!(self, Origin::Path { path } if path == ".")
    }
}

/// Which Git ref a [`Origin::Git`] dependency should check out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitReference {
    /// The repository's default branch.
    Default,
    Branch(String),
    Tag(String),
    Revision(String),
}

impl GitReference {
    /// The literal ref-spec passed to `git checkout`.
    pub fn as_refspec(&self) -> &str {
        match self {
            GitReference::Default => "HEAD",
            GitReference::Branch(s) | GitReference::Tag(s) | GitReference::Revision(s) => s,
        }
    }
}

/// One resolved dependency.
///
/// See the module docs for the role this plays in the tree. Fields beyond
/// `name` and `origin` are populated progressively as the resolver visits
/// the node; most start `None`/`false` and are never unset except by
/// [`crate::tree::Tree::update`] re-queuing the node for refetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub origin: Origin,

    /// Version constraint from the declaring manifest.
    pub requested_version: Option<Version>,
    /// Version parsed from the fetched package's own manifest.
    pub resolved_version: Option<Version>,
    /// Local directory the fetched package resides in.
    pub proj_dir: Option<PathBuf>,
    /// For `Git` origins, the checked-out commit after fetch.
    pub revision: Option<String>,

    /// Resolution is complete for this node.
    pub done: bool,
    /// The local copy must be re-fetched on the next resolve pass.
    pub update: bool,
    /// This node was loaded from the persisted cache, not discovered via manifest.
    pub cached: bool,

    /// Transitive closure (by name) of required package names. Filled by
    /// [`crate::graph::GraphBuilder`]; empty until then.
    pub package_dep: BTreeSet<String>,

    /// Opaque `[[preprocess]]` manifest content, compared verbatim for
    /// cache validity but otherwise unused by this core.
    pub preprocess_config: Option<toml::Value>,
}

impl Node {
    /// Builds a fresh, unresolved node for the given name and origin.
    ///
    /// `requested_version` should be set for `Registry` origins that pin a
    /// version and is otherwise typically `None`; it is independent of
    /// `origin` so the same constructor works for all three origin kinds.
    pub fn new(name: impl Into<String>, origin: Origin) -> Self {
        Self {
            name: name.into(),
            origin,
            requested_version: None,
            resolved_version: None,
            proj_dir: None,
            revision: None,
            done: false,
            update: false,
            cached: false,
            package_dep: BTreeSet::new(),
            preprocess_config: None,
        }
    }

    /// The always-present root node: `Path(".")`, already `done` once the
    /// resolver has loaded its own manifest (the caller marks it).
    pub fn root() -> Self {
        Self::new("root", Origin::root())
    }

    /// Builder-style setter for a requested version constraint.
    #[must_use]
    pub fn with_requested_version(mut self, version: Version) -> Self {
        self.requested_version = Some(version);
        self
    }
}
