//! The flat, append-only collection of [`Node`]s that a resolve pass builds
//! up and a [`crate::graph::GraphBuilder`] pass later augments.

use std::io::Write;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::core::FpmError;
use crate::download::Downloader;
use crate::git::GitProvider;
use crate::manifest::Package;
use crate::node::{Node, Origin};
use crate::resolver::Resolver;

/// Default location fetched Git/registry packages are materialized under,
/// relative to the root project directory.
pub const DEFAULT_BUILD_DIR: &str = "build/dependencies";

/// The append-only dependency tree.
///
/// `nodes[0]` is always the root project (`Origin::Path(".")`); this
/// invariant is established by [`Tree::new`] and never broken — nodes are
/// appended, never removed or reordered.
pub struct Tree {
    pub nodes: Vec<Node>,
    pub build_dir: PathBuf,
    pub cache_path: Option<PathBuf>,
    pub verbosity: u8,
    pub output_sink: Box<dyn Write + Send>,
    pub config_override: Option<PathBuf>,
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("nodes", &self.nodes)
            .field("build_dir", &self.build_dir)
            .field("cache_path", &self.cache_path)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}

impl Tree {
    /// Creates a tree seeded only with the root node (`done = false`); the
    /// caller still needs to resolve it to load the root's own manifest.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        let mut root = Node::root();
        root.proj_dir = Some(root_dir.into());
        Self {
            nodes: vec![root],
            build_dir: PathBuf::from(DEFAULT_BUILD_DIR),
            cache_path: None,
            verbosity: 0,
            output_sink: Box::new(std::io::sink()),
            config_override: None,
        }
    }

    #[must_use]
    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = Some(path.into());
        self
    }

    /// The root project directory (`nodes[0].proj_dir`).
    pub fn root_dir(&self) -> &Path {
        self.nodes[0]
            .proj_dir
            .as_deref()
            .expect("root node always has a proj_dir")
    }

    /// Linear scan by name; `None` means absent. A fresh Rust rendering of
    /// the "sentinel distinguishable from any valid index" contract — see
    /// DESIGN.md for why this crate uses `Option<usize>` instead of the
    /// 1-based/0-as-sentinel scheme the source language needed.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// True iff every node has `done = true`.
    pub fn finished(&self) -> bool {
        self.nodes.iter().all(|n| n.done)
    }

    /// Implements the full `add` contract of spec.md §4.1: new names are
    /// appended; existing names are either left alone (a non-cached,
    /// manifest-declared duplicate) or reconciled against the
    /// cache-validity predicate (an overlay from a persisted cache).
    pub fn add(&mut self, incoming: Node) -> usize {
        if let Some(idx) = self.find(&incoming.name) {
            if incoming.cached {
                if cache_still_valid(&incoming, &self.nodes[idx]) {
                    let mut replacement = incoming;
                    replacement.update = false;
                    self.nodes[idx] = replacement;
                    tracing::debug!(name = %self.nodes[idx].name, "cache entry accepted");
                } else {
                    tracing::info!(name = %self.nodes[idx].name, "cache entry stale, will refetch");
                    self.nodes[idx].update = true;
                }
            }
            // Non-cached incoming node with an existing name: manifest
            // declarations have priority over transitive rediscovery, so the
            // stored entry is left untouched.
            idx
        } else {
            let mut node = incoming;
            node.update = false;
            self.nodes.push(node);
            self.nodes.len() - 1
        }
    }

    /// Sugar over [`Tree::add`] for a freshly declared (non-cached)
    /// dependency.
    pub fn add_dependency(
        &mut self,
        name: impl Into<String>,
        origin: Origin,
        requested_version: Option<Version>,
    ) -> usize {
        let mut node = Node::new(name, origin);
        node.requested_version = requested_version;
        self.add(node)
    }

    /// Expands a parsed manifest into declared dependencies and enqueues
    /// them, per spec.md §4.1: runtime dependencies always, dev/target
    /// dependencies only when `is_main`.
    ///
    /// `base_dir` is the directory the declaring package's own manifest
    /// lives in; `Origin::Path` entries are resolved against it immediately
    /// so that a path dependency declared deep in the tree (e.g. `C`
    /// declared by `A` as `../c`) resolves relative to `A`'s directory, not
    /// the tree root's.
    pub fn add_package(&mut self, package: &Package, base_dir: &Path, is_main: bool) -> Result<(), FpmError> {
        for (name, spec) in package.declared_dependencies(is_main) {
            let (mut origin, requested_version) = spec.resolve(name)?;
            if let Origin::Path { path } = &origin {
                let resolved = normalize(&base_dir.join(path));
                origin = Origin::Path {
                    path: resolved.to_string_lossy().into_owned(),
                };
            }
            self.add_dependency(name.to_string(), origin, requested_version);
        }
        Ok(())
    }

    /// Runs the resolver to a fixed point over every currently unresolved
    /// node.
    pub fn resolve(&mut self, git: &dyn GitProvider, downloader: &dyn Downloader) -> Result<(), FpmError> {
        Resolver::new(git, downloader, self.config_override.as_deref())?.resolve(self)
    }

    /// Re-fetches and re-resolves the subtree rooted at `name`.
    pub fn update(
        &mut self,
        name: &str,
        git: &dyn GitProvider,
        downloader: &dyn Downloader,
    ) -> Result<(), FpmError> {
        Resolver::new(git, downloader, self.config_override.as_deref())?.update(self, name)
    }

    /// Calls [`Tree::update`] for every node, in insertion order.
    pub fn update_all(&mut self, git: &dyn GitProvider, downloader: &dyn Downloader) -> Result<(), FpmError> {
        let names: Vec<String> = self.nodes.iter().map(|n| n.name.clone()).collect();
        let resolver = Resolver::new(git, downloader, self.config_override.as_deref())?;
        for name in names {
            resolver.update(self, &name)?;
        }
        Ok(())
    }

    /// Topological link order for `node_idx`: post-order DFS through
    /// `package_dep`, providers before consumers. See
    /// [`crate::graph::GraphBuilder::link_order`].
    pub fn link_order(&self, node_idx: usize) -> Result<Vec<usize>, FpmError> {
        crate::graph::GraphBuilder::link_order(self, node_idx)
    }

    /// Computes `package_dep` for every node by re-parsing each node's own
    /// manifest and closing over the tree's existing nodes.
    pub fn build_graph(&mut self) -> Result<(), FpmError> {
        crate::graph::GraphBuilder::fill_package_deps(self)
    }

    /// Serializes the tree to `sink` in the cache's tabular TOML format.
    pub fn dump_cache(&self, sink: impl Write) -> Result<(), FpmError> {
        crate::cache_codec::dump(self, sink)
    }

    /// Loads a tree from a prior cache dump. Per the design notes, this
    /// should only be called on a freshly constructed, otherwise-empty
    /// tree — `load_cache` replaces wholesale, it does not merge.
    pub fn load_cache(source: impl std::io::Read) -> Result<Self, FpmError> {
        crate::cache_codec::load(source)
    }
}

/// Lexically collapses `.`/`..` components without touching the
/// filesystem, so joined dependency paths stay readable (`root/a/../c`
/// becomes `root/c`) instead of accumulating `..` segments across levels of
/// nesting.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                if !matches!(out.components().next_back(), Some(std::path::Component::RootDir) | None) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// The cache-validity predicate of spec.md §4.1.1: is a cached node `cached`
/// still valid against the freshly manifest-declared node `declared` of the
/// same name?
pub(crate) fn cache_still_valid(cached: &Node, declared: &Node) -> bool {
    if cached.origin != declared.origin {
        return false;
    }
    if cached.preprocess_config != declared.preprocess_config {
        return false;
    }
    log_presence_change("resolved_version", &cached.resolved_version, &declared.resolved_version);
    if let (Some(a), Some(b)) = (&cached.resolved_version, &declared.resolved_version)
        && a != b
    {
        return false;
    }
    log_presence_change("revision", &cached.revision, &declared.revision);
    if let (Some(a), Some(b)) = (&cached.revision, &declared.revision)
        && a != b
    {
        return false;
    }
    log_presence_change("proj_dir", &cached.proj_dir, &declared.proj_dir);
    if let (Some(a), Some(b)) = (&cached.proj_dir, &declared.proj_dir)
        && a != b
    {
        return false;
    }
    true
}

fn log_presence_change<T>(field: &str, cached: &Option<T>, declared: &Option<T>) {
    if cached.is_some() != declared.is_some() {
        tracing::debug!(field, "cache/manifest presence differs, not by itself invalidating");
    }
}
