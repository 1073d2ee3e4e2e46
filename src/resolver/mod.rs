//! Breadth-first fixed-point resolution over a [`Tree`] whose edges are
//! only discovered by fetching and parsing manifests.
//!
//! See spec.md §4.2 for the algorithm this module implements; registry
//! acquisition (§4.2.1) lives in [`registry`].

pub mod registry;

use std::path::PathBuf;

use crate::config::GlobalSettings;
use crate::core::FpmError;
use crate::download::Downloader;
use crate::git::GitProvider;
use crate::node::Origin;
use crate::tree::Tree;

/// Drives a [`Tree`] to a fixed point using injected Git and downloader
/// collaborators, per the "downloader injection" design note.
pub struct Resolver<'a> {
    git: &'a dyn GitProvider,
    downloader: &'a dyn Downloader,
    settings: GlobalSettings,
}

impl<'a> Resolver<'a> {
    pub fn new(
        git: &'a dyn GitProvider,
        downloader: &'a dyn Downloader,
        config_override: Option<&std::path::Path>,
    ) -> Result<Self, FpmError> {
        Ok(Self {
            git,
            downloader,
            settings: GlobalSettings::load(config_override)?,
        })
    }

    /// Runs `resolve_one` over every unresolved node until `tree.finished()`.
    ///
    /// Per spec.md §3's Lifecycle (`seed root → resolve root → enqueue deps
    /// → overlay cache entries → fixed-point loop`), the root is resolved
    /// first so its manifest's direct dependencies are enqueued, any
    /// persisted cache at `tree.cache_path` is then overlaid on top of that
    /// freshly-discovered set via [`Tree::add`]'s reconciliation contract,
    /// and only then does the general sweep run.
    ///
    /// The tree only grows and each pass marks at least one more node
    /// `done`, so this terminates; a safety bound surfaces bugs (an
    /// accidental infinite-growth loop) as [`FpmError::FixedPointDiverged`]
    /// instead of hanging.
    pub fn resolve(&self, tree: &mut Tree) -> Result<(), FpmError> {
        if !tree.nodes[0].done {
            self.resolve_one(tree, 0)?;
        }
        self.overlay_cache(tree)?;

        let safety_bound = tree.nodes.len().max(4) * 8 + 32;
        let mut pass = 0usize;
        while !tree.finished() {
            pass += 1;
            if pass > safety_bound {
                return Err(FpmError::FixedPointDiverged { iterations: pass });
            }
            let pending: Vec<usize> =
                (0..tree.nodes.len()).filter(|&i| !tree.nodes[i].done).collect();
            for idx in pending {
                self.resolve_one(tree, idx)?;
            }
        }
        Ok(())
    }

    /// Merges the tree persisted at `tree.cache_path`, if any, into `tree`
    /// via [`Tree::add`]: each non-root cached node either overlays a
    /// matching freshly-declared entry (accepted or marked `update`, per
    /// [`crate::tree::cache_still_valid`]) or is appended as a node the
    /// fixed-point loop has not reached yet. A missing cache file is not an
    /// error — there is simply nothing to reconcile on a first resolve.
    fn overlay_cache(&self, tree: &mut Tree) -> Result<(), FpmError> {
        let Some(cache_path) = tree.cache_path.clone() else {
            return Ok(());
        };
        let file = match std::fs::File::open(&cache_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(FpmError::io(&cache_path, e)),
        };
        let cached_tree = crate::cache_codec::load(file)?;
        for node in cached_tree.nodes.into_iter().filter(|n| !n.origin.is_root()) {
            tree.add(node);
        }
        Ok(())
    }

    fn resolve_one(&self, tree: &mut Tree, idx: usize) -> Result<(), FpmError> {
        if tree.nodes[idx].done {
            return Ok(());
        }
        let is_root = idx == 0;
        let name = tree.nodes[idx].name.clone();
        let origin = tree.nodes[idx].origin.clone();

        let proj_dir: PathBuf = match &origin {
            Origin::Path { path } => {
                if is_root {
                    // The root's own origin is the literal placeholder
                    // `Path(".")` — its real directory is whatever the
                    // caller passed to `Tree::new`, already stored here.
                    tree.nodes[idx]
                        .proj_dir
                        .clone()
                        .expect("root node always has a proj_dir")
                } else {
                    PathBuf::from(path)
                }
            }
            Origin::Git { url, reference } => {
                let dir = tree.build_dir.join(&name);
                let already_fetched = dir.join(".git").exists();
                if !already_fetched || tree.nodes[idx].update {
                    self.git.checkout(&dir, url, reference)?;
                }
                let revision = self.git.current_revision(&dir)?;
                tree.nodes[idx].revision = Some(revision);
                dir
            }
            Origin::Registry {
                namespace,
                name: pkg_name,
                requested_version,
            } => registry::acquire(
                self.downloader,
                &self.settings,
                namespace,
                pkg_name,
                requested_version.as_deref(),
            )?,
        };

        let manifest_path = proj_dir.join("fpm.toml");
        let package = crate::manifest::read_manifest(&manifest_path)?;

        if is_root {
            tree.nodes[idx].name = package.name.clone();
        } else if package.name != name {
            return Err(FpmError::ManifestMismatch {
                expected: name.clone(),
                found: package.name.clone(),
                proj_dir,
            });
        }

        tree.nodes[idx].resolved_version = package.version.clone();
        tree.nodes[idx].proj_dir = Some(proj_dir.clone());
        tree.nodes[idx].preprocess_config = if package.preprocess.is_empty() {
            None
        } else {
            Some(toml::Value::Array(package.preprocess.clone()))
        };

        tree.add_package(&package, &proj_dir, is_root)?;

        tree.nodes[idx].done = true;
        tree.nodes[idx].update = false;
        Ok(())
    }

    /// `update(name)` of spec.md §4.3: Git-origin nodes flagged `update`
    /// are re-checked-out and re-enter resolution; other origins are
    /// no-ops.
    pub fn update(&self, tree: &mut Tree, name: &str) -> Result<(), FpmError> {
        let idx = tree
            .find(name)
            .ok_or_else(|| FpmError::UpdateUnknown { name: name.to_string() })?;

        let is_git = matches!(tree.nodes[idx].origin, Origin::Git { .. });
        if is_git && tree.nodes[idx].update {
            tree.nodes[idx].done = false;
            self.resolve(tree)?;
        }
        Ok(())
    }
}
