//! fpm-resolve - dependency resolution core for a compiled-language package manager
//!
//! A synchronous, single-threaded library that takes a root project
//! directory, discovers its transitive dependency tree by parsing `fpm.toml`
//! manifests and fetching whatever they reference (local paths, Git
//! repositories, or registry packages), and produces a resolved [`Tree`]
//! together with the transitive requirement sets and link order a build
//! step needs.
//!
//! # Architecture
//!
//! - A manifest (`fpm.toml`) declares runtime, dev, and per-target
//!   dependencies; parsing it never touches the network.
//! - [`Tree`] is the flat, append-only collection of [`Node`]s the resolver
//!   builds up; `nodes[0]` is always the root project.
//! - [`Resolver`] drives the tree to a fixed point: fetch whatever is
//!   unresolved, parse its manifest, enqueue what it declares, repeat until
//!   nothing is left to fetch.
//! - [`graph::GraphBuilder`] runs once resolution has converged, filling in
//!   each node's transitive `package_dep` closure and computing the
//!   post-order link sequence a linker would need.
//! - [`cache_codec`] persists and restores a whole [`Tree`] as a TOML
//!   document, so a second run can skip re-fetching anything still valid.
//!
//! # Core Modules
//!
//! - [`core`] - the crate's error type and shared `Result` alias
//! - [`node`] - [`Node`] and its [`Origin`]/[`GitReference`] variants
//! - [`manifest`] - `fpm.toml` parsing
//! - [`git`] - the [`git::GitProvider`] trait and its system-git implementation
//! - [`download`] - the [`download::Downloader`] trait and its HTTP implementation
//! - [`config`] - global settings (registry location, cache directory)
//! - [`tree`] - the [`Tree`] itself and the cache-validity predicate
//! - [`resolver`] - the fixed-point resolution loop and registry acquisition
//! - [`graph`] - transitive dependency closure and link order
//! - [`cache_codec`] - TOML persistence for a resolved [`Tree`]
//!
//! # Example
//!
//! ```no_run
//! use fpm_resolve::{Tree, git::SystemGit, download::HttpDownloader};
//!
//! let git = SystemGit;
//! let downloader = HttpDownloader::default();
//! let mut tree = Tree::new("/path/to/project");
//! tree.resolve(&git, &downloader)?;
//! tree.build_graph()?;
//! let order = tree.link_order(0)?;
//! # Ok::<(), fpm_resolve::FpmError>(())
//! ```

pub mod cache_codec;
pub mod config;
pub mod core;
pub mod download;
pub mod git;
pub mod graph;
pub mod manifest;
pub mod node;
pub mod resolver;
pub mod tree;

pub use core::FpmError;
pub use node::{GitReference, Node, Origin};
pub use resolver::Resolver;
pub use tree::Tree;
