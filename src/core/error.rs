//! Error types for the dependency resolution core.
//!
//! A single enum carries every failure mode this crate can produce. Each
//! variant corresponds to one row of the error table in the resolution
//! core's specification; callers that need to branch on failure kind match
//! on the variant rather than parsing a message.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the resolver, tree, graph builder, and cache codec.
#[derive(Debug, Error)]
pub enum FpmError {
    /// The fetched package's manifest name did not match the declaring node's name.
    #[error("manifest mismatch: expected package '{expected}', found '{found}' in {proj_dir}")]
    ManifestMismatch {
        expected: String,
        found: String,
        proj_dir: PathBuf,
    },

    /// `update(name)` was called with a name absent from the tree.
    #[error("cannot update unknown dependency '{name}'")]
    UpdateUnknown { name: String },

    /// The registry JSON response was missing a required field.
    #[error("registry response for '{namespace}/{name}' is missing required field '{field}'")]
    RegistryMissingField {
        namespace: String,
        name: String,
        field: String,
    },

    /// The registry responded with a non-200 `code`.
    #[error("registry error for '{namespace}/{name}': {message}")]
    RegistryHttpError {
        namespace: String,
        name: String,
        message: String,
    },

    /// A version string could not be parsed as semver.
    #[error("invalid version string '{version}': {source}")]
    VersionParse {
        version: String,
        #[source]
        source: semver::Error,
    },

    /// The requested version directory or manifest was missing under a local registry.
    #[error("local registry has no version '{version}' for package '{namespace}/{name}'")]
    LocalRegistryMiss {
        namespace: String,
        name: String,
        version: String,
    },

    /// A local registry directory had no version subdirectories for a package.
    #[error("local registry has no versions at all for package '{namespace}/{name}'")]
    NoVersions { namespace: String, name: String },

    /// `link_order` was called with an out-of-range node index.
    #[error("package graph failed: invalid node id {id}")]
    GraphInvalidId { id: usize },

    /// A `package_dep` name did not resolve to any node in the tree.
    #[error("package graph failed: dependency '{name}' referenced by '{from}' is not in the tree")]
    GraphMissingDep { from: String, name: String },

    /// The `package_dep` fixed point did not converge within the iteration bound.
    #[error("package dependency fixed point did not converge after {iterations} iterations")]
    FixedPointDiverged { iterations: usize },

    /// The persisted cache file was malformed.
    #[error("failed to parse cache file {path}: {source}")]
    CacheParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A temporary file could not be created for a download.
    #[error("could not create temporary file for download: {0}")]
    TempFile(#[source] std::io::Error),

    /// Wraps a git subprocess failure.
    #[error("git {operation} failed: {reason}")]
    GitCommandError { operation: String, reason: String },

    /// Wraps a transport-level failure from the downloader.
    #[error("download failed: {0}")]
    DownloadError(String),

    /// A filesystem operation failed outside the more specific variants above.
    #[error("filesystem error at {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML document failed to parse or serialize.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML document failed to serialize.
    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// HTTP transport error surfaced directly from `reqwest`.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Any other I/O error not tied to a specific path.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FpmError {
    /// Wraps an [`std::io::Error`] with the path that triggered it.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }
}
