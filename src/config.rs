//! Global, user-wide registry settings.
//!
//! Loaded once per `resolve()` call and threaded through by value, mirroring
//! the teacher crate's `GlobalConfig`: a small TOML file at a
//! platform-appropriate location, never failing to load just because the
//! file is absent (defaults apply instead).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::FpmError;

/// `registry.path` / `registry.url` / `registry.cache_path` from the global
/// settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Local filesystem registry root, if configured. Takes priority over
    /// `url` per spec.md §4.2.1.
    pub path: Option<PathBuf>,
    /// Remote registry base URL, used when `path` is unset.
    #[serde(default = "default_registry_url")]
    pub url: String,
    /// Root directory for downloaded-package caching.
    pub cache_path: Option<PathBuf>,
}

fn default_registry_url() -> String {
    "https://fpm-registry.example.com".to_string()
}

/// Top-level global settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub registry: RegistrySettings,
}

impl GlobalSettings {
    /// Loads settings from `override_path` if given, else the default
    /// platform config location, else built-in defaults if neither file
    /// exists.
    pub fn load(override_path: Option<&Path>) -> Result<Self, FpmError> {
        let path = match override_path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(FpmError::io(path, e)),
        }
    }

    fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("fpm")
            .join("config.toml")
    }

    /// The resolved user download cache root, falling back to the platform
    /// cache directory under a `fpm` subdirectory.
    pub fn resolved_cache_path(&self) -> PathBuf {
        self.registry
            .cache_path
            .clone()
            .unwrap_or_else(|| dirs::cache_dir().unwrap_or_else(std::env::temp_dir).join("fpm"))
    }
}
