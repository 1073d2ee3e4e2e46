//! Registry acquisition protocol of spec.md §4.2.1: local registry path,
//! remote registry with download cache, or a download-cache hit.

use std::path::{Path, PathBuf};

use semver::Version;

use crate::config::GlobalSettings;
use crate::core::FpmError;
use crate::download::Downloader;

/// Locates (fetching if necessary) the local directory containing
/// `namespace/name`'s manifest, at `requested_version` if given, else the
/// latest available version.
pub fn acquire(
    downloader: &dyn Downloader,
    settings: &GlobalSettings,
    namespace: &str,
    name: &str,
    requested_version: Option<&str>,
) -> Result<PathBuf, FpmError> {
    if let Some(registry_root) = &settings.registry.path {
        return acquire_local(registry_root, namespace, name, requested_version);
    }
    acquire_remote(downloader, settings, namespace, name, requested_version)
}

fn acquire_local(
    registry_root: &Path,
    namespace: &str,
    name: &str,
    requested_version: Option<&str>,
) -> Result<PathBuf, FpmError> {
    let pkg_dir = registry_root.join(namespace).join(name);

    if let Some(version) = requested_version {
        let version_dir = pkg_dir.join(version);
        if !version_dir.join("fpm.toml").exists() {
            return Err(FpmError::LocalRegistryMiss {
                namespace: namespace.to_string(),
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        return Ok(version_dir);
    }

    let entries = std::fs::read_dir(&pkg_dir).map_err(|e| FpmError::io(&pkg_dir, e))?;
    let mut versions: Vec<(Version, PathBuf)> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FpmError::io(&pkg_dir, e))?;
        let Ok(file_name) = entry.file_name().into_string() else {
            continue;
        };
        if let Ok(version) = Version::parse(file_name.trim_start_matches('v')) {
            versions.push((version, entry.path()));
        }
    }

    let (best_version, best_dir) = versions
        .into_iter()
        .max_by(|a, b| a.0.cmp(&b.0))
        .ok_or_else(|| FpmError::NoVersions {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;

    if !best_dir.join("fpm.toml").exists() {
        return Err(FpmError::LocalRegistryMiss {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: best_version.to_string(),
        });
    }
    Ok(best_dir)
}

fn acquire_remote(
    downloader: &dyn Downloader,
    settings: &GlobalSettings,
    namespace: &str,
    name: &str,
    requested_version: Option<&str>,
) -> Result<PathBuf, FpmError> {
    let cache_root = settings.resolved_cache_path().join(namespace).join(name);

    if let Some(version) = requested_version
        && cache_root.join(version).join("fpm.toml").exists()
    {
        tracing::debug!(namespace, name, version, "download cache hit");
        return Ok(cache_root.join(version));
    }

    let query_url = format!("{}/packages/{namespace}/{name}", settings.registry.url.trim_end_matches('/'));
    let tmp = tempfile::NamedTempFile::new().map_err(FpmError::TempFile)?;
    let body = downloader.get_pkg_data(&query_url, requested_version, tmp.path())?;

    let missing = |field: &str| FpmError::RegistryMissingField {
        namespace: namespace.to_string(),
        name: name.to_string(),
        field: field.to_string(),
    };

    let code = body.get("code").and_then(|v| v.as_i64()).ok_or_else(|| missing("code"))?;
    if code != 200 {
        let message = body
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("message"))?;
        return Err(FpmError::RegistryHttpError {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.to_string(),
        });
    }

    let data = body.get("data").ok_or_else(|| missing("data"))?;
    let version_key = if requested_version.is_some() {
        "version_data"
    } else {
        "latest_version_data"
    };
    let version_data = data.get(version_key).ok_or_else(|| missing(version_key))?;

    let download_url = version_data
        .get("download_url")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing("download_url"))?;
    let version_str = version_data
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| missing("version"))?;
    let version = Version::parse(version_str.trim_start_matches('v')).map_err(|source| FpmError::VersionParse {
        version: version_str.to_string(),
        source,
    })?;

    let final_cache = cache_root.join(version.to_string());
    if !final_cache.join("fpm.toml").exists() {
        if final_cache.exists() {
            std::fs::remove_dir_all(&final_cache).map_err(|e| FpmError::io(&final_cache, e))?;
        }
        std::fs::create_dir_all(&final_cache).map_err(|e| FpmError::io(&final_cache, e))?;

        let archive_tmp = tempfile::NamedTempFile::new().map_err(FpmError::TempFile)?;
        downloader.get_file(download_url, archive_tmp.path())?;
        downloader.unpack(archive_tmp.path(), &final_cache)?;
    }

    Ok(final_cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::fake::FakeDownloader;
    use serde_json::json;

    fn settings_with_url(url: &str, cache_dir: &Path) -> GlobalSettings {
        GlobalSettings {
            registry: crate::config::RegistrySettings {
                path: None,
                url: url.to_string(),
                cache_path: Some(cache_dir.to_path_buf()),
            },
        }
    }

    #[test]
    fn remote_cache_hit_skips_download() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let version_dir = cache_dir.join("ns").join("pkg").join("2.0.0");
        std::fs::create_dir_all(&version_dir).unwrap();
        std::fs::write(version_dir.join("fpm.toml"), "[package]\nname = \"pkg\"\n").unwrap();

        let settings = settings_with_url("https://reg.example.com", &cache_dir);
        let downloader = FakeDownloader::new("pkg", json!({}));

        let dir = acquire(&downloader, &settings, "ns", "pkg", Some("2.0.0")).unwrap();
        assert_eq!(dir, version_dir);
        assert!(downloader.calls.borrow().is_empty());
    }

    #[test]
    fn remote_cache_miss_downloads_and_unpacks() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let settings = settings_with_url("https://reg.example.com", &cache_dir);

        let body = json!({
            "code": 200,
            "data": {
                "version_data": {
                    "download_url": "https://reg.example.com/dl/pkg-2.0.0.zip",
                    "version": "2.0.0",
                }
            }
        });
        let downloader = FakeDownloader::new("pkg", body);

        let dir = acquire(&downloader, &settings, "ns", "pkg", Some("2.0.0")).unwrap();
        assert_eq!(dir, cache_dir.join("ns").join("pkg").join("2.0.0"));
        assert!(dir.join("fpm.toml").exists());
        assert_eq!(downloader.calls.borrow().len(), 3);
    }

    #[test]
    fn missing_download_url_is_distinct_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let settings = settings_with_url("https://reg.example.com", &cache_dir);
        let body = json!({"code": 200, "data": {"version_data": {"version": "2.0.0"}}});
        let downloader = FakeDownloader::new("pkg", body);

        let err = acquire(&downloader, &settings, "ns", "pkg", Some("2.0.0")).unwrap_err();
        assert!(matches!(err, FpmError::RegistryMissingField { field, .. } if field == "download_url"));
    }

    #[test]
    fn non_200_code_surfaces_server_message() {
        let tmp = tempfile::tempdir().unwrap();
        let cache_dir = tmp.path().join("cache");
        let settings = settings_with_url("https://reg.example.com", &cache_dir);
        let body = json!({"code": 404, "message": "package not found"});
        let downloader = FakeDownloader::new("pkg", body);

        let err = acquire(&downloader, &settings, "ns", "pkg", Some("2.0.0")).unwrap_err();
        assert!(matches!(err, FpmError::RegistryHttpError { message, .. } if message == "package not found"));
    }

    #[test]
    fn local_registry_picks_max_version() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for v in ["1.0.0", "2.5.0", "2.0.0"] {
            let dir = root.join("ns").join("pkg").join(v);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("fpm.toml"), "[package]\nname = \"pkg\"\n").unwrap();
        }
        let resolved = acquire_local(root, "ns", "pkg", None).unwrap();
        assert_eq!(resolved, root.join("ns").join("pkg").join("2.5.0"));
    }

    #[test]
    fn local_registry_no_versions_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("ns").join("pkg")).unwrap();
        let err = acquire_local(root, "ns", "pkg", None).unwrap_err();
        assert!(matches!(err, FpmError::NoVersions { .. }));
    }
}
