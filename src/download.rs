//! The downloader interface consumed by registry acquisition.
//!
//! Three operations — fetch package metadata, fetch a file, unpack an
//! archive — expressed as a trait so registry acquisition tests can
//! substitute a fake instead of hitting the network, per the "downloader
//! injection" design note.

use std::path::Path;

use serde_json::Value;

use crate::core::FpmError;

pub trait Downloader {
    /// `GET <url>/packages/<namespace>/<name>[?version=<v>]`, returning the
    /// parsed JSON body. `tmp_path` is a scratch file the implementation may
    /// use to stage the raw response; callers should not rely on its
    /// contents after the call returns.
    fn get_pkg_data(
        &self,
        url: &str,
        requested_version: Option<&str>,
        tmp_path: &Path,
    ) -> Result<Value, FpmError>;

    /// Downloads the body at `url` to `tmp_path`.
    fn get_file(&self, url: &str, tmp_path: &Path) -> Result<(), FpmError>;

    /// Unpacks the archive at `archive_path` into `dest_dir`.
    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), FpmError>;
}

/// Default [`Downloader`] backed by a blocking `reqwest` client and the
/// `zip` crate, following the teacher's `self_updater` download pattern
/// (retry-with-backoff, size-limited reads) adapted to run synchronously.
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .expect("building the HTTP client with static config cannot fail"),
        }
    }
}

/// Archives larger than this are rejected outright to bound memory use.
const MAX_ARCHIVE_BYTES: u64 = 200 * 1024 * 1024;

impl Downloader for HttpDownloader {
    fn get_pkg_data(
        &self,
        url: &str,
        requested_version: Option<&str>,
        tmp_path: &Path,
    ) -> Result<Value, FpmError> {
        let mut req = self.client.get(url);
        if let Some(v) = requested_version {
            req = req.query(&[("version", v)]);
        }
        let response = req
            .send()
            .map_err(|e| FpmError::DownloadError(e.to_string()))?;
        let text = response
            .text()
            .map_err(|e| FpmError::DownloadError(e.to_string()))?;
        if let Some(parent) = tmp_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        // Best-effort staging of the raw body; failure here is not fatal.
        let _ = std::fs::write(tmp_path, &text);
        serde_json::from_str(&text).map_err(|e| FpmError::DownloadError(e.to_string()))
    }

    fn get_file(&self, url: &str, tmp_path: &Path) -> Result<(), FpmError> {
        let mut retries = 3u32;
        let mut delay = std::time::Duration::from_secs(1);
        loop {
            match self.client.get(url).send() {
                Ok(response) => {
                    if let Some(len) = response.content_length()
                        && len > MAX_ARCHIVE_BYTES
                    {
                        return Err(FpmError::DownloadError(format!(
                            "archive too large: {len} bytes"
                        )));
                    }
                    if !response.status().is_success() {
                        return Err(FpmError::DownloadError(format!(
                            "HTTP {} fetching {url}",
                            response.status()
                        )));
                    }
                    let bytes = response
                        .bytes()
                        .map_err(|e| FpmError::DownloadError(e.to_string()))?;
                    std::fs::write(tmp_path, &bytes).map_err(|e| FpmError::io(tmp_path, e))?;
                    return Ok(());
                }
                Err(e) if retries > 0 => {
                    tracing::warn!("download of {url} failed: {e}, retrying in {delay:?}");
                    std::thread::sleep(delay);
                    delay *= 2;
                    retries -= 1;
                }
                Err(e) => return Err(FpmError::DownloadError(e.to_string())),
            }
        }
    }

    fn unpack(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), FpmError> {
        let file = std::fs::File::open(archive_path).map_err(|e| FpmError::io(archive_path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| FpmError::DownloadError(e.to_string()))?;
        std::fs::create_dir_all(dest_dir).map_err(|e| FpmError::io(dest_dir, e))?;
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| FpmError::DownloadError(e.to_string()))?;
            let Some(relative) = entry.enclosed_name() else {
                tracing::warn!("skipping unsafe zip entry {}", entry.name());
                continue;
            };
            let out_path = dest_dir.join(relative);
            if entry.is_dir() {
                std::fs::create_dir_all(&out_path).map_err(|e| FpmError::io(&out_path, e))?;
            } else {
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| FpmError::io(parent, e))?;
                }
                let mut out = std::fs::File::create(&out_path).map_err(|e| FpmError::io(&out_path, e))?;
                std::io::copy(&mut entry, &mut out).map_err(|e| FpmError::io(&out_path, e))?;
            }
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    //! An in-memory [`Downloader`] for hermetic registry tests.

    use super::*;
    use std::cell::RefCell;

    /// Returns a fixed JSON payload and materializes a minimal `fpm.toml`
    /// instead of actually unpacking an archive.
    #[derive(Debug, Default)]
    pub struct FakeDownloader {
        pub pkg_data: Value,
        pub package_name: String,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeDownloader {
        pub fn new(package_name: impl Into<String>, pkg_data: Value) -> Self {
            Self {
                pkg_data,
                package_name: package_name.into(),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl Downloader for FakeDownloader {
        fn get_pkg_data(
            &self,
            url: &str,
            _requested_version: Option<&str>,
            _tmp_path: &Path,
        ) -> Result<Value, FpmError> {
            self.calls.borrow_mut().push(format!("get_pkg_data {url}"));
            Ok(self.pkg_data.clone())
        }

        fn get_file(&self, url: &str, tmp_path: &Path) -> Result<(), FpmError> {
            self.calls.borrow_mut().push(format!("get_file {url}"));
            std::fs::write(tmp_path, b"fake archive contents").map_err(|e| FpmError::io(tmp_path, e))
        }

        fn unpack(&self, _archive_path: &Path, dest_dir: &Path) -> Result<(), FpmError> {
            self.calls.borrow_mut().push("unpack".to_string());
            std::fs::create_dir_all(dest_dir).map_err(|e| FpmError::io(dest_dir, e))?;
            std::fs::write(
                dest_dir.join("fpm.toml"),
                format!("[package]\nname = \"{}\"\n", self.package_name),
            )
            .map_err(|e| FpmError::io(dest_dir, e))
        }
    }
}
