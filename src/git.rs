//! The Git interface consumed by the resolver.
//!
//! Synchronous per the core's concurrency model (spec.md §5): every call
//! here blocks the caller on a subprocess. Expressed as a trait so tests can
//! inject a fake implementation instead of invoking a real `git` binary,
//! following the "downloader injection" design note for the analogous
//! HTTP interface.

use std::path::Path;
use std::process::Command;

use crate::core::FpmError;
use crate::node::GitReference;

/// Git operations the resolver needs: checkout a ref into a directory, and
/// read back the commit that ended up checked out.
pub trait GitProvider {
    /// Clones (if `target_dir` is empty/absent) or updates and checks out
    /// `url@reference` into `target_dir`.
    fn checkout(&self, target_dir: &Path, url: &str, reference: &GitReference) -> Result<(), FpmError>;

    /// Returns the commit SHA currently checked out at `dir`.
    fn current_revision(&self, dir: &Path) -> Result<String, FpmError>;
}

/// Default [`GitProvider`] backed by the system `git` executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

impl SystemGit {
    fn run(dir: Option<&Path>, args: &[&str]) -> Result<String, FpmError> {
        let mut cmd = Command::new("git");
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output().map_err(|e| FpmError::GitCommandError {
            operation: args.join(" "),
            reason: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(FpmError::GitCommandError {
                operation: args.join(" "),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl GitProvider for SystemGit {
    fn checkout(&self, target_dir: &Path, url: &str, reference: &GitReference) -> Result<(), FpmError> {
        if !target_dir.join(".git").exists() {
            std::fs::create_dir_all(
                target_dir
                    .parent()
                    .unwrap_or_else(|| Path::new(".")),
            )
            .map_err(|e| FpmError::io(target_dir, e))?;
            Self::run(
                None,
                &["clone", url, &target_dir.to_string_lossy()],
            )?;
        } else {
            Self::run(Some(target_dir), &["fetch", "--all", "--tags"])?;
        }

        match reference {
            GitReference::Default => {
                // Already on the default branch after clone/fetch; nothing further to do.
            }
            GitReference::Branch(b) => {
                Self::run(Some(target_dir), &["checkout", b])?;
            }
            GitReference::Tag(t) => {
                Self::run(Some(target_dir), &["checkout", t])?;
            }
            GitReference::Revision(r) => {
                Self::run(Some(target_dir), &["checkout", r])?;
            }
        }
        Ok(())
    }

    fn current_revision(&self, dir: &Path) -> Result<String, FpmError> {
        Self::run(Some(dir), &["rev-parse", "HEAD"])
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod fake {
    //! An in-memory [`GitProvider`] for hermetic resolver tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Records one checkout call and always returns a fixed revision.
    #[derive(Debug, Default)]
    pub struct FakeGit {
        pub revision: String,
        pub checkouts: RefCell<Vec<(String, String)>>,
        /// Per-directory override revisions, keyed by target dir string.
        pub revisions_by_dir: RefCell<HashMap<String, String>>,
    }

    impl FakeGit {
        pub fn new(revision: impl Into<String>) -> Self {
            Self {
                revision: revision.into(),
                checkouts: RefCell::new(Vec::new()),
                revisions_by_dir: RefCell::new(HashMap::new()),
            }
        }
    }

    impl GitProvider for FakeGit {
        fn checkout(
            &self,
            target_dir: &Path,
            url: &str,
            reference: &GitReference,
        ) -> Result<(), FpmError> {
            std::fs::create_dir_all(target_dir).map_err(|e| FpmError::io(target_dir, e))?;
            let name = target_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "stub".to_string());
            std::fs::write(
                target_dir.join("fpm.toml"),
                format!("[package]\nname = \"{name}\"\n"),
            )
            .map_err(|e| FpmError::io(target_dir, e))?;
            self.checkouts
                .borrow_mut()
                .push((url.to_string(), reference.as_refspec().to_string()));
            Ok(())
        }

        fn current_revision(&self, dir: &Path) -> Result<String, FpmError> {
            let key = dir.to_string_lossy().to_string();
            Ok(self
                .revisions_by_dir
                .borrow()
                .get(&key)
                .cloned()
                .unwrap_or_else(|| self.revision.clone()))
        }
    }
}
