use crate::error::{CertPushError, Result};
use std::path::{Component, Path, PathBuf};

/// Maps paths written by the certificate producer (inside its container) onto
/// the directory where the same files are visible to this host.
///
/// Example: `/etc/letsencrypt/live/npm-2` with prefix `/etc/letsencrypt` and
/// root `/var/lib/docker/volumes/npm_letsencrypt/_data` becomes
/// `/var/lib/docker/volumes/npm_letsencrypt/_data/live/npm-2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    source_prefix: PathBuf,
    target_root: PathBuf,
}

impl PathMapping {
    pub fn new(source_prefix: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            source_prefix: source_prefix.into(),
            target_root: target_root.into(),
        }
    }

    pub fn source_prefix(&self) -> &Path {
        &self.source_prefix
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// Rewrite `embedded` into the target namespace.
    ///
    /// Matching is per path component, so `/etc/letsencrypt2` is not under
    /// `/etc/letsencrypt`. A path equal to the prefix maps to the target root.
    pub fn translate(&self, embedded: &Path) -> Result<PathBuf> {
        let not_under_prefix = || CertPushError::PathTranslation {
            path: embedded.to_path_buf(),
            prefix: self.source_prefix.clone(),
        };
        let relative = embedded
            .strip_prefix(&self.source_prefix)
            .map_err(|_| not_under_prefix())?;
        // `..` in the remainder would climb back out of the target root.
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(not_under_prefix());
        }
        if relative.as_os_str().is_empty() {
            return Ok(self.target_root.clone());
        }
        Ok(self.target_root.join(relative))
    }
}
