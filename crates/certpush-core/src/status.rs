use crate::error::Result;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

/// Outcome of the latest run, read by external monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub message: String,
}

impl DeploymentResult {
    pub fn new(success: bool, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(0),
            success,
            message: message.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        atomic_write(path, data.as_bytes())
    }

    /// Best-effort save: a status file must never fail the run it describes.
    pub fn persist(&self, path: &Path) {
        if let Err(e) = self.save(path) {
            warn!("Could not write status file {}: {e}", path.display());
        }
    }
}

/// `/var/log/cert-push.log` → `/var/log/cert-push.status.json`.
pub fn status_path_for(log_file: &Path) -> PathBuf {
    log_file.with_extension("status.json")
}

/// Replace `path` through a tempfile in the same directory, so readers see
/// either the previous record or the new one.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    // Monitoring may run as another user; tempfiles start out owner-only.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
