use crate::error::{CertPushError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Flag file written by the renewal hook. Its single line names the renewed
/// lineage directory as seen from inside the producer's container.
#[derive(Debug)]
pub struct TriggerSignal {
    path: PathBuf,
}

impl TriggerSignal {
    /// `None` when no renewal is pending.
    pub fn probe(path: &Path) -> Result<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(_) => Ok(Some(Self {
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the embedded lineage path. An empty flag can never succeed, so it
    /// is removed before the error is returned.
    pub fn lineage(&self) -> Result<PathBuf> {
        let content = std::fs::read_to_string(&self.path)?;
        let lineage = content.trim();
        if lineage.is_empty() {
            return Err(self.discard_corrupt());
        }
        Ok(PathBuf::from(lineage))
    }

    /// Remove a flag that can never succeed. A failed removal is only
    /// logged; the run still fails as a corrupt trigger.
    fn discard_corrupt(&self) -> CertPushError {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove empty flag file {}: {e}", self.path.display());
        }
        CertPushError::TriggerCorruption {
            path: self.path.clone(),
        }
    }

    /// Delete the flag once its renewal has been deployed.
    pub fn consume(self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_flag_is_idle() {
        let dir = TempDir::new().unwrap();
        assert!(TriggerSignal::probe(&dir.path().join("flag")).unwrap().is_none());
    }

    #[test]
    fn reads_trimmed_lineage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flag");
        std::fs::write(&path, "  /etc/letsencrypt/live/npm-2\n").unwrap();
        let trigger = TriggerSignal::probe(&path).unwrap().unwrap();
        assert_eq!(
            trigger.lineage().unwrap(),
            PathBuf::from("/etc/letsencrypt/live/npm-2")
        );
        assert!(path.exists(), "reading must not consume the flag");
    }

    #[test]
    fn empty_flag_is_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flag");
        std::fs::write(&path, " \n").unwrap();
        let trigger = TriggerSignal::probe(&path).unwrap().unwrap();
        let err = trigger.lineage().unwrap_err();
        assert_eq!(err.kind(), "trigger_corruption");
        assert!(!path.exists());
    }

    #[test]
    fn failed_removal_stays_trigger_corruption() {
        let dir = TempDir::new().unwrap();
        let trigger = TriggerSignal {
            path: dir.path().join("already-gone"),
        };
        assert_eq!(trigger.discard_corrupt().kind(), "trigger_corruption");
    }

    #[test]
    fn consume_deletes_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flag");
        std::fs::write(&path, "/etc/letsencrypt/live/npm-2").unwrap();
        TriggerSignal::probe(&path).unwrap().unwrap().consume().unwrap();
        assert!(!path.exists());
    }
}
