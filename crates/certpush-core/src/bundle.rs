use crate::error::{CertPushError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FULLCHAIN_FILE: &str = "fullchain.pem";
pub const PRIVKEY_FILE: &str = "privkey.pem";
pub const CHAIN_FILE: &str = "chain.pem";

/// One PEM file read from a certificate lineage directory.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// The files of one lineage, loaded and checked before any network call.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub dir: PathBuf,
    pub fullchain: Artifact,
    pub privkey: Artifact,
    pub chain: Option<Artifact>,
}

impl CertificateBundle {
    /// Resolve and validate the lineage files under `dir`.
    ///
    /// Both required files are checked for presence before either is parsed,
    /// so a half-written lineage reports `MissingArtifact` rather than a
    /// format error.
    pub fn load(dir: &Path) -> Result<Self> {
        let fullchain_path = dir.join(FULLCHAIN_FILE);
        let privkey_path = dir.join(PRIVKEY_FILE);
        for path in [&fullchain_path, &privkey_path] {
            if !path.is_file() {
                return Err(CertPushError::MissingArtifact(path.clone()));
            }
        }

        let chain_path = dir.join(CHAIN_FILE);
        let chain = if chain_path.is_file() {
            let content = std::fs::read(&chain_path)?;
            (!content.is_empty()).then_some(Artifact {
                path: chain_path.clone(),
                content,
            })
        } else {
            None
        };

        debug!("cert:  {}", fullchain_path.display());
        debug!("key:   {}", privkey_path.display());
        debug!(
            "chain: {} ({})",
            chain_path.display(),
            if chain.is_some() { "present" } else { "absent" }
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            fullchain: read_pem(fullchain_path)?,
            privkey: read_pem(privkey_path)?,
            chain,
        })
    }
}

fn read_pem(path: PathBuf) -> Result<Artifact> {
    let content = std::fs::read(&path)?;
    if !looks_like_pem(&String::from_utf8_lossy(&content)) {
        return Err(CertPushError::ArtifactFormat(path));
    }
    Ok(Artifact { path, content })
}

/// True when `text` holds at least one `-----BEGIN X-----` line followed by a
/// matching `-----END X-----` line.
pub fn looks_like_pem(text: &str) -> bool {
    let mut open: Option<&str> = None;
    for line in text.lines().map(str::trim) {
        match open {
            None => {
                if let Some(label) = pem_label(line, "-----BEGIN ") {
                    open = Some(label);
                }
            }
            Some(label) => {
                if pem_label(line, "-----END ") == Some(label) {
                    return true;
                }
            }
        }
    }
    false
}

fn pem_label<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix)?.strip_suffix("-----")
}
