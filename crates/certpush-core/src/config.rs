use crate::error::{CertPushError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "/opt/cert-push/push-to-synology.conf";

pub const REQUIRED_KEYS: &[&str] = &[
    "SYNO_HOST",
    "SYNO_PORT",
    "SYNO_USER",
    "SYNO_PASS",
    "SYNO_CERT_DESC",
    "NPM_LETSENCRYPT_PATH",
    "CONTAINER_LETSENCRYPT_PATH",
    "FLAG_FILE",
    "LOG_FILE",
];

/// Settings read from the `KEY=VALUE` config file.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub cert_description: String,
    /// Where the lineage directories are visible on this host.
    pub host_letsencrypt_path: PathBuf,
    /// The same directory as named inside the producer's container.
    pub container_letsencrypt_path: PathBuf,
    pub flag_file: PathBuf,
    pub log_file: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CertPushError::Configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut values = parse_pairs(text);

        let missing: Vec<&str> = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|k| !values.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(CertPushError::Configuration(format!(
                "missing required key(s): {}",
                missing.join(", ")
            )));
        }

        let mut take = |key: &str| values.remove(key).unwrap_or_default();
        let raw_port = take("SYNO_PORT");
        let port = match raw_port.parse::<u16>() {
            Ok(port) if port >= 1 => port,
            _ => {
                return Err(CertPushError::Configuration(format!(
                    "SYNO_PORT must be an integer between 1 and 65535, got: {raw_port:?}"
                )))
            }
        };

        Ok(Self {
            host: take("SYNO_HOST"),
            port,
            username: take("SYNO_USER"),
            password: take("SYNO_PASS"),
            cert_description: take("SYNO_CERT_DESC"),
            host_letsencrypt_path: take("NPM_LETSENCRYPT_PATH").into(),
            container_letsencrypt_path: take("CONTAINER_LETSENCRYPT_PATH").into(),
            flag_file: take("FLAG_FILE").into(),
            log_file: take("LOG_FILE").into(),
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("cert_description", &self.cert_description)
            .field("host_letsencrypt_path", &self.host_letsencrypt_path)
            .field("container_letsencrypt_path", &self.container_letsencrypt_path)
            .field("flag_file", &self.flag_file)
            .field("log_file", &self.log_file)
            .finish()
    }
}

/// Blank lines, `#` comments and lines without `=` are skipped. Keys and
/// values are trimmed; the value is everything after the first `=`.
fn parse_pairs(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}
