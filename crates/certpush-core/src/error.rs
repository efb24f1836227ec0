use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CertPushError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("trigger file {path} is empty: cannot determine certificate lineage")]
    TriggerCorruption { path: PathBuf },

    #[error("path '{path}' is not under prefix '{prefix}'")]
    PathTranslation { path: PathBuf, prefix: PathBuf },

    #[error("required certificate file not found: {0}")]
    MissingArtifact(PathBuf),

    #[error("file does not appear to be valid PEM: {0}")]
    ArtifactFormat(PathBuf),

    #[error("login failed: {0}")]
    Authentication(ApiFailure),

    #[error("no certificate with description '{description}' found on DSM; available descriptions: {available:?}")]
    NotFound {
        description: String,
        available: Vec<String>,
    },

    #[error("DSM API error: {0}")]
    RemoteApi(ApiFailure),

    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl CertPushError {
    /// Category name reported in logs and the status record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::TriggerCorruption { .. } => "trigger_corruption",
            Self::PathTranslation { .. } => "path_translation",
            Self::MissingArtifact(_) => "missing_artifact",
            Self::ArtifactFormat(_) => "artifact_format",
            Self::Authentication(_) => "authentication",
            Self::NotFound { .. } => "not_found",
            Self::RemoteApi(_) => "remote_api",
            Self::Unexpected(_) | Self::Io(_) | Self::Json(_) | Self::Http(_) => "unexpected",
        }
    }
}

/// Error payload returned by DSM alongside `"success": false`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub code: Option<i64>,
    pub payload: serde_json::Value,
}

impl ApiFailure {
    pub fn from_payload(payload: serde_json::Value) -> Self {
        let code = payload.get("code").and_then(|c| c.as_i64());
        Self { code, payload }
    }
}

impl std::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => match describe_code(code) {
                Some(meaning) => write!(f, "code {code} ({meaning}): {}", self.payload),
                None => write!(f, "code {code}: {}", self.payload),
            },
            None => write!(f, "{}", self.payload),
        }
    }
}

/// Documented meanings of the DSM web API error codes that can come back from
/// the auth and certificate endpoints.
fn describe_code(code: i64) -> Option<&'static str> {
    let meaning = match code {
        100 => "unknown error",
        101 => "no parameter of API, method or version",
        102 => "requested API does not exist",
        103 => "requested method does not exist",
        104 => "requested version does not support the functionality",
        105 => "session does not have permission",
        106 => "session timeout",
        107 => "session interrupted by duplicate login",
        119 => "SID not found",
        400 => "no such account or incorrect password",
        401 => "account disabled",
        402 => "permission denied",
        403 => "2-step verification code required",
        404 => "failed to authenticate 2-step verification code",
        406 => "enforce to authenticate with 2-factor authentication code",
        407 => "blocked IP source",
        408 => "expired password cannot change",
        409 => "expired password",
        410 => "password must be changed",
        _ => return None,
    };
    Some(meaning)
}

pub type Result<T> = std::result::Result<T, CertPushError>;
