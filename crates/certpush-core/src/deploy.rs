//! One certificate push: trigger → translate → validate → login → locate →
//! upload → clear trigger, with the DSM session closed on every exit path.

use crate::bundle::CertificateBundle;
use crate::certificate::{self, CertificateDescriptor};
use crate::config::Config;
use crate::error::Result;
use crate::path::PathMapping;
use crate::session::{RemoteEndpoint, SessionClient};
use crate::status::{status_path_for, DeploymentResult};
use crate::trigger::TriggerSignal;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, info_span};

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DeploySettings {
    pub endpoint: RemoteEndpoint,
    pub username: String,
    pub password: String,
    pub cert_description: String,
    pub mapping: PathMapping,
    pub trigger_path: PathBuf,
    /// Where to record the run outcome; `None` disables the status record.
    pub status_path: Option<PathBuf>,
    pub dry_run: bool,
}

impl DeploySettings {
    pub fn from_config(config: &Config, dry_run: bool) -> Self {
        Self {
            endpoint: RemoteEndpoint::https(&config.host, config.port),
            username: config.username.clone(),
            password: config.password.clone(),
            cert_description: config.cert_description.clone(),
            mapping: PathMapping::new(
                &config.container_letsencrypt_path,
                &config.host_letsencrypt_path,
            ),
            trigger_path: config.flag_file.clone(),
            status_path: Some(status_path_for(&config.log_file)),
            dry_run,
        }
    }
}

impl fmt::Debug for DeploySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploySettings")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("cert_description", &self.cert_description)
            .field("mapping", &self.mapping)
            .field("trigger_path", &self.trigger_path)
            .field("status_path", &self.status_path)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Stage / RunOutcome
// ---------------------------------------------------------------------------

/// Furthest point a run reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    TriggerDetected,
    PathResolved,
    ArtifactsValidated,
    SessionOpen,
    CertificateLocated,
    Uploaded,
    Completed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::TriggerDetected => "trigger_detected",
            Stage::PathResolved => "path_resolved",
            Stage::ArtifactsValidated => "artifacts_validated",
            Stage::SessionOpen => "session_open",
            Stage::CertificateLocated => "certificate_located",
            Stage::Uploaded => "uploaded",
            Stage::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No trigger present; nothing was touched.
    Idle,
    /// Everything up to the upload succeeded; nothing was changed.
    DryRun {
        certificate: CertificateDescriptor,
        bundle_dir: PathBuf,
    },
    Deployed { certificate: CertificateDescriptor },
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Execute one deployment run and record its outcome.
pub fn run(settings: &DeploySettings) -> Result<RunOutcome> {
    let span = info_span!("deploy", dry_run = settings.dry_run);
    let _enter = span.enter();

    if settings.dry_run {
        info!("DRY-RUN mode: no changes will be made to DSM or the flag file");
    }

    let mut stage = Stage::Idle;
    let result = execute(settings, &mut stage);

    match &result {
        Ok(RunOutcome::Idle) => {}
        Ok(RunOutcome::DryRun { .. }) => info!("Dry run finished"),
        Ok(RunOutcome::Deployed { .. }) => {
            info!("Certificate push completed successfully");
            record(
                settings,
                DeploymentResult::new(true, "Certificate push completed successfully"),
            );
        }
        Err(e) => {
            error!(kind = e.kind(), %stage, "Certificate push failed: {e}");
            if !settings.dry_run {
                record(settings, DeploymentResult::new(false, e.to_string()));
            }
        }
    }
    result
}

fn execute(settings: &DeploySettings, stage: &mut Stage) -> Result<RunOutcome> {
    let Some(trigger) = TriggerSignal::probe(&settings.trigger_path)? else {
        debug!("No flag file found, nothing to do");
        return Ok(RunOutcome::Idle);
    };
    *stage = Stage::TriggerDetected;
    info!("Flag file detected, starting certificate push");

    let lineage = trigger.lineage()?;
    info!("Container lineage path: {}", lineage.display());

    let host_lineage = settings.mapping.translate(&lineage)?;
    *stage = Stage::PathResolved;
    info!("Host lineage path: {}", host_lineage.display());

    let bundle = CertificateBundle::load(&host_lineage)?;
    *stage = Stage::ArtifactsValidated;

    let client = SessionClient::new(settings.endpoint.clone())?;
    let guard = client.login(&settings.username, &settings.password)?;
    *stage = Stage::SessionOpen;

    let cert = certificate::find_by_description(
        guard.client(),
        guard.session(),
        &settings.cert_description,
    )?;
    *stage = Stage::CertificateLocated;

    if settings.dry_run {
        info!(
            "[DRY RUN] Would upload {} to DSM certificate '{}' (id={})",
            bundle.fullchain.path.display(),
            settings.cert_description,
            cert.id
        );
        return Ok(RunOutcome::DryRun {
            certificate: cert,
            bundle_dir: bundle.dir,
        });
    }

    certificate::replace(guard.client(), guard.session(), &cert.id, &bundle)?;
    *stage = Stage::Uploaded;
    guard.close();

    trigger.consume()?;
    info!("Flag file removed");
    *stage = Stage::Completed;

    Ok(RunOutcome::Deployed { certificate: cert })
}

fn record(settings: &DeploySettings, result: DeploymentResult) {
    if let Some(path) = &settings.status_path {
        result.persist(path);
    }
}
