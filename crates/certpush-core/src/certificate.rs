//! Certificate inventory lookup and in-place replacement on DSM.

use crate::bundle::{Artifact, CertificateBundle};
use crate::error::{CertPushError, Result};
use crate::multipart::{FilePart, MultipartForm};
use crate::session::{Session, SessionClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PEM_CONTENT_TYPE: &str = "application/x-pem-file";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub common_name: Option<String>,
}

/// One entry of `SYNO.Core.Certificate.CRT` `list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDescriptor {
    pub id: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
struct CertificateList {
    #[serde(default)]
    certificates: Vec<CertificateDescriptor>,
}

/// Look up the certificate whose description equals `description`.
pub fn find_by_description(
    client: &SessionClient,
    session: &Session,
    description: &str,
) -> Result<CertificateDescriptor> {
    info!("Looking up certificate with description '{description}'");
    let list: CertificateList = client.get(
        session,
        &[
            ("api", "SYNO.Core.Certificate.CRT"),
            ("version", "1"),
            ("method", "list"),
        ],
    )?;
    debug!("Found {} certificate(s) on DSM", list.certificates.len());
    for cert in &list.certificates {
        debug!(
            "  - id={} desc={} subject={}",
            cert.id,
            cert.desc,
            cert.subject.common_name.as_deref().unwrap_or("-")
        );
    }

    let matched = select_by_description(&list.certificates, description)?.clone();
    info!("Matched certificate id: {}", matched.id);
    Ok(matched)
}

/// Exact, case-sensitive match on `desc`. With several matches the first in
/// listing order wins; descriptions are expected to be unique on the device.
pub fn select_by_description<'a>(
    certificates: &'a [CertificateDescriptor],
    description: &str,
) -> Result<&'a CertificateDescriptor> {
    let mut matches = certificates.iter().filter(|c| c.desc == description);
    let Some(first) = matches.next() else {
        return Err(CertPushError::NotFound {
            description: description.to_string(),
            available: certificates.iter().map(|c| c.desc.clone()).collect(),
        });
    };
    if matches.next().is_some() {
        warn!(
            "Multiple certificates found with description '{description}', using the first. \
             Remove duplicates from DSM to avoid ambiguity."
        );
    }
    Ok(first)
}

/// Build the `SYNO.Core.Certificate` `import` form replacing certificate `id`.
pub fn import_form(id: &str, bundle: &CertificateBundle) -> MultipartForm {
    let form = MultipartForm::new()
        .text("id", id)
        // Empty desc leaves the existing description untouched.
        .text("desc", "")
        .text("as_default", "false")
        .file("cert", pem_part("cert.pem", &bundle.fullchain))
        .file("key", pem_part("privkey.pem", &bundle.privkey));
    match &bundle.chain {
        Some(chain) => form.file("inter_cert", pem_part("chain.pem", chain)),
        None => form,
    }
}

fn pem_part(filename: &str, artifact: &Artifact) -> FilePart {
    FilePart::new(filename, artifact.content.clone(), PEM_CONTENT_TYPE)
}

/// Swap the material behind `id` for the bundle's. Identifier and description
/// stay as they are.
pub fn replace(
    client: &SessionClient,
    session: &Session,
    id: &str,
    bundle: &CertificateBundle,
) -> Result<()> {
    info!("Uploading certificate (id={id})");
    let form = import_form(id, bundle);
    let _: serde_json::Value = client.upload_multipart(
        session,
        &[
            ("api", "SYNO.Core.Certificate"),
            ("version", "1"),
            ("method", "import"),
        ],
        &form,
    )?;
    info!("Certificate uploaded successfully");
    Ok(())
}
