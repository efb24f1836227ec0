pub mod bundle;
pub mod certificate;
pub mod config;
pub mod deploy;
pub mod error;
pub mod multipart;
pub mod path;
pub mod session;
pub mod status;
pub mod trigger;

pub use error::{CertPushError, Result};
