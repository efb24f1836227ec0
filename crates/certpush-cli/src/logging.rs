use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Build the run's subscriber: plain-text lines to stdout and appended to
/// `log_file`. `RUST_LOG` overrides the default level.
pub fn subscriber(
    log_file: &Path,
    verbose: bool,
) -> anyhow::Result<impl tracing::Subscriber + Send + Sync + 'static> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout.and(Mutex::new(file)))
        .with_ansi(false)
        .with_target(false)
        .finish())
}
