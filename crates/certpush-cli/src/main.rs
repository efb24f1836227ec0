mod logging;
mod output;

use anyhow::Context;
use certpush_core::config::{Config, DEFAULT_CONFIG_FILE};
use certpush_core::deploy::{self, DeploySettings, RunOutcome};
use clap::Parser;
use output::print_json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "cert-push",
    about = "Push a renewed Let's Encrypt certificate to Synology DSM when the renewal hook signals it",
    version
)]
struct Cli {
    /// Path to the KEY=VALUE configuration file
    #[arg(long, env = "CERT_PUSH_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Validate config and locate the certificate on DSM, but do not upload
    /// or delete the flag file
    #[arg(long)]
    dry_run: bool,

    /// Log request-level detail
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Print the run outcome as JSON
    #[arg(long, short = 'j')]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let subscriber = logging::subscriber(&config.log_file, cli.verbose)?;

    tracing::subscriber::with_default(subscriber, || {
        let settings = DeploySettings::from_config(&config, cli.dry_run);
        let outcome = deploy::run(&settings).context("certificate push failed")?;
        report(&outcome, cli.json)
    })
}

fn report(outcome: &RunOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(outcome);
    }
    match outcome {
        // Silent on the common scheduled no-op.
        RunOutcome::Idle => {}
        RunOutcome::DryRun {
            certificate,
            bundle_dir,
        } => println!(
            "Dry run: would replace certificate '{}' (id={}) with {}",
            certificate.desc,
            certificate.id,
            bundle_dir.display()
        ),
        RunOutcome::Deployed { certificate } => println!(
            "Replaced certificate '{}' (id={})",
            certificate.desc, certificate.id
        ),
    }
    Ok(())
}
