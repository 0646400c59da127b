use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use clap::Parser;
use docchat::{config, logging, storage};

#[derive(Parser)]
#[command(
    name = "docchat-purge",
    about = "Remove uploads and indexes left behind by earlier server runs"
)]
struct Cli {
    /// Data directory to scan (defaults to DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Remove artifacts older than this many seconds (defaults to SESSION_EXPIRY_SECS).
    #[arg(long)]
    max_age_secs: Option<u64>,
    /// List what would be removed without deleting anything.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_tracing();
    let defaults =
        config::Config::from_env_lenient().context("failed to read storage settings")?;

    let data_dir = cli.data_dir.unwrap_or(defaults.data_dir);
    let max_age = Duration::from_secs(cli.max_age_secs.unwrap_or(defaults.session_expiry_secs));
    let layout = storage::StorageLayout::new(&data_dir);

    let report = storage::purge_stale_artifacts(&layout, max_age, SystemTime::now(), cli.dry_run)
        .with_context(|| format!("failed to purge {}", data_dir.display()))?;

    let verb = if cli.dry_run { "Would remove" } else { "Removed" };
    for path in &report.removed {
        println!("{verb} {}", path.display());
    }
    println!(
        "{verb} {} artifact(s); kept {}",
        report.removed.len(),
        report.kept
    );
    Ok(())
}
