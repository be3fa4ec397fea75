use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use lftp_tools::{Config, FileSelector, transfer};
use log::info;

/// Send timestamp-named data files to an FTP server using lftp.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Path to the toml configuration file
    config_file: PathBuf,
    /// Path to the lftp transfer log
    log_file: PathBuf,
    /// First date to send (required for the first run, when no log exists)
    #[arg(long)]
    since: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::try_load(&args.config_file)?;

    let selector = FileSelector::new(&config.files.dir_mask, &config.files.file_mask)?;
    let cutoff = selector.compute_cutoff(&args.log_file, args.since.as_deref())?;
    info!("Looking for new/updated files to send since {cutoff}");

    let candidates = selector.list_candidates(&cutoff);
    if candidates.is_empty() {
        info!("no new file to send");
        return Ok(());
    }
    info!("{} file(s) to send", candidates.len());

    transfer::run_transfer(&config.ftp, &candidates, &args.log_file)?;

    if let Some(last) = candidates.last() {
        info!("Date of last sent file: {}", last.stamp);
    }

    Ok(())
}
