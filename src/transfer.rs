//! Configuration and lftp invocation
//!
//! The actual upload is delegated to the external `lftp` client.
//! Candidates are staged as symlinks in a temporary directory and
//! mirrored in one batch; lftp appends one `get` line per transferred
//! file to the log, which seeds the next run's cutoff.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context as _, Result, bail};
use figment::{
    Figment,
    providers::{Format as _, Toml},
};
use log::{debug, info};
use serde::Deserialize;
use tempfile::TempDir;

use crate::select::Candidate;

/// Session options applied to every lftp run.
const LFTP_OPTIONS: &str =
    "cache flush;set net:timeout 10s;set net:max-retries 2;set net:idle 15s;debug 3";

/// Transfer configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub ftp: FtpConfig,
    pub files: FilesConfig,
}

/// FTP server connection parameters, passed through to lftp.
#[derive(Debug, Deserialize)]
pub struct FtpConfig {
    pub server: String,
    pub user: String,
    pub password: String,
    /// Remote target directory
    pub dir: String,
}

/// Local file naming convention.
#[derive(Debug, Deserialize)]
pub struct FilesConfig {
    /// Directory to scan, may contain date directives
    pub dir_mask: String,
    /// Filename pattern with date directives
    pub file_mask: String,
}

impl Config {
    /// Try loading the configuration from a toml file
    pub fn try_load(toml: &Path) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(toml))
            .extract()
            .map_err(Into::into)
    }
}

/// Look up the lftp executable on `PATH`.
pub fn find_lftp() -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join("lftp"))
        .find(|candidate| candidate.is_file())
}

/// Stage `candidates` as symlinks in a temporary directory so lftp
/// mirrors one flat batch.
///
/// The directory is removed when the returned guard is dropped.
pub fn stage_candidates(candidates: &[Candidate]) -> Result<TempDir> {
    let staging = tempfile::tempdir().context("failed to create staging directory")?;

    for candidate in candidates {
        let Some(name) = candidate.path.file_name() else {
            bail!("candidate {} has no file name", candidate.path.display());
        };
        // Absolute target, the link must resolve from the staging dir.
        let target = fs::canonicalize(&candidate.path)
            .with_context(|| format!("failed to resolve {}", candidate.path.display()))?;
        symlink(&target, staging.path().join(name))
            .with_context(|| format!("failed to stage {}", candidate.path.display()))?;
    }

    Ok(staging)
}

fn symlink(original: &Path, link: PathBuf) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(original, link)
    }

    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(original, link)
    }
}

/// Build the lftp mirror command for `data_dir`.
pub fn build_lftp_command(
    lftp: &Path,
    ftp: &FtpConfig,
    data_dir: &Path,
    log_file: &Path,
) -> Command {
    let mirror_opts = format!("--log={} -R -p -L -v", log_file.display());
    let mut command = Command::new(lftp);
    command
        .arg("-u")
        .arg(format!("{},{}", ftp.user, ftp.password))
        .arg(&ftp.server)
        .arg("-e")
        .arg(format!(
            "{LFTP_OPTIONS}; mirror {mirror_opts} {} {}; bye",
            data_dir.display(),
            ftp.dir
        ));
    command
}

/// Upload `candidates` with lftp, appending transferred files to `log_file`.
pub fn run_transfer(ftp: &FtpConfig, candidates: &[Candidate], log_file: &Path) -> Result<()> {
    let Some(lftp) = find_lftp() else {
        bail!("lftp is not available, please install it");
    };

    let staging = stage_candidates(candidates)?;
    let mut command = build_lftp_command(&lftp, ftp, staging.path(), log_file);

    info!("Running lftp ...");
    debug!("lftp command: {command:?}");
    let output = command.output().context("failed to run lftp")?;

    debug!("lftp stdout: {}", String::from_utf8_lossy(&output.stdout));
    if !output.stderr.is_empty() {
        debug!("lftp stderr: {}", String::from_utf8_lossy(&output.stderr));
    }

    if !output.status.success() {
        bail!("lftp exited with {}", output.status);
    }

    Ok(())
}
