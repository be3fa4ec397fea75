//! Incremental file selection
//!
//! This module decides which local files still have to be uploaded.
//! The cutoff comes either from the lftp transfer log of previous runs
//! or, on the very first run, from an explicit `--since` date. Every
//! file whose encoded timestamp is at or after the cutoff is a
//! candidate for the next transfer batch.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};
use walkdir::WalkDir;

use crate::{
    error::SelectError,
    pattern::{MatchError, Stamp, TimestampPattern},
};

/// Accepted `--since` formats, tried in order.
const SINCE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%Y-%m-%dT%H:%M:%S"];

/// A local file eligible for transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Full path to the file
    pub path: PathBuf,
    /// Timestamp encoded in the file name (and date directories)
    pub stamp: Stamp,
}

/// Per-run selector over one `(dir_mask, file_mask)` pair.
///
/// Compiled once per invocation; holds no mutable state.
#[derive(Debug)]
pub struct FileSelector {
    /// Literal directory prefix of the dir mask, the scan root
    root: PathBuf,
    /// Pattern matched against paths relative to `root`
    rel_pattern: TimestampPattern,
    /// Pattern matched against bare filenames in log entries
    file_pattern: TimestampPattern,
}

impl FileSelector {
    /// Compile the masks from the configuration.
    ///
    /// `dir_mask` may itself contain date directives (e.g. year/month
    /// subdirectories); its leading directive-free components become
    /// the scan root.
    pub fn new(dir_mask: &str, file_mask: &str) -> Result<Self, SelectError> {
        let (root, dir_tail) = split_literal_root(dir_mask);
        let rel_mask = if dir_tail.is_empty() {
            file_mask.to_string()
        } else {
            format!("{dir_tail}/{file_mask}")
        };

        Ok(Self {
            root,
            rel_pattern: TimestampPattern::new(&rel_mask)?,
            file_pattern: TimestampPattern::new(file_mask)?,
        })
    }

    /// Derive the cutoff for this run.
    ///
    /// With no log yet, `since` is required and the cutoff is the start
    /// of that day, so the whole day is included. With an existing log,
    /// the cutoff is the maximum timestamp found in it and `since` is
    /// ignored with a warning.
    pub fn compute_cutoff(&self, log_path: &Path, since: Option<&str>) -> Result<Stamp, SelectError> {
        if !log_path.exists() {
            let Some(since) = since else {
                return Err(SelectError::Configuration(
                    "no log of previous transfers found, --since is required on the first run"
                        .into(),
                ));
            };
            return Ok(Stamp::from_datetime(parse_since(since)?));
        }

        if since.is_some() {
            warn!(
                "--since is ignored because {} already exists, the log decides the cutoff",
                log_path.display()
            );
        }

        let contents = fs::read_to_string(log_path)
            .map_err(|e| SelectError::Io(log_path.to_path_buf(), e))?;
        contents
            .lines()
            .filter_map(|line| self.stamp_from_log_line(line))
            .max()
            .ok_or_else(|| SelectError::CorruptLog(log_path.to_path_buf()))
    }

    /// List all files under the scan root with a timestamp `>=` cutoff,
    /// ordered ascending by timestamp (ties broken by path).
    ///
    /// Ascending order keeps the lftp log advancing monotonically, so
    /// the next run's cutoff computation sees the latest entry last.
    pub fn list_candidates(&self, cutoff: &Stamp) -> Vec<Candidate> {
        if !self.root.is_dir() {
            warn!("scan root {} is not a directory", self.root.display());
        }

        let mut candidates: Vec<Candidate> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|x| x.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let rel = e.path().strip_prefix(&self.root).ok()?;
                // The pattern always uses '/' separators.
                let rel = rel.to_string_lossy().replace('\\', "/");
                match self.rel_pattern.parse(&rel) {
                    Ok(stamp) if stamp >= *cutoff => Some(Candidate {
                        path: e.path().to_owned(),
                        stamp,
                    }),
                    Ok(_) => {
                        debug!("{} is older than the cutoff", e.path().display());
                        None
                    }
                    Err(MatchError::NoMatch) => {
                        debug!("{} does not match the file mask", e.path().display());
                        None
                    }
                    Err(err) => {
                        warn!("skipping {}: {err}", e.path().display());
                        None
                    }
                }
            })
            .collect();

        candidates.sort_by(|a, b| a.stamp.cmp(&b.stamp).then_with(|| a.path.cmp(&b.path)));
        candidates
    }

    /// Extract a timestamp from one lftp log line.
    ///
    /// Lines look like
    /// `get -O ftp://user:pw@server/dir file:/T3250605_20230115_000000.nc`;
    /// only the trailing path component is matched against the file
    /// mask. Lines that do not yield a timestamp are lftp chatter and
    /// are ignored.
    fn stamp_from_log_line(&self, line: &str) -> Option<Stamp> {
        let token = line.split_whitespace().next_back()?;
        let name = token.rsplit('/').next()?;
        let name = name.strip_prefix("file:").unwrap_or(name);
        match self.file_pattern.parse(name) {
            Ok(stamp) => Some(stamp),
            Err(MatchError::NoMatch) => None,
            Err(err) => {
                warn!("ignoring log entry '{name}': {err}");
                None
            }
        }
    }
}

/// Split a dir mask into its literal root and the directive-bearing tail.
fn split_literal_root(dir_mask: &str) -> (PathBuf, String) {
    let mut root = PathBuf::new();
    let mut tail: Vec<&str> = Vec::new();

    for component in dir_mask.split('/') {
        if !tail.is_empty() || component.contains('%') {
            tail.push(component);
        } else if component.is_empty() {
            // Leading slash of an absolute mask.
            root.push("/");
        } else {
            root.push(component);
        }
    }

    (root, tail.join("/"))
}

/// Parse a `--since` value, flooring date-only forms to day start.
fn parse_since(text: &str) -> Result<NaiveDateTime, SelectError> {
    for format in SINCE_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(datetime);
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date.and_time(NaiveTime::MIN));
        }
    }
    Err(SelectError::Configuration(format!(
        "could not parse --since date '{text}' (expected e.g. 2023-01-15)"
    )))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const FILE_MASK: &str = "T3250605_%Y%m%d_%H%M%S.nc";

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn names(candidates: &[Candidate]) -> Vec<String> {
        candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    /// Selector over a flat data dir inside `tmp`.
    fn flat_selector(tmp: &TempDir) -> FileSelector {
        let dir_mask = tmp.path().join("data").to_string_lossy().into_owned();
        FileSelector::new(&dir_mask, FILE_MASK).unwrap()
    }

    #[test]
    fn first_run_without_since_is_a_configuration_error() {
        let tmp = TempDir::new().unwrap();
        let selector = flat_selector(&tmp);
        let missing_log = tmp.path().join("transfer.log");

        let err = selector.compute_cutoff(&missing_log, None).unwrap_err();
        assert!(matches!(err, SelectError::Configuration(_)));
    }

    #[test]
    fn first_run_cutoff_is_the_start_of_the_since_day() {
        let tmp = TempDir::new().unwrap();
        let selector = flat_selector(&tmp);
        let missing_log = tmp.path().join("transfer.log");

        let cutoff = selector
            .compute_cutoff(&missing_log, Some("2023-01-15"))
            .unwrap();
        assert_eq!(cutoff.as_str(), "20230115000000");
    }

    #[test]
    fn since_accepts_the_compact_and_datetime_forms() {
        let tmp = TempDir::new().unwrap();
        let selector = flat_selector(&tmp);
        let missing_log = tmp.path().join("transfer.log");

        let compact = selector
            .compute_cutoff(&missing_log, Some("20230115"))
            .unwrap();
        assert_eq!(compact.as_str(), "20230115000000");

        let datetime = selector
            .compute_cutoff(&missing_log, Some("2023-01-15T06:30:00"))
            .unwrap();
        assert_eq!(datetime.as_str(), "20230115063000");

        let err = selector
            .compute_cutoff(&missing_log, Some("January 15th"))
            .unwrap_err();
        assert!(matches!(err, SelectError::Configuration(_)));
    }

    #[test]
    fn cutoff_is_the_log_maximum_regardless_of_entry_order() {
        let tmp = TempDir::new().unwrap();
        let selector = FileSelector::new(
            &tmp.path().join("data").to_string_lossy(),
            "A_%Y%m%d",
        )
        .unwrap();

        let log = tmp.path().join("transfer.log");
        fs::write(
            &log,
            "get -O ftp://user:pw@server/dir file:/A_20230101\n\
             get -O ftp://user:pw@server/dir file:/A_20230215\n\
             get -O ftp://user:pw@server/dir file:/A_20230110\n",
        )
        .unwrap();

        let cutoff = selector.compute_cutoff(&log, None).unwrap();
        assert_eq!(cutoff.as_str(), "20230215000000");
    }

    #[test]
    fn log_without_parseable_entries_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let selector = flat_selector(&tmp);

        let log = tmp.path().join("transfer.log");
        fs::write(&log, "mirror: connecting\nsome unrelated chatter\n").unwrap();

        let err = selector.compute_cutoff(&log, None).unwrap_err();
        assert!(matches!(err, SelectError::CorruptLog(_)));
    }

    #[test]
    fn existing_log_wins_over_since() {
        let tmp = TempDir::new().unwrap();
        let selector = FileSelector::new(
            &tmp.path().join("data").to_string_lossy(),
            "A_%Y%m%d",
        )
        .unwrap();

        let log = tmp.path().join("transfer.log");
        fs::write(&log, "get -O ftp://u:p@s/d file:/A_20230215\n").unwrap();

        let cutoff = selector.compute_cutoff(&log, Some("2020-01-01")).unwrap();
        assert_eq!(cutoff.as_str(), "20230215000000");
    }

    #[test]
    fn candidates_at_or_after_the_cutoff_in_ascending_order() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        touch(&data.join("T3250605_20230114_235900.nc"));
        touch(&data.join("T3250605_20230115_000000.nc"));
        touch(&data.join("T3250605_20230116_120000.nc"));

        let selector = flat_selector(&tmp);
        let cutoff = selector
            .compute_cutoff(&tmp.path().join("transfer.log"), Some("2023-01-15"))
            .unwrap();
        let candidates = selector.list_candidates(&cutoff);

        assert_eq!(
            names(&candidates),
            [
                "T3250605_20230115_000000.nc",
                "T3250605_20230116_120000.nc"
            ]
        );
    }

    #[test]
    fn malformed_filename_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        // Month 13 is out of range; the README is plain noise.
        touch(&data.join("T3250605_20231301_000000.nc"));
        touch(&data.join("README.txt"));
        touch(&data.join("T3250605_20230116_120000.nc"));

        let selector = flat_selector(&tmp);
        let cutoff = selector
            .compute_cutoff(&tmp.path().join("transfer.log"), Some("2023-01-15"))
            .unwrap();
        let candidates = selector.list_candidates(&cutoff);

        assert_eq!(names(&candidates), ["T3250605_20230116_120000.nc"]);
    }

    #[test]
    fn selection_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        touch(&data.join("T3250605_20230115_000000.nc"));
        touch(&data.join("T3250605_20230116_120000.nc"));

        let selector = flat_selector(&tmp);
        let cutoff = selector
            .compute_cutoff(&tmp.path().join("transfer.log"), Some("2023-01-15"))
            .unwrap();

        let first = selector.list_candidates(&cutoff);
        let second = selector.list_candidates(&cutoff);
        assert_eq!(first, second);
    }

    #[test]
    fn date_directories_contribute_fields() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("archive");
        touch(&archive.join("2023/02/T_20230214.nc"));
        touch(&archive.join("2023/01/T_20230105.nc"));
        // Directory and filename disagree on the month.
        touch(&archive.join("2023/01/T_20230214.nc"));

        let dir_mask = format!("{}/%Y/%m", archive.to_string_lossy());
        let selector = FileSelector::new(&dir_mask, "T_%Y%m%d.nc").unwrap();
        let cutoff = selector
            .compute_cutoff(&tmp.path().join("transfer.log"), Some("2023-01-01"))
            .unwrap();
        let candidates = selector.list_candidates(&cutoff);

        assert_eq!(names(&candidates), ["T_20230105.nc", "T_20230214.nc"]);
    }

    #[test]
    fn empty_candidate_set_is_valid() {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        touch(&data.join("T3250605_20230110_000000.nc"));

        let selector = flat_selector(&tmp);
        let cutoff = selector
            .compute_cutoff(&tmp.path().join("transfer.log"), Some("2023-01-15"))
            .unwrap();

        assert!(selector.list_candidates(&cutoff).is_empty());
    }

    #[test]
    fn literal_root_split_keeps_directives_in_the_tail() {
        let (root, tail) = split_literal_root("/data/lidar/%Y/%m");
        assert_eq!(root, PathBuf::from("/data/lidar"));
        assert_eq!(tail, "%Y/%m");

        let (root, tail) = split_literal_root("test/data");
        assert_eq!(root, PathBuf::from("test/data"));
        assert_eq!(tail, "");
    }
}
