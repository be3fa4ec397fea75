use std::{io, path::PathBuf};

/// Fatal errors of the file selection core.
///
/// Per-file pattern mismatches are deliberately not represented here:
/// a single malformed filename is logged and skipped, never fatal.
#[derive(thiserror::Error, Debug)]
pub enum SelectError {
    /// Invalid pattern or missing required input.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transfer log exists but yields no usable cutoff.
    #[error("transfer log {} contains no parseable entry, refusing to guess a cutoff", .0.display())]
    CorruptLog(PathBuf),

    /// File system I/O failure.
    #[error("I/O error while accessing {}", .0.display())]
    Io(PathBuf, #[source] io::Error),
}

/// Result alias for the selection core.
pub type Result<T> = std::result::Result<T, SelectError>;
