//! Incremental lftp uploads for timestamp-named data files
//!
//! Instrument data files encode their acquisition time in the file
//! name (and optionally in date subdirectories). The transfer log
//! written by lftp records what was already sent; its latest entry
//! becomes the cutoff for the next run, so each invocation uploads
//! exactly the files that appeared since.

pub mod error;
pub mod pattern;
pub mod select;
pub mod transfer;

pub use error::SelectError;
pub use pattern::{Stamp, TimestampPattern};
pub use select::{Candidate, FileSelector};
pub use transfer::Config;
