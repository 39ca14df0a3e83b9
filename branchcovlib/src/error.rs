//! Error types for branchcovlib

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while filtering a coverage trace
#[derive(Error, Debug)]
pub enum BranchcovError {
    /// Failed to read a source file named by an `SF:` record
    #[error("failed to read source file '{path}': {source}")]
    SourceRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to read the input tracefile
    #[error("failed to read tracefile '{path}': {source}")]
    TraceRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write or replace the output tracefile
    #[error("failed to write tracefile '{path}': {source}")]
    OutputWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A `BRDA:` record whose line field is not an integer
    #[error("malformed branch record on trace line {line_no}: '{record}'")]
    MalformedBranchRecord { line_no: usize, record: String },

    /// A conditional rule that does not compile into a pattern
    #[error("invalid conditional pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Path does not exist
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
