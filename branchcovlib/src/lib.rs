//! # branchcovlib
//!
//! A source-aware filter for lcov-style branch coverage traces.
//!
//! ## Overview
//!
//! Coverage tracers emit branch records for many lines that contain no
//! decision in the source: object construction, destructor calls,
//! compiler-inserted branches, exception-unwind paths. This library drops
//! those records so that branch coverage reflects the conditions the code
//! actually spells out.
//!
//! The pipeline has three stages:
//!
//! - **Comment stripping**: remove `//` and `/* */` comments from each source
//!   line while keeping line numbers aligned
//! - **Classification**: collect the lines containing `if`, `else`, `for`,
//!   `while`, `switch`, `?`, `&&` or `||`
//! - **Trace filtering**: for every `SF:` section, keep a `BRDA:` record only
//!   if its line is conditional in that section's source file
//!
//! Everything is lexical. Comment delimiters and operators inside string
//! literals are treated as real syntax.
//!
//! ## Example
//!
//! ```rust
//! use branchcovlib::{filter_tracefile, FilterOptions};
//! use std::fs;
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! fs::write(
//!     dir.path().join("max.c"),
//!     "int max(int a, int b) {\n  if (a > b)\n    return a;\n  return b;\n}\n",
//! ).unwrap();
//! fs::write(
//!     dir.path().join("coverage.info"),
//!     "SF:max.c\nBRDA:2,0,0,1\nBRDA:4,0,0,-\nend_of_record\n",
//! ).unwrap();
//!
//! let stats = filter_tracefile(
//!     dir.path().join("coverage.info"),
//!     dir.path().join("filtered.info"),
//!     FilterOptions::new().source_root(dir.path()),
//! ).unwrap();
//!
//! assert_eq!(stats.kept, 1);
//! assert_eq!(stats.dropped, 1);
//! ```

pub mod error;
pub mod options;
pub mod source;
pub mod trace;

pub use error::BranchcovError;
pub use options::FilterOptions;
pub use source::{
    conditional_lines, conditional_lines_for_path, strip_comments, CommentStripper,
    ConditionalLines, ConditionalMatcher, KeywordMatcher,
};
pub use trace::{filter_tracefile, FilterStats, Record, TraceFilter};

/// Result type for branchcovlib operations
pub type Result<T> = std::result::Result<T, BranchcovError>;
