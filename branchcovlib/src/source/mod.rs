//! Source analysis: find the decision points of a source file.
//!
//! This module handles the source side of filtering. It provides:
//!
//! - **Comment stripping**: remove `//` and `/* */` comments line by line,
//!   keeping line numbering intact
//! - **Classification**: decide which comment-free lines are conditional
//!
//! ## Example
//!
//! ```rust
//! use branchcovlib::source::{conditional_lines, KeywordMatcher};
//!
//! let source = "int x = 5;\n/* if (x) */\nif (x > 1) {\n  return x;\n}";
//! let lines = conditional_lines(source.lines(), &KeywordMatcher::c_family());
//! assert!(lines.contains(3));
//! assert_eq!(lines.len(), 1);
//! ```

pub mod comments;
pub mod conditional;

pub use comments::{strip_comments, CommentStripper, StrippedLines};
pub use conditional::{
    conditional_lines, conditional_lines_for_path, conditional_lines_from_reader,
    ConditionalLines, ConditionalMatcher, KeywordMatcher, DEFAULT_KEYWORDS, DEFAULT_OPERATORS,
};
