//! Tracefile record classification.
//!
//! Only two record kinds are interpreted: `SF:` section markers and `BRDA:`
//! branch-data records. Every other line is opaque and passes through.

use crate::error::BranchcovError;
use crate::Result;

/// Prefix of a section marker naming a source file.
pub const SOURCE_FILE_PREFIX: &str = "SF:";

/// Prefix of a branch-data record.
pub const BRANCH_DATA_PREFIX: &str = "BRDA:";

/// One line of a tracefile, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// `SF:<path>`: opens a section for the named source file
    SourceFile(&'a str),
    /// `BRDA:<line>,...`: a branch at `line` of the current source file
    BranchData { line: usize },
    /// Anything else
    Other,
}

impl<'a> Record<'a> {
    /// Classify a raw trace line, with or without its line terminator.
    ///
    /// `line_no` is the 1-indexed position of the line in the trace and is
    /// only used to report malformed branch records.
    pub fn parse(text: &'a str, line_no: usize) -> Result<Self> {
        if let Some(path) = text.strip_prefix(SOURCE_FILE_PREFIX) {
            return Ok(Record::SourceFile(path.trim_end()));
        }

        if let Some(fields) = text.strip_prefix(BRANCH_DATA_PREFIX) {
            let field = fields
                .split(',')
                .next()
                .unwrap_or_default()
                .trim_end_matches(['\r', '\n']);
            return parse_line_number(field)
                .map(|line| Record::BranchData { line })
                .ok_or_else(|| BranchcovError::MalformedBranchRecord {
                    line_no,
                    record: text.trim_end().to_string(),
                });
        }

        Ok(Record::Other)
    }
}

/// Parse an unsigned decimal line number, rejecting signs and whitespace.
fn parse_line_number(field: &str) -> Option<usize> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
