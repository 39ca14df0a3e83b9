//! C-style comment stripping that preserves line numbering.
//!
//! The stripper removes `//` line comments and `/* */` block comments from a
//! sequence of source lines. It emits exactly one output line per input line,
//! so a block comment spanning several lines leaves that many (possibly empty)
//! lines behind, and line `n` of the output always corresponds to line `n` of
//! the input.
//!
//! The scan is purely lexical: comment delimiters inside string or character
//! literals are treated as real delimiters, and block comments do not nest.

/// Streaming comment stripper.
///
/// The only state carried from one line to the next is whether the previous
/// line ended inside an unterminated block comment.
#[derive(Debug, Default, Clone)]
pub struct CommentStripper {
    in_block_comment: bool,
}

impl CommentStripper {
    /// Create a stripper positioned outside any comment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the last line processed ended inside an open block comment.
    pub fn in_block_comment(&self) -> bool {
        self.in_block_comment
    }

    /// Strip comments from one line and return the trimmed remainder.
    pub fn strip_line(&mut self, line: &str) -> String {
        let mut clean = String::new();
        let mut rest = line;

        while !rest.is_empty() {
            if self.in_block_comment {
                match rest.find("*/") {
                    Some(end) => {
                        rest = &rest[end + 2..];
                        self.in_block_comment = false;
                    }
                    None => rest = "",
                }
                continue;
            }

            let line_comment = rest.find("//");
            let block_comment = rest.find("/*");

            match (block_comment, line_comment) {
                (Some(open), first_line_comment)
                    if first_line_comment.is_none_or(|lc| open < lc) =>
                {
                    clean.push_str(&rest[..open]);
                    rest = &rest[open + 2..];
                    self.in_block_comment = true;
                }
                (_, Some(start)) => {
                    clean.push_str(&rest[..start]);
                    rest = "";
                }
                _ => {
                    clean.push_str(rest);
                    rest = "";
                }
            }
        }

        clean.trim().to_string()
    }
}

/// Iterator adapter yielding the comment-free form of each input line.
pub struct StrippedLines<I> {
    lines: I,
    stripper: CommentStripper,
}

impl<I, S> Iterator for StrippedLines<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let line = self.lines.next()?;
        Some(self.stripper.strip_line(line.as_ref()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.lines.size_hint()
    }
}

/// Strip comments from a sequence of lines, lazily.
///
/// # Example
///
/// ```rust
/// use branchcovlib::strip_comments;
///
/// let source = ["int a; /* start", "still comment", "end */ int b; // tail"];
/// let clean: Vec<String> = strip_comments(source).collect();
/// assert_eq!(clean, vec!["int a;", "", "int b;"]);
/// ```
pub fn strip_comments<I, S>(lines: I) -> StrippedLines<I::IntoIter>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    StrippedLines {
        lines: lines.into_iter(),
        stripper: CommentStripper::new(),
    }
}
