//! Conditional-line classification.
//!
//! A line is *conditional* when its comment-free text contains syntax that can
//! make control flow branch. The default rule set is the C-family one: the
//! whole-word keywords `if`, `else`, `for`, `while`, `switch`, or any of the
//! operators `?`, `&&`, `||`.
//!
//! Matching is line-granular. A condition split over several physical lines is
//! only conditional on the lines where a triggering token appears.

use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::error::BranchcovError;
use crate::Result;

use super::comments::{strip_comments, CommentStripper};

/// Keywords recognized by [`KeywordMatcher::c_family`].
pub const DEFAULT_KEYWORDS: &[&str] = &["if", "else", "for", "while", "switch"];

/// Operators recognized by [`KeywordMatcher::c_family`].
pub const DEFAULT_OPERATORS: &[&str] = &["?", "&&", "||"];

const C_FAMILY_PATTERN: &str = r"\b(?:if|else|for|while|switch)\b|\?|&&|\|\|";

static C_FAMILY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(C_FAMILY_PATTERN).expect("built-in conditional pattern"));

/// Decides whether a single comment-free line is a decision point.
pub trait ConditionalMatcher {
    fn is_conditional(&self, line: &str) -> bool;
}

impl<M: ConditionalMatcher + ?Sized> ConditionalMatcher for &M {
    fn is_conditional(&self, line: &str) -> bool {
        (**self).is_conditional(line)
    }
}

impl<M: ConditionalMatcher + ?Sized> ConditionalMatcher for Box<M> {
    fn is_conditional(&self, line: &str) -> bool {
        (**self).is_conditional(line)
    }
}

/// Regex-backed matcher over whole-word keywords and literal operators.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    pattern: Regex,
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        Self::c_family()
    }
}

impl KeywordMatcher {
    /// The C-family rule set (`if else for while switch`, `? && ||`).
    pub fn c_family() -> Self {
        Self {
            pattern: C_FAMILY.clone(),
        }
    }

    /// Build a matcher from custom keywords and operators.
    ///
    /// Keywords only match as whole words; operators match anywhere.
    /// At least one non-empty keyword or operator is required.
    pub fn new(keywords: &[&str], operators: &[&str]) -> Result<Self> {
        let mut alternatives = Vec::new();

        let words: Vec<String> = keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| regex::escape(k))
            .collect();
        if !words.is_empty() {
            alternatives.push(format!(r"\b(?:{})\b", words.join("|")));
        }

        alternatives.extend(
            operators
                .iter()
                .filter(|op| !op.is_empty())
                .map(|op| regex::escape(op)),
        );

        let pattern = alternatives.join("|");
        if pattern.is_empty() {
            return Err(BranchcovError::InvalidPattern {
                pattern,
                message: "at least one keyword or operator is required".to_string(),
            });
        }

        let regex = Regex::new(&pattern).map_err(|e| BranchcovError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        Ok(Self { pattern: regex })
    }

    /// The compiled pattern, as a string.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

impl ConditionalMatcher for KeywordMatcher {
    fn is_conditional(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

/// The 1-indexed conditional line numbers of one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalLines {
    lines: BTreeSet<usize>,
}

impl ConditionalLines {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, line: usize) -> bool {
        self.lines.contains(&line)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.lines.iter().copied()
    }
}

impl FromIterator<usize> for ConditionalLines {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self {
            lines: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ConditionalLines {
    type Item = usize;
    type IntoIter = btree_set::IntoIter<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.into_iter()
    }
}

/// Classify raw source lines, stripping comments first.
///
/// # Example
///
/// ```rust
/// use branchcovlib::{conditional_lines, KeywordMatcher};
///
/// let source = ["int x = 5;", "if (x) y();", "/* if */", "a = b ? c : d;"];
/// let lines = conditional_lines(source, &KeywordMatcher::c_family());
/// assert_eq!(lines.iter().collect::<Vec<_>>(), vec![2, 4]);
/// ```
pub fn conditional_lines<I, S, M>(lines: I, matcher: &M) -> ConditionalLines
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    M: ConditionalMatcher + ?Sized,
{
    strip_comments(lines)
        .enumerate()
        .filter(|(_, clean)| matcher.is_conditional(clean))
        .map(|(idx, _)| idx + 1)
        .collect()
}

/// Classify every line read from `reader`.
///
/// Fails only if the reader fails or yields invalid UTF-8.
pub fn conditional_lines_from_reader<R, M>(
    reader: R,
    matcher: &M,
) -> std::io::Result<ConditionalLines>
where
    R: BufRead,
    M: ConditionalMatcher + ?Sized,
{
    let mut stripper = CommentStripper::new();
    let mut lines = BTreeSet::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let clean = stripper.strip_line(&line);
        let is_conditional = matcher.is_conditional(&clean);
        trace!(line = idx + 1, conditional = is_conditional, text = %clean);
        if is_conditional {
            lines.insert(idx + 1);
        }
    }

    Ok(ConditionalLines { lines })
}

/// Read the source file at `path` and classify its lines.
pub fn conditional_lines_for_path<M>(
    path: impl AsRef<Path>,
    matcher: &M,
) -> Result<ConditionalLines>
where
    M: ConditionalMatcher + ?Sized,
{
    let path = path.as_ref();
    let source_err = |e: std::io::Error| BranchcovError::SourceRead {
        path: path.to_path_buf(),
        source: e,
    };

    let file = File::open(path).map_err(source_err)?;
    conditional_lines_from_reader(BufReader::new(file), matcher).map_err(source_err)
}
