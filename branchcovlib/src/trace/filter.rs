//! Branch-record filtering over a tracefile.
//!
//! The filter makes a single pass over the trace. Each `SF:` marker replaces
//! the active conditional-line set with the one derived from the named source
//! file; each `BRDA:` record is kept only if its line is in the active set.
//! All other lines, and every kept line, are written out byte for byte.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info, trace, warn};

use crate::error::BranchcovError;
use crate::options::FilterOptions;
use crate::source::{
    conditional_lines_for_path, ConditionalLines, ConditionalMatcher, KeywordMatcher,
};
use crate::Result;

use super::record::Record;

/// Counters collected during one filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    /// `SF:` markers seen
    pub sections: usize,
    /// Source files actually read (cache hits excluded)
    pub sources_read: usize,
    /// `BRDA:` records seen
    pub branch_records: usize,
    /// `BRDA:` records written
    pub kept: usize,
    /// `BRDA:` records omitted
    pub dropped: usize,
    /// Records of any other kind, written unchanged
    pub passthrough: usize,
}

impl FilterStats {
    /// Total number of records read.
    pub fn records(&self) -> usize {
        self.sections + self.branch_records + self.passthrough
    }
}

/// Streaming tracefile filter.
///
/// The active conditional-line set and the source cache, when enabled, are
/// reset at the start of every run, so each run sees the sources as they are
/// on disk at that time.
pub struct TraceFilter<M = KeywordMatcher> {
    matcher: M,
    options: FilterOptions,
    active: ConditionalLines,
    cache: HashMap<PathBuf, ConditionalLines>,
}

impl TraceFilter<KeywordMatcher> {
    /// Create a filter using the C-family conditional rules.
    pub fn new(options: FilterOptions) -> Self {
        Self::with_matcher(KeywordMatcher::c_family(), options)
    }
}

impl<M: ConditionalMatcher> TraceFilter<M> {
    /// Create a filter with a custom conditional-line matcher.
    pub fn with_matcher(matcher: M, options: FilterOptions) -> Self {
        Self {
            matcher,
            options,
            active: ConditionalLines::new(),
            cache: HashMap::new(),
        }
    }

    /// Filter a trace from `input` into `output`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use branchcovlib::{FilterOptions, TraceFilter};
    /// use std::fs;
    /// use tempfile::tempdir;
    ///
    /// let dir = tempdir().unwrap();
    /// fs::write(dir.path().join("max.c"), "int max(int a, int b) {\n  if (a > b)\n    return a;\n  return b;\n}\n").unwrap();
    ///
    /// let trace = "SF:max.c\nBRDA:2,0,0,1\nBRDA:3,0,0,-\nend_of_record\n";
    /// let mut out = Vec::new();
    /// let mut filter = TraceFilter::new(FilterOptions::new().source_root(dir.path()));
    /// let stats = filter.filter(trace.as_bytes(), &mut out).unwrap();
    ///
    /// assert_eq!(String::from_utf8(out).unwrap(), "SF:max.c\nBRDA:2,0,0,1\nend_of_record\n");
    /// assert_eq!(stats.dropped, 1);
    /// ```
    pub fn filter<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<FilterStats> {
        self.run(input, output, BranchcovError::Io, BranchcovError::Io)
    }

    /// Filter the tracefile at `input` into `output`.
    ///
    /// The result is written to a temporary file next to `output` and moved
    /// into place only once the whole trace has been processed, so a failed
    /// run leaves any existing `output` untouched. `input` and `output` may be
    /// the same path. An existing `output` keeps its permissions; a new one
    /// gets the usual umask-derived mode.
    pub fn filter_file(
        &mut self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
    ) -> Result<FilterStats> {
        let input = input.as_ref();
        let output = output.as_ref();

        if !input.exists() {
            return Err(BranchcovError::PathNotFound(input.to_path_buf()));
        }

        let read_err = |e: io::Error| BranchcovError::TraceRead {
            path: input.to_path_buf(),
            source: e,
        };
        let write_err = |e: io::Error| BranchcovError::OutputWrite {
            path: output.to_path_buf(),
            source: e,
        };

        let reader = BufReader::new(File::open(input).map_err(read_err)?);

        let dir = match output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut staged = stage_output(dir).map_err(write_err)?;

        debug!(
            input = %input.display(),
            output = %output.display(),
            staged = %staged.path().display(),
            "filtering tracefile"
        );

        let stats = self.run(
            reader,
            BufWriter::new(staged.as_file_mut()),
            read_err,
            write_err,
        )?;

        if let Ok(existing) = fs::metadata(output) {
            staged
                .as_file()
                .set_permissions(existing.permissions())
                .map_err(write_err)?;
        }
        staged.persist(output).map_err(|e| write_err(e.error))?;

        info!(
            sections = stats.sections,
            kept = stats.kept,
            dropped = stats.dropped,
            "wrote {}",
            output.display()
        );
        Ok(stats)
    }

    fn run<R, W, RE, WE>(
        &mut self,
        mut input: R,
        mut output: W,
        read_err: RE,
        write_err: WE,
    ) -> Result<FilterStats>
    where
        R: BufRead,
        W: Write,
        RE: Fn(io::Error) -> BranchcovError,
        WE: Fn(io::Error) -> BranchcovError,
    {
        let mut stats = FilterStats::default();
        let mut line = String::new();
        let mut line_no = 0;

        self.active = ConditionalLines::new();
        self.cache.clear();

        loop {
            line.clear();
            if input.read_line(&mut line).map_err(&read_err)? == 0 {
                break;
            }
            line_no += 1;

            let keep = match Record::parse(&line, line_no)? {
                Record::SourceFile(path) => {
                    stats.sections += 1;
                    self.active = self.load(path, &mut stats)?;
                    true
                }
                Record::BranchData { line: source_line } => {
                    stats.branch_records += 1;
                    if stats.sections == 0 {
                        warn!(line_no, "branch record before any source file marker");
                    }
                    let keep = self.active.contains(source_line);
                    if keep {
                        stats.kept += 1;
                    } else {
                        stats.dropped += 1;
                        trace!(line_no, source_line, "dropping non-conditional branch");
                    }
                    keep
                }
                Record::Other => {
                    stats.passthrough += 1;
                    true
                }
            };

            if keep {
                output.write_all(line.as_bytes()).map_err(&write_err)?;
            }
        }

        output.flush().map_err(&write_err)?;
        Ok(stats)
    }

    /// Conditional lines of the source named by an `SF:` record.
    fn load(&mut self, path: &str, stats: &mut FilterStats) -> Result<ConditionalLines> {
        let resolved = self.options.resolve(path);

        if self.options.cache_sources {
            if let Some(lines) = self.cache.get(&resolved) {
                debug!(path = %resolved.display(), "conditional lines from cache");
                return Ok(lines.clone());
            }
        }

        let lines = conditional_lines_for_path(&resolved, &self.matcher)?;
        stats.sources_read += 1;
        debug!(
            path = %resolved.display(),
            conditional = lines.len(),
            "classified source file"
        );

        if self.options.cache_sources {
            self.cache.insert(resolved, lines.clone());
        }
        Ok(lines)
    }
}

/// Create the temporary file a filtered trace is written to before it
/// replaces the output.
///
/// On Unix the file is opened with mode `0o666`, so the process umask applies
/// as it would for a freshly created output.
fn stage_output(dir: &Path) -> io::Result<NamedTempFile> {
    let mut builder = Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Filter the tracefile at `input` into `output` with the C-family rules.
///
/// See [`TraceFilter::filter_file`].
pub fn filter_tracefile(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: FilterOptions,
) -> Result<FilterStats> {
    TraceFilter::new(options).filter_file(input, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// A source file where line 10 is `if (a > b) {` and line 11 is `return a;`.
    const MAX_CPP: &str = r#"#include <cstdio>

/*
 * Returns the larger of two values.
 * if a tie, returns b
 */
int max(int a, int b)
{
    // compare
    if (a > b) {
        return a;
    }
    return b;
}
"#;

    const OTHER_CPP: &str = "void f() {\n    g();\n    while (x) {\n        y();\n    }\n}\n";

    fn write_source(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn run(dir: &Path, trace: &str) -> Result<(String, FilterStats)> {
        let mut out = Vec::new();
        let mut filter = TraceFilter::new(FilterOptions::new().source_root(dir));
        let stats = filter.filter(trace.as_bytes(), &mut out)?;
        Ok((String::from_utf8(out).unwrap(), stats))
    }

    #[test]
    fn keeps_conditional_and_drops_plain_branches() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        let trace = "SF:max.cpp\nBRDA:10,0,0,1\nBRDA:11,0,0,-\nend_of_record\n";
        let (out, stats) = run(dir.path(), trace).unwrap();

        assert_eq!(out, "SF:max.cpp\nBRDA:10,0,0,1\nend_of_record\n");
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn commented_keywords_do_not_keep_branches() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        // line 5 mentions "if" inside a block comment, line 9 inside a line comment
        let trace = "SF:max.cpp\nBRDA:5,0,0,1\nBRDA:9,0,0,1\n";
        let (out, stats) = run(dir.path(), trace).unwrap();

        assert_eq!(out, "SF:max.cpp\n");
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn other_records_pass_through_in_order() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        let trace = "TN:\nSF:max.cpp\nFN:7,max\nFNDA:3,max\nDA:10,3\nBRDA:11,0,0,1\nDA:11,2\nBRDA:10,0,1,2\nBRF:2\nBRH:2\nLF:5\nend_of_record\n";
        let (out, stats) = run(dir.path(), trace).unwrap();

        assert_eq!(
            out,
            "TN:\nSF:max.cpp\nFN:7,max\nFNDA:3,max\nDA:10,3\nDA:11,2\nBRDA:10,0,1,2\nBRF:2\nBRH:2\nLF:5\nend_of_record\n"
        );
        assert_eq!(stats.passthrough, 9);
        assert_eq!(stats.records(), 12);
    }

    #[test]
    fn sections_are_isolated() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);
        write_source(dir.path(), "src/other.cpp", OTHER_CPP);

        // line 3 is plain in max.cpp but a `while` in other.cpp; line 10 the reverse
        let trace = "SF:max.cpp\nBRDA:3,0,0,1\nBRDA:10,0,0,1\nend_of_record\n\
                     SF:src/other.cpp\nBRDA:3,0,0,1\nBRDA:10,0,0,1\nend_of_record\n";
        let (out, stats) = run(dir.path(), trace).unwrap();

        assert_eq!(
            out,
            "SF:max.cpp\nBRDA:10,0,0,1\nend_of_record\nSF:src/other.cpp\nBRDA:3,0,0,1\nend_of_record\n"
        );
        assert_eq!(stats.sections, 2);
        assert_eq!(stats.sources_read, 2);
    }

    #[test]
    fn branches_before_any_section_are_dropped() {
        let dir = tempdir().unwrap();
        let (out, stats) = run(dir.path(), "TN:\nBRDA:1,0,0,1\n").unwrap();

        assert_eq!(out, "TN:\n");
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn line_terminators_are_preserved() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        let trace = "SF:max.cpp\r\nBRDA:10,0,0,1\r\nBRDA:11,0,0,1\r\nend_of_record";
        let (out, _) = run(dir.path(), trace).unwrap();

        assert_eq!(out, "SF:max.cpp\r\nBRDA:10,0,0,1\r\nend_of_record");
    }

    #[test]
    fn missing_source_aborts() {
        let dir = tempdir().unwrap();
        let err = run(dir.path(), "SF:nope.cpp\nBRDA:1,0,0,1\n").unwrap_err();

        match err {
            BranchcovError::SourceRead { path, .. } => assert!(path.ends_with("nope.cpp")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_branch_record_aborts() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        let err = run(dir.path(), "SF:max.cpp\nDA:1,1\nBRDA:x,0,0,1\n").unwrap_err();
        assert!(matches!(
            err,
            BranchcovError::MalformedBranchRecord { line_no: 3, .. }
        ));
    }

    #[test]
    fn repeated_sources_are_reread_without_cache() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        let trace = "SF:max.cpp\nend_of_record\nSF:max.cpp\nend_of_record\n";
        let (_, stats) = run(dir.path(), trace).unwrap();

        assert_eq!(stats.sections, 2);
        assert_eq!(stats.sources_read, 2);
    }

    #[test]
    fn cache_reuses_sources_with_identical_output() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);

        let trace = "SF:max.cpp\nBRDA:10,0,0,1\nBRDA:11,0,0,1\nend_of_record\n\
                     SF:max.cpp\nBRDA:10,0,0,1\nBRDA:11,0,0,1\nend_of_record\n";

        let (uncached, _) = run(dir.path(), trace).unwrap();

        let mut out = Vec::new();
        let options = FilterOptions::new()
            .source_root(dir.path())
            .cache_sources(true);
        let stats = TraceFilter::new(options)
            .filter(trace.as_bytes(), &mut out)
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), uncached);
        assert_eq!(stats.sources_read, 1);
    }

    #[test]
    fn cache_does_not_outlive_a_run() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "a.c", "x();\n");

        let trace = "SF:a.c\nBRDA:1,0,0,1\n";
        let options = FilterOptions::new()
            .source_root(dir.path())
            .cache_sources(true);
        let mut filter = TraceFilter::new(options);

        let mut first = Vec::new();
        filter.filter(trace.as_bytes(), &mut first).unwrap();
        assert_eq!(String::from_utf8(first).unwrap(), "SF:a.c\n");

        write_source(dir.path(), "a.c", "if (x) y();\n");

        let mut second = Vec::new();
        let stats = filter.filter(trace.as_bytes(), &mut second).unwrap();
        assert_eq!(String::from_utf8(second).unwrap(), "SF:a.c\nBRDA:1,0,0,1\n");
        assert_eq!(stats.sources_read, 1);
    }

    #[test]
    fn custom_matcher_is_used() {
        let dir = tempdir().unwrap();
        write_source(
            dir.path(),
            "lib.rs",
            "fn f(x: u8) {\n    match x {\n        _ => {}\n    }\n}\n",
        );

        let matcher = KeywordMatcher::new(&["match"], &[]).unwrap();
        let mut filter =
            TraceFilter::with_matcher(matcher, FilterOptions::new().source_root(dir.path()));
        let mut out = Vec::new();
        filter
            .filter("SF:lib.rs\nBRDA:1,0,0,1\nBRDA:2,0,0,1\n".as_bytes(), &mut out)
            .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "SF:lib.rs\nBRDA:2,0,0,1\n");
    }

    #[test]
    fn filter_file_writes_output() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);
        let input = dir.path().join("coverage.info");
        let output = dir.path().join("filtered.info");
        fs::write(
            &input,
            format!(
                "SF:{}\nBRDA:10,0,0,1\nBRDA:13,0,0,1\nend_of_record\n",
                dir.path().join("max.cpp").display()
            ),
        )
        .unwrap();

        let stats = filter_tracefile(&input, &output, FilterOptions::new()).unwrap();

        let written = fs::read_to_string(&output).unwrap();
        assert!(written.contains("BRDA:10,0,0,1"));
        assert!(!written.contains("BRDA:13"));
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn filter_file_in_place() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);
        let trace = dir.path().join("coverage.info");
        fs::write(&trace, "SF:max.cpp\nBRDA:11,0,0,1\nend_of_record\n").unwrap();

        let options = FilterOptions::new().source_root(dir.path());
        filter_tracefile(&trace, &trace, options).unwrap();

        assert_eq!(
            fs::read_to_string(&trace).unwrap(),
            "SF:max.cpp\nend_of_record\n"
        );
    }

    #[test]
    fn failed_run_leaves_existing_output_untouched() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("coverage.info");
        let output = dir.path().join("filtered.info");
        fs::write(&input, "SF:missing.cpp\nBRDA:1,0,0,1\n").unwrap();
        fs::write(&output, "previous\n").unwrap();

        let options = FilterOptions::new().source_root(dir.path());
        let err = filter_tracefile(&input, &output, options).unwrap_err();

        assert!(matches!(err, BranchcovError::SourceRead { .. }));
        assert_eq!(fs::read_to_string(&output).unwrap(), "previous\n");
        // the staged file was removed
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[cfg(unix)]
    fn mode(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn existing_output_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);
        let input = dir.path().join("coverage.info");
        let output = dir.path().join("filtered.info");
        fs::write(&input, "SF:max.cpp\nBRDA:10,0,0,1\n").unwrap();
        fs::write(&output, "old\n").unwrap();
        fs::set_permissions(&output, fs::Permissions::from_mode(0o644)).unwrap();

        let options = FilterOptions::new().source_root(dir.path());
        filter_tracefile(&input, &output, options).unwrap();

        assert_eq!(mode(&output), 0o644);
        assert_eq!(fs::read_to_string(&output).unwrap(), "SF:max.cpp\nBRDA:10,0,0,1\n");
    }

    #[cfg(unix)]
    #[test]
    fn in_place_filter_keeps_input_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);
        let trace = dir.path().join("coverage.info");
        fs::write(&trace, "SF:max.cpp\nBRDA:11,0,0,1\n").unwrap();
        fs::set_permissions(&trace, fs::Permissions::from_mode(0o664)).unwrap();

        let options = FilterOptions::new().source_root(dir.path());
        filter_tracefile(&trace, &trace, options).unwrap();

        assert_eq!(mode(&trace), 0o664);
    }

    #[cfg(unix)]
    #[test]
    fn new_output_gets_umask_default_mode() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "max.cpp", MAX_CPP);
        let input = dir.path().join("coverage.info");
        let output = dir.path().join("filtered.info");
        // fs::write creates files with 0o666 minus the umask
        fs::write(&input, "SF:max.cpp\n").unwrap();

        let options = FilterOptions::new().source_root(dir.path());
        filter_tracefile(&input, &output, options).unwrap();

        assert_eq!(mode(&output), mode(&input));
    }

    #[test]
    fn failed_run_creates_no_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("coverage.info");
        let output = dir.path().join("filtered.info");
        fs::write(&input, "SF:missing.cpp\n").unwrap();

        assert!(filter_tracefile(&input, &output, FilterOptions::new()).is_err());
        assert!(!output.exists());
    }

    #[test]
    fn missing_tracefile_is_reported() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("absent.info");
        let output = dir.path().join("out.info");

        let err = filter_tracefile(&input, &output, FilterOptions::new()).unwrap_err();
        assert!(matches!(err, BranchcovError::PathNotFound(p) if p == input));
    }
}
