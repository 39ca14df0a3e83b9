//! # branchcov
//!
//! A CLI tool that removes branch records for non-conditional source lines
//! from lcov tracefiles.
//!
//! ## Overview
//!
//! branchcov is built on top of branchcovlib. For every `SF:` section of a
//! tracefile it reads the named source file, strips C-style comments, and
//! keeps a `BRDA:` record only when its line contains `if`, `else`, `for`,
//! `while`, `switch`, `?`, `&&` or `||`. Every other record is copied as is.
//!
//! ## Usage
//!
//! ```bash
//! # Filter a tracefile
//! branchcov coverage.info coverage.filtered.info
//!
//! # Source paths in the trace are relative to another directory
//! branchcov coverage.info out.info --source-root build/..
//!
//! # Print what was kept and dropped
//! branchcov coverage.info out.info --stats --format json
//!
//! # Show which lines of a file count as conditional
//! branchcov classify src/board.cpp
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use branchcovlib::{
    conditional_lines_for_path, FilterOptions, FilterStats, KeywordMatcher, TraceFilter,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use console::Style;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Run summary printed by `--stats`
#[derive(Debug, Serialize)]
struct StatsReport {
    input: PathBuf,
    output: PathBuf,
    #[serde(flatten)]
    stats: FilterStats,
}

/// Conditional lines printed by `classify --format json`
#[derive(Debug, Serialize)]
struct ClassifyReport {
    path: PathBuf,
    lines: Vec<usize>,
}

/// Build the clap Command structure
fn build_command() -> Command {
    Command::new("branchcov")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Drop branch records for non-conditional source lines from lcov tracefiles")
        .subcommand_negates_reqs(true)
        .args_conflicts_with_subcommands(true)
        .arg(
            Arg::new("tracefile")
                .help("Input lcov tracefile")
                .required(true),
        )
        .arg(
            Arg::new("output")
                .help("Where to write the filtered tracefile (may equal the input)")
                .required(true),
        )
        .arg(
            Arg::new("source-root")
                .short('s')
                .long("source-root")
                .help("Resolve relative SF: paths against this directory"),
        )
        .arg(
            Arg::new("cache")
                .long("cache")
                .action(ArgAction::SetTrue)
                .help("Classify each source file once, even if it has several sections"),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .action(ArgAction::SetTrue)
                .help("Print a summary of kept and dropped branch records"),
        )
        .arg(format_arg())
        .arg(
            Arg::new("keyword")
                .short('k')
                .long("keyword")
                .action(ArgAction::Append)
                .global(true)
                .help("Conditional keyword, replaces the default rule set (repeatable)"),
        )
        .arg(
            Arg::new("operator")
                .long("operator")
                .action(ArgAction::Append)
                .global(true)
                .help("Conditional operator, replaces the default rule set (repeatable)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("Increase log verbosity (-v info, -vv debug, -vvv trace)"),
        )
        .subcommand(
            Command::new("classify")
                .about("Print the conditional line numbers of a source file")
                .arg(
                    Arg::new("source")
                        .help("Source file to classify")
                        .required(true),
                )
                .arg(format_arg()),
        )
}

fn format_arg() -> Arg {
    Arg::new("format")
        .long("format")
        .value_parser(["text", "json"])
        .default_value("text")
        .help("Output format for reports")
}

/// Initialize the stderr tracing subscriber
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Build the conditional matcher from --keyword/--operator
fn build_matcher(matches: &ArgMatches) -> Result<KeywordMatcher, anyhow::Error> {
    let keywords: Vec<&str> = matches
        .get_many::<String>("keyword")
        .map(|v| v.map(|s| s.as_str()).collect())
        .unwrap_or_default();
    let operators: Vec<&str> = matches
        .get_many::<String>("operator")
        .map(|v| v.map(|s| s.as_str()).collect())
        .unwrap_or_default();

    if keywords.is_empty() && operators.is_empty() {
        Ok(KeywordMatcher::c_family())
    } else {
        Ok(KeywordMatcher::new(&keywords, &operators)?)
    }
}

fn is_json(matches: &ArgMatches) -> bool {
    matches.get_one::<String>("format").map(|s| s.as_str()) == Some("json")
}

/// Handler for the default filter command
fn filter_handler(matches: &ArgMatches) -> Result<(), anyhow::Error> {
    let input = PathBuf::from(
        matches
            .get_one::<String>("tracefile")
            .ok_or_else(|| anyhow::anyhow!("missing tracefile argument"))?,
    );
    let output = PathBuf::from(
        matches
            .get_one::<String>("output")
            .ok_or_else(|| anyhow::anyhow!("missing output argument"))?,
    );

    let mut options = FilterOptions::new().cache_sources(matches.get_flag("cache"));
    if let Some(root) = matches.get_one::<String>("source-root") {
        options = options.source_root(root);
    }

    let matcher = build_matcher(matches)?;
    let stats = TraceFilter::with_matcher(matcher, options).filter_file(&input, &output)?;

    if matches.get_flag("stats") {
        let report = StatsReport {
            input,
            output,
            stats,
        };
        if is_json(matches) {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print!("{}", render_stats(&report));
        }
    }

    Ok(())
}

/// Render the text form of a stats report
fn render_stats(report: &StatsReport) -> String {
    let label = Style::new().bold();
    let stats = &report.stats;
    let rows = [
        ("Sections", stats.sections),
        ("Sources read", stats.sources_read),
        ("Branch records", stats.branch_records),
        ("  kept", stats.kept),
        ("  dropped", stats.dropped),
        ("Pass-through", stats.passthrough),
    ];

    let mut out = format!(
        "{} -> {}\n",
        report.input.display(),
        report.output.display()
    );
    for (name, value) in rows {
        out.push_str(&format!(
            "{} {:>10}\n",
            label.apply_to(format!("{name:<16}")),
            value
        ));
    }
    out
}

/// Handler for the classify subcommand
fn classify_handler(matches: &ArgMatches) -> Result<(), anyhow::Error> {
    let path = PathBuf::from(
        matches
            .get_one::<String>("source")
            .ok_or_else(|| anyhow::anyhow!("missing source argument"))?,
    );

    let matcher = build_matcher(matches)?;
    let lines: Vec<usize> = conditional_lines_for_path(&path, &matcher)?
        .into_iter()
        .collect();

    if is_json(matches) {
        let report = ClassifyReport { path, lines };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in lines {
            println!("{line}");
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let matches = build_command().get_matches();
    init_tracing(matches.get_count("verbose"));

    let result = match matches.subcommand() {
        Some(("classify", sub)) => classify_handler(sub),
        _ => filter_handler(&matches),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
