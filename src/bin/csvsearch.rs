use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::{ArgAction, Parser, ValueHint};
use serde_json::json;

use csvedit::error::{exit_code_for, usage_exit_code};
use csvedit::logging::{init_tracing, record_run};
use csvedit::pipeline::{self, SearchRequest};
use csvedit::stats::RunStats;

/// Count rows of a CSV file whose column contains a keyword.
///
/// The file must start with a header row; an empty file or an unknown
/// column is an error.
#[derive(Debug, Parser)]
#[command(name = "csvsearch", version, arg_required_else_help = true)]
struct SearchArgs {
    /// Path to the CSV file
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    file: PathBuf,
    /// Substring to search for
    #[arg(long, value_name = "KW", value_parser = NonEmptyStringValueParser::new())]
    keyword: String,
    /// Column to search, matched case-insensitively against the header
    #[arg(
        long,
        value_name = "NAME",
        default_value = "title",
        value_parser = NonEmptyStringValueParser::new()
    )]
    column: String,
    #[arg(long = "case-sensitive", action = ArgAction::SetTrue)]
    case_sensitive: bool,
    /// Only scan the first N data rows
    #[arg(long, value_name = "N")]
    limit: Option<u64>,
    /// Print matching rows as they are found
    #[arg(long, action = ArgAction::SetTrue)]
    print: bool,
    /// Print the summary as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Append a JSON line for the completed run to FILE
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    log: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match SearchArgs::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(usage_exit_code(&err));
        }
    };
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("search failed: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: &SearchArgs) -> Result<()> {
    let request = SearchRequest {
        path: &args.file,
        column: &args.column,
        keyword: &args.keyword,
        case_sensitive: args.case_sensitive,
        limit: args.limit,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let stats = pipeline::search(&request, |line| {
        if args.print {
            writeln!(out, "{line}")?;
        }
        Ok(())
    })
    .and_then(|outcome| outcome.require_rows(&args.file))
    .context("csvsearch")?;

    if args.json {
        let summary = json!({
            "file": args.file,
            "column": args.column,
            "keyword": args.keyword,
            "case_sensitive": args.case_sensitive,
            "limit": args.limit,
            "scanned": stats.scanned,
            "matches": stats.hits,
            "elapsed_ms": stats.elapsed_ms,
            "throughput": stats.throughput(),
        });
        writeln!(out, "{summary}")?;
    } else {
        print_summary(&mut out, args, &stats)?;
    }

    if let Some(log) = &args.log {
        record_run(log, "csvsearch", &args.file, stats)?;
    }
    Ok(())
}

fn print_summary<W: Write>(out: &mut W, args: &SearchArgs, stats: &RunStats) -> Result<()> {
    let case = if args.case_sensitive {
        "case-sensitive"
    } else {
        "case-insensitive"
    };
    writeln!(out, "== File Search Summary ==")?;
    writeln!(out, "  {:<15}: {}", "File", args.file.display())?;
    writeln!(out, "  {:<15}: {}", "Column", args.column)?;
    writeln!(out, "  {:<15}: {} ({case})", "Keyword", args.keyword)?;
    if let Some(limit) = args.limit {
        writeln!(out, "  {:<15}: {limit} data rows", "Limit")?;
    }
    writeln!(out, "  {:<15}: {}", "Scanned rows", stats.scanned)?;
    writeln!(out, "  {:<15}: {}", "Matches", stats.hits)?;
    writeln!(out, "  {:<15}: {} ms", "Elapsed", stats.elapsed_ms)?;
    if let Some(rate) = stats.throughput() {
        writeln!(out, "  {:<15}: {rate:.2} rows/sec", "Throughput")?;
    }
    Ok(())
}
