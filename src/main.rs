use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde_json::json;

use csvedit::error::{exit_code_for, usage_exit_code};
use csvedit::finalize::DEFAULT_BACKUP_SUFFIX;
use csvedit::logging::{init_tracing, record_run};
use csvedit::pipeline::{
    self, OutputTarget, SearchOutcome, SearchRequest, UpdateReport, UpdateRequest,
};
use csvedit::rules::ReplaceOptions;
use csvedit::stats::RunStats;

const DEFAULT_PREVIEW_LINES: usize = 10;
const MOVIE_COLUMN: &str = "title";
const PERSON_COLUMN: &str = "person_name";

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(usage_exit_code(&err));
        }
    };
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let log = cli.log.as_deref();
    match cli.command {
        Command::Preview(cmd) => handle_preview(cmd)?,
        Command::SearchMovies(cmd) => handle_search_movies(cmd, log)?,
        Command::UpdatePersons(cmd) => handle_update_persons(cmd, log)?,
    }

    Ok(())
}

fn handle_preview(cmd: PreviewCommand) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(
        out,
        "== Preview: {} (first {} lines) ==",
        cmd.file.display(),
        cmd.lines
    )?;
    pipeline::preview(&cmd.file, cmd.lines, &mut out).context("preview")?;
    Ok(())
}

fn handle_search_movies(cmd: SearchMoviesCommand, log: Option<&Path>) -> Result<()> {
    let request = SearchRequest {
        path: &cmd.file,
        column: MOVIE_COLUMN,
        keyword: &cmd.keyword,
        case_sensitive: cmd.case_sensitive,
        limit: cmd.limit,
    };
    let outcome = pipeline::search(&request, |_| Ok(())).context("search-movies")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let SearchOutcome::Completed(stats) = outcome else {
        writeln!(out, "Empty file. Nothing to search.")?;
        return Ok(());
    };

    if cmd.json {
        let summary = json!({
            "command": "search-movies",
            "file": cmd.file,
            "column": MOVIE_COLUMN,
            "keyword": cmd.keyword,
            "case_sensitive": cmd.case_sensitive,
            "limit": cmd.limit,
            "scanned": stats.scanned,
            "matches": stats.hits,
            "elapsed_ms": stats.elapsed_ms,
            "throughput": stats.throughput(),
        });
        writeln!(out, "{summary}")?;
    } else {
        print_search_summary(&mut out, &cmd, &stats)?;
    }

    if let Some(log) = log {
        record_run(log, "search-movies", &cmd.file, stats)?;
    }
    Ok(())
}

fn handle_update_persons(cmd: UpdatePersonsCommand, log: Option<&Path>) -> Result<()> {
    let target = match (&cmd.output, cmd.in_place) {
        (_, true) => OutputTarget::InPlace {
            backup_suffix: cmd
                .backup
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKUP_SUFFIX.to_string()),
        },
        (Some(path), false) => OutputTarget::File(path.clone()),
        (None, false) => {
            return Err(csvedit::Error::invocation(
                "--output is required when not using --in-place",
            )
            .into());
        }
    };
    let request = UpdateRequest {
        input: cmd.input.clone(),
        target,
        column: PERSON_COLUMN.to_string(),
        replace: ReplaceOptions {
            from: cmd.from.clone(),
            to: cmd.to.clone(),
            case_insensitive: cmd.case_insensitive,
        },
        limit: cmd.limit,
    };
    let report = pipeline::update(&request).context("update-persons")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cmd.json {
        let summary = json!({
            "command": "update-persons",
            "input": cmd.input,
            "output": report.output,
            "backup": report.backup,
            "from": cmd.from,
            "to": cmd.to,
            "case_insensitive": cmd.case_insensitive,
            "limit": cmd.limit,
            "scanned": report.stats.scanned,
            "updated": report.stats.hits,
            "elapsed_ms": report.stats.elapsed_ms,
            "throughput": report.stats.throughput(),
        });
        writeln!(out, "{summary}")?;
    } else {
        print_update_summary(&mut out, &cmd, &report)?;
    }

    if let Some(log) = log {
        record_run(log, "update-persons", &cmd.input, report.stats)?;
    }
    Ok(())
}

fn print_search_summary<W: Write>(
    out: &mut W,
    cmd: &SearchMoviesCommand,
    stats: &RunStats,
) -> Result<()> {
    writeln!(out, "Search complete.")?;
    writeln!(out, "  File: {}", cmd.file.display())?;
    writeln!(
        out,
        "  Keyword: {} ({})",
        cmd.keyword,
        case_label(cmd.case_sensitive)
    )?;
    if let Some(limit) = cmd.limit {
        writeln!(out, "  Limit: {limit} lines (data rows excluding header)")?;
    }
    writeln!(out, "  Scanned rows: {}", stats.scanned)?;
    writeln!(out, "  Matches: {}", stats.hits)?;
    print_timing(out, stats)
}

fn print_update_summary<W: Write>(
    out: &mut W,
    cmd: &UpdatePersonsCommand,
    report: &UpdateReport,
) -> Result<()> {
    writeln!(out, "Update complete.")?;
    writeln!(out, "  Input: {}", cmd.input.display())?;
    match &report.backup {
        Some(backup) => writeln!(
            out,
            "  Output: {} (in-place with backup {})",
            report.output.display(),
            backup.display()
        )?,
        None => writeln!(out, "  Output: {}", report.output.display())?,
    }
    writeln!(
        out,
        "  Replacement: '{}' -> '{}' ({})",
        cmd.from,
        cmd.to,
        case_label(!cmd.case_insensitive)
    )?;
    if let Some(limit) = cmd.limit {
        writeln!(out, "  Limit: {limit} lines (data rows excluding header)")?;
    }
    writeln!(out, "  Scanned rows: {}", report.stats.scanned)?;
    writeln!(out, "  Updated rows: {}", report.stats.hits)?;
    print_timing(out, &report.stats)
}

fn print_timing<W: Write>(out: &mut W, stats: &RunStats) -> Result<()> {
    writeln!(out, "  Elapsed: {} ms", stats.elapsed_ms)?;
    if let Some(rate) = stats.throughput() {
        writeln!(out, "  Throughput: {rate:.2} rows/sec")?;
    }
    Ok(())
}

fn case_label(case_sensitive: bool) -> &'static str {
    if case_sensitive {
        "case-sensitive"
    } else {
        "case-insensitive"
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "csvedit",
    version,
    about = "Preview, search and update CSV files",
    arg_required_else_help = true
)]
struct Cli {
    /// Increase diagnostic output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Append a JSON line per completed run to FILE
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, global = true)]
    log: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the first lines of a file verbatim
    Preview(PreviewCommand),
    /// Count rows whose `title` column contains a keyword
    SearchMovies(SearchMoviesCommand),
    /// Find and replace text in the `person_name` column
    UpdatePersons(UpdatePersonsCommand),
}

#[derive(Debug, Args)]
struct PreviewCommand {
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    file: PathBuf,
    #[arg(long, value_name = "N", default_value_t = DEFAULT_PREVIEW_LINES)]
    lines: usize,
}

#[derive(Debug, Args)]
struct SearchMoviesCommand {
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    file: PathBuf,
    #[arg(long, value_name = "KW", value_parser = NonEmptyStringValueParser::new())]
    keyword: String,
    #[arg(long = "case-sensitive", action = ArgAction::SetTrue)]
    case_sensitive: bool,
    /// Only scan the first N data rows
    #[arg(long, value_name = "N")]
    limit: Option<u64>,
    /// Print the summary as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Args)]
struct UpdatePersonsCommand {
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    input: PathBuf,
    #[arg(
        long,
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        conflicts_with = "in_place",
        required_unless_present = "in_place"
    )]
    output: Option<PathBuf>,
    /// Replace the input file, keeping the previous content as a backup
    #[arg(long = "in-place", action = ArgAction::SetTrue)]
    in_place: bool,
    /// Suffix appended to the input path for the backup (default .bak)
    #[arg(
        long,
        value_name = "SUFFIX",
        requires = "in_place",
        value_parser = NonEmptyStringValueParser::new()
    )]
    backup: Option<String>,
    #[arg(long, value_name = "TEXT", value_parser = NonEmptyStringValueParser::new())]
    from: String,
    #[arg(long, value_name = "TEXT", value_parser = NonEmptyStringValueParser::new())]
    to: String,
    #[arg(long = "case-insensitive", action = ArgAction::SetTrue)]
    case_insensitive: bool,
    /// Only rewrite the first N data rows; later rows are not written
    #[arg(long, value_name = "N")]
    limit: Option<u64>,
    /// Print the summary as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}
