use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::Level;

use crate::error::{IoContext, Result};
use crate::stats::RunStats;

const MAX_ENTRIES: usize = 500;

/// Installs the stderr diagnostics subscriber. Safe to call more than once.
pub fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Debug, Serialize)]
pub struct RunLogEntry<'a> {
    pub timestamp: &'a str,
    pub command: &'a str,
    pub path: &'a Path,
    #[serde(flatten)]
    pub stats: RunStats,
}

/// Appends one JSON line describing a finished run to `log_path`.
pub fn record_run(log_path: &Path, command: &str, path: &Path, stats: RunStats) -> Result<()> {
    if let Some(dir) = log_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).io_context(|| format!("creating {}", dir.display()))?;
    }
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".into());
    let entry = RunLogEntry {
        timestamp: &timestamp,
        command,
        path,
        stats,
    };
    let json = serde_json::to_string(&entry)
        .map_err(std::io::Error::from)
        .io_context(|| "serializing run log entry")?;
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_path)
        .io_context(|| format!("opening {}", log_path.display()))?;
    writeln!(file, "{json}").io_context(|| format!("writing {}", log_path.display()))?;
    drop(file);
    truncate_log(log_path)
}

fn truncate_log(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .io_context(|| format!("reading {}", path.display()))?;
    let reader = BufReader::new(file);
    let lines: Vec<_> = reader
        .lines()
        .collect::<Result<_, _>>()
        .io_context(|| format!("reading {}", path.display()))?;
    if lines.len() <= MAX_ENTRIES {
        return Ok(());
    }
    let keep = &lines[lines.len() - MAX_ENTRIES..];
    fs::write(path, keep.join("\n") + "\n").io_context(|| format!("rewriting {}", path.display()))
}
