//! Streaming row pipeline shared by preview, search and update.
//!
//! Files are read one line at a time and nothing outlives the iteration that
//! decoded it. The first line of a file is its header; every later line is a
//! data row.

use std::borrow::Cow;
use std::io::{self, BufRead, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::codec;
use crate::columns::{self, ColumnIndex};
use crate::error::{Error, IoContext, Result};
use crate::files::{check_output, open_input};
use crate::finalize::{promote, replace_with_backup, stage_beside};
use crate::rules::{MatchRule, ReplaceOptions, ReplaceRule};
use crate::stats::RunStats;

const WRITE_BUFFER_BYTES: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub path: &'a Path,
    pub column: &'a str,
    pub keyword: &'a str,
    pub case_sensitive: bool,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The file has no header line.
    EmptyFile,
    Completed(RunStats),
}

impl SearchOutcome {
    /// The stats of a completed search; an empty file is an input error.
    pub fn require_rows(self, path: &Path) -> Result<RunStats> {
        match self {
            SearchOutcome::Completed(stats) => Ok(stats),
            SearchOutcome::EmptyFile => {
                Err(Error::input(format!("empty file: {}", path.display())))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    File(PathBuf),
    InPlace { backup_suffix: String },
}

#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub input: PathBuf,
    pub target: OutputTarget,
    pub column: String,
    pub replace: ReplaceOptions,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub stats: RunStats,
    pub output: PathBuf,
    pub backup: Option<PathBuf>,
}

/// Copies up to `max_lines` raw lines of `path` to `out`.
pub fn preview<W: Write>(path: &Path, max_lines: usize, out: &mut W) -> Result<usize> {
    let reader = open_input(path)?;
    let mut shown = 0;
    for line in reader.lines().take(max_lines) {
        let line = line.io_context(|| format!("reading {}", path.display()))?;
        writeln!(out, "{line}").io_context(|| "writing preview")?;
        shown += 1;
    }
    Ok(shown)
}

/// Counts data rows whose target column contains the keyword.
///
/// `on_match` receives the raw text of every matching line.
pub fn search<F>(request: &SearchRequest<'_>, mut on_match: F) -> Result<SearchOutcome>
where
    F: FnMut(&str) -> io::Result<()>,
{
    let started = Instant::now();
    let path = request.path;
    let mut lines = open_input(path)?.lines();

    let Some(header) = next_line(&mut lines, path)? else {
        debug!(input = %path.display(), "input has no header");
        return Ok(SearchOutcome::EmptyFile);
    };
    let column = require_column(&header, request.column)?;
    debug!(column = request.column, index = column.get(), "search column resolved");

    let rule = MatchRule::new(request.keyword, request.case_sensitive);
    let stats = fold_rows(lines, path, request.limit, |line| {
        let row = codec::decode(line);
        let hit = column.field(&row).is_some_and(|text| rule.is_match(text));
        if hit {
            on_match(line).io_context(|| "printing matching row")?;
        }
        Ok(hit)
    })?;

    let stats = stats.finish(started);
    info!(scanned = stats.scanned, matches = stats.hits, "search finished");
    Ok(SearchOutcome::Completed(stats))
}

/// Rewrites the target column of every data row.
///
/// Output is staged beside its destination and only promoted once every row
/// has been written; on any failure the staged file is discarded and the
/// destination is left as it was.
pub fn update(request: &UpdateRequest) -> Result<UpdateReport> {
    let started = Instant::now();
    let rule = ReplaceRule::new(&request.replace)?;
    let destination = match &request.target {
        OutputTarget::File(path) => {
            check_output(path)?;
            path.clone()
        }
        OutputTarget::InPlace { backup_suffix } => {
            if backup_suffix.is_empty() {
                return Err(Error::invocation("--backup suffix must not be empty"));
            }
            request.input.clone()
        }
    };

    let reader = open_input(&request.input)?;
    let mut staged = stage_beside(&destination)?;
    debug!(staged = %staged.path().display(), "writing staged output");

    let stats = {
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, staged.as_file_mut());
        let stats = rewrite_rows(reader, &mut writer, request, &rule)?;
        writer
            .flush()
            .io_context(|| format!("writing {}", destination.display()))?;
        stats
    };
    staged
        .as_file()
        .sync_all()
        .io_context(|| format!("syncing staged output for {}", destination.display()))?;

    let backup = match &request.target {
        OutputTarget::File(path) => {
            promote(staged, path)?;
            None
        }
        OutputTarget::InPlace { backup_suffix } => {
            Some(replace_with_backup(staged, &request.input, backup_suffix)?)
        }
    };

    let stats = stats.finish(started);
    info!(scanned = stats.scanned, updated = stats.hits, "update finished");
    Ok(UpdateReport {
        stats,
        output: destination,
        backup,
    })
}

fn rewrite_rows<R, W>(
    reader: R,
    out: &mut W,
    request: &UpdateRequest,
    rule: &ReplaceRule,
) -> Result<RunStats>
where
    R: BufRead,
    W: Write,
{
    let path = request.input.as_path();
    let mut lines = reader.lines();
    let Some(header) = next_line(&mut lines, path)? else {
        debug!(input = %path.display(), "input has no header; output is empty");
        return Ok(RunStats::default());
    };
    let column = require_column(&header, &request.column)?;
    writeln!(out, "{header}").io_context(|| "writing header")?;

    fold_rows(lines, path, request.limit, |line| {
        let mut row = codec::decode(line);
        let replaced = column.field(&row).and_then(|text| match rule.apply(text) {
            Cow::Owned(new) if new != text => Some(new),
            _ => None,
        });
        let updated = replaced.is_some();
        if let Some(new) = replaced {
            row[column.get()] = new;
        }
        writeln!(out, "{}", codec::encode(&row)).io_context(|| "writing row")?;
        Ok(updated)
    })
}

fn next_line<R: BufRead>(lines: &mut Lines<R>, path: &Path) -> Result<Option<String>> {
    lines
        .next()
        .transpose()
        .io_context(|| format!("reading {}", path.display()))
}

fn require_column(header: &str, name: &str) -> Result<ColumnIndex> {
    columns::resolve(&codec::decode(header), name).ok_or_else(|| {
        Error::input(format!("cannot find '{name}' column in header: {header}"))
    })
}

/// Feeds data rows to `on_row` until EOF or `limit` rows, counting the rows
/// for which it returns `true`.
fn fold_rows<R, F>(
    lines: Lines<R>,
    path: &Path,
    limit: Option<u64>,
    mut on_row: F,
) -> Result<RunStats>
where
    R: BufRead,
    F: FnMut(&str) -> Result<bool>,
{
    let cap = limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
    lines.take(cap).try_fold(RunStats::default(), |stats, line| {
        let line = line.io_context(|| format!("reading {}", path.display()))?;
        Ok(stats.record(on_row(&line)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MOVIES: &str = "movie_id,title,year\n\
        tt1,Star Wars,1977\n\
        tt2,STARSHIP TROOPERS,1997\n\
        tt3,\"Lock, Stock and Two Smoking Barrels\",1998\n\
        tt4\n\
        tt5,Lone Star,1996\n";

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).expect("write fixture");
        path
    }

    fn search_request<'a>(path: &'a Path, keyword: &'a str) -> SearchRequest<'a> {
        SearchRequest {
            path,
            column: "title",
            keyword,
            case_sensitive: false,
            limit: None,
        }
    }

    fn completed(outcome: SearchOutcome) -> RunStats {
        match outcome {
            SearchOutcome::Completed(stats) => stats,
            SearchOutcome::EmptyFile => panic!("expected a completed search"),
        }
    }

    fn update_request(input: &Path, target: OutputTarget, from: &str, to: &str) -> UpdateRequest {
        UpdateRequest {
            input: input.to_path_buf(),
            target,
            column: "person_name".into(),
            replace: ReplaceOptions {
                from: from.into(),
                to: to.into(),
                case_insensitive: false,
            },
            limit: None,
        }
    }

    #[test]
    fn preview_stops_at_limit_or_eof() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);

        let mut out = Vec::new();
        assert_eq!(preview(&path, 2, &mut out).expect("preview"), 2);
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "movie_id,title,year\ntt1,Star Wars,1977\n"
        );

        let mut out = Vec::new();
        assert_eq!(preview(&path, 100, &mut out).expect("preview"), 6);
        assert_eq!(String::from_utf8(out).expect("utf8"), MOVIES);
    }

    #[test]
    fn search_ignores_case_by_default() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);

        let stats = completed(search(&search_request(&path, "Star"), |_| Ok(())).expect("search"));
        assert_eq!(stats.scanned, 5);
        assert_eq!(stats.hits, 3);
    }

    #[test]
    fn search_case_sensitive_skips_uppercase() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);
        let request = SearchRequest {
            case_sensitive: true,
            ..search_request(&path, "Star")
        };

        let mut printed = Vec::new();
        let stats = completed(
            search(&request, |line| {
                printed.push(line.to_string());
                Ok(())
            })
            .expect("search"),
        );
        assert_eq!(stats.hits, 2);
        assert_eq!(printed, ["tt1,Star Wars,1977", "tt5,Lone Star,1996"]);
    }

    #[test]
    fn search_is_repeatable() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);
        let request = search_request(&path, "o");

        let first = completed(search(&request, |_| Ok(())).expect("first"));
        let second = completed(search(&request, |_| Ok(())).expect("second"));
        assert_eq!((first.scanned, first.hits), (second.scanned, second.hits));
    }

    #[test]
    fn search_limit_bounds_scanned_rows() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);

        for (limit, expected) in [(0, 0), (2, 2), (5, 5), (50, 5)] {
            let request = SearchRequest {
                limit: Some(limit),
                ..search_request(&path, "star")
            };
            let stats = completed(search(&request, |_| Ok(())).expect("search"));
            assert_eq!(stats.scanned, expected, "limit {limit}");
        }
    }

    #[test]
    fn short_rows_and_quoted_commas() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);

        let request = search_request(&path, "lock, stock");
        let stats = completed(search(&request, |_| Ok(())).expect("search"));
        assert_eq!(stats.hits, 1);

        let stats = completed(search(&search_request(&path, ""), |_| Ok(())).expect("search"));
        assert_eq!(stats.hits, 4, "short row tt4 never matches");
    }

    #[test]
    fn empty_file_is_reported_and_can_be_required() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "empty.csv", "");

        let outcome = search(&search_request(&path, "x"), |_| Ok(())).expect("search");
        assert_eq!(outcome, SearchOutcome::EmptyFile);

        let err = outcome.require_rows(&path).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(err.to_string().starts_with("empty file: "));
    }

    #[test]
    fn required_rows_of_a_completed_search() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);

        let outcome = search(&search_request(&path, "star"), |_| Ok(())).expect("search");
        let stats = outcome.require_rows(&path).expect("rows");
        assert_eq!((stats.scanned, stats.hits), (5, 3));
    }

    #[test]
    fn missing_search_column_is_input_error() {
        let temp = tempdir().expect("temp dir");
        let path = write_file(temp.path(), "movies.csv", MOVIES);
        let request = SearchRequest {
            column: "director",
            ..search_request(&path, "x")
        };

        let err = search(&request, |_| Ok(())).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
        assert!(err.to_string().contains("'director'"));
    }

    #[test]
    fn update_rewrites_target_column_to_new_file() {
        let temp = tempdir().expect("temp dir");
        let input = write_file(temp.path(), "persons.csv", "person_name,id\nTom,1\nAnton,2\n");
        let output = temp.path().join("out.csv");

        let report = update(&update_request(
            &input,
            OutputTarget::File(output.clone()),
            "To",
            "TTOO",
        ))
        .expect("update");

        assert_eq!(report.stats.scanned, 2);
        assert_eq!(report.stats.hits, 1);
        assert_eq!(report.output, output);
        assert_eq!(report.backup, None);
        assert_eq!(
            fs::read_to_string(&output).expect("read output"),
            "person_name,id\nTTOOm,1\nAnton,2\n"
        );
        assert_eq!(
            fs::read_to_string(&input).expect("read input"),
            "person_name,id\nTom,1\nAnton,2\n"
        );
    }

    #[test]
    fn update_keeps_every_row_in_order() {
        let temp = tempdir().expect("temp dir");
        let input = write_file(
            temp.path(),
            "persons.csv",
            "id,Person_Name,note\n1,\"Smith, Tom\",a\n2\n3,Tomas,\"say \"\"hi\"\"\"\n4,Ann,\n",
        );
        let output = temp.path().join("out.csv");
        let mut request = update_request(&input, OutputTarget::File(output.clone()), "tom", "T,M");
        request.replace.case_insensitive = true;

        let report = update(&request).expect("update");

        assert_eq!(report.stats.scanned, 4);
        assert_eq!(report.stats.hits, 2);
        assert_eq!(
            fs::read_to_string(&output).expect("read output"),
            "id,Person_Name,note\n1,\"Smith, T,M\",a\n2\n3,\"T,Mas\",\"say \"\"hi\"\"\"\n4,Ann,\n"
        );
    }

    #[test]
    fn update_limit_truncates_output() {
        let temp = tempdir().expect("temp dir");
        let input = write_file(temp.path(), "persons.csv", "person_name\nTom\nTim\nTam\n");
        let output = temp.path().join("out.csv");
        let mut request = update_request(&input, OutputTarget::File(output.clone()), "T", "t");
        request.limit = Some(2);

        let report = update(&request).expect("update");

        assert_eq!(report.stats.scanned, 2);
        assert_eq!(fs::read_to_string(&output).expect("read"), "person_name\ntom\ntim\n");
    }

    #[cfg(unix)]
    #[test]
    fn update_keeps_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let mode = |path: &Path| {
            fs::metadata(path).expect("metadata").permissions().mode() & 0o777
        };
        let temp = tempdir().expect("temp dir");
        let input = write_file(temp.path(), "persons.csv", "person_name\nTom\n");
        fs::set_permissions(&input, fs::Permissions::from_mode(0o644)).expect("chmod");

        let in_place = OutputTarget::InPlace {
            backup_suffix: ".bak".into(),
        };
        update(&update_request(&input, in_place, "To", "TTOO")).expect("in place");
        assert_eq!(mode(&input), 0o644);

        let existing = write_file(temp.path(), "existing.csv", "old\n");
        fs::set_permissions(&existing, fs::Permissions::from_mode(0o640)).expect("chmod");
        let target = OutputTarget::File(existing.clone());
        update(&update_request(&input, target, "a", "b")).expect("existing output");
        assert_eq!(mode(&existing), 0o640);

        let fresh = temp.path().join("fresh.csv");
        let reference = write_file(temp.path(), "reference.csv", "");
        let target = OutputTarget::File(fresh.clone());
        update(&update_request(&input, target, "a", "b")).expect("new output");
        assert_eq!(mode(&fresh), mode(&reference));
    }

    #[test]
    fn update_in_place_keeps_backup() {
        let temp = tempdir().expect("temp dir");
        let original = "person_name,id\nTom,1\nAnton,2\n";
        let input = write_file(temp.path(), "persons.csv", original);
        let request = update_request(
            &input,
            OutputTarget::InPlace {
                backup_suffix: ".orig".into(),
            },
            "To",
            "TTOO",
        );

        let report = update(&request).expect("update");

        let backup = temp.path().join("persons.csv.orig");
        assert_eq!(report.backup.as_deref(), Some(backup.as_path()));
        assert_eq!(report.output, input);
        assert_eq!(fs::read_to_string(&backup).expect("read backup"), original);
        assert_eq!(
            fs::read_to_string(&input).expect("read input"),
            "person_name,id\nTTOOm,1\nAnton,2\n"
        );
        assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 2);
    }

    #[test]
    fn missing_update_column_leaves_no_files() {
        let temp = tempdir().expect("temp dir");
        let input = write_file(temp.path(), "persons.csv", "name,id\nTom,1\n");
        let request = update_request(
            &input,
            OutputTarget::InPlace {
                backup_suffix: ".bak".into(),
            },
            "To",
            "TTOO",
        );

        let err = update(&request).unwrap_err();

        assert!(matches!(err, Error::Input(_)));
        assert_eq!(fs::read_to_string(&input).expect("read"), "name,id\nTom,1\n");
        assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 1);
    }

    #[test]
    fn headerless_update_writes_empty_output() {
        let temp = tempdir().expect("temp dir");
        let input = write_file(temp.path(), "empty.csv", "");
        let output = temp.path().join("out.csv");

        let report = update(&update_request(&input, OutputTarget::File(output.clone()), "a", "b"))
            .expect("update");

        assert_eq!(report.stats.scanned, 0);
        assert_eq!(fs::read_to_string(&output).expect("read"), "");
    }

    #[test]
    fn update_into_directory_is_rejected() {
        let temp = tempdir().expect("temp dir");
        let input = write_file(temp.path(), "persons.csv", "person_name\nTom\n");
        let target = OutputTarget::File(temp.path().to_path_buf());
        let request = update_request(&input, target, "a", "b");

        let err = update(&request).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn invalid_utf8_aborts_and_discards_output() {
        let temp = tempdir().expect("temp dir");
        let input = temp.path().join("persons.csv");
        fs::write(&input, b"person_name\nTom\n\xff\xfe\n").expect("write fixture");
        let output = temp.path().join("out.csv");

        let err = update(&update_request(&input, OutputTarget::File(output.clone()), "T", "t"))
            .unwrap_err();

        assert!(matches!(err, Error::Io { .. }));
        assert!(!output.exists());
        assert_eq!(fs::read_dir(temp.path()).expect("read dir").count(), 1);
    }
}
