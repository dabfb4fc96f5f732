//! Backfill of `created_at` / `completed_at` from version-control history.
//!
//! # Responsibility
//! - Fill empty `created_at` cells from the commit that added the item file,
//!   falling back to fixed register epochs.
//! - Fill empty `completed_at` cells of completed items from commit subjects.
//!
//! # Invariants
//! - Non-empty date cells are never overwritten.
//! - Rows whose id does not start with `BACKLOG-` are dropped on rewrite.
//! - History lookup failures degrade to "no date found"; they never abort
//!   the backfill.

use crate::config::BacklogPaths;
use crate::model::item::id_number;
use crate::model::values::{is_unset, normalize};
use crate::store::{read_backlog_table, save_backlog_table, Record, StoreResult};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const ITEM_ID_PREFIX: &str = "BACKLOG-";
/// Register epoch for items carried over from the original index.
pub const ORIGINAL_BACKLOG_DATE: &str = "2025-12-15";
/// Register epoch for items created after the CSV conversion.
pub const CSV_CONVERSION_DATE: &str = "2026-01-17";
const LAST_ORIGINAL_ITEM: u64 = 71;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);
const GIT_POLL_INTERVAL: Duration = Duration::from_millis(20);
const ISO_DATE_LEN: usize = 10;

static COMPLETION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"complete|done|finish").expect("valid completion regex"));
static PR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)PR\s*#?(\d+)").expect("valid pull request regex"));

/// One commit as `(author date, subject)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub date: String,
    pub subject: String,
}

/// History lookup error.
#[derive(Debug)]
pub enum HistoryError {
    Spawn(std::io::Error),
    Io(std::io::Error),
    Timeout(Duration),
}

impl Display for HistoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to start git: {err}"),
            Self::Io(err) => write!(f, "failed to read git output: {err}"),
            Self::Timeout(limit) => write!(f, "git did not finish within {}s", limit.as_secs()),
        }
    }
}

impl Error for HistoryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) | Self::Io(err) => Some(err),
            Self::Timeout(_) => None,
        }
    }
}

/// Read-only view of repository history.
///
/// Paths are repository-relative and `/`-separated.
pub trait HistorySource {
    /// Author date of the commit that first added `path`.
    fn first_added(&self, path: &str) -> Result<Option<String>, HistoryError>;

    /// Commits (all refs) whose message matches every pattern, optionally
    /// limited to a pathspec.
    fn commits_matching(
        &self,
        patterns: &[&str],
        pathspec: Option<&str>,
    ) -> Result<Vec<Commit>, HistoryError>;
}

/// [`HistorySource`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitHistory {
    repo_root: PathBuf,
    timeout: Duration,
}

impl GitHistory {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            timeout: GIT_TIMEOUT,
        }
    }

    /// Runs git and returns trimmed stdout. Exit status is ignored: a failing
    /// query simply yields no output.
    fn run(&self, args: &[&str]) -> Result<String, HistoryError> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(HistoryError::Spawn)?;

        let mut stdout = child.stdout.take().ok_or_else(|| {
            HistoryError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "git stdout not captured",
            ))
        })?;
        let reader = thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });

        let deadline = Instant::now() + self.timeout;
        loop {
            if child.try_wait().map_err(HistoryError::Io)?.is_some() {
                break;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(HistoryError::Timeout(self.timeout));
            }
            thread::sleep(GIT_POLL_INTERVAL);
        }

        let output = reader
            .join()
            .map_err(|_| {
                HistoryError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "git output reader panicked",
                ))
            })?
            .map_err(HistoryError::Io)?;
        Ok(output.trim().to_string())
    }
}

impl HistorySource for GitHistory {
    fn first_added(&self, path: &str) -> Result<Option<String>, HistoryError> {
        let output = self.run(&[
            "log",
            "--follow",
            "--diff-filter=A",
            "--format=%aI",
            "-1",
            "--",
            path,
        ])?;
        Ok((!output.is_empty()).then(|| iso_date(&output)))
    }

    fn commits_matching(
        &self,
        patterns: &[&str],
        pathspec: Option<&str>,
    ) -> Result<Vec<Commit>, HistoryError> {
        let mut args = vec!["log", "--all", "--format=%aI|%s"];
        for pattern in patterns {
            args.push("--grep");
            args.push(*pattern);
        }
        if patterns.len() > 1 {
            args.push("--all-match");
        }
        if let Some(pathspec) = pathspec {
            args.push("--");
            args.push(pathspec);
        }

        let output = self.run(&args)?;
        Ok(output
            .lines()
            .filter_map(|line| line.split_once('|'))
            .map(|(date, subject)| Commit {
                date: iso_date(date),
                subject: subject.to_string(),
            })
            .collect())
    }
}

fn iso_date(timestamp: &str) -> String {
    timestamp.chars().take(ISO_DATE_LEN).collect()
}

/// Fallback `created_at` by item number.
pub fn fallback_created_date(item_id: &str) -> &'static str {
    match id_number(item_id) {
        Some(number) if (1..=LAST_ORIGINAL_ITEM).contains(&number) => ORIGINAL_BACKLOG_DATE,
        _ => CSV_CONVERSION_DATE,
    }
}

/// Which date cell a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateField {
    CreatedAt,
    CompletedAt,
}

/// How a filled date was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    ItemFile,
    Fallback,
    History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateChange {
    pub id: String,
    pub field: DateField,
    pub date: String,
    pub source: DateSource,
}

/// Backfills date cells in `backlog.csv` and rewrites it.
pub fn update_dates<H: HistorySource>(
    paths: &BacklogPaths,
    history: &H,
) -> StoreResult<Vec<DateChange>> {
    let mut table = read_backlog_table(paths)?;
    if table.has_column("variance") && table.has_column("file") {
        table.insert_column_after("variance", "created_at");
        table.insert_column_after("created_at", "completed_at");
    } else {
        table.ensure_column("created_at");
        table.ensure_column("completed_at");
    }

    let backfill = DateBackfill {
        history,
        backlog_prefix: paths.repo_relative_root(),
    };
    table
        .rows
        .retain(|row| cell(row, "id").starts_with(ITEM_ID_PREFIX));

    let mut changes = Vec::new();
    for row in &mut table.rows {
        changes.extend(backfill.fill_row(row));
    }

    save_backlog_table(paths, &table)?;
    info!(
        "event=update_dates module=service status=ok updated={}",
        changes.len()
    );
    Ok(changes)
}

fn cell<'a>(row: &'a Record, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or_default()
}

struct DateBackfill<'a, H> {
    history: &'a H,
    /// Repository-relative backlog root, empty for shallow layouts.
    backlog_prefix: String,
}

impl<H: HistorySource> DateBackfill<'_, H> {
    fn fill_row(&self, row: &mut Record) -> Vec<DateChange> {
        let id = cell(row, "id").to_string();
        let mut changes = Vec::new();

        if cell(row, "created_at").trim().is_empty() {
            let (date, source) = match self.item_file_date(&id) {
                Some(date) => (date, DateSource::ItemFile),
                None => (fallback_created_date(&id).to_string(), DateSource::Fallback),
            };
            row.insert("created_at".to_string(), date.clone());
            changes.push(DateChange {
                id: id.clone(),
                field: DateField::CreatedAt,
                date,
                source,
            });
        }

        let status = normalize(cell(row, "status"));
        if cell(row, "completed_at").trim().is_empty()
            && (status == "completed" || status == "done")
        {
            let sprint = cell(row, "sprint").to_string();
            let variance = cell(row, "variance").to_string();
            if let Some(date) = self.completion_date(&id, &sprint, &variance) {
                row.insert("completed_at".to_string(), date.clone());
                changes.push(DateChange {
                    id,
                    field: DateField::CompletedAt,
                    date,
                    source: DateSource::History,
                });
            }
        }
        changes
    }

    fn prefixed(&self, path: &str) -> String {
        if self.backlog_prefix.is_empty() {
            path.to_string()
        } else {
            format!("{}/{path}", self.backlog_prefix)
        }
    }

    /// Pathspec covering the backlog root's parent (the plans directory).
    fn plans_pathspec(&self) -> Option<String> {
        self.backlog_prefix
            .rsplit_once('/')
            .map(|(parent, _)| format!("{parent}/"))
    }

    fn item_file_date(&self, id: &str) -> Option<String> {
        [format!("items/{id}.md"), format!("{id}.md")]
            .iter()
            .find_map(|path| {
                self.lookup(self.history.first_added(&self.prefixed(path)))
                    .flatten()
            })
    }

    fn completion_date(&self, id: &str, sprint: &str, variance: &str) -> Option<String> {
        let backlog_spec = self.prefixed("");
        let backlog_spec = (!backlog_spec.is_empty()).then_some(backlog_spec);
        let id_lower = id.to_lowercase();
        let by_id = self
            .lookup(self.history.commits_matching(&[id], backlog_spec.as_deref()))
            .unwrap_or_default()
            .into_iter()
            .find(|commit| {
                let subject = commit.subject.to_lowercase();
                subject.contains(&id_lower) && COMPLETION_RE.is_match(&subject)
            });
        if let Some(commit) = by_id {
            return Some(commit.date);
        }

        if !is_unset(sprint) {
            let sprint_lower = sprint.to_lowercase();
            let plans_spec = self.plans_pathspec();
            let by_sprint = self
                .lookup(
                    self.history
                        .commits_matching(&[sprint, "complete"], plans_spec.as_deref()),
                )
                .unwrap_or_default()
                .into_iter()
                .find(|commit| commit.subject.to_lowercase().contains(&sprint_lower));
            if let Some(commit) = by_sprint {
                return Some(commit.date);
            }
        }

        let pr = PR_RE.captures(variance)?.get(1)?.as_str();
        let tag = format!("#{pr}");
        self.lookup(self.history.commits_matching(&[tag.as_str()], None))
            .unwrap_or_default()
            .into_iter()
            .find(|commit| commit.subject.contains(&tag))
            .map(|commit| commit.date)
    }

    fn lookup<T>(&self, result: Result<T, HistoryError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("event=history_lookup module=service status=error error={err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        fallback_created_date, update_dates, Commit, DateField, DateSource, HistoryError,
        HistorySource,
    };
    use crate::config::BacklogPaths;
    use crate::store::read_backlog_table;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeHistory {
        added: HashMap<String, String>,
        commits: Vec<Commit>,
    }

    impl HistorySource for FakeHistory {
        fn first_added(&self, path: &str) -> Result<Option<String>, HistoryError> {
            Ok(self.added.get(path).cloned())
        }

        fn commits_matching(
            &self,
            patterns: &[&str],
            _pathspec: Option<&str>,
        ) -> Result<Vec<Commit>, HistoryError> {
            Ok(self
                .commits
                .iter()
                .filter(|commit| patterns.iter().all(|p| commit.subject.contains(p)))
                .cloned()
                .collect())
        }
    }

    fn commit(date: &str, subject: &str) -> Commit {
        Commit {
            date: date.into(),
            subject: subject.into(),
        }
    }

    #[test]
    fn fallback_depends_on_item_number() {
        assert_eq!(fallback_created_date("BACKLOG-001"), "2025-12-15");
        assert_eq!(fallback_created_date("BACKLOG-071"), "2025-12-15");
        assert_eq!(fallback_created_date("BACKLOG-072"), "2026-01-17");
        assert_eq!(fallback_created_date("BACKLOG-abc"), "2026-01-17");
    }

    #[test]
    fn backfill_fills_empty_dates_and_drops_foreign_rows() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo/.claude/plans/backlog");
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::write(
            root.join("data/backlog.csv"),
            "id,title,status,sprint,variance,file\n\
             BACKLOG-010,a,Completed,-,,x\n\
             BACKLOG-080,b,Completed,SPRINT-004,,x\n\
             BACKLOG-090,c,Completed,-,PR #55,x\n\
             NOTE-1,d,Pending,-,,x\n",
        )
        .unwrap();

        let mut history = FakeHistory::default();
        history.added.insert(
            ".claude/plans/backlog/items/BACKLOG-010.md".into(),
            "2026-01-02".into(),
        );
        history.commits = vec![
            commit("2026-01-05", "BACKLOG-010 mark complete"),
            commit("2026-01-09", "SPRINT-004 complete"),
            commit("2026-01-11", "Merge pull request #55"),
        ];

        let paths = BacklogPaths::new(&root);
        let changes = update_dates(&paths, &history).unwrap();
        assert_eq!(changes.len(), 6);
        assert_eq!(changes[0].source, DateSource::ItemFile);
        assert_eq!(changes[1].field, DateField::CompletedAt);

        let table = read_backlog_table(&paths).unwrap();
        assert_eq!(
            table.headers,
            vec!["id", "title", "status", "sprint", "variance", "created_at", "completed_at", "file"]
        );
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0]["created_at"], "2026-01-02");
        assert_eq!(table.rows[0]["completed_at"], "2026-01-05");
        assert_eq!(table.rows[1]["created_at"], "2026-01-17");
        assert_eq!(table.rows[1]["completed_at"], "2026-01-09");
        assert_eq!(table.rows[2]["completed_at"], "2026-01-11");
    }
}
