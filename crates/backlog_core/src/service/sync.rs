//! Markdown item files <-> `backlog.csv` reconciliation.
//!
//! # Responsibility
//! - Detect item files that have no CSV row and CSV rows with no file.
//! - Flag CSV statuses outside the canonical sync vocabulary.
//! - Append rows for missing items from their markdown metadata.
//!
//! # Invariants
//! - Status checks here are exact and case-sensitive.
//! - Fixing keeps the existing header order; canonical columns that are
//!   missing are appended.
//! - Orphaned CSV rows are reported, never removed.

use crate::config::BacklogPaths;
use crate::model::item::id_number;
use crate::model::values::UNSET;
use crate::store::{
    list_item_files, read_markdown, read_table_or_empty, write_table, Record, StoreError,
    StoreResult,
};
use chrono::NaiveDate;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

/// Status values the sync check accepts verbatim.
pub const SYNC_STATUSES: &[&str] = &[
    "Pending",
    "In Progress",
    "Implemented",
    "Testing",
    "Completed",
    "Blocked",
    "Deferred",
    "Obsolete",
];

const SYNC_PRIORITIES: &[&str] = &["Critical", "High", "Medium", "Low"];

/// Columns written for rows created from markdown.
pub const SYNC_COLUMNS: &[&str] = &[
    "id",
    "title",
    "category",
    "priority",
    "status",
    "sprint",
    "est_tokens",
    "actual_tokens",
    "variance",
    "created_at",
    "completed_at",
    "file",
];

static ID_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^#\s+BACKLOG-\d+[:\s]+(.+)$").expect("valid id title regex")
});
static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("valid heading regex"));
static ID_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^BACKLOG-\d+[:\s]*").expect("valid id prefix regex"));
static PRIORITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*Priority\*\*[:\s]+(\w+)").expect("valid priority regex"));
static CATEGORY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\*Category\*\*[:\s]+(.+?)(?:\n|\*\*)").expect("valid category regex")
});
static STATUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\*\*Status\*\*[:\s]+([A-Za-z][A-Za-z ]*?)\s*(?:$|[^A-Za-z ])")
        .expect("valid status regex")
});
static SPRINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\*Sprint\*\*[:\s]+(SPRINT-\d+|-)").expect("valid sprint regex")
});
static ESTIMATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\*Estimate\*\*[:\s]+(.+?)(?:\n|\*\*)").expect("valid estimate regex")
});

/// Outcome of comparing item files with the CSV register.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub csv_count: usize,
    pub md_count: usize,
    pub missing_from_csv: Vec<String>,
    pub orphaned_in_csv: Vec<String>,
    pub invalid_statuses: Vec<(String, String)>,
    pub in_sync: bool,
}

/// Reads CSV metadata fields from one markdown item file.
///
/// Unrecognized priority or status values fall back to the defaults.
pub fn extract_metadata(path: &Path, today: NaiveDate) -> StoreResult<Record> {
    let content =
        read_markdown(path)?.ok_or_else(|| StoreError::MissingFile(path.to_path_buf()))?;
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let priority = capture(&PRIORITY_RE, &content)
        .filter(|priority| SYNC_PRIORITIES.contains(&priority.as_str()))
        .unwrap_or_else(|| "Medium".to_string());
    let status = capture(&STATUS_RE, &content)
        .filter(|status| SYNC_STATUSES.contains(&status.as_str()))
        .unwrap_or_else(|| "Pending".to_string());
    let sprint = capture(&SPRINT_RE, &content).unwrap_or_else(|| UNSET.to_string());
    let estimate = capture(&ESTIMATE_RE, &content).unwrap_or_else(|| UNSET.to_string());

    let record = [
        ("id", stem),
        ("title", extract_title(&content)),
        ("category", extract_category(&content)),
        ("priority", priority),
        ("status", status),
        ("sprint", sprint),
        ("est_tokens", estimate),
        ("actual_tokens", UNSET.to_string()),
        ("variance", UNSET.to_string()),
        ("created_at", today.format("%Y-%m-%d").to_string()),
        ("completed_at", String::new()),
        ("file", format!("[{name}](items/{name})")),
    ]
    .into_iter()
    .map(|(column, value)| (column.to_string(), value))
    .collect::<Record>();
    Ok(record)
}

fn capture(re: &Regex, content: &str) -> Option<String> {
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().trim().to_string())
}

fn extract_title(content: &str) -> String {
    if let Some(title) = capture(&ID_TITLE_RE, content) {
        return title;
    }
    capture(&HEADING_RE, content)
        .map(|heading| ID_PREFIX_RE.replace(&heading, "").trim().to_string())
        .unwrap_or_default()
}

fn extract_category(content: &str) -> String {
    capture(&CATEGORY_RE, content)
        .map(|raw| {
            let lowered = raw.to_lowercase();
            lowered.split('/').next().unwrap_or_default().trim().to_string()
        })
        .unwrap_or_else(|| "feature".to_string())
}

fn file_stems(files: &[std::path::PathBuf]) -> BTreeSet<String> {
    files
        .iter()
        .filter_map(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .collect()
}

/// Compares `items/*.md` with `backlog.csv`. A missing CSV counts as empty.
pub fn check_sync(paths: &BacklogPaths) -> StoreResult<SyncReport> {
    let table = read_table_or_empty(&paths.backlog_csv())?;
    let md_ids = file_stems(&list_item_files(paths)?);
    let csv_ids = table
        .rows
        .iter()
        .filter_map(|row| row.get("id"))
        .cloned()
        .collect::<BTreeSet<_>>();

    let missing_from_csv = md_ids.difference(&csv_ids).cloned().collect::<Vec<_>>();
    let orphaned_in_csv = csv_ids.difference(&md_ids).cloned().collect::<Vec<_>>();
    let invalid_statuses = table
        .rows
        .iter()
        .filter_map(|row| {
            let status = row.get("status").map(String::as_str).unwrap_or_default();
            (!status.is_empty() && !SYNC_STATUSES.contains(&status)).then(|| {
                (
                    row.get("id").cloned().unwrap_or_default(),
                    status.to_string(),
                )
            })
        })
        .collect::<Vec<_>>();

    for id in &orphaned_in_csv {
        warn!("event=sync_orphan module=service status=warn id={id}");
    }

    let report = SyncReport {
        csv_count: csv_ids.len(),
        md_count: md_ids.len(),
        in_sync: missing_from_csv.is_empty() && invalid_statuses.is_empty(),
        missing_from_csv,
        orphaned_in_csv,
        invalid_statuses,
    };
    info!(
        "event=sync_check module=service status=ok in_sync={} missing={} orphaned={}",
        report.in_sync,
        report.missing_from_csv.len(),
        report.orphaned_in_csv.len()
    );
    Ok(report)
}

/// Appends rows for `missing_ids` and rewrites the CSV ordered by id number.
///
/// Returns the number of rows added. Ids whose file vanished are skipped.
pub fn fix_missing(
    paths: &BacklogPaths,
    missing_ids: &[String],
    today: NaiveDate,
) -> StoreResult<usize> {
    if missing_ids.is_empty() {
        return Ok(0);
    }

    let mut table = read_table_or_empty(&paths.backlog_csv())?;
    for column in SYNC_COLUMNS {
        table.ensure_column(column);
    }

    let mut added = 0;
    for id in missing_ids {
        let path = paths.item_file(id);
        if !path.exists() {
            warn!("event=sync_fix module=service status=skip id={id} reason=file_missing");
            continue;
        }
        table.rows.push(extract_metadata(&path, today)?);
        added += 1;
    }

    table.rows.sort_by_key(|row| {
        row.get("id")
            .and_then(|id| id_number(id))
            .unwrap_or(u64::MAX)
    });
    write_table(&paths.backlog_csv(), &table)?;
    info!("event=sync_fix module=service status=ok added={added}");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::{extract_metadata, extract_title};
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 3).unwrap()
    }

    #[test]
    fn title_prefers_id_heading_then_strips_prefix() {
        assert_eq!(extract_title("# BACKLOG-012: Fix login\n"), "Fix login");
        assert_eq!(extract_title("intro\n# Plain heading\n"), "Plain heading");
        assert_eq!(extract_title("no heading"), "");
    }

    #[test]
    fn metadata_applies_defaults_and_filters_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BACKLOG-042.md");
        std::fs::write(
            &path,
            "# BACKLOG-042: Offline mode\n\n\
             **Priority**: Urgent\n\
             **Category**: Feature / Sync\n\
             **Status**: In Progress\n\
             **Sprint**: SPRINT-007\n\
             **Estimate**: ~40K\n",
        )
        .unwrap();

        let record = extract_metadata(&path, today()).unwrap();
        assert_eq!(record["id"], "BACKLOG-042");
        assert_eq!(record["title"], "Offline mode");
        assert_eq!(record["priority"], "Medium");
        assert_eq!(record["category"], "feature");
        assert_eq!(record["status"], "In Progress");
        assert_eq!(record["sprint"], "SPRINT-007");
        assert_eq!(record["est_tokens"], "~40K");
        assert_eq!(record["created_at"], "2026-02-03");
        assert_eq!(record["file"], "[BACKLOG-042.md](items/BACKLOG-042.md)");
    }

    #[test]
    fn metadata_rejects_unknown_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("BACKLOG-001.md");
        std::fs::write(&path, "# Title\n**Status**: Someday\n").unwrap();

        let record = extract_metadata(&path, today()).unwrap();
        assert_eq!(record["status"], "Pending");
        assert_eq!(record["sprint"], "-");
        assert_eq!(record["category"], "feature");
    }
}
