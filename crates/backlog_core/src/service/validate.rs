//! Register integrity checks.
//!
//! # Responsibility
//! - Report schema and enum violations in backlog, sprint and changelog
//!   registers as human-readable issues.
//!
//! # Invariants
//! - Validation never mutates registers.
//! - Line numbers are 1-based file lines; the header is line 1.

use crate::config::BacklogPaths;
use crate::model::values::{is_unset, Area, ItemStatus, ItemType, Priority, SprintStatus};
use crate::store::{read_table, read_table_or_empty, Record, StoreError, StoreResult, Table};
use log::info;

const FIRST_DATA_LINE: usize = 2;
const EXPECTED_DATE_LEN: usize = 10;

/// Issues found in one register file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub file: &'static str,
    pub issues: Vec<String>,
}

/// Result of validating all registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub files: Vec<FileReport>,
}

impl ValidationReport {
    pub fn issue_count(&self) -> usize {
        self.files.iter().map(|file| file.issues.len()).sum()
    }

    pub fn passed(&self) -> bool {
        self.issue_count() == 0
    }

    pub fn issues(&self) -> impl Iterator<Item = &String> {
        self.files.iter().flat_map(|file| file.issues.iter())
    }
}

/// Validates every register under `paths`.
///
/// Missing required files become issues rather than errors; only unreadable
/// files fail the call.
pub fn validate_all(paths: &BacklogPaths) -> StoreResult<ValidationReport> {
    let files = vec![
        FileReport {
            file: "backlog.csv",
            issues: validate_backlog(paths)?,
        },
        FileReport {
            file: "sprints.csv",
            issues: validate_sprints(paths)?,
        },
        FileReport {
            file: "changelog.csv",
            issues: validate_changelog(paths)?,
        },
    ];
    let report = ValidationReport { files };
    info!(
        "event=validate module=service status=ok issues={}",
        report.issue_count()
    );
    Ok(report)
}

pub fn validate_backlog(paths: &BacklogPaths) -> StoreResult<Vec<String>> {
    let Some(table) = required_table(&paths.backlog_csv())? else {
        return Ok(vec![format!(
            "Missing file: {}",
            paths.backlog_csv().display()
        )]);
    };
    Ok(backlog_issues(&table))
}

/// Checks backlog rows already in memory.
pub fn backlog_issues(table: &Table) -> Vec<String> {
    let mut issues = Vec::new();

    for (index, row) in table.rows.iter().enumerate() {
        let line = index + FIRST_DATA_LINE;
        let id = cell(row, "id");
        let label = if id.is_empty() {
            format!("row-{line}")
        } else {
            id.to_string()
        };

        if id.is_empty() {
            issues.push(format!("Line {line}: Missing id"));
        }
        if cell(row, "title").is_empty() {
            issues.push(format!("{label}: Missing title"));
        }

        let checks: [(&str, fn(&str) -> bool); 4] = [
            ("type", |v| ItemType::parse(v).is_some()),
            ("area", |v| Area::parse(v).is_some()),
            ("priority", |v| Priority::parse(v).is_some()),
            ("status", |v| ItemStatus::parse(v).is_some()),
        ];
        for (field, is_valid) in checks {
            let value = cell(row, field);
            if !is_unset(value) && !is_valid(value) {
                issues.push(format!("{label}: Invalid {field} '{value}'"));
            }
        }
    }

    issues
}

pub fn validate_sprints(paths: &BacklogPaths) -> StoreResult<Vec<String>> {
    let Some(table) = required_table(&paths.sprints_csv())? else {
        return Ok(vec![format!(
            "Missing file: {}",
            paths.sprints_csv().display()
        )]);
    };

    let mut issues = Vec::new();
    for (index, row) in table.rows.iter().enumerate() {
        let line = index + FIRST_DATA_LINE;
        let sprint_id = row
            .get("sprint_id")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("row-{line}"));
        let status = cell(row, "status");
        if !status.is_empty() && SprintStatus::parse(status).is_none() {
            issues.push(format!("{sprint_id}: Invalid status '{status}'"));
        }
    }
    Ok(issues)
}

pub fn validate_changelog(paths: &BacklogPaths) -> StoreResult<Vec<String>> {
    let table = read_table_or_empty(&paths.changelog_csv())?;

    let mut issues = Vec::new();
    for (index, row) in table.rows.iter().enumerate() {
        let line = index + FIRST_DATA_LINE;
        let date = row.get("date").map(String::as_str).unwrap_or("");
        if !date.is_empty() && date.chars().count() != EXPECTED_DATE_LEN {
            issues.push(format!(
                "Changelog line {line}: Invalid date format '{date}' (expected YYYY-MM-DD)"
            ));
        }
    }
    Ok(issues)
}

fn cell<'a>(row: &'a Record, name: &str) -> &'a str {
    row.get(name).map(|value| value.trim()).unwrap_or("")
}

fn required_table(path: &std::path::Path) -> StoreResult<Option<Table>> {
    match read_table(path) {
        Ok(table) => Ok(Some(table)),
        Err(StoreError::MissingFile(_)) => Ok(None),
        Err(err) => Err(err),
    }
}
