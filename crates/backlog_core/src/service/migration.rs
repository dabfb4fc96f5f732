//! Category -> type + area migration.
//!
//! # Responsibility
//! - Propose a `type` and `area` for every backlog row from its legacy
//!   `category` and title, with a confidence grade for human review.
//! - Apply a reviewed proposal table back onto `backlog.csv`.
//!
//! # Invariants
//! - Proposals never touch the backlog; only `apply_review` writes.
//! - Rows whose reviewed values are invalid keep their previous type/area.
//! - After apply, the header has `type` and `area` and no `category`.

use crate::config::BacklogPaths;
use crate::model::values::{Area, ItemType};
use crate::store::{
    read_backlog_table, read_table, save_backlog_table, write_table, Record, StoreError, Table,
};
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Review table columns in file order.
pub const REVIEW_COLUMNS: &[&str] = &[
    "id",
    "title",
    "status",
    "old_category",
    "proposed_type",
    "proposed_area",
    "confidence",
    "final_type",
    "final_area",
    "notes",
];

/// Default review file name, relative to the working directory.
pub const DEFAULT_REVIEW_FILE: &str = "category-migration-review.csv";

const CATEGORY_TO_TYPE: &[(&str, ItemType)] = &[
    ("bug", ItemType::Bug),
    ("bugfix", ItemType::Bug),
    ("bug fix", ItemType::Bug),
    ("fix", ItemType::Bug),
    ("ux-bug", ItemType::Bug),
    ("feature", ItemType::Feature),
    ("enhancement", ItemType::Feature),
    ("refactor", ItemType::Refactor),
    ("refactoring", ItemType::Refactor),
    ("tech-debt", ItemType::Refactor),
    ("technical debt", ItemType::Refactor),
    ("cleanup", ItemType::Chore),
    ("config", ItemType::Chore),
    ("test", ItemType::Test),
    ("testing", ItemType::Test),
    ("qa", ItemType::Test),
    ("docs", ItemType::Docs),
    ("infra", ItemType::Chore),
    ("infrastructure", ItemType::Chore),
    ("security", ItemType::Bug),
    ("schema", ItemType::Chore),
    ("service", ItemType::Feature),
    ("ui", ItemType::Feature),
    ("ux", ItemType::Feature),
    ("ux redesign", ItemType::Feature),
    ("performance", ItemType::Refactor),
    ("optimization", ItemType::Refactor),
    ("architecture", ItemType::Refactor),
    ("auth", ItemType::Feature),
    ("data", ItemType::Chore),
    ("data integrity", ItemType::Bug),
    ("type-safety", ItemType::Refactor),
];

const CATEGORY_TO_AREA: &[(&str, Area)] = &[
    ("ui", Area::Ui),
    ("ux", Area::Ui),
    ("ux redesign", Area::Ui),
    ("ux-bug", Area::Ui),
    ("infra", Area::Infra),
    ("infrastructure", Area::Infra),
    ("config", Area::Infra),
    ("security", Area::Security),
    ("schema", Area::Schema),
    ("ipc", Area::Ipc),
    ("auth", Area::Service),
];

/// Title keywords, checked in order, that suggest a type.
const TITLE_TYPE_KEYWORDS: &[(&[&str], ItemType)] = &[
    (&["fix", "bug", "broken", "crash", "error", "fail"], ItemType::Bug),
    (&["add", "new", "create", "implement", "support"], ItemType::Feature),
    (
        &["refactor", "extract", "move", "rename", "split", "consolidate"],
        ItemType::Refactor,
    ),
    (&["test", "coverage", "spec"], ItemType::Test),
    (&["doc", "readme", "comment"], ItemType::Docs),
];

const SERVICE_CATEGORIES: &[&str] = &["service", "auth", "data", "data integrity"];

static TITLE_AREA_PATTERNS: Lazy<Vec<(Regex, Area)>> = Lazy::new(|| {
    [
        (
            r"\b(electron|main process|preload|native|sqlite|ipc|better-sqlite)\b",
            Area::Electron,
        ),
        (
            r"\b(ui|button|modal|dialog|screen|page|component|css|style|layout|theme|dark mode|responsive)\b",
            Area::Ui,
        ),
        (
            r"\b(ci|cd|pipeline|build|deploy|vercel|github action|eslint|lint|jest|coverage|webpack|vite)\b",
            Area::Infra,
        ),
        (
            r"\b(security|auth|encrypt|token|session|jwt|oauth|safestorage|keychain|credential)\b",
            Area::Security,
        ),
        (
            r"\b(schema|migration|table|column|index|database|db|supabase|rls|row level)\b",
            Area::Schema,
        ),
        (r"\b(ipc|handler|bridge|preload|channel)\b", Area::Ipc),
        (
            r"\b(api|service|sync|graph|gmail|import|export|contact|email|message|attachment)\b",
            Area::Service,
        ),
    ]
    .into_iter()
    .map(|(pattern, area)| {
        let regex = Regex::new(&format!("(?i){pattern}")).expect("valid title area regex");
        (regex, area)
    })
    .collect()
});

/// How sure a proposal is; ordering is low < medium < high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Display for Confidence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Migration error.
#[derive(Debug)]
pub enum MigrationError {
    Store(StoreError),
    /// `backlog.csv` has neither `category` nor both `type` and `area`.
    MissingCategoryColumn,
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::MissingCategoryColumn => {
                write!(f, "backlog.csv has no `category` column to migrate")
            }
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::MissingCategoryColumn => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Proposes a type from a legacy category, then from title keywords.
pub fn propose_type(category: &str, title: &str) -> (ItemType, Confidence) {
    let category = category.trim().to_lowercase();
    if let Some((_, item_type)) = CATEGORY_TO_TYPE.iter().find(|(key, _)| *key == category) {
        return (*item_type, Confidence::High);
    }

    let title = title.to_lowercase();
    TITLE_TYPE_KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|word| title.contains(word)))
        .map(|(_, item_type)| (*item_type, Confidence::Medium))
        .unwrap_or((ItemType::Chore, Confidence::Low))
}

/// Proposes an area from a legacy category, then from title patterns.
pub fn propose_area(category: &str, title: &str) -> (Area, Confidence) {
    let category = category.trim().to_lowercase();
    if let Some((_, area)) = CATEGORY_TO_AREA.iter().find(|(key, _)| *key == category) {
        return (*area, Confidence::High);
    }

    if let Some((_, area)) = TITLE_AREA_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(title))
    {
        return (*area, Confidence::Medium);
    }

    if SERVICE_CATEGORIES.contains(&category.as_str()) {
        (Area::Service, Confidence::Medium)
    } else {
        (Area::Service, Confidence::Low)
    }
}

/// One row of the review table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub old_category: String,
    pub proposed_type: ItemType,
    pub proposed_area: Area,
    pub confidence: Confidence,
}

impl ReviewRow {
    fn to_record(&self) -> Record {
        let mut record = Record::new();
        for (column, value) in [
            ("id", self.id.as_str()),
            ("title", self.title.as_str()),
            ("status", self.status.as_str()),
            ("old_category", self.old_category.as_str()),
            ("proposed_type", self.proposed_type.as_str()),
            ("proposed_area", self.proposed_area.as_str()),
            ("confidence", self.confidence.as_str()),
        ] {
            record.insert(column.to_string(), value.to_string());
        }
        record
    }
}

/// Builds the review rows for every backlog row, lowest confidence first.
pub fn generate_review(backlog: &Table) -> Vec<ReviewRow> {
    let cell = |row: &Record, name: &str| row.get(name).cloned().unwrap_or_default();
    let mut rows = backlog
        .rows
        .iter()
        .map(|row| {
            let title = cell(row, "title");
            let old_category = cell(row, "category");
            let (proposed_type, type_confidence) = propose_type(&old_category, &title);
            let (proposed_area, area_confidence) = propose_area(&old_category, &title);
            ReviewRow {
                id: cell(row, "id"),
                status: cell(row, "status"),
                confidence: type_confidence.min(area_confidence),
                title,
                old_category,
                proposed_type,
                proposed_area,
            }
        })
        .collect::<Vec<_>>();
    rows.sort_by(|a, b| a.confidence.cmp(&b.confidence).then_with(|| a.id.cmp(&b.id)));
    rows
}

/// Writes the review table for `backlog.csv` to `output`.
pub fn write_review(paths: &BacklogPaths, output: &Path) -> MigrationResult<Vec<ReviewRow>> {
    let backlog = read_backlog_table(paths)?;
    let rows = generate_review(&backlog);

    let mut table = Table::new(REVIEW_COLUMNS.iter().map(|c| c.to_string()).collect());
    table.rows = rows.iter().map(ReviewRow::to_record).collect();
    write_table(output, &table)?;

    info!(
        "event=migration_propose module=service status=ok rows={} output={}",
        rows.len(),
        output.display()
    );
    Ok(rows)
}

/// Result of applying a review table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub total: usize,
    pub errors: Vec<String>,
}

/// Applies a review table onto an in-memory backlog table.
pub fn apply_review_table(
    backlog: &mut Table,
    review: &Table,
) -> MigrationResult<ApplyOutcome> {
    let has_type_area = backlog.has_column("type") && backlog.has_column("area");
    if !has_type_area {
        let Some(index) = backlog.headers.iter().position(|h| h == "category") else {
            return Err(MigrationError::MissingCategoryColumn);
        };
        for (offset, column) in ["type", "area"].into_iter().enumerate() {
            if !backlog.has_column(column) {
                backlog.headers.insert(index + 1 + offset, column.to_string());
            }
        }
    }
    let had_category = backlog.has_column("category");

    let reviews = review
        .rows
        .iter()
        .filter_map(|row| row.get("id").map(|id| (id.as_str(), row)))
        .collect::<std::collections::HashMap<_, _>>();

    let mut outcome = ApplyOutcome {
        total: backlog.rows.len(),
        ..ApplyOutcome::default()
    };
    for row in &mut backlog.rows {
        let id = row.get("id").cloned().unwrap_or_default();
        let Some(review) = reviews.get(id.as_str()) else {
            outcome.errors.push(format!(
                "{id}: not found in review CSV; keeping old category as type"
            ));
            let fallback = if had_category {
                row.get("category").cloned().unwrap_or_default()
            } else {
                ItemType::Chore.as_str().to_string()
            };
            row.insert("type".to_string(), fallback);
            row.insert("area".to_string(), Area::Service.as_str().to_string());
            continue;
        };

        let chosen = |final_column: &str, proposed_column: &str| {
            let value = review.get(final_column).map(|v| v.trim()).unwrap_or_default();
            if value.is_empty() {
                review
                    .get(proposed_column)
                    .map(|v| v.trim().to_string())
                    .unwrap_or_default()
            } else {
                value.to_string()
            }
        };
        let final_type = chosen("final_type", "proposed_type");
        let final_area = chosen("final_area", "proposed_area");

        let Some(item_type) = ItemType::parse(&final_type) else {
            outcome
                .errors
                .push(format!("{id}: invalid type '{final_type}'"));
            continue;
        };
        let Some(area) = Area::parse(&final_area) else {
            outcome
                .errors
                .push(format!("{id}: invalid area '{final_area}'"));
            continue;
        };

        row.insert("type".to_string(), item_type.as_str().to_string());
        row.insert("area".to_string(), area.as_str().to_string());
        outcome.applied += 1;
    }

    backlog.remove_column("category");
    Ok(outcome)
}

/// Applies the review file at `review_path` and rewrites `backlog.csv`.
pub fn apply_review(paths: &BacklogPaths, review_path: &Path) -> MigrationResult<ApplyOutcome> {
    let review = read_table(review_path)?;
    let mut backlog = read_backlog_table(paths)?;
    let outcome = apply_review_table(&mut backlog, &review)?;
    save_backlog_table(paths, &backlog)?;

    for error in &outcome.errors {
        warn!("event=migration_apply module=service status=warn detail={error}");
    }
    info!(
        "event=migration_apply module=service status=ok applied={} total={}",
        outcome.applied, outcome.total
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::{apply_review_table, generate_review, propose_area, propose_type, Confidence};
    use crate::model::values::{Area, ItemType};
    use crate::store::{Record, Table};

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        let mut table = Table::new(headers.iter().map(|h| h.to_string()).collect());
        table.rows = rows
            .iter()
            .map(|cells| {
                headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, c)| (h.to_string(), c.to_string()))
                    .collect::<Record>()
            })
            .collect();
        table
    }

    #[test]
    fn proposals_prefer_category_then_title() {
        assert_eq!(propose_type("Bugfix", "x"), (ItemType::Bug, Confidence::High));
        assert_eq!(
            propose_type("misc", "Implement export"),
            (ItemType::Feature, Confidence::Medium)
        );
        assert_eq!(propose_type("misc", "Tidy"), (ItemType::Chore, Confidence::Low));

        assert_eq!(propose_area("ux", "x"), (Area::Ui, Confidence::High));
        assert_eq!(
            propose_area("feature", "Modal flickers on open"),
            (Area::Ui, Confidence::Medium)
        );
        assert_eq!(propose_area("data", "Tidy"), (Area::Service, Confidence::Medium));
        assert_eq!(propose_area("feature", "Tidy"), (Area::Service, Confidence::Low));
    }

    #[test]
    fn review_sorts_low_confidence_first() {
        let backlog = table(
            &["id", "title", "category", "status"],
            &[
                &["BACKLOG-001", "Dark mode", "ui", "Pending"],
                &["BACKLOG-002", "Tidy", "misc", "Pending"],
            ],
        );
        let rows = generate_review(&backlog);
        assert_eq!(rows[0].id, "BACKLOG-002");
        assert_eq!(rows[0].confidence, Confidence::Low);
        assert_eq!(rows[1].confidence, Confidence::High);
    }

    #[test]
    fn apply_replaces_category_column_in_place() {
        let mut backlog = table(
            &["id", "title", "category", "priority"],
            &[
                &["BACKLOG-001", "a", "ui", "High"],
                &["BACKLOG-002", "b", "bug", "Low"],
                &["BACKLOG-003", "c", "infra", "Low"],
            ],
        );
        let review = table(
            &["id", "proposed_type", "proposed_area", "final_type", "final_area"],
            &[
                &["BACKLOG-001", "feature", "ui", "", ""],
                &["BACKLOG-002", "bug", "service", "bug", "nowhere"],
            ],
        );

        let outcome = apply_review_table(&mut backlog, &review).unwrap();
        assert_eq!(backlog.headers, vec!["id", "title", "type", "area", "priority"]);
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(backlog.rows[0]["type"], "feature");
        assert!(backlog.rows[1].get("type").is_none());
        assert_eq!(backlog.rows[2]["type"], "infra");
        assert_eq!(backlog.rows[2]["area"], "service");
    }
}
