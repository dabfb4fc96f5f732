//! Changelog register row.

use crate::store::Record;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangelogEntry {
    pub date: String,
    pub action: String,
    pub details: String,
}

impl ChangelogEntry {
    pub fn from_record(record: &Record) -> Self {
        let field = |name: &str| record.get(name).cloned().unwrap_or_default();
        Self {
            date: field("date"),
            action: field("action"),
            details: field("details"),
        }
    }

    /// Completion and merge actions feed the recent-activity list.
    pub fn is_completion(&self) -> bool {
        matches!(
            self.action.trim().to_lowercase().as_str(),
            "complete" | "merge"
        )
    }
}
