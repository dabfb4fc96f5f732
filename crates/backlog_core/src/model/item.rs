//! Backlog item view over a `backlog.csv` row.
//!
//! # Invariants
//! - Every known column is kept as raw text; missing columns read as empty.
//! - Typed accessors never fail; unparsable text yields `None`.

use super::values::{normalize, Area, ItemStatus, ItemType, Priority, UNSET};
use crate::store::Record;
use serde::Serialize;

/// Canonical column order for newly created backlog registers.
pub const BACKLOG_COLUMNS: &[&str] = &[
    "id",
    "title",
    "type",
    "area",
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

/// One backlog item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BacklogItem {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub area: String,
    /// Legacy single-axis classification replaced by `type` + `area`.
    pub category: String,
    pub priority: String,
    pub status: String,
    pub sprint: String,
    pub est_tokens: String,
    pub actual_tokens: String,
    pub variance: String,
    pub created_at: String,
    pub completed_at: String,
    pub file: String,
    pub description: String,
}

impl BacklogItem {
    pub fn from_record(record: &Record) -> Self {
        let field = |name: &str| record.get(name).cloned().unwrap_or_default();
        Self {
            id: field("id"),
            title: field("title"),
            item_type: field("type"),
            area: field("area"),
            category: field("category"),
            priority: field("priority"),
            status: field("status"),
            sprint: field("sprint"),
            est_tokens: field("est_tokens"),
            actual_tokens: field("actual_tokens"),
            variance: field("variance"),
            created_at: field("created_at"),
            completed_at: field("completed_at"),
            file: field("file"),
            description: field("description"),
        }
    }

    /// Converts back to a row; empty optional columns are omitted.
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        let pairs = [
            ("id", &self.id),
            ("title", &self.title),
            ("type", &self.item_type),
            ("area", &self.area),
            ("category", &self.category),
            ("priority", &self.priority),
            ("status", &self.status),
            ("sprint", &self.sprint),
            ("est_tokens", &self.est_tokens),
            ("actual_tokens", &self.actual_tokens),
            ("variance", &self.variance),
            ("created_at", &self.created_at),
            ("completed_at", &self.completed_at),
            ("file", &self.file),
            ("description", &self.description),
        ];
        for (name, value) in pairs {
            if !value.is_empty() {
                record.insert(name.to_string(), value.clone());
            }
        }
        record
    }

    pub fn item_type(&self) -> Option<ItemType> {
        ItemType::parse(&self.item_type)
    }

    pub fn area(&self) -> Option<Area> {
        Area::parse(&self.area)
    }

    pub fn priority(&self) -> Option<Priority> {
        Priority::parse(&self.priority)
    }

    pub fn status(&self) -> Option<ItemStatus> {
        ItemStatus::parse(&self.status)
    }

    /// Open unless the status is completed or obsolete.
    pub fn is_open(&self) -> bool {
        !self.status().is_some_and(ItemStatus::is_closed)
    }

    /// Only the literal `-` marks these columns as unset; an empty cell does not.
    pub fn is_unassigned(&self) -> bool {
        self.sprint == UNSET
    }

    pub fn has_estimate(&self) -> bool {
        self.est_tokens != UNSET
    }

    pub fn has_actual(&self) -> bool {
        self.actual_tokens != UNSET
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(self.priority(), Some(Priority::Critical | Priority::High))
    }

    /// Category used by breakdowns; post-migration rows fall back to `type`.
    pub fn category_key(&self) -> &str {
        if self.category.trim().is_empty() {
            &self.item_type
        } else {
            &self.category
        }
    }

    /// Sprint compared leniently, e.g. `**SPRINT-042**` matches `sprint-042`.
    pub fn in_sprint(&self, sprint_id: &str) -> bool {
        normalize(&self.sprint) == normalize(sprint_id)
    }

    /// Numeric part of a `PREFIX-NNN` id, used for natural ordering.
    pub fn number(&self) -> Option<u64> {
        id_number(&self.id)
    }
}

/// First run of digits in an id, e.g. `BACKLOG-042` -> `42`.
pub fn id_number(id: &str) -> Option<u64> {
    let digits = id
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect::<String>();
    digits.parse().ok()
}

/// Truncates to `max` characters without splitting a code point.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::{id_number, BacklogItem};
    use crate::model::values::ItemStatus;

    fn item(status: &str, sprint: &str) -> BacklogItem {
        BacklogItem {
            id: "BACKLOG-001".into(),
            title: "Fix login".into(),
            status: status.into(),
            sprint: sprint.into(),
            ..BacklogItem::default()
        }
    }

    #[test]
    fn open_state_follows_closed_statuses() {
        assert!(item("Pending", "-").is_open());
        assert!(item("", "-").is_open());
        assert!(!item("**Completed**", "-").is_open());
        assert!(!item("obsolete", "-").is_open());
        assert_eq!(item("In Progress", "-").status(), Some(ItemStatus::InProgress));
    }

    #[test]
    fn only_placeholder_sprint_is_unassigned() {
        assert!(item("Pending", "-").is_unassigned());
        assert!(!item("Pending", "").is_unassigned());
        assert!(!item("Pending", "SPRINT-042").is_unassigned());
        assert!(item("Pending", "SPRINT-042").in_sprint("sprint-042"));
    }

    #[test]
    fn record_roundtrip_keeps_known_columns() {
        let mut original = item("Pending", "SPRINT-001");
        original.item_type = "bug".into();
        let restored = BacklogItem::from_record(&original.to_record());
        assert_eq!(restored, original);
    }

    #[test]
    fn id_number_reads_first_digit_run() {
        assert_eq!(id_number("BACKLOG-042"), Some(42));
        assert_eq!(id_number("TASK-1184b"), Some(1184));
        assert_eq!(id_number("none"), None);
    }
}
