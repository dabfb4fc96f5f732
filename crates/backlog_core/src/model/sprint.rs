//! Sprint register row.

use super::values::SprintStatus;
use crate::store::Record;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sprint {
    pub sprint_id: String,
    pub status: String,
}

impl Sprint {
    pub fn from_record(record: &Record) -> Self {
        Self {
            sprint_id: record.get("sprint_id").cloned().unwrap_or_default(),
            status: record.get("status").cloned().unwrap_or_default(),
        }
    }

    pub fn status(&self) -> Option<SprintStatus> {
        SprintStatus::parse(&self.status)
    }

    /// Active and planning sprints both count as in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status(),
            Some(SprintStatus::Active | SprintStatus::Planning)
        )
    }
}
