//! Backlog query use-cases.
//!
//! # Responsibility
//! - Provide filtered views (status, priority, type, area, sprint, title).
//! - Provide planning views (open work, ready-for-sprint queue).
//! - Summarize register counts.
//!
//! # Invariants
//! - All filters compare normalized text.
//! - Results keep register order, except `ready` which is stably sorted by
//!   priority rank.

use crate::model::item::BacklogItem;
use crate::model::values::{group_key, normalize, priority_rank, ItemStatus, UNSET};
use crate::repo::backlog_repo::BacklogRepository;
use crate::store::StoreResult;
use std::collections::BTreeMap;

/// Field a simple equality query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Status,
    Priority,
    Type,
    Area,
    Sprint,
}

impl ItemField {
    fn value(self, item: &BacklogItem) -> &str {
        match self {
            Self::Status => &item.status,
            Self::Priority => &item.priority,
            Self::Type => &item.item_type,
            Self::Area => &item.area,
            Self::Sprint => &item.sprint,
        }
    }
}

/// Register counts grouped by normalized value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacklogStatistics {
    pub total_items: usize,
    pub total_sprints: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_priority: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_area: BTreeMap<String, usize>,
    pub sprints_by_status: BTreeMap<String, usize>,
}

/// Use-case service for backlog queries.
pub struct QueryService<R: BacklogRepository> {
    repo: R,
}

impl<R: BacklogRepository> QueryService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Items whose `field` normalizes to `value`, optionally also matching a
    /// status.
    pub fn filter(
        &self,
        field: ItemField,
        value: &str,
        status: Option<&str>,
    ) -> StoreResult<Vec<BacklogItem>> {
        let wanted = normalize(value);
        let wanted_status = status.map(normalize);
        Ok(self
            .repo
            .items()?
            .into_iter()
            .filter(|item| normalize(field.value(item)) == wanted)
            .filter(|item| {
                wanted_status
                    .as_ref()
                    .map_or(true, |status| normalize(&item.status) == *status)
            })
            .collect())
    }

    /// Case-insensitive substring search over titles.
    pub fn search(&self, query: &str) -> StoreResult<Vec<BacklogItem>> {
        let needle = query.to_lowercase();
        Ok(self
            .repo
            .items()?
            .into_iter()
            .filter(|item| item.title.to_lowercase().contains(&needle))
            .collect())
    }

    /// Items not completed or obsolete.
    pub fn open(&self) -> StoreResult<Vec<BacklogItem>> {
        Ok(self
            .repo
            .items()?
            .into_iter()
            .filter(BacklogItem::is_open)
            .collect())
    }

    /// Pending items with an empty or `-` sprint, ordered by priority for sprint planning.
    pub fn ready(&self) -> StoreResult<Vec<BacklogItem>> {
        let mut items = self
            .repo
            .items()?
            .into_iter()
            .filter(|item| {
                item.status() == Some(ItemStatus::Pending)
                    && matches!(normalize(&item.sprint).as_str(), "" | UNSET)
            })
            .collect::<Vec<_>>();
        items.sort_by_key(|item| priority_rank(&item.priority));
        Ok(items)
    }

    pub fn statistics(&self) -> StoreResult<BacklogStatistics> {
        let items = self.repo.items()?;
        let sprints = self.repo.sprints()?;

        Ok(BacklogStatistics {
            total_items: items.len(),
            total_sprints: sprints.len(),
            by_status: count_by(&items, |item| item.status.as_str()),
            by_priority: count_by(&items, |item| item.priority.as_str()),
            by_type: count_by(&items, |item| item.item_type.as_str()),
            by_area: count_by(&items, |item| item.area.as_str()),
            sprints_by_status: count_by(&sprints, |sprint| sprint.status.as_str()),
        })
    }
}

/// Counts rows by the normalized value `key` extracts.
pub fn count_by<T>(rows: &[T], key: impl Fn(&T) -> &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(group_key(key(row))).or_insert(0) += 1;
    }
    counts
}

/// Orders counts by descending count, then by key.
pub fn sorted_by_count(counts: &BTreeMap<String, usize>) -> Vec<(&str, usize)> {
    let mut entries = counts
        .iter()
        .map(|(key, count)| (key.as_str(), *count))
        .collect::<Vec<_>>();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
}

#[cfg(test)]
mod tests {
    use super::{count_by, sorted_by_count, ItemField, QueryService};
    use crate::model::item::BacklogItem;
    use crate::repo::backlog_repo::MemoryBacklogRepository;

    fn item(id: &str, priority: &str, status: &str, sprint: &str) -> BacklogItem {
        BacklogItem {
            id: id.into(),
            title: format!("Item {id}"),
            priority: priority.into(),
            status: status.into(),
            sprint: sprint.into(),
            ..BacklogItem::default()
        }
    }

    fn service() -> QueryService<MemoryBacklogRepository> {
        QueryService::new(MemoryBacklogRepository {
            items: vec![
                item("BACKLOG-001", "Low", "Pending", "-"),
                item("BACKLOG-002", "**Critical**", "Pending", ""),
                item("BACKLOG-003", "High", "Completed", "SPRINT-001"),
                item("BACKLOG-004", "High", "Pending", "SPRINT-002"),
                item("BACKLOG-005", "unsure", "Pending", "-"),
                item("BACKLOG-006", "Medium", "Pending", "-"),
            ],
            ..MemoryBacklogRepository::default()
        })
    }

    #[test]
    fn ready_sorts_unassigned_pending_by_priority() {
        let ids = service()
            .ready()
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["BACKLOG-002", "BACKLOG-006", "BACKLOG-001", "BACKLOG-005"]
        );
    }

    #[test]
    fn filter_applies_optional_status() {
        let high = service().filter(ItemField::Priority, "high", None).unwrap();
        assert_eq!(high.len(), 2);

        let high_pending = service()
            .filter(ItemField::Priority, "HIGH", Some("pending"))
            .unwrap();
        assert_eq!(high_pending.len(), 1);
        assert_eq!(high_pending[0].id, "BACKLOG-004");
    }

    #[test]
    fn open_excludes_closed_items() {
        assert_eq!(service().open().unwrap().len(), 5);
    }

    #[test]
    fn count_by_groups_blank_as_unknown_and_sorts_by_count() {
        let rows = vec![
            item("A", "high", "", "-"),
            item("B", "High", "", "-"),
            item("C", "low", "", "-"),
            item("D", "", "", "-"),
        ];
        let counts = count_by(&rows, |row| row.priority.as_str());
        assert_eq!(counts["high"], 2);
        assert_eq!(counts["unknown"], 1);
        assert_eq!(
            sorted_by_count(&counts),
            vec![("high", 2), ("low", 1), ("unknown", 1)]
        );
    }
}
