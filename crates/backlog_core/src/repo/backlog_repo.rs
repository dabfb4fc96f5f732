//! Backlog repository contracts and implementations.

use crate::config::BacklogPaths;
use crate::model::changelog::ChangelogEntry;
use crate::model::item::BacklogItem;
use crate::model::sprint::Sprint;
use crate::store::{load_backlog, load_changelog, load_sprints, StoreResult};

/// Read access to backlog, sprint and changelog registers.
pub trait BacklogRepository {
    fn items(&self) -> StoreResult<Vec<BacklogItem>>;
    fn sprints(&self) -> StoreResult<Vec<Sprint>>;
    /// Optional register; implementations return an empty list when absent.
    fn changelog(&self) -> StoreResult<Vec<ChangelogEntry>>;
}

/// Repository reading CSV registers from a backlog root.
#[derive(Debug, Clone)]
pub struct CsvBacklogRepository {
    paths: BacklogPaths,
}

impl CsvBacklogRepository {
    pub fn new(paths: BacklogPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &BacklogPaths {
        &self.paths
    }
}

impl BacklogRepository for CsvBacklogRepository {
    fn items(&self) -> StoreResult<Vec<BacklogItem>> {
        load_backlog(&self.paths)
    }

    fn sprints(&self) -> StoreResult<Vec<Sprint>> {
        load_sprints(&self.paths)
    }

    fn changelog(&self) -> StoreResult<Vec<ChangelogEntry>> {
        load_changelog(&self.paths)
    }
}

/// In-memory repository for callers that already hold rows.
#[derive(Debug, Clone, Default)]
pub struct MemoryBacklogRepository {
    pub items: Vec<BacklogItem>,
    pub sprints: Vec<Sprint>,
    pub changelog: Vec<ChangelogEntry>,
}

impl BacklogRepository for MemoryBacklogRepository {
    fn items(&self) -> StoreResult<Vec<BacklogItem>> {
        Ok(self.items.clone())
    }

    fn sprints(&self) -> StoreResult<Vec<Sprint>> {
        Ok(self.sprints.clone())
    }

    fn changelog(&self) -> StoreResult<Vec<ChangelogEntry>> {
        Ok(self.changelog.clone())
    }
}

impl<R: BacklogRepository + ?Sized> BacklogRepository for &R {
    fn items(&self) -> StoreResult<Vec<BacklogItem>> {
        (**self).items()
    }

    fn sprints(&self) -> StoreResult<Vec<Sprint>> {
        (**self).sprints()
    }

    fn changelog(&self) -> StoreResult<Vec<ChangelogEntry>> {
        (**self).changelog()
    }
}
