//! Core logic for the backlog planning toolkit.
//! This crate owns every register format and business rule; the CLI only
//! parses arguments and prints results.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;
pub mod store;

pub use config::{BacklogPaths, MetricsPaths, DEFAULT_BACKLOG_ROOT, DEFAULT_METRICS_DIR};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::item::BacklogItem;
pub use model::metrics::{MetricsRecord, UsageEntry};
pub use repo::backlog_repo::{BacklogRepository, CsvBacklogRepository, MemoryBacklogRepository};
pub use search::fts::{
    build_index, index_items, search_items, IndexedItem, SearchError, SearchHit, SearchQuery,
    SearchResult,
};
pub use service::query_service::QueryService;
pub use store::{StoreError, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
