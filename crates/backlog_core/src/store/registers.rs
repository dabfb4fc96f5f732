//! Typed loaders for the backlog registers.

use super::table::{read_table, read_table_or_empty, write_table, Table};
use super::{StoreError, StoreResult};
use crate::config::BacklogPaths;
use crate::model::changelog::ChangelogEntry;
use crate::model::item::BacklogItem;
use crate::model::sprint::Sprint;
use std::path::{Path, PathBuf};

const ITEM_FILE_PREFIX: &str = "BACKLOG-";
const ITEM_FILE_SUFFIX: &str = ".md";

/// Reads `backlog.csv` as a raw table (header order preserved).
pub fn read_backlog_table(paths: &BacklogPaths) -> StoreResult<Table> {
    read_table(&paths.backlog_csv())
}

/// Writes `backlog.csv` from a raw table.
pub fn save_backlog_table(paths: &BacklogPaths, table: &Table) -> StoreResult<()> {
    write_table(&paths.backlog_csv(), table)
}

pub fn load_backlog(paths: &BacklogPaths) -> StoreResult<Vec<BacklogItem>> {
    let table = read_backlog_table(paths)?;
    Ok(table.rows.iter().map(BacklogItem::from_record).collect())
}

pub fn load_sprints(paths: &BacklogPaths) -> StoreResult<Vec<Sprint>> {
    let table = read_table(&paths.sprints_csv())?;
    Ok(table.rows.iter().map(Sprint::from_record).collect())
}

/// The changelog is optional; a missing file yields no entries.
pub fn load_changelog(paths: &BacklogPaths) -> StoreResult<Vec<ChangelogEntry>> {
    let table = read_table_or_empty(&paths.changelog_csv())?;
    Ok(table.rows.iter().map(ChangelogEntry::from_record).collect())
}

/// Sorted `items/BACKLOG-*.md` paths; a missing items directory yields none.
pub fn list_item_files(paths: &BacklogPaths) -> StoreResult<Vec<PathBuf>> {
    let dir = paths.items_dir();
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(StoreError::Io { path: dir, source }),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(ITEM_FILE_PREFIX) && name.ends_with(ITEM_FILE_SUFFIX) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Reads a markdown file, returning `None` when it does not exist.
pub fn read_markdown(path: &Path) -> StoreResult<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
