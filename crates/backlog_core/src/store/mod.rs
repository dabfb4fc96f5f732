//! CSV register persistence.
//!
//! # Responsibility
//! - Read and write register tables without losing unknown columns.
//! - Isolate `csv` crate details from services.
//!
//! # Invariants
//! - Rows are written in header order; cells absent from a row are written
//!   empty.
//! - Required registers report `MissingFile`; optional ones read as empty.

mod registers;
mod table;

pub use registers::{
    list_item_files, load_backlog, load_changelog, load_sprints, read_backlog_table,
    read_markdown, save_backlog_table,
};
pub use table::{
    append_row, read_table, read_table_or_empty, write_rows, write_table, Record, Table,
};

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type StoreResult<T> = Result<T, StoreError>;

/// Register I/O error.
#[derive(Debug)]
pub enum StoreError {
    MissingFile(PathBuf),
    Io { path: PathBuf, source: std::io::Error },
    Csv { path: PathBuf, source: csv::Error },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingFile(path) => write!(f, "Missing file: {}", path.display()),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Csv { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::MissingFile(_) => None,
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
        }
    }
}
