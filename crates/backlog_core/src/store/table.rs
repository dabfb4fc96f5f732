//! Header-ordered CSV tables.

use super::{StoreError, StoreResult};
use csv::{ReaderBuilder, WriterBuilder};
use log::{debug, error};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// One register row keyed by column name.
pub type Record = BTreeMap<String, String>;

/// A CSV register: ordered header plus rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Record>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|header| header == name)
    }

    /// Inserts `name` right after `anchor`, or appends when `anchor` is absent.
    ///
    /// No-op when `name` already exists.
    pub fn insert_column_after(&mut self, anchor: &str, name: &str) {
        if self.has_column(name) {
            return;
        }
        match self.headers.iter().position(|header| header == anchor) {
            Some(index) => self.headers.insert(index + 1, name.to_string()),
            None => self.headers.push(name.to_string()),
        }
    }

    /// Drops a column from the header and every row.
    pub fn remove_column(&mut self, name: &str) {
        self.headers.retain(|header| header != name);
        for row in &mut self.rows {
            row.remove(name);
        }
    }

    /// Appends `name` to the header if it is not present yet.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.headers.push(name.to_string());
        }
    }
}

/// Reads a CSV file with a header row.
///
/// Short rows read missing cells as empty; cells past the header are dropped.
pub fn read_table(path: &Path) -> StoreResult<Table> {
    if !path.exists() {
        return Err(StoreError::MissingFile(path.to_path_buf()));
    }

    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|header| header.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_err)?;
        let row = headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                (
                    header.clone(),
                    record.get(index).unwrap_or_default().to_string(),
                )
            })
            .collect::<Record>();
        rows.push(row);
    }

    debug!(
        "event=table_read module=store status=ok path={} rows={}",
        path.display(),
        rows.len()
    );
    Ok(Table { headers, rows })
}

/// Reads a CSV file, treating a missing file as an empty table.
pub fn read_table_or_empty(path: &Path) -> StoreResult<Table> {
    match read_table(path) {
        Err(StoreError::MissingFile(_)) => Ok(Table::default()),
        other => other,
    }
}

/// Writes a table, creating parent directories as needed.
pub fn write_table(path: &Path, table: &Table) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = WriterBuilder::new().from_path(path).map_err(csv_err)?;
    writer.write_record(&table.headers).map_err(csv_err)?;
    for row in &table.rows {
        let cells = table
            .headers
            .iter()
            .map(|header| row.get(header).map(String::as_str).unwrap_or(""));
        writer.write_record(cells).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| {
        error!(
            "event=table_write module=store status=error path={} error={}",
            path.display(),
            source
        );
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    debug!(
        "event=table_write module=store status=ok path={} rows={}",
        path.display(),
        table.rows.len()
    );
    Ok(())
}

/// Appends one row, creating the file with `headers` first when missing.
pub fn append_row(path: &Path, headers: &[&str], row: &Record) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new().from_writer(file);
    if is_new {
        writer.write_record(headers).map_err(csv_err)?;
    }
    writer
        .write_record(header_cells(headers, row))
        .map_err(csv_err)?;
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(
        "event=row_append module=store status=ok path={} created={}",
        path.display(),
        is_new
    );
    Ok(())
}

fn header_cells<'a>(headers: &'a [&'a str], row: &'a Record) -> impl Iterator<Item = &'a str> {
    headers
        .iter()
        .map(move |header| row.get(*header).map(String::as_str).unwrap_or(""))
}

/// Writes `headers` then `rows` as CSV into any writer (e.g. stdout).
pub fn write_rows<W: Write>(out: W, headers: &[&str], rows: &[Record]) -> csv::Result<()> {
    let mut writer = WriterBuilder::new().from_writer(out);
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(header_cells(headers, row))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        append_row, read_table, read_table_or_empty, write_rows, write_table, Record, Table,
    };
    use crate::store::StoreError;

    #[test]
    fn short_rows_read_as_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "id,title,status\nA-1,First\nA-2,Second,done,extra\n").unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["id", "title", "status"]);
        assert_eq!(table.rows[0]["status"], "");
        assert_eq!(table.rows[1]["status"], "done");
        assert_eq!(table.rows[1].len(), 3);
    }

    #[test]
    fn missing_file_is_an_error_unless_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");

        assert!(matches!(read_table(&path), Err(StoreError::MissingFile(_))));
        assert_eq!(read_table_or_empty(&path).unwrap(), Table::default());
    }

    #[test]
    fn write_keeps_header_order_and_quotes_commas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");

        let mut table = Table::new(vec!["id".into(), "title".into()]);
        let mut row = Record::new();
        row.insert("title".into(), "Fix sync, again".into());
        row.insert("id".into(), "BACKLOG-1".into());
        table.rows.push(row);
        write_table(&path, &table).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id,title\nBACKLOG-1,\"Fix sync, again\"\n");
    }

    #[test]
    fn column_edits_respect_anchor_and_existing_columns() {
        let mut table = Table::new(vec!["id".into(), "variance".into(), "file".into()]);
        table.insert_column_after("variance", "created_at");
        table.insert_column_after("created_at", "completed_at");
        table.insert_column_after("variance", "created_at");
        table.insert_column_after("missing", "notes");
        assert_eq!(
            table.headers,
            vec!["id", "variance", "created_at", "completed_at", "file", "notes"]
        );

        table.remove_column("notes");
        assert!(!table.has_column("notes"));
    }

    #[test]
    fn append_creates_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("log.csv");
        let mut row = Record::new();
        row.insert("a".into(), "1".into());

        append_row(&path, &["a", "b"], &row).unwrap();
        append_row(&path, &["a", "b"], &row).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,b\n1,\n1,\n");
    }

    #[test]
    fn write_rows_targets_any_writer() {
        let mut row = Record::new();
        row.insert("b".into(), "xy".into());
        let mut out = Vec::new();
        write_rows(&mut out, &["a", "b"], &[row]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a,b\n,xy\n");
    }
}
