//! SQLite FTS5 search over backlog items.
//!
//! # Responsibility
//! - Index id, title and description of every item.
//! - Return ranked hits with highlighted snippets.
//!
//! # Invariants
//! - Blank queries return no hits without touching the index.
//! - Result ordering is deterministic by rank, then id.

use crate::config::BacklogPaths;
use crate::db::{open_index_in_memory, DbError};
use crate::model::normalize;
use crate::service::dashboard::load_dashboard_items;
use crate::store::{Record, StoreError};
use log::info;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Result type for search APIs.
pub type SearchResult<T> = Result<T, SearchError>;

/// Search-layer error for query parsing, index access and register loading.
#[derive(Debug)]
pub enum SearchError {
    /// User-provided query cannot be parsed by FTS5 syntax.
    InvalidQuery {
        query: String,
        message: String,
    },
    Db(DbError),
    Store(StoreError),
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery { query, message } => {
                write!(f, "invalid full-text query `{query}`: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery { .. } => None,
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<StoreError> for SearchError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One item as stored in the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedItem {
    pub id: String,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub description: String,
}

impl IndexedItem {
    fn from_record(record: &Record) -> Self {
        let field = |name: &str| record.get(name).cloned().unwrap_or_default();
        Self {
            id: field("id"),
            title: field("title"),
            status: field("status"),
            priority: field("priority"),
            description: field("description"),
        }
    }
}

/// Search options for full-text query behavior.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// User query text.
    pub text: String,
    /// Optional status filter, compared after normalization.
    pub status: Option<String>,
    /// Maximum number of hits to return.
    pub limit: u32,
    /// Whether to pass text directly as raw FTS5 expression.
    pub raw_fts_syntax: bool,
}

impl SearchQuery {
    /// Creates a query with default limit and no status filter.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: None,
            limit: 20,
            raw_fts_syntax: false,
        }
    }
}

/// Single search hit returned by [`search_items`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub status: String,
    pub snippet: String,
}

/// Inserts `items` into an index connection. Returns the number inserted.
pub fn index_items(conn: &mut Connection, items: &[IndexedItem]) -> SearchResult<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO items (id, title, status, status_key, priority, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for item in items {
            stmt.execute(params![
                item.id,
                item.title,
                item.status,
                normalize(&item.status),
                item.priority,
                item.description
            ])?;
        }
    }
    tx.commit()?;
    Ok(items.len())
}

/// Opens a fresh index and fills it from the backlog under `paths`.
///
/// Descriptions come from item markdown files, falling back to the CSV
/// `description` column.
pub fn build_index(paths: &BacklogPaths) -> SearchResult<Connection> {
    let started_at = Instant::now();
    let items = load_dashboard_items(paths)?
        .iter()
        .map(IndexedItem::from_record)
        .collect::<Vec<_>>();

    let mut conn = open_index_in_memory()?;
    let count = index_items(&mut conn, &items)?;
    info!(
        "event=search_index module=search status=ok items={count} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

/// Searches indexed items via FTS5 and returns ranked results.
///
/// Returns an empty list for blank queries or a zero limit.
pub fn search_items(conn: &Connection, query: &SearchQuery) -> SearchResult<Vec<SearchHit>> {
    let Some(match_expr) = build_match_expression(query) else {
        return Ok(Vec::new());
    };

    if query.limit == 0 {
        return Ok(Vec::new());
    }

    let mut sql = String::from(
        "SELECT
            items.id AS id,
            items.title AS title,
            items.status AS status,
            snippet(items_fts, -1, '[', ']', ' ... ', 10) AS snippet
         FROM items_fts
         JOIN items ON items.rowid = items_fts.rowid
         WHERE items_fts MATCH ?",
    );
    let mut bind_values: Vec<Value> = vec![Value::Text(match_expr.clone())];

    if let Some(status) = query.status.as_deref() {
        sql.push_str(" AND items.status_key = ?");
        bind_values.push(Value::Text(normalize(status)));
    }

    sql.push_str(" ORDER BY bm25(items_fts), items.id ASC LIMIT ?");
    bind_values.push(Value::Integer(i64::from(query.limit)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query(params_from_iter(bind_values))
        .map_err(|err| map_query_error(err, &match_expr))?;
    let mut hits = Vec::new();

    while let Some(row) = rows
        .next()
        .map_err(|err| map_query_error(err, &match_expr))?
    {
        hits.push(parse_search_hit(row)?);
    }

    Ok(hits)
}

fn parse_search_hit(row: &Row<'_>) -> SearchResult<SearchHit> {
    Ok(SearchHit {
        id: row.get("id")?,
        title: row.get("title")?,
        status: row.get("status")?,
        snippet: row.get("snippet")?,
    })
}

fn build_match_expression(query: &SearchQuery) -> Option<String> {
    let text = query.text.trim();
    if text.is_empty() {
        return None;
    }

    if query.raw_fts_syntax {
        return Some(text.to_string());
    }

    let terms = text
        .split_whitespace()
        .map(escape_fts_term)
        .collect::<Vec<_>>();
    Some(terms.join(" AND "))
}

fn escape_fts_term(raw: &str) -> String {
    let escaped = raw.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn map_query_error(err: rusqlite::Error, query: &str) -> SearchError {
    if is_match_syntax_error(&err) {
        return SearchError::InvalidQuery {
            query: query.to_string(),
            message: err.to_string(),
        };
    }

    SearchError::Db(DbError::Sqlite(err))
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let msg = message.to_lowercase();
            (msg.contains("fts5") && msg.contains("syntax"))
                || msg.contains("malformed match expression")
                || msg.contains("unterminated")
                || msg.contains("no such column")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{build_match_expression, index_items, search_items, IndexedItem, SearchQuery};
    use crate::db::open_index_in_memory;
    use rusqlite::Connection;

    fn item(id: &str, title: &str, status: &str, description: &str) -> IndexedItem {
        IndexedItem {
            id: id.to_string(),
            title: title.to_string(),
            status: status.to_string(),
            priority: "High".to_string(),
            description: description.to_string(),
        }
    }

    fn seeded() -> Connection {
        let mut conn = open_index_in_memory().unwrap();
        index_items(
            &mut conn,
            &[
                item("BACKLOG-001", "Fix login redirect", "Pending", "Users bounce after login."),
                item("BACKLOG-002", "Sync engine", "Completed", "Offline sync for login tokens."),
                item("BACKLOG-003", "Dark mode", "Pending", "Theme support."),
            ],
        )
        .unwrap();
        conn
    }

    #[test]
    fn terms_are_quoted_and_joined() {
        let query = SearchQuery::new("  login \"x ");
        assert_eq!(
            build_match_expression(&query).as_deref(),
            Some("\"login\" AND \"\"\"x\"")
        );
        assert_eq!(build_match_expression(&SearchQuery::new("   ")), None);
    }

    #[test]
    fn search_matches_title_and_description() {
        let conn = seeded();
        let hits = search_items(&conn, &SearchQuery::new("login")).unwrap();
        let ids = hits.iter().map(|hit| hit.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"BACKLOG-001"));
        assert!(ids.contains(&"BACKLOG-002"));
        assert!(hits.iter().all(|hit| hit.snippet.contains("[login]")
            || hit.snippet.contains("[Login]")));
    }

    #[test]
    fn status_filter_and_limit_apply() {
        let conn = seeded();
        let mut query = SearchQuery::new("login");
        query.status = Some("completed".to_string());
        let hits = search_items(&conn, &query).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "BACKLOG-002");

        let mut limited = SearchQuery::new("login");
        limited.limit = 1;
        assert_eq!(search_items(&conn, &limited).unwrap().len(), 1);
    }

    #[test]
    fn punctuation_does_not_break_default_queries() {
        let conn = seeded();
        let hits = search_items(&conn, &SearchQuery::new("dark (mode")).unwrap();
        assert_eq!(hits.len(), 1);
        let hits = search_items(&conn, &SearchQuery::new("BACKLOG-003")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Dark mode");
    }

    #[test]
    fn malformed_raw_query_is_reported() {
        let conn = seeded();
        let mut query = SearchQuery::new("login AND (");
        query.raw_fts_syntax = true;
        let err = search_items(&conn, &query).unwrap_err();
        assert!(matches!(err, super::SearchError::InvalidQuery { .. }));
    }
}
