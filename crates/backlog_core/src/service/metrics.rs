//! Agent token ledger use-cases.
//!
//! # Responsibility
//! - Append usage entries to `tokens.csv`.
//! - Summarize, filter and aggregate ledger rows.
//!
//! # Invariants
//! - The ledger is append-only; nothing here rewrites existing rows.
//! - Rows whose timestamp does not parse are never excluded by date filters.
//! - Numeric cells that fail to parse count as `0`.

use crate::config::MetricsPaths;
use crate::model::metrics::{
    parse_count, MetricsRecord, UsageEntry, METRICS_COLUMNS, NUMERIC_COLUMNS,
};
use crate::store::{append_row, read_table, write_rows, Record, StoreError};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use log::info;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Ledger error.
#[derive(Debug)]
pub enum MetricsError {
    Store(StoreError),
    Csv(csv::Error),
    Json(serde_json::Error),
    /// The ledger is missing or has no rows.
    EmptyLedger,
}

impl Display for MetricsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Csv(err) => write!(f, "failed to encode rows: {err}"),
            Self::Json(err) => write!(f, "failed to encode rows: {err}"),
            Self::EmptyLedger => write!(f, "No metrics file found or empty"),
        }
    }
}

impl Error for MetricsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::EmptyLedger => None,
        }
    }
}

impl From<StoreError> for MetricsError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<csv::Error> for MetricsError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Stamps `entry` with `now`, derives totals and appends it to the ledger.
pub fn log_usage(
    paths: &MetricsPaths,
    entry: UsageEntry,
    now: DateTime<Utc>,
) -> MetricsResult<MetricsRecord> {
    let record = MetricsRecord::from_entry(entry, now);
    append_row(&paths.tokens_csv(), METRICS_COLUMNS, &record.to_record())?;
    info!(
        "event=metrics_log module=service status=ok agent_type={} task_id={} total_tokens={}",
        record.agent_type, record.task_id, record.total_tokens
    );
    Ok(record)
}

/// All ledger rows; `None` when the ledger file does not exist.
pub fn load_rows(paths: &MetricsPaths) -> MetricsResult<Option<Vec<Record>>> {
    match read_table(&paths.tokens_csv()) {
        Ok(table) => Ok(Some(table.rows)),
        Err(StoreError::MissingFile(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentTypeUsage {
    pub agent_type: String,
    pub entries: usize,
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    pub entries: usize,
    /// Sorted by agent type.
    pub by_agent_type: Vec<AgentTypeUsage>,
    pub total_tokens: u64,
}

/// Entry and token totals per agent type.
pub fn summarize(rows: &[Record]) -> MetricsSummary {
    let mut by_type: BTreeMap<String, (usize, u64)> = BTreeMap::new();
    for row in rows {
        let agent_type = cell(row, "agent_type");
        let key = if agent_type.is_empty() {
            "unknown"
        } else {
            agent_type
        };
        let slot = by_type.entry(key.to_string()).or_default();
        slot.0 += 1;
        slot.1 = slot.1.saturating_add(parse_count(cell(row, "total_tokens")));
    }

    let by_agent_type = by_type
        .into_iter()
        .map(|(agent_type, (entries, tokens))| AgentTypeUsage {
            agent_type,
            entries,
            tokens,
        })
        .collect::<Vec<_>>();
    MetricsSummary {
        entries: rows.len(),
        total_tokens: by_agent_type
            .iter()
            .fold(0, |total, usage| total.saturating_add(usage.tokens)),
        by_agent_type,
    }
}

fn cell<'a>(row: &'a Record, name: &str) -> &'a str {
    row.get(name).map(String::as_str).unwrap_or_default()
}

/// Row filter; every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsFilter {
    pub task: Option<String>,
    pub task_prefix: Option<String>,
    pub agent_type: Option<String>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    /// Inclusive, from 00:00:00 UTC.
    pub since: Option<NaiveDate>,
    /// Inclusive, through 23:59:59 UTC.
    pub until: Option<NaiveDate>,
}

impl MetricsFilter {
    pub fn matches(&self, row: &Record) -> bool {
        let exact = |wanted: &Option<String>, column: &str| {
            wanted.as_deref().map_or(true, |wanted| cell(row, column) == wanted)
        };
        if !exact(&self.task, "task_id")
            || !exact(&self.agent_type, "agent_type")
            || !exact(&self.session_id, "session_id")
            || !exact(&self.agent_id, "agent_id")
        {
            return false;
        }
        if let Some(prefix) = self.task_prefix.as_deref() {
            if !cell(row, "task_id").starts_with(prefix) {
                return false;
            }
        }

        let Ok(timestamp) = DateTime::parse_from_rfc3339(cell(row, "timestamp")) else {
            return true;
        };
        let timestamp = timestamp.with_timezone(&Utc);
        if let Some(start) = self.since.and_then(|date| day_bound(date, 0, 0, 0)) {
            if timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.until.and_then(|date| day_bound(date, 23, 59, 59)) {
            if timestamp > end {
                return false;
            }
        }
        true
    }
}

fn day_bound(date: NaiveDate, hour: u32, min: u32, sec: u32) -> Option<DateTime<Utc>> {
    date.and_hms_opt(hour, min, sec)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn filter_rows(rows: Vec<Record>, filter: &MetricsFilter) -> Vec<Record> {
    rows.into_iter().filter(|row| filter.matches(row)).collect()
}

/// Rows as CSV text with the full ledger header.
pub fn rows_to_csv(rows: &[Record]) -> MetricsResult<String> {
    let mut out = Vec::new();
    write_rows(&mut out, METRICS_COLUMNS, rows)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Rows as pretty JSON with numeric columns coerced to integers.
pub fn rows_to_json(rows: &[Record]) -> MetricsResult<String> {
    let records = rows
        .iter()
        .map(MetricsRecord::from_record)
        .collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// Which rows an effort aggregation covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffortSelector {
    Task(String),
    TaskPrefix(String),
    Session(String),
    Agent(String),
}

impl EffortSelector {
    /// Output key naming the selector.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Task(_) => "task_id",
            Self::TaskPrefix(_) => "task_prefix",
            Self::Session(_) => "session_id",
            Self::Agent(_) => "agent_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Task(value)
            | Self::TaskPrefix(value)
            | Self::Session(value)
            | Self::Agent(value) => value,
        }
    }

    pub fn matches(&self, row: &Record) -> bool {
        match self {
            Self::Task(task) => cell(row, "task_id") == task.as_str(),
            Self::TaskPrefix(prefix) => cell(row, "task_id").starts_with(prefix.as_str()),
            Self::Session(session) => cell(row, "session_id") == session.as_str(),
            Self::Agent(agent) => cell(row, "agent_id") == agent.as_str(),
        }
    }
}

/// Summed effort for one selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffortTotals {
    pub selector: EffortSelector,
    /// Sums in [`NUMERIC_COLUMNS`] order.
    pub sums: Vec<(&'static str, u64)>,
    pub agent_sessions: usize,
    pub entries: usize,
}

impl EffortTotals {
    pub fn get(&self, column: &str) -> u64 {
        self.sums
            .iter()
            .find(|(name, _)| *name == column)
            .map_or(0, |(_, value)| *value)
    }
}

impl Serialize for EffortTotals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.sums.len() + 3))?;
        map.serialize_entry(self.selector.key(), self.selector.value())?;
        for (column, sum) in &self.sums {
            map.serialize_entry(column, sum)?;
        }
        map.serialize_entry("agent_sessions", &self.agent_sessions)?;
        map.serialize_entry("entries", &self.entries)?;
        map.end()
    }
}

/// Sums numeric columns over rows matching `selector`.
///
/// Fails with [`MetricsError::EmptyLedger`] when `rows` is empty.
pub fn aggregate(rows: &[Record], selector: EffortSelector) -> MetricsResult<EffortTotals> {
    if rows.is_empty() {
        return Err(MetricsError::EmptyLedger);
    }

    let matching = rows
        .iter()
        .filter(|row| selector.matches(row))
        .collect::<Vec<_>>();
    let sums = NUMERIC_COLUMNS
        .iter()
        .map(|column| {
            let total = matching
                .iter()
                .map(|row| parse_count(cell(row, column)))
                .fold(0u64, u64::saturating_add);
            (*column, total)
        })
        .collect();
    let agent_sessions = matching
        .iter()
        .map(|row| cell(row, "agent_id"))
        .filter(|agent_id| !agent_id.is_empty())
        .collect::<BTreeSet<_>>()
        .len();

    Ok(EffortTotals {
        selector,
        sums,
        agent_sessions,
        entries: matching.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::{aggregate, filter_rows, summarize, EffortSelector, MetricsError, MetricsFilter};
    use crate::store::Record;
    use chrono::NaiveDate;

    fn row(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn ledger() -> Vec<Record> {
        vec![
            row(&[
                ("timestamp", "2026-01-29T23:00:00Z"),
                ("agent_type", "engineer"),
                ("agent_id", "a1"),
                ("task_id", "TASK-1775"),
                ("total_tokens", "1000"),
                ("api_calls", "3"),
            ]),
            row(&[
                ("timestamp", "2026-01-30T08:00:00Z"),
                ("agent_type", "engineer"),
                ("agent_id", "a2"),
                ("task_id", "TASK-1776"),
                ("total_tokens", "2000"),
                ("api_calls", "bad"),
            ]),
            row(&[
                ("timestamp", "not-a-date"),
                ("agent_type", ""),
                ("agent_id", "a2"),
                ("task_id", "TASK-1800"),
                ("total_tokens", "500"),
            ]),
        ]
    }

    #[test]
    fn summary_groups_blank_agent_type_as_unknown() {
        let summary = summarize(&ledger());
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.total_tokens, 3500);
        assert_eq!(summary.by_agent_type[0].agent_type, "engineer");
        assert_eq!(summary.by_agent_type[0].tokens, 3000);
        assert_eq!(summary.by_agent_type[1].agent_type, "unknown");
    }

    #[test]
    fn date_filters_keep_unparsable_timestamps() {
        let filter = MetricsFilter {
            since: NaiveDate::from_ymd_opt(2026, 1, 30),
            ..MetricsFilter::default()
        };
        let kept = filter_rows(ledger(), &filter);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0]["task_id"], "TASK-1776");

        let filter = MetricsFilter {
            until: NaiveDate::from_ymd_opt(2026, 1, 29),
            task_prefix: Some("TASK-17".into()),
            ..MetricsFilter::default()
        };
        let kept = filter_rows(ledger(), &filter);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["task_id"], "TASK-1775");
    }

    #[test]
    fn aggregate_sums_and_counts_unique_agents() {
        let totals = aggregate(&ledger(), EffortSelector::TaskPrefix("TASK-17".into())).unwrap();
        assert_eq!(totals.entries, 2);
        assert_eq!(totals.agent_sessions, 2);
        assert_eq!(totals.get("total_tokens"), 3000);
        assert_eq!(totals.get("api_calls"), 3);

        let json = serde_json::to_value(&totals).unwrap();
        assert_eq!(json["task_prefix"], "TASK-17");
        assert_eq!(json["entries"], 2);
    }

    #[test]
    fn token_sums_clamp_at_u64_max() {
        let rows = vec![
            row(&[
                ("agent_type", "engineer"),
                ("agent_id", "a1"),
                ("total_tokens", "18446744073709551615"),
            ]),
            row(&[
                ("agent_type", "engineer"),
                ("agent_id", "a1"),
                ("total_tokens", "1"),
            ]),
            row(&[("agent_type", "qa"), ("agent_id", "a1"), ("total_tokens", "1")]),
        ];

        let summary = summarize(&rows);
        assert_eq!(summary.by_agent_type[0].tokens, u64::MAX);
        assert_eq!(summary.total_tokens, u64::MAX);

        let totals = aggregate(&rows, EffortSelector::Agent("a1".into())).unwrap();
        assert_eq!(totals.get("total_tokens"), u64::MAX);
        assert_eq!(totals.entries, 3);
    }

    #[test]
    fn aggregate_rejects_empty_ledger() {
        assert!(matches!(
            aggregate(&[], EffortSelector::Session("s".into())),
            Err(MetricsError::EmptyLedger)
        ));
    }
}
