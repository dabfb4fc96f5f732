//! Agent token ledger rows (`tokens.csv`).
//!
//! # Invariants
//! - `billable_tokens == input_tokens + output_tokens`.
//! - `total_tokens == billable_tokens + cache_read + cache_create`.
//! - `timestamp` is UTC formatted as `%Y-%m-%dT%H:%M:%SZ`.

use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Ledger columns in file order.
pub const METRICS_COLUMNS: &[&str] = &[
    "timestamp",
    "session_id",
    "agent_id",
    "agent_type",
    "task_id",
    "description",
    "input_tokens",
    "output_tokens",
    "cache_read",
    "cache_create",
    "billable_tokens",
    "total_tokens",
    "api_calls",
    "duration_secs",
    "started_at",
    "ended_at",
];

/// Numeric ledger columns, summed by aggregations.
pub const NUMERIC_COLUMNS: &[&str] = &[
    "input_tokens",
    "output_tokens",
    "cache_read",
    "cache_create",
    "billable_tokens",
    "total_tokens",
    "api_calls",
    "duration_secs",
];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Caller-supplied fields of one ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageEntry {
    pub agent_type: String,
    pub task_id: String,
    pub description: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read: u64,
    pub cache_create: u64,
    pub api_calls: u64,
    pub duration_secs: u64,
    pub session_id: String,
    pub agent_id: String,
    pub started_at: String,
    pub ended_at: String,
}

/// A complete ledger row with derived totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsRecord {
    pub timestamp: String,
    pub session_id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub task_id: String,
    pub description: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read: u64,
    pub cache_create: u64,
    pub billable_tokens: u64,
    pub total_tokens: u64,
    pub api_calls: u64,
    pub duration_secs: u64,
    pub started_at: String,
    pub ended_at: String,
}

impl MetricsRecord {
    /// Stamps an entry and derives its billable and total counts.
    pub fn from_entry(entry: UsageEntry, now: DateTime<Utc>) -> Self {
        // Counts are caller-supplied; totals clamp at u64::MAX.
        let billable_tokens = entry.input_tokens.saturating_add(entry.output_tokens);
        Self {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            session_id: entry.session_id,
            agent_id: entry.agent_id,
            agent_type: entry.agent_type,
            task_id: entry.task_id,
            description: entry.description,
            input_tokens: entry.input_tokens,
            output_tokens: entry.output_tokens,
            cache_read: entry.cache_read,
            cache_create: entry.cache_create,
            billable_tokens,
            total_tokens: billable_tokens
                .saturating_add(entry.cache_read)
                .saturating_add(entry.cache_create),
            api_calls: entry.api_calls,
            duration_secs: entry.duration_secs,
            started_at: entry.started_at,
            ended_at: entry.ended_at,
        }
    }

    /// Reads a ledger row; numeric cells that fail to parse become `0`.
    pub fn from_record(record: &Record) -> Self {
        let text = |name: &str| record.get(name).cloned().unwrap_or_default();
        let number = |name: &str| record.get(name).map_or(0, |value| parse_count(value));
        Self {
            timestamp: text("timestamp"),
            session_id: text("session_id"),
            agent_id: text("agent_id"),
            agent_type: text("agent_type"),
            task_id: text("task_id"),
            description: text("description"),
            input_tokens: number("input_tokens"),
            output_tokens: number("output_tokens"),
            cache_read: number("cache_read"),
            cache_create: number("cache_create"),
            billable_tokens: number("billable_tokens"),
            total_tokens: number("total_tokens"),
            api_calls: number("api_calls"),
            duration_secs: number("duration_secs"),
            started_at: text("started_at"),
            ended_at: text("ended_at"),
        }
    }

    pub fn to_record(&self) -> Record {
        let numbers = [
            ("input_tokens", self.input_tokens),
            ("output_tokens", self.output_tokens),
            ("cache_read", self.cache_read),
            ("cache_create", self.cache_create),
            ("billable_tokens", self.billable_tokens),
            ("total_tokens", self.total_tokens),
            ("api_calls", self.api_calls),
            ("duration_secs", self.duration_secs),
        ];
        let texts = [
            ("timestamp", &self.timestamp),
            ("session_id", &self.session_id),
            ("agent_id", &self.agent_id),
            ("agent_type", &self.agent_type),
            ("task_id", &self.task_id),
            ("description", &self.description),
            ("started_at", &self.started_at),
            ("ended_at", &self.ended_at),
        ];

        let mut record = Record::new();
        for (name, value) in texts {
            record.insert(name.to_string(), value.clone());
        }
        for (name, value) in numbers {
            record.insert(name.to_string(), value.to_string());
        }
        record
    }
}

/// Lenient integer parse used for ledger cells.
pub fn parse_count(value: &str) -> u64 {
    value.trim().parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{MetricsRecord, UsageEntry};
    use chrono::{TimeZone, Utc};

    #[test]
    fn from_entry_derives_totals_and_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 1, 30, 9, 5, 0).unwrap();
        let record = MetricsRecord::from_entry(
            UsageEntry {
                agent_type: "engineer".into(),
                input_tokens: 5000,
                output_tokens: 3000,
                cache_read: 1000,
                cache_create: 500,
                ..UsageEntry::default()
            },
            now,
        );

        assert_eq!(record.timestamp, "2026-01-30T09:05:00Z");
        assert_eq!(record.billable_tokens, 8000);
        assert_eq!(record.total_tokens, 9500);
    }

    #[test]
    fn from_entry_clamps_totals_at_u64_max() {
        let now = Utc.with_ymd_and_hms(2026, 1, 30, 9, 5, 0).unwrap();
        let record = MetricsRecord::from_entry(
            UsageEntry {
                input_tokens: u64::MAX,
                output_tokens: 1,
                cache_read: 10,
                ..UsageEntry::default()
            },
            now,
        );

        assert_eq!(record.billable_tokens, u64::MAX);
        assert_eq!(record.total_tokens, u64::MAX);
    }

    #[test]
    fn from_record_tolerates_bad_numbers() {
        let mut row = crate::store::Record::new();
        row.insert("total_tokens".into(), "12x".into());
        row.insert("api_calls".into(), " 7 ".into());
        let record = MetricsRecord::from_record(&row);
        assert_eq!(record.total_tokens, 0);
        assert_eq!(record.api_calls, 7);
    }
}
