//! Agent token ledger commands.

use super::CommandResult;
use anyhow::bail;
use backlog_core::model::values::AgentType;
use backlog_core::service::metrics::{
    aggregate, filter_rows, load_rows, log_usage, rows_to_csv, rows_to_json, summarize,
    EffortSelector, MetricsError, MetricsFilter,
};
use backlog_core::{MetricsPaths, UsageEntry};
use chrono::Utc;
use std::io::Write;
use std::process::ExitCode;

const RULE_WIDTH: usize = 40;

/// Output style for `backlog metrics query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryFormat {
    #[default]
    Csv,
    Json,
    Count,
}

pub fn cmd_metrics_log(
    paths: &MetricsPaths,
    entry: UsageEntry,
    out: &mut dyn Write,
) -> CommandResult {
    if AgentType::parse(&entry.agent_type).is_none() {
        let valid = AgentType::ALL
            .iter()
            .map(|agent| agent.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("invalid agent type '{}' (expected one of: {valid})", entry.agent_type);
    }

    let record = log_usage(paths, entry, Utc::now())?;
    writeln!(out, "Logged metrics for {}", record.agent_type)?;
    writeln!(out, "  Task: {}", or_none(&record.task_id))?;
    writeln!(out, "  Description: {}", or_none(&record.description))?;
    writeln!(
        out,
        "  Tokens: {} total ({} in, {} out)",
        grouped(record.total_tokens),
        grouped(record.input_tokens),
        grouped(record.output_tokens)
    )?;
    if record.duration_secs > 0 {
        writeln!(out, "  Duration: {}s", record.duration_secs)?;
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_metrics_summary(paths: &MetricsPaths, out: &mut dyn Write) -> CommandResult {
    let Some(rows) = load_rows(paths)? else {
        writeln!(out, "No metrics file found.")?;
        return Ok(ExitCode::SUCCESS);
    };
    if rows.is_empty() {
        writeln!(out, "No metrics logged yet.")?;
        return Ok(ExitCode::SUCCESS);
    }

    let summary = summarize(&rows);
    writeln!(out, "\nMetrics Summary ({} entries)", summary.entries)?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    for usage in &summary.by_agent_type {
        writeln!(
            out,
            "  {:12} {:4} entries  {:>12} tokens",
            usage.agent_type,
            usage.entries,
            grouped(usage.tokens)
        )?;
    }
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(
        out,
        "  {:12} {:4} entries  {:>12} tokens",
        "TOTAL",
        summary.entries,
        grouped(summary.total_tokens)
    )?;
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_metrics_query(
    paths: &MetricsPaths,
    filter: &MetricsFilter,
    format: QueryFormat,
    out: &mut dyn Write,
    err: &mut dyn Write,
) -> CommandResult {
    let rows = filter_rows(load_rows(paths)?.unwrap_or_default(), filter);
    match format {
        QueryFormat::Count => writeln!(out, "{}", rows.len())?,
        QueryFormat::Json => writeln!(out, "{}", rows_to_json(&rows)?)?,
        QueryFormat::Csv if rows.is_empty() => writeln!(err, "No matching entries found.")?,
        QueryFormat::Csv => write!(out, "{}", rows_to_csv(&rows)?)?,
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_metrics_sum(
    paths: &MetricsPaths,
    selector: EffortSelector,
    pretty: bool,
    out: &mut dyn Write,
) -> CommandResult {
    let rows = load_rows(paths)?.unwrap_or_default();
    let totals = match aggregate(&rows, selector) {
        Ok(totals) => totals,
        Err(MetricsError::EmptyLedger) => bail!("No metrics file found or empty"),
        Err(other) => return Err(other.into()),
    };

    let json = if pretty {
        serde_json::to_string_pretty(&totals)?
    } else {
        serde_json::to_string(&totals)?
    };
    writeln!(out, "{json}")?;
    Ok(ExitCode::SUCCESS)
}

fn or_none(value: &str) -> &str {
    if value.is_empty() {
        "(none)"
    } else {
        value
    }
}

/// Comma-grouped integer, e.g. `1,234,567`.
fn grouped(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::grouped;

    #[test]
    fn grouping_inserts_thousands_separators() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(999), "999");
        assert_eq!(grouped(1_000), "1,000");
        assert_eq!(grouped(12_345_678), "12,345,678");
    }
}
