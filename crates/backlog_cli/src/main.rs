//! `backlog` command-line entry point.
//!
//! # Responsibility
//! - Parse arguments and resolve register locations.
//! - Start file logging when `--log-dir` is given.
//! - Map command failures to exit code 1.

use anyhow::{anyhow, Context};
use backlog_cli::commands::{
    cmd_analyze, cmd_dashboard, cmd_find, cmd_metrics_log, cmd_metrics_query, cmd_metrics_sum,
    cmd_metrics_summary, cmd_migrate_apply, cmd_migrate_propose, cmd_query, cmd_sync,
    cmd_update_dates, cmd_validate, AnalyzeFormat, CommandResult, QueryFormat, QueryKind,
};
use backlog_core::service::dashboard::DEFAULT_OUTPUT_FILE;
use backlog_core::service::metrics::{EffortSelector, MetricsFilter};
use backlog_core::service::migration::DEFAULT_REVIEW_FILE;
use backlog_core::{
    default_log_level, init_logging, BacklogPaths, MetricsPaths, SearchQuery, UsageEntry,
    DEFAULT_BACKLOG_ROOT, DEFAULT_METRICS_DIR,
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Backlog, sprint and agent-metrics toolkit.
#[derive(Parser, Debug)]
#[command(name = "backlog", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Backlog root containing `data/` and `items/`
    #[arg(long, global = true, env = "BACKLOG_ROOT", default_value = DEFAULT_BACKLOG_ROOT)]
    root: PathBuf,

    /// Directory holding the agent token ledger
    #[arg(long, global = true, env = "BACKLOG_METRICS_DIR", default_value = DEFAULT_METRICS_DIR)]
    metrics_dir: PathBuf,

    /// Log level for file logging (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write rotating log files to this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the CSV registers for schema and value errors
    Validate,
    /// List items by field, search titles, or show statistics
    Query {
        #[arg(value_enum)]
        kind: QueryKind,
        /// Value to match (required for status, priority, type, area, sprint, search)
        value: Option<String>,
        /// Additional status filter for priority, type and area queries
        #[arg(long)]
        status: Option<String>,
        /// Show status, priority and sprint for each item
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the backlog health report
    Analyze {
        /// Print only the short summary
        #[arg(long, conflicts_with = "json")]
        summary: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compare item markdown files with backlog.csv
    Sync {
        /// Add rows for item files missing from the CSV
        #[arg(long)]
        fix: bool,
    },
    /// Generate the HTML dashboard
    Dashboard {
        #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
        output: PathBuf,
        /// Open the result in the default browser
        #[arg(long)]
        open: bool,
    },
    /// Migrate the legacy category column to type and area
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Backfill created_at and completed_at from git history
    UpdateDates,
    /// Agent token ledger
    Metrics {
        #[command(subcommand)]
        action: MetricsAction,
    },
    /// Full-text search over ids, titles and item descriptions
    Find {
        #[arg(required = true)]
        text: Vec<String>,
        /// Only items with this status
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Pass the text to SQLite FTS5 unchanged
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand, Debug)]
enum MigrateAction {
    /// Write a review CSV with proposed type and area per item
    Propose {
        #[arg(short, long, default_value = DEFAULT_REVIEW_FILE)]
        output: PathBuf,
    },
    /// Apply a reviewed CSV to backlog.csv
    Apply { review: PathBuf },
}

#[derive(Subcommand, Debug)]
enum MetricsAction {
    /// Append one entry to the ledger
    Log(LogArgs),
    /// Entries and tokens per agent type
    Summary,
    /// Filter ledger rows
    Query {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output as JSON
        #[arg(short, long, conflicts_with = "count")]
        json: bool,
        /// Only print the number of matches
        #[arg(short, long)]
        count: bool,
    },
    /// Sum effort for one task, task prefix, session or agent
    Sum {
        #[command(flatten)]
        selector: SumArgs,
        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },
}

#[derive(Args, Debug)]
struct LogArgs {
    #[arg(short = 't', long)]
    agent_type: String,
    #[arg(short = 'i', long, default_value = "")]
    task_id: String,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(long = "input", default_value_t = 0)]
    input_tokens: u64,
    #[arg(long = "output", default_value_t = 0)]
    output_tokens: u64,
    #[arg(long, default_value_t = 0)]
    cache_read: u64,
    #[arg(long, default_value_t = 0)]
    cache_create: u64,
    #[arg(long, default_value_t = 0)]
    api_calls: u64,
    #[arg(long = "duration", default_value_t = 0)]
    duration_secs: u64,
    #[arg(long, default_value = "")]
    session_id: String,
    #[arg(long, default_value = "")]
    agent_id: String,
    #[arg(long, default_value = "")]
    started_at: String,
    #[arg(long, default_value = "")]
    ended_at: String,
}

impl From<LogArgs> for UsageEntry {
    fn from(args: LogArgs) -> Self {
        Self {
            agent_type: args.agent_type,
            task_id: args.task_id,
            description: args.description,
            input_tokens: args.input_tokens,
            output_tokens: args.output_tokens,
            cache_read: args.cache_read,
            cache_create: args.cache_create,
            api_calls: args.api_calls,
            duration_secs: args.duration_secs,
            session_id: args.session_id,
            agent_id: args.agent_id,
            started_at: args.started_at,
            ended_at: args.ended_at,
        }
    }
}

#[derive(Args, Debug)]
struct FilterArgs {
    #[arg(short = 't', long)]
    task: Option<String>,
    #[arg(long)]
    task_prefix: Option<String>,
    #[arg(short = 'a', long)]
    agent_type: Option<String>,
    #[arg(short = 's', long)]
    session_id: Option<String>,
    #[arg(long)]
    agent_id: Option<String>,
    /// Entries on or after this date (YYYY-MM-DD)
    #[arg(long)]
    since: Option<NaiveDate>,
    /// Entries on or before this date (YYYY-MM-DD)
    #[arg(long)]
    until: Option<NaiveDate>,
}

impl From<FilterArgs> for MetricsFilter {
    fn from(args: FilterArgs) -> Self {
        Self {
            task: args.task,
            task_prefix: args.task_prefix,
            agent_type: args.agent_type,
            session_id: args.session_id,
            agent_id: args.agent_id,
            since: args.since,
            until: args.until,
        }
    }
}

/// Exactly one selector is accepted.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct SumArgs {
    #[arg(short = 't', long)]
    task: Option<String>,
    #[arg(long)]
    task_prefix: Option<String>,
    #[arg(short = 's', long)]
    session_id: Option<String>,
    #[arg(short = 'a', long)]
    agent_id: Option<String>,
}

impl SumArgs {
    fn into_selector(self) -> anyhow::Result<EffortSelector> {
        self.task
            .map(EffortSelector::Task)
            .or(self.task_prefix.map(EffortSelector::TaskPrefix))
            .or(self.session_id.map(EffortSelector::Session))
            .or(self.agent_id.map(EffortSelector::Agent))
            .ok_or_else(|| anyhow!("a sum selector is required"))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            error!("event=command module=cli status=error error={err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CommandResult {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let log_dir = if log_dir.is_absolute() {
            log_dir.to_path_buf()
        } else {
            std::env::current_dir()
                .context("failed to resolve the working directory")?
                .join(log_dir)
        };
        let level = cli.log_level.as_deref().unwrap_or_else(|| default_log_level());
        init_logging(level, &log_dir).map_err(|message| anyhow!(message))?;
    }

    let paths = BacklogPaths::new(cli.root);
    let metrics = MetricsPaths::new(cli.metrics_dir);
    info!(
        "event=command module=cli status=start root={} metrics_dir={}",
        paths.root().display(),
        metrics.dir().display()
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let code = dispatch(cli.command, &paths, &metrics, &mut out)?;
    out.flush()?;
    Ok(code)
}

fn dispatch(
    command: Command,
    paths: &BacklogPaths,
    metrics: &MetricsPaths,
    out: &mut dyn Write,
) -> CommandResult {
    match command {
        Command::Validate => cmd_validate(paths, out),
        Command::Query {
            kind,
            value,
            status,
            verbose,
        } => cmd_query(
            paths,
            kind,
            value.as_deref(),
            status.as_deref(),
            verbose,
            out,
        ),
        Command::Analyze { summary, json } => {
            let format = if json {
                AnalyzeFormat::Json
            } else if summary {
                AnalyzeFormat::Summary
            } else {
                AnalyzeFormat::Report
            };
            cmd_analyze(paths, format, out)
        }
        Command::Sync { fix } => cmd_sync(paths, fix, out),
        Command::Dashboard { output, open } => cmd_dashboard(paths, &output, open, out),
        Command::Migrate { action } => match action {
            MigrateAction::Propose { output } => cmd_migrate_propose(paths, &output, out),
            MigrateAction::Apply { review } => cmd_migrate_apply(paths, &review, out),
        },
        Command::UpdateDates => cmd_update_dates(paths, out),
        Command::Metrics { action } => match action {
            MetricsAction::Log(args) => cmd_metrics_log(metrics, args.into(), out),
            MetricsAction::Summary => cmd_metrics_summary(metrics, out),
            MetricsAction::Query {
                filter,
                json,
                count,
            } => {
                let format = if count {
                    QueryFormat::Count
                } else if json {
                    QueryFormat::Json
                } else {
                    QueryFormat::Csv
                };
                let mut err = std::io::stderr();
                cmd_metrics_query(metrics, &filter.into(), format, out, &mut err)
            }
            MetricsAction::Sum { selector, pretty } => {
                cmd_metrics_sum(metrics, selector.into_selector()?, pretty, out)
            }
        },
        Command::Find {
            text,
            status,
            limit,
            raw,
        } => {
            let mut query = SearchQuery::new(text.join(" "));
            query.status = status;
            query.limit = limit;
            query.raw_fts_syntax = raw;
            cmd_find(paths, &query, out)
        }
    }
}
