//! Subcommand handlers.

mod find;
mod ledger;
mod registers;

pub use find::cmd_find;
pub use ledger::{cmd_metrics_log, cmd_metrics_query, cmd_metrics_sum, cmd_metrics_summary};
pub use ledger::QueryFormat;
pub use registers::{
    cmd_analyze, cmd_dashboard, cmd_migrate_apply, cmd_migrate_propose, cmd_query, cmd_sync,
    cmd_update_dates, cmd_validate, AnalyzeFormat, QueryKind,
};

use std::process::ExitCode;

/// Exit code plus any error that aborted the command.
pub type CommandResult = anyhow::Result<ExitCode>;

/// Maximum validation issues printed before the remainder is summarized.
pub const MAX_LISTED_ISSUES: usize = 20;
