//! Backlog register commands: validate, query, analyze, sync, dashboard,
//! migrate and update-dates.

use super::{CommandResult, MAX_LISTED_ISSUES};
use anyhow::{bail, Context};
use backlog_core::model::item::BacklogItem;
use backlog_core::service::analysis::{analyze_repository, render_report, render_summary};
use backlog_core::service::dashboard::{generate_dashboard, open_in_browser};
use backlog_core::service::dates::{update_dates, DateField, DateSource, GitHistory};
use backlog_core::service::migration::{apply_review, write_review, Confidence};
use backlog_core::service::query_service::{sorted_by_count, ItemField};
use backlog_core::service::sync::{check_sync, fix_missing};
use backlog_core::service::validate::validate_all;
use backlog_core::{BacklogPaths, CsvBacklogRepository, QueryService};
use chrono::Local;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

const RULE_WIDTH: usize = 40;
const SYNC_RULE_WIDTH: usize = 50;

/// Query selector for `backlog query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum QueryKind {
    Status,
    Priority,
    Type,
    Area,
    Sprint,
    Search,
    Open,
    Ready,
    Stats,
}

impl QueryKind {
    fn name(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Priority => "priority",
            Self::Type => "type",
            Self::Area => "area",
            Self::Sprint => "sprint",
            Self::Search => "search",
            Self::Open => "open",
            Self::Ready => "ready",
            Self::Stats => "stats",
        }
    }
}

/// Output style for `backlog analyze`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyzeFormat {
    #[default]
    Report,
    Summary,
    Json,
}

pub fn cmd_validate(paths: &BacklogPaths, out: &mut dyn Write) -> CommandResult {
    writeln!(out, "Validating backlog data...")?;
    writeln!(out, "  Data dir: {}", paths.data_dir().display())?;
    writeln!(out, "  Items dir: {}", paths.items_dir().display())?;
    writeln!(out)?;

    let report = validate_all(paths)?;
    for file in &report.files {
        writeln!(out, "Checking {}...", file.file)?;
        writeln!(out, "  Found {} issues", file.issues.len())?;
    }
    writeln!(out)?;

    if report.passed() {
        writeln!(out, "VALIDATION PASSED")?;
        return Ok(ExitCode::SUCCESS);
    }

    writeln!(out, "VALIDATION FAILED")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    for issue in report.issues().take(MAX_LISTED_ISSUES) {
        writeln!(out, "  - {issue}")?;
    }
    let total = report.issue_count();
    if total > MAX_LISTED_ISSUES {
        writeln!(out, "  ... and {} more", total - MAX_LISTED_ISSUES)?;
    }
    Ok(ExitCode::FAILURE)
}

pub fn cmd_query(
    paths: &BacklogPaths,
    kind: QueryKind,
    value: Option<&str>,
    status: Option<&str>,
    verbose: bool,
    out: &mut dyn Write,
) -> CommandResult {
    let service = QueryService::new(CsvBacklogRepository::new(paths.clone()));

    let field = match kind {
        QueryKind::Stats => {
            print_statistics(&service, out)?;
            return Ok(ExitCode::SUCCESS);
        }
        QueryKind::Open => {
            print_items(&service.open()?, verbose, out)?;
            return Ok(ExitCode::SUCCESS);
        }
        QueryKind::Ready => {
            let items = service.ready()?;
            writeln!(
                out,
                "Ready for sprint planning ({} items, sorted by priority):\n",
                items.len()
            )?;
            for item in &items {
                let priority = if item.priority.is_empty() {
                    "-".to_string()
                } else {
                    item.priority.to_uppercase()
                };
                writeln!(out, "[{priority:8}] {}: {}", item.id, item.title)?;
            }
            return Ok(ExitCode::SUCCESS);
        }
        QueryKind::Search => None,
        QueryKind::Status => Some(ItemField::Status),
        QueryKind::Priority => Some(ItemField::Priority),
        QueryKind::Type => Some(ItemField::Type),
        QueryKind::Area => Some(ItemField::Area),
        QueryKind::Sprint => Some(ItemField::Sprint),
    };

    let Some(value) = value.filter(|value| !value.is_empty()) else {
        bail!("{} query requires a value", kind.name());
    };
    let items = match field {
        None => service.search(value)?,
        // The status filter only narrows priority, type and area queries.
        Some(field @ (ItemField::Priority | ItemField::Type | ItemField::Area)) => {
            service.filter(field, value, status)?
        }
        Some(field) => service.filter(field, value, None)?,
    };
    print_items(&items, verbose, out)?;
    Ok(ExitCode::SUCCESS)
}

fn print_items(items: &[BacklogItem], verbose: bool, out: &mut dyn Write) -> std::io::Result<()> {
    if items.is_empty() {
        return writeln!(out, "No items found.");
    }

    writeln!(out, "Found {} item(s):\n", items.len())?;
    for item in items {
        writeln!(out, "{}: {}", item.id, item.title)?;
        if verbose {
            writeln!(
                out,
                "  Status: {} | Priority: {} | Sprint: {}",
                or_dash(&item.status),
                or_dash(&item.priority),
                or_dash(&item.sprint)
            )?;
        }
    }
    writeln!(out)
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

fn print_statistics(
    service: &QueryService<CsvBacklogRepository>,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let stats = service.statistics()?;
    writeln!(out, "Backlog Statistics")?;
    writeln!(out, "{}", "=".repeat(RULE_WIDTH))?;
    writeln!(out, "Total items: {}", stats.total_items)?;
    writeln!(out, "Total sprints: {}", stats.total_sprints)?;
    writeln!(out)?;

    let groups: [(&str, &BTreeMap<String, usize>); 5] = [
        ("By Status:", &stats.by_status),
        ("By Priority:", &stats.by_priority),
        ("By Type:", &stats.by_type),
        ("By Area:", &stats.by_area),
        ("Sprints by Status:", &stats.sprints_by_status),
    ];
    for (heading, counts) in groups {
        writeln!(out, "{heading}")?;
        for (key, count) in sorted_by_count(counts) {
            writeln!(out, "  {key}: {count}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn cmd_analyze(
    paths: &BacklogPaths,
    format: AnalyzeFormat,
    out: &mut dyn Write,
) -> CommandResult {
    let repo = CsvBacklogRepository::new(paths.clone());
    let analysis = analyze_repository(&repo, Local::now())?;
    match format {
        AnalyzeFormat::Report => write!(out, "{}", render_report(&analysis))?,
        AnalyzeFormat::Summary => write!(out, "{}", render_summary(&analysis))?,
        AnalyzeFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&analysis)?)?,
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_sync(paths: &BacklogPaths, fix: bool, out: &mut dyn Write) -> CommandResult {
    let report = check_sync(paths)?;
    let rule = "=".repeat(SYNC_RULE_WIDTH);
    writeln!(out, "\n{rule}\nBACKLOG CSV SYNC CHECK\n{rule}\n")?;
    writeln!(out, "Markdown files: {}", report.md_count)?;
    writeln!(out, "CSV entries:    {}", report.csv_count)?;

    if !report.missing_from_csv.is_empty() {
        writeln!(out, "\nMissing from CSV ({}):", report.missing_from_csv.len())?;
        for id in &report.missing_from_csv {
            writeln!(out, "   - {id}")?;
        }
    }
    if !report.orphaned_in_csv.is_empty() {
        writeln!(out, "\nIn CSV but no markdown ({}):", report.orphaned_in_csv.len())?;
        for id in &report.orphaned_in_csv {
            writeln!(out, "   - {id}")?;
        }
    }
    if !report.invalid_statuses.is_empty() {
        writeln!(out, "\nInvalid status values:")?;
        for (id, status) in &report.invalid_statuses {
            writeln!(out, "   - {id}: '{status}'")?;
        }
    }

    if report.in_sync {
        writeln!(out, "\nCSV is in sync with markdown files\n")?;
        return Ok(ExitCode::SUCCESS);
    }

    writeln!(out, "\nCSV is OUT OF SYNC")?;
    if !fix {
        writeln!(out, "\nRun with --fix to add missing items\n")?;
        return Ok(ExitCode::FAILURE);
    }

    if !report.missing_from_csv.is_empty() {
        writeln!(out, "\nFixing...")?;
        let added = fix_missing(paths, &report.missing_from_csv, Local::now().date_naive())?;
        writeln!(out, "Added {added} items to CSV")?;
        writeln!(out, "Run `backlog dashboard` to update the dashboard\n")?;
    }
    // Invalid statuses are reported, never rewritten.
    if report.invalid_statuses.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

pub fn cmd_dashboard(
    paths: &BacklogPaths,
    output: &Path,
    open: bool,
    out: &mut dyn Write,
) -> CommandResult {
    let count = generate_dashboard(paths, output)?;
    writeln!(out, "Dashboard generated: {} ({count} items)", output.display())?;
    if open {
        open_in_browser(output)
            .with_context(|| format!("failed to open {}", output.display()))?;
        writeln!(out, "Opened in browser")?;
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_migrate_propose(
    paths: &BacklogPaths,
    output: &Path,
    out: &mut dyn Write,
) -> CommandResult {
    let rows = write_review(paths, output)?;
    let count = |level: Confidence| rows.iter().filter(|row| row.confidence == level).count();

    writeln!(out, "Review CSV generated: {}", output.display())?;
    writeln!(out, "Total items: {}", rows.len())?;
    writeln!(out, "  High confidence:    {}", count(Confidence::High))?;
    writeln!(out, "  Medium confidence:  {}", count(Confidence::Medium))?;
    writeln!(out, "  Low confidence:     {}", count(Confidence::Low))?;
    writeln!(out)?;
    writeln!(out, "Next steps:")?;
    writeln!(out, "  1. Review items sorted by confidence (low first)")?;
    writeln!(out, "  2. Fill in 'final_type' and 'final_area' where the proposal is wrong")?;
    writeln!(out, "  3. Leave them blank to accept the proposed values")?;
    writeln!(out, "  4. Run: backlog migrate apply {}", output.display())?;
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_migrate_apply(
    paths: &BacklogPaths,
    review_path: &Path,
    out: &mut dyn Write,
) -> CommandResult {
    let outcome = apply_review(paths, review_path)?;
    writeln!(
        out,
        "Applied {}/{} items to {}",
        outcome.applied,
        outcome.total,
        paths.backlog_csv().display()
    )?;
    if outcome.errors.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    writeln!(out, "\nWarnings ({}):", outcome.errors.len())?;
    for error in &outcome.errors {
        writeln!(out, "  {error}")?;
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cmd_update_dates(paths: &BacklogPaths, out: &mut dyn Write) -> CommandResult {
    writeln!(out, "Updating backlog dates from git history...\n")?;
    let history = GitHistory::new(paths.repo_root());
    let changes = update_dates(paths, &history)?;

    for change in &changes {
        let field = match change.field {
            DateField::CreatedAt => "created_at",
            DateField::CompletedAt => "completed_at",
        };
        let source = match change.source {
            DateSource::ItemFile => " (from MD file)",
            DateSource::Fallback => " (fallback)",
            DateSource::History => "",
        };
        writeln!(out, "  {}: {field} = {}{source}", change.id, change.date)?;
    }
    writeln!(out, "\nUpdated {} date fields", changes.len())?;
    writeln!(out, "CSV saved to: {}", paths.backlog_csv().display())?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::{cmd_query, cmd_sync, cmd_validate, QueryKind};
    use backlog_core::BacklogPaths;
    use std::process::ExitCode;

    fn seeded() -> (tempfile::TempDir, BacklogPaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = BacklogPaths::new(dir.path());
        std::fs::create_dir_all(paths.data_dir()).unwrap();
        std::fs::write(
            paths.backlog_csv(),
            "id,title,type,area,priority,status,sprint\n\
             BACKLOG-001,Fix login,bug,ui,Low,Pending,-\n\
             BACKLOG-002,Offline sync,feature,service,High,Pending,\n",
        )
        .unwrap();
        std::fs::write(paths.sprints_csv(), "sprint_id,status\n").unwrap();
        (dir, paths)
    }

    fn run_query(paths: &BacklogPaths, kind: QueryKind, value: Option<&str>) -> String {
        let mut out = Vec::new();
        cmd_query(paths, kind, value, None, true, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn ready_lists_by_priority_rank() {
        let (_dir, paths) = seeded();
        let text = run_query(&paths, QueryKind::Ready, None);
        let high = text.find("[HIGH    ] BACKLOG-002").unwrap();
        let low = text.find("[LOW     ] BACKLOG-001").unwrap();
        assert!(high < low);
    }

    #[test]
    fn value_queries_print_matches() {
        let (_dir, paths) = seeded();
        let text = run_query(&paths, QueryKind::Type, Some("BUG"));
        assert!(text.contains("Found 1 item(s):"));
        assert!(text.contains("  Status: Pending | Priority: Low | Sprint: -"));
        assert!(run_query(&paths, QueryKind::Search, Some("nothing")).contains("No items found."));
    }

    #[test]
    fn value_queries_require_a_value() {
        let (_dir, paths) = seeded();
        let mut out = Vec::new();
        let err = cmd_query(&paths, QueryKind::Sprint, None, None, false, &mut out).unwrap_err();
        assert_eq!(err.to_string(), "sprint query requires a value");
    }

    #[test]
    fn validate_passes_clean_registers() {
        let (_dir, paths) = seeded();
        let mut out = Vec::new();
        let code = cmd_validate(&paths, &mut out).unwrap();
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(String::from_utf8(out).unwrap().contains("VALIDATION PASSED"));
    }

    #[test]
    fn validate_lists_first_twenty_issues() {
        let (_dir, paths) = seeded();
        let rows = (1..=25)
            .map(|n| format!("BACKLOG-{n:03},Item {n},bug,ui,Urgent,Pending,-\n"))
            .collect::<String>();
        std::fs::write(
            paths.backlog_csv(),
            format!("id,title,type,area,priority,status,sprint\n{rows}"),
        )
        .unwrap();

        let mut out = Vec::new();
        let code = cmd_validate(&paths, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(text.contains("VALIDATION FAILED"));
        assert_eq!(text.matches("Invalid priority 'Urgent'").count(), 20);
        assert!(text.contains("  - BACKLOG-020: Invalid priority 'Urgent'"));
        assert!(!text.contains("BACKLOG-021"));
        assert!(text.trim_end().ends_with("  ... and 5 more"));
    }

    #[test]
    fn sync_fix_skips_banner_when_nothing_is_missing() {
        let (_dir, paths) = seeded();
        std::fs::create_dir_all(paths.items_dir()).unwrap();
        for id in ["BACKLOG-001", "BACKLOG-002"] {
            std::fs::write(paths.item_file(id), format!("# {id}: Item\n")).unwrap();
        }
        std::fs::write(
            paths.backlog_csv(),
            "id,title,status\nBACKLOG-001,Fix login,done\nBACKLOG-002,Offline sync,Pending\n",
        )
        .unwrap();

        let mut out = Vec::new();
        let code = cmd_sync(&paths, true, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(code, ExitCode::FAILURE);
        assert!(text.contains("   - BACKLOG-001: 'done'"));
        assert!(text.contains("CSV is OUT OF SYNC"));
        assert!(!text.contains("Fixing..."));
        assert!(!text.contains("Added 0"));
    }
}
