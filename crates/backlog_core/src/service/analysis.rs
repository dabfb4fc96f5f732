//! Backlog health analysis.
//!
//! # Responsibility
//! - Compute a serializable snapshot of backlog state: breakdowns, effort,
//!   sprint health, items needing attention, velocity, recent activity.
//! - Render the snapshot as a full text report or a short summary.
//!
//! # Invariants
//! - Analysis is a pure function of the registers and the supplied clock.
//! - Percentages never divide by zero.

use crate::model::changelog::ChangelogEntry;
use crate::model::item::{truncate_chars, BacklogItem};
use crate::model::sprint::Sprint;
use crate::model::tokens::{format_thousands, parse_tokens, EffortBucket};
use crate::model::values::{ItemStatus, Priority};
use crate::repo::backlog_repo::BacklogRepository;
use crate::service::query_service::{count_by, sorted_by_count};
use crate::store::StoreResult;
use chrono::{DateTime, Local};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::Write as _;

const TITLE_PREVIEW_CHARS: usize = 60;
const ATTENTION_LIST_LIMIT: usize = 10;
const RECENT_COMPLETIONS: usize = 10;
const REPORT_WIDTH: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacklogAnalysis {
    pub generated_at: String,
    pub summary: Summary,
    pub status_breakdown: BTreeMap<String, usize>,
    pub priority_breakdown: Breakdown,
    pub category_breakdown: Breakdown,
    pub effort_analysis: EffortAnalysis,
    pub sprint_health: SprintHealth,
    pub attention_needed: AttentionNeeded,
    pub velocity: Velocity,
    pub recent_activity: RecentActivity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total_items: usize,
    pub open_items: usize,
    pub completed_items: usize,
    pub obsolete_items: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub all: BTreeMap<String, usize>,
    pub open_only: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffortAnalysis {
    pub items_with_estimates: usize,
    pub items_without_estimates: usize,
    pub total_estimated_tokens: u64,
    pub total_estimated_tokens_formatted: String,
    /// Serialized as an object keyed by bucket label, in bucket order.
    #[serde(serialize_with = "bucket_map")]
    pub effort_buckets: Vec<(String, usize)>,
}

fn bucket_map<S: Serializer>(
    buckets: &[(String, usize)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(buckets.len()))?;
    for (label, count) in buckets {
        map.serialize_entry(label, count)?;
    }
    map.end()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SprintHealth {
    pub total_sprints: usize,
    pub sprint_statuses: BTreeMap<String, usize>,
    pub active_sprints: Vec<String>,
    pub items_in_sprints: usize,
    pub items_unassigned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemRef {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttentionNeeded {
    pub high_priority_unassigned: Vec<ItemRef>,
    pub high_priority_unassigned_count: usize,
    pub blocked_items: Vec<ItemRef>,
    pub testing_items: Vec<ItemRef>,
    pub reopened_items: Vec<ItemRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Velocity {
    pub items_with_actuals: usize,
    pub total_actual_tokens: u64,
    pub total_actual_tokens_formatted: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRef {
    pub date: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecentActivity {
    pub recent_completions: Vec<ActivityRef>,
}

/// Loads registers through `repo` and analyzes them.
pub fn analyze_repository<R: BacklogRepository>(
    repo: &R,
    now: DateTime<Local>,
) -> StoreResult<BacklogAnalysis> {
    let items = repo.items()?;
    let sprints = repo.sprints()?;
    let changelog = repo.changelog()?;
    Ok(analyze(&items, &sprints, &changelog, now))
}

/// Builds the analysis snapshot.
pub fn analyze(
    items: &[BacklogItem],
    sprints: &[Sprint],
    changelog: &[ChangelogEntry],
    now: DateTime<Local>,
) -> BacklogAnalysis {
    let status_counts = count_by(items, |item| item.status.as_str());
    let open_items = items
        .iter()
        .filter(|item| item.is_open())
        .cloned()
        .collect::<Vec<_>>();

    let (estimated, unestimated): (Vec<&BacklogItem>, Vec<&BacklogItem>) =
        open_items.iter().partition(|item| item.has_estimate());
    let estimates = estimated
        .iter()
        .map(|item| parse_tokens(&item.est_tokens))
        .collect::<Vec<_>>();
    let total_estimated_tokens = estimates
        .iter()
        .fold(0u64, |total, tokens| total.saturating_add(*tokens));
    let effort_buckets = EffortBucket::ALL
        .iter()
        .map(|bucket| {
            let count = estimates
                .iter()
                .filter(|tokens| EffortBucket::for_tokens(**tokens) == *bucket)
                .count();
            (bucket.label().to_string(), count)
        })
        .collect();

    let (in_sprints, unassigned): (Vec<&BacklogItem>, Vec<&BacklogItem>) =
        open_items.iter().partition(|item| !item.is_unassigned());
    let high_priority_unassigned = unassigned
        .iter()
        .filter(|item| item.is_high_priority())
        .collect::<Vec<_>>();

    let with_actuals = items
        .iter()
        .filter(|item| item.has_actual())
        .collect::<Vec<_>>();
    let total_actual_tokens = with_actuals
        .iter()
        .map(|item| parse_tokens(&item.actual_tokens))
        .fold(0u64, u64::saturating_add);

    let completions = changelog
        .iter()
        .filter(|entry| entry.is_completion())
        .collect::<Vec<_>>();
    let recent_completions = completions
        [completions.len().saturating_sub(RECENT_COMPLETIONS)..]
        .iter()
        .map(|entry| ActivityRef {
            date: entry.date.clone(),
            details: truncate_chars(&entry.details, TITLE_PREVIEW_CHARS),
        })
        .collect();

    BacklogAnalysis {
        generated_at: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        summary: Summary {
            total_items: items.len(),
            open_items: open_items.len(),
            completed_items: status_counts.get("completed").copied().unwrap_or(0),
            obsolete_items: status_counts.get("obsolete").copied().unwrap_or(0),
        },
        priority_breakdown: Breakdown {
            all: count_by(items, |item| item.priority.as_str()),
            open_only: count_by(&open_items, |item| item.priority.as_str()),
        },
        category_breakdown: Breakdown {
            all: count_by(items, BacklogItem::category_key),
            open_only: count_by(&open_items, BacklogItem::category_key),
        },
        status_breakdown: status_counts,
        effort_analysis: EffortAnalysis {
            items_with_estimates: estimated.len(),
            items_without_estimates: unestimated.len(),
            total_estimated_tokens,
            total_estimated_tokens_formatted: format_thousands(total_estimated_tokens),
            effort_buckets,
        },
        sprint_health: SprintHealth {
            total_sprints: sprints.len(),
            sprint_statuses: count_by(sprints, |sprint| sprint.status.as_str()),
            active_sprints: sprints
                .iter()
                .filter(|sprint| sprint.is_active())
                .map(|sprint| sprint.sprint_id.clone())
                .collect(),
            items_in_sprints: in_sprints.len(),
            items_unassigned: unassigned.len(),
        },
        attention_needed: AttentionNeeded {
            high_priority_unassigned: high_priority_unassigned
                .iter()
                .take(ATTENTION_LIST_LIMIT)
                .map(|item| item_ref(item, true))
                .collect(),
            high_priority_unassigned_count: high_priority_unassigned.len(),
            blocked_items: with_status(items, ItemStatus::Blocked),
            testing_items: with_status(items, ItemStatus::Testing),
            reopened_items: with_status(items, ItemStatus::Reopened),
        },
        velocity: Velocity {
            items_with_actuals: with_actuals.len(),
            total_actual_tokens,
            total_actual_tokens_formatted: if total_actual_tokens > 0 {
                format_thousands(total_actual_tokens)
            } else {
                "N/A".to_string()
            },
        },
        recent_activity: RecentActivity { recent_completions },
    }
}

fn item_ref(item: &BacklogItem, with_priority: bool) -> ItemRef {
    ItemRef {
        id: item.id.clone(),
        title: truncate_chars(&item.title, TITLE_PREVIEW_CHARS),
        priority: with_priority.then(|| item.priority.clone()),
    }
}

fn with_status(items: &[BacklogItem], status: ItemStatus) -> Vec<ItemRef> {
    items
        .iter()
        .filter(|item| item.status() == Some(status))
        .map(|item| item_ref(item, false))
        .collect()
}

fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn bar(pct: f64) -> String {
    "█".repeat((pct / 5.0) as usize)
}

/// Renders the full multi-section text report.
pub fn render_report(analysis: &BacklogAnalysis) -> String {
    let mut out = String::new();
    let rule = "=".repeat(REPORT_WIDTH);
    let s = &analysis.summary;

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "BACKLOG ANALYSIS REPORT");
    let _ = writeln!(out, "Generated: {}", analysis.generated_at);
    let _ = writeln!(out, "{rule}\n");

    let _ = writeln!(out, "## SUMMARY");
    let _ = writeln!(out, "  Total Items:     {}", s.total_items);
    let _ = writeln!(out, "  Open Items:      {}", s.open_items);
    let _ = writeln!(out, "  Completed:       {}", s.completed_items);
    let _ = writeln!(out, "  Obsolete:        {}\n", s.obsolete_items);

    let _ = writeln!(out, "## STATUS BREAKDOWN");
    for (status, count) in sorted_by_count(&analysis.status_breakdown) {
        let pct = percent(count, s.total_items);
        let _ = writeln!(out, "  {status:15} {count:4} ({pct:5.1}%) {}", bar(pct));
    }
    out.push('\n');

    let _ = writeln!(out, "## PRIORITY BREAKDOWN (Open Items Only)");
    for priority in Priority::ALL {
        let count = analysis
            .priority_breakdown
            .open_only
            .get(priority.as_str())
            .copied()
            .unwrap_or(0);
        if count > 0 {
            let pct = percent(count, s.open_items);
            let _ = writeln!(
                out,
                "  {:15} {count:4} ({pct:5.1}%) {}",
                priority.as_str(),
                bar(pct)
            );
        }
    }
    out.push('\n');

    let _ = writeln!(out, "## CATEGORY BREAKDOWN (Open Items, Top 10)");
    for (category, count) in sorted_by_count(&analysis.category_breakdown.open_only)
        .into_iter()
        .take(10)
    {
        let pct = percent(count, s.open_items);
        let _ = writeln!(out, "  {category:15} {count:4} ({pct:5.1}%)");
    }
    out.push('\n');

    let e = &analysis.effort_analysis;
    let _ = writeln!(out, "## EFFORT ANALYSIS");
    let _ = writeln!(out, "  Items with estimates:    {}", e.items_with_estimates);
    let _ = writeln!(out, "  Items without estimates: {}", e.items_without_estimates);
    let _ = writeln!(
        out,
        "  Total estimated effort:  {} tokens\n",
        e.total_estimated_tokens_formatted
    );
    let _ = writeln!(out, "  Effort Distribution:");
    for (bucket, count) in e.effort_buckets.iter().filter(|(_, count)| *count > 0) {
        let _ = writeln!(out, "    {bucket:20} {count:4}");
    }
    out.push('\n');

    let sp = &analysis.sprint_health;
    let active = if sp.active_sprints.is_empty() {
        "None".to_string()
    } else {
        sp.active_sprints.join(", ")
    };
    let _ = writeln!(out, "## SPRINT HEALTH");
    let _ = writeln!(out, "  Total Sprints:      {}", sp.total_sprints);
    let _ = writeln!(out, "  Active Sprints:     {active}");
    let _ = writeln!(out, "  Items in Sprints:   {}", sp.items_in_sprints);
    let _ = writeln!(out, "  Items Unassigned:   {}\n", sp.items_unassigned);

    let att = &analysis.attention_needed;
    let _ = writeln!(out, "## ATTENTION NEEDED\n");
    if !att.high_priority_unassigned.is_empty() {
        let _ = writeln!(
            out,
            "  High Priority Unassigned ({} total):",
            att.high_priority_unassigned_count
        );
        for item in att.high_priority_unassigned.iter().take(5) {
            let priority = item.priority.as_deref().unwrap_or("-");
            let _ = writeln!(out, "    [{priority:8}] {}: {}", item.id, item.title);
        }
        if att.high_priority_unassigned_count > 5 {
            let _ = writeln!(
                out,
                "    ... and {} more",
                att.high_priority_unassigned_count - 5
            );
        }
        out.push('\n');
    }
    render_item_list(&mut out, "Blocked Items", &att.blocked_items);
    render_item_list(&mut out, "Awaiting User Verification", &att.testing_items);
    render_item_list(&mut out, "Reopened (Failed Testing)", &att.reopened_items);

    let v = &analysis.velocity;
    if v.items_with_actuals > 0 {
        let _ = writeln!(out, "## VELOCITY");
        let _ = writeln!(out, "  Completed with tracking: {} items", v.items_with_actuals);
        let _ = writeln!(
            out,
            "  Total actual tokens:     {}\n",
            v.total_actual_tokens_formatted
        );
    }

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "END OF REPORT");
    let _ = writeln!(out, "{rule}");
    out
}

fn render_item_list(out: &mut String, heading: &str, items: &[ItemRef]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {heading} ({}):", items.len());
    for item in items {
        let _ = writeln!(out, "    {}: {}", item.id, item.title);
    }
    out.push('\n');
}

/// Renders the few-line summary.
pub fn render_summary(analysis: &BacklogAnalysis) -> String {
    let mut out = String::new();
    let s = &analysis.summary;
    let att = &analysis.attention_needed;
    let open_priority = &analysis.priority_breakdown.open_only;
    let active = if analysis.sprint_health.active_sprints.is_empty() {
        "None active".to_string()
    } else {
        analysis.sprint_health.active_sprints.join(", ")
    };

    let _ = writeln!(
        out,
        "Backlog: {} open ({} completed)",
        s.open_items, s.completed_items
    );
    let _ = writeln!(
        out,
        "Priority: {} critical, {} high",
        open_priority.get("critical").copied().unwrap_or(0),
        open_priority.get("high").copied().unwrap_or(0)
    );
    let _ = writeln!(out, "Sprints: {active}");

    if att.high_priority_unassigned_count > 0 {
        let _ = writeln!(
            out,
            "⚠️  {} high-priority items unassigned",
            att.high_priority_unassigned_count
        );
    }
    if !att.blocked_items.is_empty() {
        let _ = writeln!(out, "⚠️  {} blocked items", att.blocked_items.len());
    }
    if !att.reopened_items.is_empty() {
        let _ = writeln!(
            out,
            "⚠️  {} reopened items need attention",
            att.reopened_items.len()
        );
    }
    out
}
