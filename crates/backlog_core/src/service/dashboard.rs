//! HTML dashboard export.
//!
//! # Responsibility
//! - Enrich backlog rows with descriptions taken from item markdown files.
//! - Inject the rows as JSON into an HTML template.
//!
//! # Invariants
//! - Every CSV column is exported; `description` is always present.
//! - The template placeholder is replaced verbatim; no other template text
//!   changes.

use crate::config::BacklogPaths;
use crate::store::{read_backlog_table, read_markdown, Record, StoreError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Token replaced by the JSON item array.
pub const DATA_PLACEHOLDER: &str = "BACKLOG_DATA_PLACEHOLDER";
/// Default output file name, relative to the working directory.
pub const DEFAULT_OUTPUT_FILE: &str = "backlog-dashboard.html";

const DESCRIPTION_HEADINGS: &[&str] = &[
    "Description",
    "Summary",
    "Problem Statement",
    "Problem",
    "Background",
    "Overview",
];
const MAX_DESCRIPTION_CHARS: usize = 500;

const DEFAULT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Backlog Dashboard</title>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 4px 8px; text-align: left; vertical-align: top; }
th { background: #f4f4f4; }
</style>
</head>
<body>
<h1>Backlog Dashboard</h1>
<p id="summary"></p>
<table id="items"><thead><tr>
<th>ID</th><th>Title</th><th>Priority</th><th>Status</th><th>Sprint</th><th>Description</th>
</tr></thead><tbody></tbody></table>
<script>
const BACKLOG = BACKLOG_DATA_PLACEHOLDER;
const body = document.querySelector("#items tbody");
for (const item of BACKLOG) {
  const row = document.createElement("tr");
  for (const key of ["id", "title", "priority", "status", "sprint", "description"]) {
    const cell = document.createElement("td");
    cell.textContent = item[key] || "";
    row.appendChild(cell);
  }
  body.appendChild(row);
}
document.querySelector("#summary").textContent = BACKLOG.length + " items";
</script>
</body>
</html>
"##;

/// Dashboard generation error.
#[derive(Debug)]
pub enum DashboardError {
    Store(StoreError),
    Json(serde_json::Error),
    Write {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

impl Display for DashboardError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "failed to encode dashboard data: {err}"),
            Self::Write { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
        }
    }
}

impl Error for DashboardError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::Write { source, .. } => Some(source),
        }
    }
}

impl From<StoreError> for DashboardError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<serde_json::Error> for DashboardError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// First non-empty section body under a known description heading.
///
/// Bodies run until the next `## ` heading and are truncated to 500
/// characters plus `...`.
pub fn extract_description(markdown: &str) -> String {
    for heading in DESCRIPTION_HEADINGS {
        let marker = format!("## {heading}");
        let Some(body) = section_body(markdown, &marker) else {
            continue;
        };
        let body = body.trim();
        if body.is_empty() {
            continue;
        }
        if body.chars().count() > MAX_DESCRIPTION_CHARS {
            let mut truncated = body.chars().take(MAX_DESCRIPTION_CHARS).collect::<String>();
            truncated.push_str("...");
            return truncated;
        }
        return body.to_string();
    }
    String::new()
}

/// Text after the first `marker` line, up to the next `## ` heading or the
/// end. A marker followed by other text on its line does not count.
fn section_body<'a>(markdown: &'a str, marker: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(found) = markdown[search_from..].find(marker) {
        let after_marker = search_from + found + marker.len();
        let rest = &markdown[after_marker..];
        let whitespace = rest.len() - rest.trim_start().len();
        if let Some(newline) = rest[..whitespace].find('\n') {
            let body = &rest[newline + 1..];
            let end = if body.starts_with("## ") {
                0
            } else {
                body.find("\n## ").unwrap_or(body.len())
            };
            return Some(&body[..end]);
        }
        search_from = after_marker;
    }
    None
}

/// Backlog rows with `description` taken from the item file when it has one.
pub fn load_dashboard_items(paths: &BacklogPaths) -> Result<Vec<Record>, StoreError> {
    let table = read_backlog_table(paths)?;
    let mut items = Vec::with_capacity(table.rows.len());
    for mut row in table.rows {
        let id = row.get("id").cloned().unwrap_or_default();
        let from_markdown = read_markdown(&paths.item_file(&id))?
            .map(|content| extract_description(&content))
            .unwrap_or_default();
        let description = if from_markdown.is_empty() {
            row.get("description")
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        } else {
            from_markdown
        };
        row.insert("description".to_string(), description);
        items.push(row);
    }
    Ok(items)
}

/// Substitutes the item JSON into `template`.
pub fn render_dashboard(template: &str, items: &[Record]) -> Result<String, DashboardError> {
    // `</` would end the surrounding <script> element early.
    let json = serde_json::to_string_pretty(items)?.replace("</", "<\\/");
    Ok(template.replace(DATA_PLACEHOLDER, &json))
}

/// Writes the dashboard for `paths` to `output`, returning the item count.
///
/// Uses `<root>/dashboard.html` as template when present.
pub fn generate_dashboard(paths: &BacklogPaths, output: &Path) -> Result<usize, DashboardError> {
    let items = load_dashboard_items(paths)?;
    let template = read_markdown(&paths.dashboard_template())?;
    let html = render_dashboard(template.as_deref().unwrap_or(DEFAULT_TEMPLATE), &items)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DashboardError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(output, html).map_err(|source| DashboardError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    info!(
        "event=dashboard_generate module=service status=ok items={} custom_template={} output={}",
        items.len(),
        template.is_some(),
        output.display()
    );
    Ok(items.len())
}

/// Opens `path` with the platform's default handler.
pub fn open_in_browser(path: &Path) -> std::io::Result<()> {
    let target = path.canonicalize()?;
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", ""]);
        command
    } else {
        std::process::Command::new("xdg-open")
    };
    command.arg(target).status()?;
    Ok(())
}
