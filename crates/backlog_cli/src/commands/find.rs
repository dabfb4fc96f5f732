//! Full-text `find` command.

use super::CommandResult;
use backlog_core::{build_index, search_items, BacklogPaths, SearchQuery};
use std::io::Write;
use std::process::ExitCode;

pub fn cmd_find(paths: &BacklogPaths, query: &SearchQuery, out: &mut dyn Write) -> CommandResult {
    let conn = build_index(paths)?;
    let hits = search_items(&conn, query)?;
    if hits.is_empty() {
        writeln!(out, "No items found.")?;
        return Ok(ExitCode::SUCCESS);
    }

    writeln!(out, "Found {} item(s):\n", hits.len())?;
    for hit in &hits {
        writeln!(out, "{}: {} [{}]", hit.id, hit.title, hit.status)?;
        writeln!(out, "  {}", hit.snippet)?;
    }
    writeln!(out)?;
    Ok(ExitCode::SUCCESS)
}
