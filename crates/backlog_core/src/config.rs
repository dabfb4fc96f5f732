//! Filesystem layout of a backlog root and a metrics directory.
//!
//! # Responsibility
//! - Derive every register path from one root so callers never join paths
//!   by hand.
//!
//! # Invariants
//! - Paths are derived, never probed; existence is checked by the store.

use std::path::{Component, Path, PathBuf};

/// Default backlog root relative to the repository root.
pub const DEFAULT_BACKLOG_ROOT: &str = ".claude/plans/backlog";
/// Default metrics directory relative to the repository root.
pub const DEFAULT_METRICS_DIR: &str = ".claude/metrics";

const DATA_DIR: &str = "data";
const ITEMS_DIR: &str = "items";
const BACKLOG_FILE: &str = "backlog.csv";
const SPRINTS_FILE: &str = "sprints.csv";
const CHANGELOG_FILE: &str = "changelog.csv";
const DASHBOARD_TEMPLATE_FILE: &str = "dashboard.html";
const METRICS_FILE: &str = "tokens.csv";

/// Resolved locations of the backlog registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogPaths {
    root: PathBuf,
}

impl BacklogPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn items_dir(&self) -> PathBuf {
        self.root.join(ITEMS_DIR)
    }

    pub fn backlog_csv(&self) -> PathBuf {
        self.data_dir().join(BACKLOG_FILE)
    }

    pub fn sprints_csv(&self) -> PathBuf {
        self.data_dir().join(SPRINTS_FILE)
    }

    pub fn changelog_csv(&self) -> PathBuf {
        self.data_dir().join(CHANGELOG_FILE)
    }

    pub fn dashboard_template(&self) -> PathBuf {
        self.root.join(DASHBOARD_TEMPLATE_FILE)
    }

    /// Markdown detail file for one item id.
    pub fn item_file(&self, item_id: &str) -> PathBuf {
        self.items_dir().join(format!("{item_id}.md"))
    }

    /// Repository root, assuming the conventional `<repo>/.claude/plans/backlog`
    /// nesting. Falls back to the backlog root itself for shallow layouts.
    pub fn repo_root(&self) -> PathBuf {
        self.root
            .ancestors()
            .nth(3)
            .map(|path| {
                if path.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    path.to_path_buf()
                }
            })
            .unwrap_or_else(|| self.root.clone())
    }

    /// Backlog root relative to [`Self::repo_root`], `/`-joined for git
    /// pathspecs. Empty for shallow layouts.
    pub fn repo_relative_root(&self) -> String {
        let components = self
            .root
            .components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>();
        if self.root.ancestors().nth(3).is_none() || components.len() < 3 {
            return String::new();
        }
        components[components.len() - 3..].join("/")
    }
}

/// Resolved location of the agent token ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsPaths {
    dir: PathBuf,
}

impl MetricsPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn tokens_csv(&self) -> PathBuf {
        self.dir.join(METRICS_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::{BacklogPaths, MetricsPaths};
    use std::path::PathBuf;

    #[test]
    fn backlog_paths_follow_conventional_layout() {
        let paths = BacklogPaths::new("/repo/.claude/plans/backlog");
        assert_eq!(
            paths.backlog_csv(),
            PathBuf::from("/repo/.claude/plans/backlog/data/backlog.csv")
        );
        assert_eq!(
            paths.item_file("BACKLOG-007"),
            PathBuf::from("/repo/.claude/plans/backlog/items/BACKLOG-007.md")
        );
        assert_eq!(paths.repo_root(), PathBuf::from("/repo"));
        assert_eq!(paths.repo_relative_root(), ".claude/plans/backlog");
    }

    #[test]
    fn repo_root_falls_back_for_shallow_roots() {
        let paths = BacklogPaths::new("backlog");
        assert_eq!(paths.repo_root(), PathBuf::from("backlog"));
        assert_eq!(paths.repo_relative_root(), "");

        let relative = BacklogPaths::new(".claude/plans/backlog");
        assert_eq!(relative.repo_root(), PathBuf::from("."));
    }

    #[test]
    fn metrics_paths_point_at_tokens_csv() {
        let paths = MetricsPaths::new("/repo/.claude/metrics");
        assert_eq!(
            paths.tokens_csv(),
            PathBuf::from("/repo/.claude/metrics/tokens.csv")
        );
    }
}
