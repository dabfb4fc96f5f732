//! Normalization helpers and register enumerations.

/// Placeholder used by the registers for "no value".
pub const UNSET: &str = "-";

/// Normalizes a register value for comparison.
///
/// Lowercases, trims, and strips markdown emphasis markers (`*`, `_`), so
/// `**High**` and `high` compare equal.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase().replace(['*', '_'], "")
}

/// Returns whether a raw cell is empty or the `-` placeholder.
pub fn is_unset(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed == UNSET
}

/// Grouping key used by breakdowns; blank cells group as `unknown`.
pub fn group_key(value: &str) -> String {
    let normalized = normalize(value);
    if normalized.is_empty() {
        "unknown".to_string()
    } else {
        normalized
    }
}

macro_rules! register_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident => $canonical:literal $(| $alias:literal)* ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            /// Every variant in declaration order.
            pub const ALL: &'static [$name] = &[ $( $name::$variant, )+ ];

            /// Parses a raw register cell leniently (see [`normalize`]).
            pub fn parse(raw: &str) -> Option<Self> {
                match normalize(raw).as_str() {
                    $( $canonical $(| $alias)* => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Canonical lowercase spelling.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $canonical, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }
    };
}

register_enum! {
    /// Kind of work an item represents.
    ItemType {
        Bug => "bug",
        Feature => "feature",
        Chore => "chore",
        Refactor => "refactor",
        Test => "test",
        Docs => "docs",
    }
}

register_enum! {
    /// Part of the product an item touches.
    Area {
        Ui => "ui",
        Electron => "electron",
        Infra => "infra",
        Service => "service",
        Security => "security",
        Schema => "schema",
        Ipc => "ipc",
    }
}

register_enum! {
    /// Scheduling priority; declaration order is planning order.
    Priority {
        Critical => "critical",
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

register_enum! {
    /// Lifecycle state of a backlog item.
    ItemStatus {
        Pending => "pending",
        InProgress => "in-progress" | "in progress",
        Completed => "completed",
        Blocked => "blocked",
        Deferred => "deferred",
        Obsolete => "obsolete",
        Reopened => "reopened",
        Testing => "testing",
        // legacy value still present in older rows
        NeedsFeature => "needs feature",
    }
}

register_enum! {
    /// Lifecycle state of a sprint.
    SprintStatus {
        Planning => "planning",
        Planned => "planned",
        Active => "active",
        Complete => "complete",
        Completed => "completed",
        Deprecated => "deprecated",
    }
}

register_enum! {
    /// Role of the agent that produced a metrics row.
    AgentType {
        Engineer => "engineer",
        Pm => "pm",
        SrEngineer => "sr-engineer",
        Qa => "qa",
        Explore => "explore",
        Fix => "fix",
        Main => "main",
    }
}

/// Rank used when sorting raw priority text; unknown values sort last.
pub fn priority_rank(raw: &str) -> u32 {
    match Priority::parse(raw) {
        Some(Priority::Critical) => 0,
        Some(Priority::High) => 1,
        Some(Priority::Medium) => 2,
        Some(Priority::Low) => 3,
        None => 99,
    }
}

impl ItemStatus {
    /// Closed items no longer count toward open work.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Obsolete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_markdown_and_case() {
        assert_eq!(normalize("  **High** "), "high");
        assert_eq!(normalize("_In Progress_"), "in progress");
    }

    #[test]
    fn item_status_accepts_both_in_progress_spellings() {
        assert_eq!(ItemStatus::parse("In Progress"), Some(ItemStatus::InProgress));
        assert_eq!(ItemStatus::parse("in-progress"), Some(ItemStatus::InProgress));
        assert_eq!(ItemStatus::parse("Needs Feature"), Some(ItemStatus::NeedsFeature));
        assert_eq!(ItemStatus::parse("wip"), None);
    }

    #[test]
    fn agent_type_keeps_hyphenated_names() {
        assert_eq!(AgentType::parse("sr-engineer"), Some(AgentType::SrEngineer));
        assert_eq!(AgentType::SrEngineer.as_str(), "sr-engineer");
    }

    #[test]
    fn priority_rank_orders_unknown_last() {
        assert_eq!(priority_rank("**Critical**"), 0);
        assert_eq!(priority_rank("low"), 3);
        assert_eq!(priority_rank("whenever"), 99);
    }

    #[test]
    fn unset_and_group_key_handle_placeholders() {
        assert!(is_unset("-"));
        assert!(is_unset("  "));
        assert!(!is_unset("SPRINT-042"));
        assert_eq!(group_key(""), "unknown");
        assert_eq!(group_key("Bug"), "bug");
    }
}
