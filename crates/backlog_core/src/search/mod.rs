//! Full-text search entry points.
//!
//! # Responsibility
//! - Build a throwaway FTS5 index over backlog items.
//! - Keep query escaping and ranking inside core.

pub mod fts;
