//! Planning register domain model.
//!
//! # Responsibility
//! - Define the values stored in backlog, sprint, changelog and metrics
//!   registers.
//! - Own the lenient comparison rules shared by every query.
//!
//! # Invariants
//! - Enum comparisons always go through [`normalize`].
//! - Records keep raw text; typed values are parsed on demand so a
//!   read-write cycle never loses data.

pub mod changelog;
pub mod item;
pub mod metrics;
pub mod sprint;
pub mod tokens;
pub mod values;

pub use values::{group_key, is_unset, normalize, UNSET};
