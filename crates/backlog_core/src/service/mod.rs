//! Use-case services over the planning registers.
//!
//! # Responsibility
//! - Orchestrate register reads and writes into command-level APIs.
//! - Keep the CLI decoupled from CSV and markdown details.

pub mod analysis;
pub mod dashboard;
pub mod dates;
pub mod metrics;
pub mod migration;
pub mod query_service;
pub mod sync;
pub mod validate;
