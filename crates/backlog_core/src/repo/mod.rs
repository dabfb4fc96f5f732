//! Repository layer over the planning registers.
//!
//! # Responsibility
//! - Define read contracts that services depend on.
//! - Isolate CSV file locations from query and analysis logic.
//!
//! # Invariants
//! - Repositories return rows in register order.

pub mod backlog_repo;
