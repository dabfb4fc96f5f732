//! Command implementations behind the `backlog` binary.
//!
//! Each command writes its human-readable output to the given writer and
//! returns the process exit code; argument parsing lives in `main.rs`.

pub mod commands;
