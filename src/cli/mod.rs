//! Command-line interface for insight_forge.
//!
//! Provides commands for running the analysis pipeline and for inspecting
//! the plan a query would produce.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
