//! Command-line interface for music-steward.
//!
//! Each command builds the services it needs from the loaded config, runs
//! one operation against the catalog and exits.

mod commands;

pub use commands::{Cli, Commands, run_command};
