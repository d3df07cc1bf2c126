//! CLI module for the funcsync deployment tool.
//!
//! This module provides the command-line interface for syncing a project's
//! functions to an environment.

mod commands;
mod output;

pub use commands::{Cli, OutputFormat};
pub use output::OutputFormatter;
