//! CLI module for flowloop - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running flow files,
//! validating them and evaluating conditions.

pub mod commands;

pub use commands::Cli;
