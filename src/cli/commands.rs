//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a loop flow file
//! - check: validate flow files
//! - eval: evaluate a condition expression

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// flowloop - Loop node iteration engine for node-graph flows
#[derive(Parser, Debug)]
#[command(name = "flowloop")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the loop described by a flow file
    Run {
        /// Flow file (YAML)
        file: PathBuf,

        /// Override the flow's input with a JSON value
        #[arg(short, long)]
        input: Option<String>,

        /// Print the loop report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate flow files without running them
    Check {
        /// Files or glob patterns
        #[arg(required = true)]
        patterns: Vec<String>,
    },

    /// Evaluate a loop condition
    Eval {
        /// Condition expression, e.g. "index < 10 && !done"
        expression: String,

        /// Variable bindings as a JSON object
        #[arg(short, long)]
        bindings: Option<String>,
    },
}
