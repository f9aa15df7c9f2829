//! CLI argument definitions for graft.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "graft",
    version,
    about = "Dependency resolver for source-based packages",
    long_about = "graft resolves a package's transitive dependency requirements into one \
                  consistent, reproducible set of versions, records them in Graft.resolved, \
                  and validates the resulting graph of modules."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ~/.graft/config.toml)
    #[arg(long, global = true, env = "GRAFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Package registry directory, overriding [registry] path
    #[arg(long, global = true, env = "GRAFT_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Fail instead of re-resolving when Graft.resolved is stale or incomplete
    #[arg(long, global = true)]
    pub locked: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve dependencies, reusing pins that still apply
    Resolve,

    /// Ignore recorded pins and resolve every dependency to its newest allowed version
    Update,

    /// Print the resolved dependency tree
    #[command(name = "show-dependencies", alias = "tree")]
    ShowDependencies {
        /// Output format: text or json
        #[arg(long, default_value = "text")]
        format: String,
        /// Maximum depth
        #[arg(long)]
        depth: Option<usize>,
        /// Explain why a package is included
        #[arg(long)]
        why: Option<String>,
    },

    /// List modules in build order with their packages and checkout paths
    Describe,
}

pub fn parse() -> Cli {
    Cli::parse()
}
