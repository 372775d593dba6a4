//! CLI parse: clap types for factory-sync. No behavior; definitions only.

use crate::catalog::CatalogKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// factory-sync - Client-side sync for the agent factory dashboard
#[derive(Parser)]
#[command(name = "factory-sync")]
#[command(about = "Cached, polled views over an agent factory backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List projects
    Projects,
    /// Show the merged library for one kind (persona, skill, workflow)
    Catalog {
        kind: CatalogKind,
    },
    /// Filter the command palette
    Palette {
        /// Case-insensitive substring; empty lists everything
        #[arg(default_value = "")]
        query: String,
    },
    /// Show the runtime a project would start with
    Resolve {
        project: String,
    },
    /// Start a project's loop
    Start {
        project: String,
        /// Engine (defaults to the resolved engine)
        #[arg(long)]
        engine: Option<String>,
        /// Model (defaults to the resolved model)
        #[arg(long)]
        model: Option<String>,
    },
    /// Stop a project's loop
    Stop {
        project: String,
    },
    /// Poll a project's status and logs
    Watch {
        project: String,
        /// Stop after this many status updates
        #[arg(long, default_value = "5")]
        updates: usize,
    },
}

impl Commands {
    /// Command name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Projects => "projects",
            Commands::Catalog { .. } => "catalog",
            Commands::Palette { .. } => "palette",
            Commands::Resolve { .. } => "resolve",
            Commands::Start { .. } => "start",
            Commands::Stop { .. } => "stop",
            Commands::Watch { .. } => "watch",
        }
    }
}
