//! Command line arguments
//!
//! Commands:
//! - docql-server serve [--config <path>]
//! - docql-server discover --dump <export.json> [--config <path>]
//!
//! Without a subcommand the server is started.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const CONFIG_PATH: &str = "config.yaml";

/// DocQL - relational translation over document keyspaces
#[derive(Parser, Debug)]
#[command(name = "docql-server")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to $DOCQL_CONFIG, then config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Serve translation endpoints over the persisted schema
    Serve,

    /// Discover a schema from a document export and write it to the schema path
    Discover {
        /// JSON export: {"<keyspace>": {"<document key>": {...}}}
        #[arg(long)]
        dump: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Configuration file to load
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| std::env::var("DOCQL_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(CONFIG_PATH))
    }
}
