//! CLI argument definitions using clap
//!
//! JSON-valued arguments accept either inline JSON or `@path` to read a file.
//!
//! Commands:
//! - querygate flatten --schema <file>
//! - querygate filter --schema <file> --filter <json>
//! - querygate project --schema <file> --mode sort|project --fields <json>
//! - querygate plan --schema <file> --request <json> [--pipeline <json>]
//! - querygate page --schema <file> --data <file> --request <json>
//! - querygate count --schema <file> --data <file> --request <json>
//! - querygate legacy --schema <file> --data <file> --request <json>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// querygate - schema-validated queries and paged aggregation
#[derive(Parser, Debug)]
#[command(name = "querygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Engine configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the flattened dot-path schema
    Flatten {
        /// Schema descriptor JSON file
        #[arg(long)]
        schema: PathBuf,
    },

    /// Validate a filter and print its rewritten form
    Filter {
        #[arg(long)]
        schema: PathBuf,
        /// Filter document
        #[arg(long)]
        filter: String,
    },

    /// Validate a sort or projection document
    Project {
        #[arg(long)]
        schema: PathBuf,
        /// "sort" or "project"
        #[arg(long, default_value = "project")]
        mode: String,
        #[arg(long)]
        fields: String,
    },

    /// Print the store calls a paged read would make
    Plan {
        #[arg(long)]
        schema: PathBuf,
        /// Paging options (filter, sort, project, page, limit, ...)
        #[arg(long, default_value = "{}")]
        request: String,
        /// Stages to run before paging
        #[arg(long)]
        pipeline: Option<String>,
    },

    /// Run a paged read against documents loaded from a JSON array file
    Page {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "{}")]
        request: String,
        #[arg(long)]
        pipeline: Option<String>,
    },

    /// Count pages and documents matching a request
    Count {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        data: PathBuf,
        #[arg(long, default_value = "{}")]
        request: String,
        #[arg(long)]
        pipeline: Option<String>,
    },

    /// Run a first-generation paged read
    Legacy {
        #[arg(long)]
        schema: PathBuf,
        #[arg(long)]
        data: PathBuf,
        /// filter, page, limit, sort, project, unwind, extraMatch, resource, lookup
        #[arg(long, default_value = "{}")]
        request: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
