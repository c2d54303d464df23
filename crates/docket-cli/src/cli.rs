use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "docket",
    about = "Docket: inspect and edit file-backed datastores and job queues",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Common {
    /// Config file with [datastore] and [jobs] tables (default: ./docket.toml if present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory to operate on, overriding the config file
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print one document
    Get {
        key: String,

        #[command(flatten)]
        common: Common,
    },

    /// Create or overwrite a document from a JSON object
    Put {
        key: String,

        /// Document body, e.g. '{"title":"Hello","_rev":0}'
        json_body: String,

        /// Skip the `_rev` consistency check
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        common: Common,
    },

    /// Delete one document
    Delete {
        key: String,

        #[command(flatten)]
        common: Common,
    },

    /// List document keys, one page at a time
    Keys {
        /// Lower bound of the key range (upper bound when --descending)
        #[arg(long)]
        start_key: Option<String>,

        /// Upper bound of the key range (lower bound when --descending)
        #[arg(long)]
        end_key: Option<String>,

        /// Exact key to match
        #[arg(long)]
        key: Option<String>,

        /// Page size
        #[arg(long, default_value_t = docket_store::DEFAULT_QUERY_LIMIT)]
        limit: usize,

        /// Index position to start the page from
        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        descending: bool,

        /// Include each document in the output
        #[arg(long)]
        docs: bool,

        #[command(flatten)]
        common: Common,
    },

    /// Inspect or prune a job queue directory
    Jobs {
        #[command(subcommand)]
        command: JobsCommands,
    },
}

#[derive(Subcommand)]
pub enum JobsCommands {
    /// List persisted jobs without running them
    List {
        #[command(flatten)]
        common: Common,
    },

    /// Remove every persisted job for a method
    Clear {
        method: String,

        #[command(flatten)]
        common: Common,
    },
}
