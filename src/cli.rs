use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mediamirror")]
#[command(author, version, about = "Media attachment mirror with on-demand image sizes")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Import a file from disk as a new attachment
    Import {
        /// File to import
        #[arg(required = true)]
        file: PathBuf,
    },

    /// Show the size status of an attachment
    Status {
        /// Attachment ID
        id: i64,

        /// Only this size
        size: Option<String>,
    },

    /// Regenerate one size, or every size, of an attachment
    Generate {
        /// Attachment ID
        id: i64,

        /// Only this size
        size: Option<String>,
    },

    /// Regenerate every image attachment in the catalog
    RegenerateAll,

    /// Push an attachment's files to remote storage
    Sync {
        /// Attachment ID
        id: i64,
    },

    /// Delete an attachment and all of its files
    Delete {
        /// Attachment ID
        id: i64,
    },

    /// Show resolved settings, or change one
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config or defaults if not specified)
        #[arg(value_name = "CONFIG")]
        file: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print every setting with its source
    Show,

    /// Set one setting in the config file
    Set {
        /// Dotted key, e.g. storage.s3.bucket
        key: String,

        /// New value
        value: String,
    },
}
