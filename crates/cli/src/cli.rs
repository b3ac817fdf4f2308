//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Fanout - publish one piece of content to many destinations
#[derive(Parser, Debug)]
#[command(
    name = "fanout",
    author,
    version,
    about = "Multi-destination content dispatcher",
    long_about = "Publishes one content item to every configured destination.\n\n\
                  Each destination is rate limited, checked for duplicates against the \n\
                  attempt history and retried with exponential backoff independently."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FANOUT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FANOUT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level from -v / -q
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch one content item to the configured destinations
    Publish(PublishArgs),

    /// Validate configuration file without publishing
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `publish` command
#[derive(Parser, Debug, Clone)]
pub struct PublishArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "fanout.toml", env = "FANOUT_CONFIG")]
    pub config: PathBuf,

    #[command(flatten)]
    pub content: ContentArgs,

    /// Destination to publish to (repeatable; default: every enabled destination)
    #[arg(short, long = "destination", value_name = "ID")]
    pub destinations: Vec<String>,

    /// Dispatch deadline in seconds, overriding the configuration (0 = none)
    #[arg(long, env = "FANOUT_DEADLINE")]
    pub deadline: Option<u64>,

    /// Show formatted payloads and exit without publishing
    #[arg(long)]
    pub dry_run: bool,

    /// Output the dispatch result as JSON
    #[arg(long)]
    pub json: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FANOUT_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Where the content item comes from
#[derive(Args, Debug, Clone)]
pub struct ContentArgs {
    /// JSON file holding a complete content item
    #[arg(long, conflicts_with_all = ["body", "body_file"])]
    pub item: Option<PathBuf>,

    /// Body text
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the body text from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Item id (default: derived from the content fingerprint)
    #[arg(long)]
    pub id: Option<String>,

    /// Title
    #[arg(long)]
    pub title: Option<String>,

    /// Link to the original source
    #[arg(long)]
    pub url: Option<String>,

    /// Tag (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "fanout.toml", env = "FANOUT_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "fanout.toml", env = "FANOUT_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Include disabled destinations
    #[arg(long)]
    pub all: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => observability::LogFormat::Json,
            LogFormat::Pretty => observability::LogFormat::Pretty,
            LogFormat::Compact => observability::LogFormat::Compact,
        }
    }
}
