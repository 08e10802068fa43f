use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Offline sync queue for volunteer, event and attendance records")]
#[command(long_about = "rollcall - offline sync for volunteer coordination

Records written while the spreadsheet service is unreachable are queued
locally and uploaded, in order, the next time the queue is run.

QUICK START:
  rollcall record attendance checkins.json   Store records and queue an upload
  rollcall queue status                      Show what is waiting
  rollcall queue run                         Sync with the remote service
  rollcall queue retry                       Retry failed operations

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  rollcall <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Defaults to `general.default_output` from the config file.
    #[arg(short, long, value_enum, global = true)]
    pub output: Option<OutputFormat>,

    /// Data directory (defaults to ~/.rollcall)
    #[arg(long, env = "ROLLCALL_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the sync queue
    ///
    /// Inspect, run and repair queued uploads and downloads.
    ///
    /// # Examples
    ///
    ///   rollcall queue status
    ///   rollcall queue list --status failed
    ///   rollcall queue add --type download --data-type events
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Store records locally and queue them for upload
    ///
    /// Reads a JSON array of records (each with an `id`) from FILE, writes
    /// them to the local store and enqueues one upload.
    ///
    /// # Examples
    ///
    ///   rollcall record attendance checkins.json
    ///   rollcall record volunteers new-volunteers.json
    Record {
        /// Data type (volunteers, events, attendance)
        data_type: String,

        /// JSON file with the records
        file: PathBuf,
    },

    /// Show or create the configuration file
    Config(ConfigArgs),
}

/// Arguments for the queue command.
#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Sync queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show sync queue status
    ///
    /// Displays queued, retrying and failed operations.
    Status,

    /// List queued operations
    List {
        /// Filter by status (queued, retry, completed, failed)
        #[arg(long, short = 's')]
        status: Option<String>,

        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Show queue statistics
    ///
    /// Counts by status, operation type and data type, plus ages.
    Stats,

    /// Run queued operations against the remote service
    Run,

    /// Retry failed operations
    ///
    /// Without an ID, re-queues every failed operation that has attempts
    /// left and runs the queue. With an ID, resets that operation's attempt
    /// count so it runs again on the next `queue run`.
    Retry {
        /// Specific operation ID to reset
        #[arg(long, short = 'i')]
        id: Option<String>,
    },

    /// Remove one operation from the queue
    Remove {
        /// Operation ID
        id: String,
    },

    /// Remove every operation from the queue
    Clear {
        /// Required; queued work is lost
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Add an operation to the queue
    ///
    /// Uploads take their records from --file (a JSON array).
    Add {
        /// Operation type (upload, download, delete)
        #[arg(long = "type", short = 't')]
        operation: String,

        /// Data type (volunteers, events, attendance)
        #[arg(long, short = 'd')]
        data_type: String,

        /// JSON file with records to upload
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },
}

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },
}
