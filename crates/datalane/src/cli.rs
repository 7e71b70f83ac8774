//! Clap derive structures for the `datalane` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use datalane_core::Operation;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// datalane -- cached, serialized access to a JSON backend
#[derive(Debug, Parser)]
#[command(
    name = "datalane",
    version,
    about = "Query a JSON backend through the datalane dispatcher",
    long_about = "Runs reads and writes against configured entities.\n\n\
        Reads are reused from a local response cache until they expire,\n\
        writes to the same URL are serialized, and batch/bulk entities\n\
        fan out into several requests joined into one result.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Backend profile to use
    #[arg(long, short = 'p', env = "DATALANE_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Backend base URL (overrides profile)
    #[arg(long, env = "DATALANE_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Bearer token (overrides profile)
    #[arg(long, env = "DATALANE_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "DATALANE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// Page name used for page-scoped cache entries
    #[arg(long, env = "DATALANE_PAGE", global = true)]
    pub page: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Accept invalid TLS certificates
    #[arg(long, short = 'k', env = "DATALANE_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds [default: from config, else 30]
    #[arg(long, env = "DATALANE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

impl GlobalOpts {
    pub fn format(&self) -> OutputFormat {
        self.output.clone().unwrap_or(OutputFormat::Table)
    }
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read an entity (served from cache when reusable)
    #[command(alias = "g")]
    Get(GetArgs),

    /// Send a write operation to an entity
    #[command(alias = "s")]
    Send(SendArgs),

    /// Run a batch entity and print results keyed by identifier
    Batch(BatchArgs),

    /// Read several entities at once and print results by position
    Bulk(BulkArgs),

    /// List configured entities
    #[command(alias = "ls")]
    Entities,

    /// Inspect and maintain the response cache
    Cache(CacheArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Data commands ────────────────────────────────────────────────────

/// Read operations accepted by `get`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReadOperation {
    Get,
    #[value(name = "get_list", alias = "list")]
    GetList,
}

impl From<ReadOperation> for Operation {
    fn from(op: ReadOperation) -> Self {
        match op {
            ReadOperation::Get => Self::Get,
            ReadOperation::GetList => Self::GetList,
        }
    }
}

/// Write operations accepted by `send`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WriteOperation {
    Post,
    Put,
    Patch,
    Delete,
}

impl From<WriteOperation> for Operation {
    fn from(op: WriteOperation) -> Self {
        match op {
            WriteOperation::Post => Self::Post,
            WriteOperation::Put => Self::Put,
            WriteOperation::Patch => Self::Patch,
            WriteOperation::Delete => Self::Delete,
        }
    }
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Entity name from the config file
    pub entity: String,

    /// Query parameters as KEY=VALUE (values parsed as JSON when possible)
    pub params: Vec<String>,

    /// Operation to run [default: the entity's default operation]
    #[arg(long)]
    pub operation: Option<ReadOperation>,

    /// Drop any cached response before reading
    #[arg(long)]
    pub fresh: bool,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Write operation
    pub operation: WriteOperation,

    /// Entity name from the config file
    pub entity: String,

    /// Inline JSON body
    #[arg(long, short = 'd', conflicts_with = "from_file")]
    pub data: Option<String>,

    /// Read the JSON body from a file
    #[arg(long, short = 'F')]
    pub from_file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Batch entity name from the config file
    pub entity: String,

    /// Parameters sent to every leaf as KEY=VALUE
    pub params: Vec<String>,
}

#[derive(Debug, Args)]
pub struct BulkArgs {
    /// Entity names, results are printed in this order
    #[arg(required = true, num_args = 1..)]
    pub entities: Vec<String>,

    /// Parameters sent to every entity as KEY=VALUE
    #[arg(long = "param", short = 'P')]
    pub params: Vec<String>,
}

// ── Cache ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// List cached responses
    #[command(alias = "ls")]
    List,

    /// Remove one cached response by key
    #[command(alias = "rm")]
    Remove {
        /// Cache key as shown by `cache list`
        key: String,
    },

    /// Remove expired and other-page entries
    Sweep,

    /// Remove every cached response
    Clear,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add a backend profile, creating the config file if needed
    Init {
        /// Base URL for the new profile
        #[arg(long)]
        base_url: String,

        /// Name of the new profile
        #[arg(long, default_value = "default")]
        name: String,

        /// Environment variable holding the bearer token
        #[arg(long)]
        token_env: Option<String>,

        /// Replace a profile that already exists
        #[arg(long)]
        force: bool,
    },

    /// List configured profiles (* marks the default)
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Show the current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
