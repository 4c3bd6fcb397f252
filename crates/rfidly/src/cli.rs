//! Clap derive structures for the `rfidly` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// rfidly -- RFID scan station for the command line
#[derive(Debug, Parser)]
#[command(
    name = "rfidly",
    version,
    about = "Capture RFID scans and commit them as inventory batches",
    long_about = "Operator station for RFID inventory.\n\n\
        Discovers and drives readers through the device hub, listens to the\n\
        scan push channel, keeps a selection of scans between runs, and\n\
        commits that selection to the inventory backend as a named batch.",
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
    /// Station profile to use
    #[arg(long, short = 'p', env = "RFIDLY_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Inventory backend URL (overrides profile)
    #[arg(long, short = 'b', env = "RFIDLY_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Device hub URL (overrides profile)
    #[arg(long, env = "RFIDLY_HUB", global = true)]
    pub hub: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "RFIDLY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "RFIDLY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover, connect to, and disconnect readers
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Connect to a reader and capture tag reads
    Scan(ScanArgs),

    /// Listen to the scan push channel
    Watch(WatchArgs),

    /// Feed random scans through the local pipeline
    #[command(alias = "sim")]
    Simulate(SimulateArgs),

    /// Inspect and edit the pending selection
    #[command(alias = "sel")]
    Selection(SelectionArgs),

    /// Commit the selection as a batch
    Batch(BatchArgs),

    /// Browse committed batches
    Batches(BatchesArgs),

    /// Browse known tags
    Tags(TagsArgs),

    /// Browse transactions of the latest batch
    #[command(alias = "tx")]
    Transactions(TransactionsArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Shared Arguments ─────────────────────────────────────────────────

/// Pagination arguments for backend listings.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Page number, starting at 1
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Results per page
    #[arg(long, short = 'l', default_value = "25")]
    pub limit: u32,

    /// Fetch all pages automatically
    #[arg(long, short = 'a')]
    pub all: bool,
}

/// How a capture run ends and what it leaves behind.
#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long, short = 'd', value_name = "SECS")]
    pub duration: Option<u64>,

    /// Show one row per EPC with occurrence counts
    #[arg(long)]
    pub count_mode: bool,

    /// Select every visible row when the run ends
    #[arg(long)]
    pub select_all: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DEVICES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// Search the network for readers
    Discover {
        /// Vendor prefix to search for (overrides profile)
        #[arg(long)]
        vendor: Option<String>,

        /// Discovery attempt budget (overrides profile)
        #[arg(long)]
        attempts: Option<u32>,
    },

    /// Connect to a reader, start inventory, report its version, then stop
    Connect {
        /// Reader IP address
        ip: String,

        /// Reader port
        port: u16,
    },

    /// Ask the connected reader to disconnect
    Disconnect,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SCAN / WATCH / SIMULATE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Reader IP address (default: first discovered reader)
    #[arg(long, requires = "port")]
    pub ip: Option<String>,

    /// Reader port
    #[arg(long, requires = "ip")]
    pub port: Option<u16>,

    /// Save every read as a transaction of this batch
    #[arg(long, value_name = "ID")]
    pub batch_id: Option<i64>,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Channel to join (overrides profile)
    #[arg(long)]
    pub channel: Option<String>,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of scans to emit
    #[arg(long, short = 'n', default_value = "5")]
    pub count: usize,

    /// Read this EPC every time instead of random ones
    #[arg(long)]
    pub epc: Option<String>,

    /// Show one row per EPC with occurrence counts
    #[arg(long)]
    pub count_mode: bool,

    /// Select every visible row afterwards
    #[arg(long)]
    pub select_all: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SELECTION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SelectionArgs {
    #[command(subcommand)]
    pub command: SelectionCommand,
}

#[derive(Debug, Subcommand)]
pub enum SelectionCommand {
    /// List the selected records
    #[command(alias = "ls")]
    Show,

    /// Remove records from the selection
    #[command(alias = "rm")]
    Drop {
        /// Record IDs (a number or tmp-<uuid>)
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },

    /// Empty the selection
    Clear,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  BATCHES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct BatchArgs {
    #[command(subcommand)]
    pub command: BatchCommand,
}

#[derive(Debug, Subcommand)]
pub enum BatchCommand {
    /// Save the selected records and group them into a new batch
    Create {
        /// Batch name
        #[arg(long, short = 'n')]
        name: String,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct BatchesArgs {
    #[command(subcommand)]
    pub command: BatchesCommand,
}

#[derive(Debug, Subcommand)]
pub enum BatchesCommand {
    /// List batches
    #[command(alias = "ls")]
    List(ListArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  TAGS / TRANSACTIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct TagsArgs {
    #[command(subcommand)]
    pub command: TagsCommand,
}

#[derive(Debug, Subcommand)]
pub enum TagsCommand {
    /// List tags
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        list: ListArgs,

        /// Only tags matching this text
        #[arg(long)]
        query: Option<String>,
    },

    /// Look up one tag by EPC
    Get {
        /// Tag EPC
        epc: String,
    },
}

#[derive(Debug, Args)]
pub struct TransactionsArgs {
    #[command(subcommand)]
    pub command: TransactionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum TransactionsCommand {
    /// List transactions of the latest batch
    #[command(alias = "ls")]
    List(ListArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current configuration
    Show,

    /// Print the config file location
    Path,

    /// Set a value on the active profile
    Set {
        /// Profile key, e.g. "backend_url" or "push_key"
        key: String,

        /// Value to set
        value: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
