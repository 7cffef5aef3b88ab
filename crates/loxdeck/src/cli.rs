//! Clap derive structures for the `loxdeck` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// loxdeck -- drive Loxone Miniserver controls from buttons and dials
#[derive(Debug, Parser)]
#[command(
    name = "loxdeck",
    version,
    about = "Drive Loxone Miniserver controls from buttons, dials and the command line",
    long_about = "Relays switch, dimmer, blind and pulse commands to a Loxone Miniserver\n\
        over its local API, polls state back for button labels, and browses\n\
        the Miniserver catalog to look up control identifiers.",
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
    /// Miniserver profile to use
    #[arg(long, short = 'p', env = "LOXDECK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Miniserver address, host[:port] or URL (overrides profile)
    #[arg(long, short = 'a', env = "LOXDECK_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Username (overrides profile)
    #[arg(long, short = 'u', env = "LOXDECK_USERNAME", global = true)]
    pub username: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "LOXDECK_OUTPUT",
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

    /// Accept self-signed TLS certificates
    #[arg(long, short = 'k', env = "LOXDECK_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "LOXDECK_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Debug, Clone, Copy, ValueEnum)]
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
    /// Browse the Miniserver catalog
    #[command(alias = "cat")]
    Catalog(CatalogArgs),

    /// Send a raw command to a control and print the reply code
    Send(SendArgs),

    /// Press a configured button once
    Press(PressArgs),

    /// Turn a configured dial by a number of ticks
    Rotate(RotateArgs),

    /// Run every configured button's poll loop until interrupted
    Deck,

    /// Open a realtime session and print state changes and value updates
    Watch(WatchArgs),

    /// Serve the catalog browsing API over HTTP
    Serve(ServeArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CATALOG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommand,
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// List catalog entries
    #[command(alias = "ls")]
    List {
        /// Only entries in rooms whose name contains this text
        #[arg(long, short = 'r')]
        room: Option<String>,

        /// Only entries of this type (e.g. Switch, Dimmer, Jalousie)
        #[arg(long, short = 't')]
        kind: Option<String>,
    },

    /// Show one entry with its current state readings
    Get {
        /// Entry identifier
        id: String,
    },

    /// Check that the Miniserver answers with these credentials
    Test,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONTROL
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Target entry identifier
    pub target: String,

    /// Verb, e.g. On, Off, Pulse, FullDown, ManualPosition/40
    pub verb: String,
}

#[derive(Debug, Args)]
pub struct PressArgs {
    /// Button name from the config file
    pub button: String,
}

#[derive(Debug, Args)]
pub struct RotateArgs {
    /// Button name from the config file
    pub button: String,

    /// Detents to turn; negative turns down
    #[arg(allow_hyphen_values = true)]
    pub ticks: i32,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  REALTIME / SERVICE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Proceed even if the authenticate reply is not an accepted code
    #[arg(long)]
    pub no_strict_auth: bool,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, short = 'l', env = "LOXDECK_LISTEN", default_value = "127.0.0.1:7090")]
    pub listen: SocketAddr,
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

    /// Display current resolved configuration
    Show,

    /// Store a password in the system keyring
    SetPassword {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },

    /// Print the config file path
    Path,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
