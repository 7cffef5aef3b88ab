//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use loxdeck_config::ConfigError;
use loxdeck_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Miniserver at {address}")]
    #[diagnostic(
        code(loxdeck::connection_failed),
        help(
            "Check that the Miniserver is powered and reachable: {reason}\n\
             Try: loxdeck catalog test --address <host>"
        )
    )]
    ConnectionFailed { address: String, reason: String },

    #[error("Realtime session is not connected")]
    #[diagnostic(
        code(loxdeck::disconnected),
        help("The session reconnects on its own; retry in a few seconds.")
    )]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(loxdeck::auth_failed),
        help(
            "Verify the Miniserver username and password.\n\
             Run: loxdeck config set-password --profile <name>"
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(loxdeck::no_credentials),
        help(
            "Configure credentials with: loxdeck config init\n\
             Or set LOXDECK_USERNAME and LOXDECK_PASSWORD."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(loxdeck::not_found), help("Run: loxdeck {list_command}"))]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Miniserver rejected '{verb}' (code {code})")]
    #[diagnostic(
        code(loxdeck::rejected),
        help("Check that the verb is valid for this control type.")
    )]
    Rejected { verb: String, code: u16 },

    #[error("Miniserver error: {message}")]
    #[diagnostic(code(loxdeck::api_error))]
    Api { message: String },

    #[error("Button '{button}' is missing a Miniserver or target")]
    #[diagnostic(
        code(loxdeck::needs_setup),
        help("Set address, username and target for this button in the config file.")
    )]
    NeedsSetup { button: String },

    #[error("Button '{button}' ({kind}) does not react to turning")]
    #[diagnostic(code(loxdeck::not_a_dial), help("Only dimmer-dial and blind-dial buttons turn."))]
    NotADial { button: String, kind: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(loxdeck::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(loxdeck::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: loxdeck config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No Miniserver configured")]
    #[diagnostic(
        code(loxdeck::no_config),
        help(
            "Create a config with: loxdeck config init\n\
             Expected at: {path}\n\
             Or pass --address and --username."
        )
    )]
    NoConfig { path: String },

    #[error("{0}")]
    #[diagnostic(code(loxdeck::config))]
    Config(String),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(loxdeck::timeout),
        help("Increase timeout with --timeout or check the Miniserver's load.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Prompt failed: {0}")]
    #[diagnostic(code(loxdeck::prompt))]
    Prompt(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. }
            | Self::NoConfig { .. }
            | Self::NeedsSetup { .. }
            | Self::NotADial { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<dialoguer::Error> for CliError {
    fn from(err: dialoguer::Error) -> Self {
        Self::Prompt(err.to_string())
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { address, reason } => {
                CliError::ConnectionFailed { address, reason }
            }
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Disconnected => CliError::Disconnected,
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::NotFound { identifier } => CliError::NotFound {
                resource_type: "control".into(),
                identifier,
                list_command: "catalog list".into(),
            },
            CoreError::Api { message, status: _ } | CoreError::Internal(message) => {
                CliError::Api { message }
            }
            CoreError::NotConfigured { message } => CliError::Validation {
                field: "connection".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Config(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => CliError::ProfileNotFound {
                name,
                available: String::from("(none)"),
            },
            ConfigError::ButtonNotFound { name } => CliError::NotFound {
                resource_type: "button".into(),
                identifier: name,
                list_command: "config show".into(),
            },
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config(other.to_string()),
        }
    }
}
