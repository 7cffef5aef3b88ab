//! Configuration for the loxdeck tools.
//!
//! TOML profiles (one per Miniserver), named button definitions, password
//! resolution (env + keyring + plaintext), and translation to
//! `loxdeck_core::ConnectionSettings` / `ButtonSettings`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use loxdeck_core::{ActionKind, ButtonSettings, ConnectionSettings, TlsVerification};

/// Keyring service name for stored passwords.
pub const KEYRING_SERVICE: &str = "loxdeck";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "LOXDECK_CONFIG";

/// Environment variable consulted for the password of any profile.
pub const PASSWORD_ENV: &str = "LOXDECK_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("button '{name}' not found")]
    ButtonNotFound { name: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named Miniserver profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Named buttons, as they would be laid out on the deck.
    #[serde(default)]
    pub buttons: BTreeMap<String, ButtonConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
            buttons: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Require an accepted authenticate reply on the realtime channel.
    #[serde(default = "default_strict_auth")]
    pub strict_auth: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
            strict_auth: default_strict_auth(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_strict_auth() -> bool {
    true
}

/// A named Miniserver profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Host, `host:port` or URL (e.g. "192.168.1.77").
    pub address: String,

    pub username: Option<String>,

    /// Password in plaintext. Prefer the keyring.
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override realtime strict-auth.
    pub strict_auth: Option<bool>,
}

/// One configured button.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ButtonConfig {
    pub kind: ActionKind,

    /// Catalog identifier of the controlled entry.
    pub target: String,

    /// Display name.
    pub name: Option<String>,

    /// Dial step in percent.
    pub step: Option<f64>,

    /// Profile to use instead of the default one.
    pub profile: Option<String>,
}

impl Config {
    /// Resolve a profile by name, falling back to `default_profile` and
    /// then to `"default"`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
            .to_owned();
        match self.profiles.get(&name) {
            Some(profile) => Ok((name, profile)),
            None => Err(ConfigError::ProfileNotFound { name }),
        }
    }

    pub fn button(&self, name: &str) -> Result<&ButtonConfig, ConfigError> {
        self.buttons
            .get(name)
            .ok_or_else(|| ConfigError::ButtonNotFound { name: name.into() })
    }

    /// Strict-auth setting for a profile.
    pub fn strict_auth(&self, profile: &Profile) -> bool {
        profile.strict_auth.unwrap_or(self.defaults.strict_auth)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `$LOXDECK_CONFIG`, else platform
/// conventions (XDG on Linux).
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "loxdeck", "loxdeck").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("loxdeck");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment.
///
/// Environment keys use a double underscore for nesting, e.g.
/// `LOXDECK_DEFAULTS__TIMEOUT=10`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LOXDECK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

/// Resolve a profile's password.
///
/// Order: the profile's `password_env`, then `$LOXDECK_PASSWORD`, then the
/// system keyring, then plaintext in the config file.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env → env var lookup
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Global env var
    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?
        .set_password(password.expose_secret())
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to core settings ────────────────────────────────────

/// Build `ConnectionSettings` from a profile, without CLI overrides.
pub fn profile_to_connection_settings(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectionSettings, ConfigError> {
    if profile.address.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "address".into(),
            reason: format!("profile '{profile_name}' has no Miniserver address"),
        });
    }
    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var("LOXDECK_USERNAME").ok())
        .ok_or_else(|| ConfigError::NoCredentials {
            profile: profile_name.into(),
        })?;
    let password = resolve_password(profile, profile_name)?;

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::DangerAcceptInvalid // Miniservers ship self-signed certs
    };

    let mut settings = ConnectionSettings::new(profile.address.clone(), username, password);
    settings.tls = tls;
    settings.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    Ok(settings)
}

/// Resolve a named button into its kind and core settings.
pub fn button_settings(
    config: &Config,
    button_name: &str,
) -> Result<(ActionKind, ButtonSettings), ConfigError> {
    let button = config.button(button_name)?;
    let (profile_name, profile) = config.profile(button.profile.as_deref())?;
    let connection = profile_to_connection_settings(profile, &profile_name, &config.defaults)?;
    Ok((button.kind, button_config_to_settings(button, Some(connection))))
}

/// Core settings for a button with an already-resolved connection.
pub fn button_config_to_settings(
    button: &ButtonConfig,
    connection: Option<ConnectionSettings>,
) -> ButtonSettings {
    ButtonSettings {
        connection,
        target: Some(button.target.clone()),
        name: button.name.clone(),
        step_size: button.step,
    }
}
