//! CLI configuration: a thin layer over `loxdeck_config`.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--address, --username, --insecure, --timeout).

use std::time::Duration;

use loxdeck_config::{ButtonConfig, Profile};
use loxdeck_core::{ActionKind, ButtonSettings, ConnectionSettings, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use loxdeck_config::{Config, config_path, load_config_or_default};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Connection settings for the active profile, with flag overrides.
///
/// Without a matching profile, `--address` plus `--username` (or their
/// environment variables) and `LOXDECK_PASSWORD` are enough.
pub fn resolve_connection(
    global: &GlobalOpts,
    config: &Config,
) -> Result<ConnectionSettings, CliError> {
    resolve_named(global, config, &active_profile_name(global, config))
}

/// A named button's kind and settings, connected through its own profile
/// unless `--profile` says otherwise.
pub fn resolve_button(
    global: &GlobalOpts,
    config: &Config,
    name: &str,
) -> Result<(ActionKind, ButtonSettings), CliError> {
    let button: &ButtonConfig = config.button(name)?;
    let profile_name = global
        .profile
        .clone()
        .or_else(|| button.profile.clone())
        .unwrap_or_else(|| active_profile_name(global, config));
    let connection = resolve_named(global, config, &profile_name)?;
    Ok((
        button.kind,
        loxdeck_config::button_config_to_settings(button, Some(connection)),
    ))
}

fn resolve_named(
    global: &GlobalOpts,
    config: &Config,
    profile_name: &str,
) -> Result<ConnectionSettings, CliError> {
    let mut profile = match config.profiles.get(profile_name) {
        Some(profile) => profile.clone(),
        None if global.address.is_some() => Profile::default(),
        None if config.profiles.is_empty() => {
            return Err(CliError::NoConfig {
                path: config_path().display().to_string(),
            });
        }
        None => {
            let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name.to_owned(),
                available: available.join(", "),
            });
        }
    };

    // Flags (and their env vars) beat the profile
    if let Some(ref address) = global.address {
        profile.address.clone_from(address);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }

    let mut settings =
        loxdeck_config::profile_to_connection_settings(&profile, profile_name, &config.defaults)?;

    if global.insecure {
        settings.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(timeout) = global.timeout {
        settings.timeout = Duration::from_secs(timeout);
    }
    Ok(settings)
}

/// Realtime strict-auth for the active profile.
pub fn strict_auth(global: &GlobalOpts, config: &Config) -> bool {
    config
        .profiles
        .get(&active_profile_name(global, config))
        .map_or(config.defaults.strict_auth, |p| config.strict_auth(p))
}
