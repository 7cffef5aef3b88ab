//! Config subcommand handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Select};
use secrecy::SecretString;

use loxdeck_config::Profile;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking passwords.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "strict_auth = {}", cfg.defaults.strict_auth);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let Some(p) = cfg.profiles.get(name) else {
            continue;
        };
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "address = \"{}\"", p.address);
        if let Some(ref u) = p.username {
            let _ = writeln!(out, "username = \"{u}\"");
        }
        if p.password.is_some() {
            let _ = writeln!(out, "password = \"{MASK}\"");
        }
        if let Some(ref env) = p.password_env {
            let _ = writeln!(out, "password_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(strict) = p.strict_auth {
            let _ = writeln!(out, "strict_auth = {strict}");
        }
    }

    for (name, b) in &cfg.buttons {
        let _ = writeln!(out);
        let _ = writeln!(out, "[buttons.{name}]");
        let _ = writeln!(out, "kind = \"{}\"", b.kind);
        let _ = writeln!(out, "target = \"{}\"", b.target);
        if let Some(ref n) = b.name {
            let _ = writeln!(out, "name = \"{n}\"");
        }
        if let Some(step) = b.step {
            let _ = writeln!(out, "step = {step}");
        }
        if let Some(ref profile) = b.profile {
            let _ = writeln!(out, "profile = \"{profile}\"");
        }
    }

    out
}

/// Structured view of the config with passwords masked.
fn redacted_value(cfg: &Config) -> serde_json::Value {
    let mut value = serde_json::to_value(cfg).unwrap_or_default();
    if let Some(profiles) = value
        .get_mut("profiles")
        .and_then(serde_json::Value::as_object_mut)
    {
        for profile in profiles.values_mut() {
            if let Some(password) = profile.get_mut("password").filter(|p| !p.is_null()) {
                *password = MASK.into();
            }
        }
    }
    value
}

/// Offer to store the password in the system keyring.
///
/// Returns `Some(password)` if the user chose plaintext, `None` if stored
/// in the keyring.
fn prompt_keyring_storage(profile_name: &str, password: String) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the password?")
        .items(choices)
        .default(0)
        .interact()?;

    if selection == 0 {
        loxdeck_config::store_password(profile_name, &SecretString::from(password))?;
        eprintln!("   ✓ Password stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(password))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load_config_or_default();
            let out = match global.output {
                OutputFormat::Table | OutputFormat::Plain => format_config_redacted(&cfg),
                OutputFormat::Json => output::render_json(&redacted_value(&cfg), false),
                OutputFormat::JsonCompact => output::render_json(&redacted_value(&cfg), true),
                OutputFormat::Yaml => {
                    serde_yaml::to_string(&redacted_value(&cfg)).unwrap_or_default()
                }
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::SetPassword { profile } => {
            let cfg = config::load_config_or_default();
            let profile_name = profile.unwrap_or_else(|| config::active_profile_name(global, &cfg));
            if !cfg.profiles.contains_key(&profile_name) {
                return Err(CliError::ProfileNotFound {
                    name: profile_name,
                    available: cfg.profiles.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }

            let password = rpassword::prompt_password(format!("Password for '{profile_name}': "))?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "password cannot be empty".into(),
                });
            }
            loxdeck_config::store_password(&profile_name, &SecretString::from(password))?;
            if !global.quiet {
                eprintln!("Password stored in system keyring for profile '{profile_name}'");
            }
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path().display().to_string(), global.quiet);
            Ok(())
        }
    }
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let config_path = config::config_path();
    eprintln!("loxdeck configuration wizard");
    eprintln!("   Config path: {}\n", config_path.display());

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()?;

    let address: String = Input::new()
        .with_prompt("Miniserver address")
        .default(global.address.clone().unwrap_or_else(|| "192.168.1.77".into()))
        .interact_text()?;

    let mut username_prompt = Input::<String>::new().with_prompt("Username");
    if let Some(ref username) = global.username {
        username_prompt = username_prompt.default(username.clone());
    }
    let username = username_prompt.interact_text()?;

    let password = rpassword::prompt_password("Password: ")?;
    if username.trim().is_empty() || password.is_empty() {
        return Err(CliError::Validation {
            field: "credentials".into(),
            reason: "username and password cannot be empty".into(),
        });
    }
    let password = prompt_keyring_storage(&profile_name, password)?;

    let mut cfg = config::load_config_or_default();
    cfg.profiles.insert(profile_name.clone(), Profile {
        address,
        username: Some(username),
        password,
        insecure: global.insecure.then_some(true),
        ..Profile::default()
    });
    if cfg.profiles.len() == 1 || cfg.default_profile.is_none() {
        cfg.default_profile = Some(profile_name.clone());
    }

    let path = loxdeck_config::save_config(&cfg)?;
    eprintln!("\n   ✓ Profile '{profile_name}' saved to {}", path.display());
    eprintln!("   Try: loxdeck catalog test");
    Ok(())
}
