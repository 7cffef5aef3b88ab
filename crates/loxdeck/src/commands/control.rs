//! One-shot control commands: raw send, button press, dial turn.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use loxdeck_api::CODE_OK;
use loxdeck_core::{Button, Connector, HttpConnector, Miniserver, Outcome, RecordingSurface};

use crate::cli::{GlobalOpts, PressArgs, RotateArgs, SendArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct CommandResult {
    target: String,
    verb: String,
    code: u16,
}

#[derive(Debug, Serialize)]
struct GestureResult {
    button: String,
    verb: String,
    label: String,
}

pub async fn send(args: SendArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = config::resolve_connection(global, cfg)?;
    let miniserver = HttpConnector.connect(&settings)?;

    let code = miniserver.send_command(&args.target, &args.verb).await?;
    let result = CommandResult {
        target: args.target,
        verb: args.verb,
        code,
    };
    let out = output::render_single(
        global.output,
        &result,
        |r| format!("{} {} -> {}", r.target, r.verb, r.code),
        |r| r.code.to_string(),
    );
    output::print_output(&out, global.quiet);

    if code == CODE_OK {
        Ok(())
    } else {
        Err(CliError::Rejected {
            verb: result.verb,
            code,
        })
    }
}

pub async fn press(args: PressArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let (mut button, miniserver) = prepare(&args.button, cfg, global).await?;
    let surface = RecordingSurface::new();
    let outcome = button.press(miniserver.as_ref(), &surface).await;
    finish(&args.button, &button, outcome, global)
}

pub async fn rotate(args: RotateArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    if args.ticks == 0 {
        return Err(CliError::Validation {
            field: "ticks".into(),
            reason: "must be non-zero".into(),
        });
    }
    let (mut button, miniserver) = prepare(&args.button, cfg, global).await?;
    if !button.kind().is_dial() {
        return Err(CliError::NotADial {
            button: args.button,
            kind: button.kind().to_string(),
        });
    }
    let surface = RecordingSurface::new();
    let outcome = button.rotate(args.ticks, miniserver.as_ref(), &surface).await;
    finish(&args.button, &button, outcome, global)
}

/// Build the button and seed its state from a fresh catalog so toggles
/// and turns start from the Miniserver's current view.
async fn prepare(
    name: &str,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(Button, Arc<dyn Miniserver>), CliError> {
    let (kind, settings) = config::resolve_button(global, cfg, name)?;
    let connection = match settings.connection.as_ref() {
        Some(connection) if settings.is_configured() => connection.clone(),
        _ => {
            return Err(CliError::NeedsSetup {
                button: name.to_owned(),
            });
        }
    };
    let miniserver = HttpConnector.connect(&connection)?;
    let mut button = Button::new(kind, settings);

    match miniserver.fetch_catalog().await {
        Ok(catalog) => {
            if !button.refresh(&catalog) {
                warn!(button = name, "target has no readable state; starting from defaults");
            }
        }
        Err(e) => warn!(button = name, error = %e, "could not read current state"),
    }
    debug!(button = name, state = ?button.state(), "button prepared");
    Ok((button, miniserver))
}

fn finish(
    name: &str,
    button: &Button,
    outcome: Outcome,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match outcome {
        Outcome::Accepted { verb } => {
            let result = GestureResult {
                button: name.to_owned(),
                verb,
                label: button.label().replace('\n', " "),
            };
            let out = output::render_single(
                global.output,
                &result,
                |r| format!("{}: {} ({})", r.button, r.label, r.verb),
                |r| r.label.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
        Outcome::Rejected { verb, code } => Err(CliError::Rejected { verb, code }),
        Outcome::Failed { verb: _, message } => Err(CliError::Api { message }),
        Outcome::NeedsSetup => Err(CliError::NeedsSetup {
            button: name.to_owned(),
        }),
        Outcome::Ignored => Err(CliError::NotADial {
            button: name.to_owned(),
            kind: button.kind().to_string(),
        }),
    }
}
