//! `watch`: follow a realtime session until interrupted.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use loxdeck_api::{SessionEvent, StateValue};
use loxdeck_core::{SessionOptions, SessionRegistry};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

/// One printed line of the watch stream.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
enum WatchLine {
    State {
        at: DateTime<Utc>,
        state: String,
    },
    Catalog {
        at: DateTime<Utc>,
        miniserver: Option<String>,
        controls: usize,
    },
    Value {
        at: DateTime<Utc>,
        id: String,
        value: StateValue,
    },
    Text {
        at: DateTime<Utc>,
        text: String,
    },
    Disconnected {
        at: DateTime<Utc>,
        reason: Option<String>,
    },
}

impl WatchLine {
    fn from_event(event: SessionEvent) -> Self {
        let at = Utc::now();
        match event {
            SessionEvent::StateChanged(state) => Self::State {
                at,
                state: state.to_string(),
            },
            SessionEvent::CatalogLoaded(catalog) => Self::Catalog {
                at,
                miniserver: catalog.ms_info.ms_name.clone(),
                controls: catalog.controls.len(),
            },
            SessionEvent::Value(value) => Self::Value {
                at,
                id: value.id,
                value: value.value,
            },
            SessionEvent::Text(text) => Self::Text { at, text },
            SessionEvent::Disconnected { reason } => Self::Disconnected { at, reason },
        }
    }

    fn at(&self) -> DateTime<Utc> {
        match self {
            Self::State { at, .. }
            | Self::Catalog { at, .. }
            | Self::Value { at, .. }
            | Self::Text { at, .. }
            | Self::Disconnected { at, .. } => *at,
        }
    }

    /// Human-readable rendering without the timestamp.
    fn describe(&self) -> String {
        match self {
            Self::State { state, .. } => format!("state      {state}"),
            Self::Catalog {
                miniserver,
                controls,
                ..
            } => format!(
                "catalog    {} ({controls} controls)",
                miniserver.as_deref().unwrap_or("Miniserver")
            ),
            Self::Value { id, value, .. } => {
                let value = match value {
                    StateValue::Number(n) => n.to_string(),
                    StateValue::Text(t) => t.clone(),
                    StateValue::Other(v) => v.to_string(),
                };
                format!("value      {id} = {value}")
            }
            Self::Text { text, .. } => format!("text       {text}"),
            Self::Disconnected { reason, .. } => format!(
                "disconnected{}",
                reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
            ),
        }
    }

    fn render(&self, format: OutputFormat, color: bool) -> String {
        match format {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(self, true),
            OutputFormat::Plain => self.describe(),
            OutputFormat::Table | OutputFormat::Yaml => {
                let stamp = self
                    .at()
                    .with_timezone(&Local)
                    .format("%H:%M:%S%.3f")
                    .to_string();
                format!("{} {}", output::muted(&stamp, color), self.describe())
            }
        }
    }
}

/// Realtime session options for `watch`.
///
/// `--timeout` bounds HTTP requests only; realtime replies keep the
/// session's own timeout.
fn session_options(args: &WatchArgs, cfg: &Config, global: &GlobalOpts) -> SessionOptions {
    SessionOptions {
        strict_auth: config::strict_auth(global, cfg) && !args.no_strict_auth,
        ..SessionOptions::default()
    }
}

pub async fn handle(args: WatchArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = config::resolve_connection(global, cfg)?;
    let registry = SessionRegistry::new(session_options(&args, cfg, global));
    let lease = registry.acquire(&settings)?;
    let mut events = lease.subscribe();
    let color = output::should_color(global.color);

    debug!(key = %lease.key(), "watching session");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    let line = WatchLine::from_event(event);
                    output::print_output(&line.render(global.output, color), global.quiet);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch output fell behind; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    drop(lease);
    Ok(())
}
