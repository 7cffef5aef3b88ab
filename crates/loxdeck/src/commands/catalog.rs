//! Catalog command handlers.

use std::sync::Arc;

use tabled::Tabled;

use loxdeck_core::{CatalogBrowser, ConnectionReport, ControlEntry, HttpConnector};

use crate::cli::{CatalogArgs, CatalogCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Room")]
    room: String,
    #[tabled(rename = "Category")]
    category: String,
}

impl From<&ControlEntry> for EntryRow {
    fn from(e: &ControlEntry) -> Self {
        Self {
            id: e.id.clone(),
            name: e.name.clone(),
            kind: e.kind.clone(),
            room: e.room.clone().unwrap_or_default(),
            category: e.category.clone().unwrap_or_default(),
        }
    }
}

fn detail(e: &ControlEntry) -> String {
    let mut lines = vec![
        format!("ID:        {}", e.id),
        format!("Name:      {}", e.name),
        format!("Type:      {}", e.kind),
        format!("Room:      {}", e.room.as_deref().unwrap_or("-")),
        format!("Category:  {}", e.category.as_deref().unwrap_or("-")),
    ];
    if !e.states.is_empty() {
        lines.push("States:".into());
        for (name, value) in &e.states {
            let value = value.map_or_else(|| "-".into(), |v| v.to_string());
            lines.push(format!("  {name:<16} {value}"));
        }
    }
    lines.join("\n")
}

fn report_detail(r: &ConnectionReport) -> String {
    if !r.ok {
        return format!(
            "Connection failed: {}",
            r.error.as_deref().unwrap_or("unknown error")
        );
    }
    [
        format!("Miniserver: {}", r.miniserver.as_deref().unwrap_or("-")),
        format!("Serial:     {}", r.serial.as_deref().unwrap_or("-")),
        format!("Version:    {}", r.version.as_deref().unwrap_or("-")),
        format!("Controls:   {}", r.controls),
    ]
    .join("\n")
}

/// Keep entries whose room contains `room` and whose type equals `kind`,
/// both case-insensitively.
fn filter_entries(
    entries: Vec<ControlEntry>,
    room: Option<&str>,
    kind: Option<&str>,
) -> Vec<ControlEntry> {
    let room = room.map(str::to_lowercase);
    entries
        .into_iter()
        .filter(|e| {
            room.as_deref().is_none_or(|r| {
                e.room
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(r))
            })
        })
        .filter(|e| kind.is_none_or(|k| e.kind.eq_ignore_ascii_case(k)))
        .collect()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: CatalogArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let settings = config::resolve_connection(global, cfg)?;
    let browser = CatalogBrowser::new(Arc::new(HttpConnector));

    match args.command {
        CatalogCommand::List { room, kind } => {
            let catalog = browser.fetch_catalog(&settings, false).await?;
            let entries = filter_entries(
                ControlEntry::list(&catalog),
                room.as_deref(),
                kind.as_deref(),
            );
            let out = output::render_list(
                global.output,
                &entries,
                |e| EntryRow::from(e),
                |e| e.id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        CatalogCommand::Get { id } => match browser.fetch_entry(&settings, &id).await? {
            Some(entry) => {
                let out = output::render_single(global.output, &entry, detail, |e| e.id.clone());
                output::print_output(&out, global.quiet);
                Ok(())
            }
            None => Err(CliError::NotFound {
                resource_type: "control".into(),
                identifier: id,
                list_command: "catalog list".into(),
            }),
        },

        CatalogCommand::Test => {
            let report = browser.test_connection(&settings).await;
            let out = output::render_single(global.output, &report, report_detail, |r| {
                r.ok.to_string()
            });
            output::print_output(&out, global.quiet);
            if report.ok {
                Ok(())
            } else {
                Err(CliError::ConnectionFailed {
                    address: settings.address.clone(),
                    reason: report.error.unwrap_or_default(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn entry(id: &str, kind: &str, room: Option<&str>) -> ControlEntry {
        ControlEntry {
            id: id.into(),
            name: id.into(),
            kind: kind.into(),
            room: room.map(Into::into),
            category: None,
            states: BTreeMap::new(),
        }
    }

    #[test]
    fn filters_by_room_substring_and_exact_type() {
        let entries = vec![
            entry("a", "Switch", Some("Kitchen")),
            entry("b", "Dimmer", Some("Kitchen")),
            entry("c", "Switch", Some("Living Room")),
            entry("d", "Switch", None),
        ];

        let ids = |v: Vec<ControlEntry>| v.into_iter().map(|e| e.id).collect::<Vec<_>>();

        assert_eq!(ids(filter_entries(entries.clone(), Some("kitch"), None)), ["a", "b"]);
        assert_eq!(ids(filter_entries(entries.clone(), None, Some("switch"))), ["a", "c", "d"]);
        assert_eq!(ids(filter_entries(entries, Some("room"), Some("Switch"))), ["c"]);
    }

    #[test]
    fn detail_lists_unknown_state_as_dash() {
        let mut e = entry("a", "Switch", None);
        e.states.insert("active".into(), None);
        assert!(detail(&e).contains("active"));
        assert!(detail(&e).contains(" -"));
    }
}
