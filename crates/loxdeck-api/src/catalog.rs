// Catalog document models
//
// The full configuration snapshot served at `data/LoxAPP3.json`. Fields use
// `#[serde(default)]` liberally because firmware generations disagree about
// which blocks are present. A catalog is immutable once fetched; every
// refresh replaces it wholesale.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::StateValue;

/// Path of the catalog document, shared by the HTTP and realtime paths.
pub const CATALOG_PATH: &str = "data/LoxAPP3.json";

// ── Document ─────────────────────────────────────────────────────────

/// Full controller configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub ms_info: MiniserverInfo,
    /// Entries keyed by their 128-bit identifier.
    #[serde(default)]
    pub controls: HashMap<String, Control>,
    #[serde(default)]
    pub rooms: HashMap<String, Room>,
    #[serde(default)]
    pub cats: HashMap<String, Category>,
    /// Current readings keyed by sub-channel identifier.
    #[serde(default)]
    pub values: HashMap<String, StateValue>,
    /// Catch-all for undocumented blocks.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Controller identity block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiniserverInfo {
    #[serde(default)]
    pub ms_name: Option<String>,
    #[serde(default)]
    pub serial_nr: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub sw_version: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One logical entry (a switch, dimmer, blind, pushbutton, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    #[serde(default)]
    pub name: String,
    /// Type tag, e.g. `"Switch"`, `"Dimmer"`, `"Jalousie"`.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub uuid_action: Option<String>,
    /// Parent grouping reference.
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub cat: Option<String>,
    /// Named sub-channels.
    #[serde(default)]
    pub states: HashMap<String, StateRef>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A sub-channel reference: either an inline reading or the identifier of
/// a reading held in [`Catalog::values`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    Number(f64),
    Bool(bool),
    Id(String),
    /// Structured sub-channels (mood lists, nested blocks). Never numeric.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

// ── Lookups ──────────────────────────────────────────────────────────

impl Catalog {
    /// Look up an entry by identifier.
    pub fn control(&self, id: &str) -> Option<&Control> {
        self.controls.get(id)
    }

    /// Current numeric reading of one named sub-channel of an entry.
    ///
    /// Inline values win; string references are resolved through
    /// [`values`](Self::values), falling back to parsing the string itself.
    pub fn state_value(&self, id: &str, state: &str) -> Option<f64> {
        match self.control(id)?.states.get(state)? {
            StateRef::Number(n) => Some(*n),
            StateRef::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            StateRef::Id(sub) => self
                .values
                .get(sub)
                .and_then(StateValue::as_f64)
                .or_else(|| sub.trim().parse().ok()),
            StateRef::Other(_) => None,
        }
    }

    /// Human name of a room reference, if known.
    pub fn room_name(&self, id: &str) -> Option<&str> {
        self.rooms.get(id).map(|r| r.name.as_str())
    }

    /// Human name of a category reference, if known.
    pub fn category_name(&self, id: &str) -> Option<&str> {
        self.cats.get(id).map(|c| c.name.as_str())
    }

    /// All entries with their identifiers, sorted by name then identifier.
    pub fn entries(&self) -> Vec<(&str, &Control)> {
        let mut entries: Vec<(&str, &Control)> =
            self.controls.iter().map(|(id, c)| (id.as_str(), c)).collect();
        entries.sort_by(|a, b| a.1.name.cmp(&b.1.name).then_with(|| a.0.cmp(b.0)));
        entries
    }
}
