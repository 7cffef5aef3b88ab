use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// What a physical control does when pressed or turned.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    /// Toggle `On`/`Off`.
    Switch,
    /// Key that toggles a dimmer between 0 and 100.
    DimmerKey,
    /// Dial that steps a dimmer level.
    DimmerDial,
    /// Key that fully closes a blind.
    BlindKey,
    /// Dial that steps a blind position.
    BlindDial,
    /// Momentary pulse.
    Pulse,
}

/// Fixed verb for closing a blind fully.
pub const VERB_FULL_DOWN: &str = "FullDown";
pub const VERB_PULSE: &str = "Pulse";

impl ActionKind {
    pub fn is_dial(self) -> bool {
        matches!(self, Self::DimmerDial | Self::BlindDial)
    }

    /// Name shown on the button when none is configured.
    pub fn title(self) -> &'static str {
        match self {
            Self::Switch => "Switch",
            Self::DimmerKey | Self::DimmerDial => "Dimmer",
            Self::BlindKey | Self::BlindDial => "Blind",
            Self::Pulse => "Pulse",
        }
    }

    /// Sub-channel names read from the catalog, in order of preference.
    pub fn state_channels(self) -> &'static [&'static str] {
        match self {
            Self::Switch | Self::Pulse => &["active"],
            Self::DimmerKey | Self::DimmerDial | Self::BlindKey | Self::BlindDial => {
                &["position", "value"]
            }
        }
    }

    /// Whether the label carries a percentage rather than ON/OFF.
    pub(crate) fn shows_level(self) -> bool {
        !matches!(self, Self::Switch | Self::Pulse)
    }
}

/// Verb for an absolute blind position.
pub fn manual_position_verb(position: f64) -> String {
    format!("ManualPosition/{}", format_level(position))
}

/// Render a level for the command path: integral values without a
/// fractional part (`100`, not `100.0`).
pub fn format_level(level: f64) -> String {
    format!("{level}")
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn kinds_parse_from_kebab_case() {
        assert_eq!(ActionKind::from_str("dimmer-dial").ok(), Some(ActionKind::DimmerDial));
        assert_eq!(ActionKind::BlindKey.to_string(), "blind-key");
        assert!(ActionKind::from_str("dimmer").is_err());
    }

    #[test]
    fn every_kind_has_a_state_channel() {
        for kind in ActionKind::iter() {
            assert!(!kind.state_channels().is_empty(), "{kind}");
        }
    }

    #[test]
    fn verbs_render_whole_numbers_without_fraction() {
        assert_eq!(format_level(100.0), "100");
        assert_eq!(format_level(42.5), "42.5");
        assert_eq!(manual_position_verb(40.0), "ManualPosition/40");
    }
}
