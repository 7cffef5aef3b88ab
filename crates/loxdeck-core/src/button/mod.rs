// ── Command dispatcher ──
//
// One `Button` per visible hardware control. A press or a dial turn maps
// to exactly one outbound command; the numeric reply code decides whether
// the remembered state moves. Nothing is retried here: a rejected or
// failed command shows the alert indicator and is logged, and the next
// poll brings the label back in line with the controller.

mod action;
mod surface;

use tracing::{debug, warn};

use loxdeck_api::{CODE_OK, Catalog};

use crate::config::ConnectionSettings;
use crate::miniserver::Miniserver;

pub use action::{ActionKind, VERB_FULL_DOWN, VERB_PULSE, format_level, manual_position_verb};
pub use surface::{ButtonSurface, Indicator, RecordingSurface, SurfaceUpdate};

/// Title shown while required settings are missing.
pub const SETUP_LABEL: &str = "Setup";

/// Dial step used when none (or a non-positive one) is configured.
pub const DEFAULT_STEP: f64 = 5.0;

const LEVEL_MIN: f64 = 0.0;
const LEVEL_MAX: f64 = 100.0;

// ── Settings & state ─────────────────────────────────────────────────

/// Per-button configuration as handed over by the host.
#[derive(Debug, Clone, Default)]
pub struct ButtonSettings {
    pub connection: Option<ConnectionSettings>,
    /// Identifier of the catalog entry this button drives.
    pub target: Option<String>,
    /// Display name; the kind's title is used when absent.
    pub name: Option<String>,
    pub step_size: Option<f64>,
}

impl ButtonSettings {
    /// Presence checks only: a complete connection and a non-blank target.
    pub fn is_configured(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ConnectionSettings::is_complete)
            && self.target().is_some()
    }

    pub fn target(&self) -> Option<&str> {
        self.target
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Effective dial step.
    pub fn step(&self) -> f64 {
        self.step_size
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(DEFAULT_STEP)
    }
}

/// Last known controller state, as far as this button knows it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ButtonState {
    /// Level or position in `[0, 100]`.
    pub level: f64,
    pub on: bool,
}

/// Result of one press or turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The controller answered `200`.
    Accepted { verb: String },
    /// The controller answered with another code.
    Rejected { verb: String, code: u16 },
    /// The request never got an answer.
    Failed { verb: String, message: String },
    /// Settings are incomplete; nothing was sent.
    NeedsSetup,
    /// The gesture means nothing for this kind (e.g. turning a key).
    Ignored,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

struct Plan {
    verb: String,
    /// State to adopt when the command is accepted.
    next: Option<ButtonState>,
}

// ── Button ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Button {
    kind: ActionKind,
    settings: ButtonSettings,
    state: ButtonState,
}

impl Button {
    pub fn new(kind: ActionKind, settings: ButtonSettings) -> Self {
        Self {
            kind,
            settings,
            state: ButtonState::default(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn settings(&self) -> &ButtonSettings {
        &self.settings
    }

    pub fn state(&self) -> ButtonState {
        self.state
    }

    pub fn name(&self) -> &str {
        self.settings
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.kind.title())
    }

    /// Current title for the surface.
    pub fn label(&self) -> String {
        if !self.settings.is_configured() {
            return SETUP_LABEL.to_owned();
        }
        let name = self.name();
        match self.kind {
            ActionKind::Switch => {
                format!("{name}\n{}", if self.state.on { "ON" } else { "OFF" })
            }
            ActionKind::Pulse => name.to_owned(),
            _ => format!("{name}\n{:.0}%", self.state.level),
        }
    }

    /// Adopt the controller's view from a catalog snapshot.
    ///
    /// Returns `false` when the target or its state channel is missing;
    /// the remembered state is left alone in that case.
    pub fn refresh(&mut self, catalog: &Catalog) -> bool {
        let Some(target) = self.settings.target() else {
            return false;
        };
        let reading = self
            .kind
            .state_channels()
            .iter()
            .find_map(|channel| catalog.state_value(target, channel));
        match reading {
            Some(value) => self.apply_reading(value),
            None => {
                debug!(target, kind = %self.kind, "no state channel in catalog");
                false
            }
        }
    }

    /// Adopt one numeric reading of the button's state channel.
    pub fn apply_reading(&mut self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        if self.kind.shows_level() {
            self.state.level = value.clamp(LEVEL_MIN, LEVEL_MAX);
            self.state.on = self.state.level > 0.0;
        } else {
            self.state.on = value.abs() > f64::EPSILON;
        }
        true
    }

    // ── Gestures ─────────────────────────────────────────────────────

    /// Key press (or dial push).
    pub async fn press(
        &mut self,
        miniserver: &dyn Miniserver,
        surface: &dyn ButtonSurface,
    ) -> Outcome {
        if !self.settings.is_configured() {
            surface.set_title(SETUP_LABEL);
            return Outcome::NeedsSetup;
        }
        let plan = self.plan_press();
        self.dispatch(plan, miniserver, surface).await
    }

    /// Dial turn by `ticks` detents (negative turns down).
    pub async fn rotate(
        &mut self,
        ticks: i32,
        miniserver: &dyn Miniserver,
        surface: &dyn ButtonSurface,
    ) -> Outcome {
        if !self.settings.is_configured() {
            surface.set_title(SETUP_LABEL);
            return Outcome::NeedsSetup;
        }
        match self.plan_rotate(ticks) {
            Some(plan) => self.dispatch(plan, miniserver, surface).await,
            None => Outcome::Ignored,
        }
    }

    fn plan_press(&self) -> Plan {
        match self.kind {
            ActionKind::Switch => {
                let on = !self.state.on;
                Plan {
                    verb: if on { "On" } else { "Off" }.to_owned(),
                    next: Some(ButtonState { on, ..self.state }),
                }
            }
            ActionKind::DimmerKey | ActionKind::DimmerDial => {
                let level = if self.state.level > 0.0 { LEVEL_MIN } else { LEVEL_MAX };
                Plan {
                    verb: format_level(level),
                    next: Some(ButtonState {
                        level,
                        on: level > 0.0,
                    }),
                }
            }
            ActionKind::BlindKey | ActionKind::BlindDial => Plan {
                verb: VERB_FULL_DOWN.to_owned(),
                next: None,
            },
            ActionKind::Pulse => Plan {
                verb: VERB_PULSE.to_owned(),
                next: None,
            },
        }
    }

    fn plan_rotate(&self, ticks: i32) -> Option<Plan> {
        if !self.kind.is_dial() || ticks == 0 {
            return None;
        }
        let level = dial_target(self.state.level, ticks, self.settings.step());
        let verb = match self.kind {
            ActionKind::BlindDial => manual_position_verb(level),
            _ => format_level(level),
        };
        Some(Plan {
            verb,
            next: Some(ButtonState {
                level,
                on: level > 0.0,
            }),
        })
    }

    async fn dispatch(
        &mut self,
        plan: Plan,
        miniserver: &dyn Miniserver,
        surface: &dyn ButtonSurface,
    ) -> Outcome {
        let Some(target) = self.settings.target().map(str::to_owned) else {
            return Outcome::NeedsSetup;
        };
        let Plan { verb, next } = plan;

        match miniserver.send_command(&target, &verb).await {
            Ok(code) if code == CODE_OK => {
                if let Some(next) = next {
                    self.state = next;
                }
                debug!(target, verb, "command accepted");
                surface.set_title(&self.label());
                surface.show_indicator(Indicator::Ok);
                Outcome::Accepted { verb }
            }
            Ok(code) => {
                warn!(target, verb, code, "command rejected");
                surface.show_indicator(Indicator::Alert);
                Outcome::Rejected { verb, code }
            }
            Err(e) => {
                warn!(target, verb, error = %e, "command failed");
                surface.show_indicator(Indicator::Alert);
                Outcome::Failed {
                    verb,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// `clamp(current + ticks * step, 0, 100)`
pub fn dial_target(current: f64, ticks: i32, step: f64) -> f64 {
    (current + f64::from(ticks) * step).clamp(LEVEL_MIN, LEVEL_MAX)
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeMiniserver, settings_for};

    const TARGET: &str = "0f1e2d3c-0001-0000-0000-000000000001";

    fn button(kind: ActionKind) -> Button {
        Button::new(kind, settings_for(TARGET, "Lamp"))
    }

    fn catalog(states: &serde_json::Value) -> Catalog {
        serde_json::from_value(json!({
            "controls": { TARGET: { "name": "Lamp", "type": "Switch", "states": states } }
        }))
        .expect("catalog")
    }

    // ── Switch ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn switch_toggles_on_then_off() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::Switch);

        assert!(b.press(&ms, &surface).await.is_success());
        assert!(b.state().on);
        assert_eq!(surface.last_title().as_deref(), Some("Lamp\nON"));

        assert!(b.press(&ms, &surface).await.is_success());
        assert!(!b.state().on);
        assert_eq!(surface.last_title().as_deref(), Some("Lamp\nOFF"));

        assert_eq!(ms.commands(), vec![
            (TARGET.to_owned(), "On".to_owned()),
            (TARGET.to_owned(), "Off".to_owned()),
        ]);
    }

    #[tokio::test]
    async fn rejected_code_leaves_state_unchanged() {
        let ms = FakeMiniserver::new(json!({}));
        ms.queue_reply(Some(500));
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::Switch);

        let outcome = b.press(&ms, &surface).await;
        assert_eq!(outcome, Outcome::Rejected {
            verb: "On".into(),
            code: 500
        });
        assert!(!b.state().on);
        assert_eq!(surface.last_indicator(), Some(Indicator::Alert));

        // The next press still asks for On.
        assert!(b.press(&ms, &surface).await.is_success());
        assert_eq!(ms.commands().last().map(|c| c.1.as_str()), Some("On"));
    }

    #[tokio::test]
    async fn transport_failure_shows_alert() {
        let ms = FakeMiniserver::new(json!({}));
        ms.queue_reply(None);
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::Pulse);

        assert!(matches!(b.press(&ms, &surface).await, Outcome::Failed { .. }));
        assert_eq!(surface.last_indicator(), Some(Indicator::Alert));
    }

    #[tokio::test]
    async fn unconfigured_button_sends_nothing() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut b = Button::new(ActionKind::Switch, ButtonSettings::default());

        assert_eq!(b.press(&ms, &surface).await, Outcome::NeedsSetup);
        assert_eq!(b.rotate(1, &ms, &surface).await, Outcome::NeedsSetup);
        assert!(ms.commands().is_empty());
        assert_eq!(surface.last_title().as_deref(), Some(SETUP_LABEL));
    }

    // ── Dimmer / blind ───────────────────────────────────────────────

    #[tokio::test]
    async fn dimmer_key_alternates_between_0_and_100() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::DimmerKey);

        b.press(&ms, &surface).await;
        assert_eq!(b.state().level, 100.0);
        b.press(&ms, &surface).await;
        assert_eq!(b.state().level, 0.0);

        let verbs: Vec<String> = ms.commands().into_iter().map(|c| c.1).collect();
        assert_eq!(verbs, vec!["100", "0"]);
    }

    #[tokio::test]
    async fn dial_clamps_to_upper_bound() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut settings = settings_for(TARGET, "Lamp");
        settings.step_size = Some(10.0);
        let mut b = Button::new(ActionKind::DimmerDial, settings);
        b.apply_reading(95.0);

        assert!(b.rotate(1, &ms, &surface).await.is_success());
        assert_eq!(b.state().level, 100.0);
        assert_eq!(ms.commands().last().map(|c| c.1.clone()), Some("100".to_owned()));
        assert_eq!(surface.last_title().as_deref(), Some("Lamp\n100%"));
    }

    #[tokio::test]
    async fn blind_dial_sends_manual_position_with_default_step() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::BlindDial);
        b.apply_reading(30.0);

        b.rotate(2, &ms, &surface).await;
        assert_eq!(b.state().level, 40.0);
        b.rotate(-100, &ms, &surface).await;
        assert_eq!(b.state().level, 0.0);

        let verbs: Vec<String> = ms.commands().into_iter().map(|c| c.1).collect();
        assert_eq!(verbs, vec!["ManualPosition/40", "ManualPosition/0"]);
    }

    #[tokio::test]
    async fn blind_key_sends_full_down_without_state_change() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::BlindKey);
        b.apply_reading(20.0);

        assert!(b.press(&ms, &surface).await.is_success());
        assert_eq!(b.state().level, 20.0);
        assert_eq!(ms.commands().last().map(|c| c.1.clone()), Some(VERB_FULL_DOWN.to_owned()));
    }

    #[tokio::test]
    async fn turning_a_key_is_ignored() {
        let ms = FakeMiniserver::new(json!({}));
        let surface = RecordingSurface::new();
        let mut b = button(ActionKind::Switch);

        assert_eq!(b.rotate(3, &ms, &surface).await, Outcome::Ignored);
        assert!(ms.commands().is_empty());
    }

    #[test]
    fn dial_target_clamps_both_ends() {
        assert_eq!(dial_target(95.0, 1, 10.0), 100.0);
        assert_eq!(dial_target(3.0, -1, 5.0), 0.0);
        assert_eq!(dial_target(50.0, 2, 2.5), 55.0);
    }

    #[test]
    fn non_positive_step_falls_back_to_default() {
        let mut settings = settings_for(TARGET, "Lamp");
        settings.step_size = Some(0.0);
        assert_eq!(settings.step(), DEFAULT_STEP);
        settings.step_size = None;
        assert_eq!(settings.step(), DEFAULT_STEP);
    }

    // ── Refresh ──────────────────────────────────────────────────────

    #[test]
    fn switch_refresh_reads_active_channel() {
        let mut b = button(ActionKind::Switch);

        assert!(b.refresh(&catalog(&json!({ "active": 1 }))));
        assert!(b.state().on);
        assert!(b.label().contains("ON"));

        assert!(b.refresh(&catalog(&json!({ "active": 0 }))));
        assert!(!b.state().on);
        assert!(b.label().contains("OFF"));
    }

    #[test]
    fn dimmer_refresh_falls_back_to_value_channel() {
        let mut b = button(ActionKind::DimmerDial);
        assert!(b.refresh(&catalog(&json!({ "value": 42 }))));
        assert_eq!(b.label(), "Lamp\n42%");

        assert!(b.refresh(&catalog(&json!({ "position": 130, "value": 1 }))));
        assert_eq!(b.state().level, 100.0);
    }

    #[test]
    fn refresh_without_state_keeps_previous() {
        let mut b = button(ActionKind::Switch);
        b.apply_reading(1.0);
        assert!(!b.refresh(&catalog(&json!({ "position": 10 }))));
        assert!(b.state().on);
    }

    #[test]
    fn missing_name_uses_kind_title() {
        let mut settings = settings_for(TARGET, "Lamp");
        settings.name = None;
        let b = Button::new(ActionKind::Pulse, settings);
        assert_eq!(b.label(), "Pulse");
    }
}
