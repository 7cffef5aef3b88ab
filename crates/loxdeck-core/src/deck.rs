// ── Per-button poll loops ──
//
// A `Deck` owns every visible button. Each configured button gets its own
// background task that fetches the full catalog right away and then every
// `POLL_INTERVAL`, applying the button's state to its title. Buttons never
// share fetches: N buttons on one Miniserver mean N catalog requests per
// interval. Hiding a button cancels its task; a fetch that completes after
// that point is dropped on the floor.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::button::{
    ActionKind, Button, ButtonSettings, ButtonState, ButtonSurface, Indicator, Outcome,
};
use crate::miniserver::{Connector, Miniserver};

/// How often a visible button re-fetches the catalog.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

struct Slot {
    kind: ActionKind,
    button: Mutex<Button>,
    surface: Arc<dyn ButtonSurface>,
    /// `None` when settings are incomplete or the connector refused them.
    miniserver: Option<Arc<dyn Miniserver>>,
    cancel: CancellationToken,
}

enum Gesture {
    Press,
    Rotate(i32),
}

/// All buttons currently on screen, keyed by the host's context string.
pub struct Deck {
    connector: Arc<dyn Connector>,
    slots: DashMap<String, Arc<Slot>>,
    poll_interval: Duration,
}

impl Deck {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            slots: DashMap::new(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, context: &str) -> bool {
        self.slots.contains_key(context)
    }

    /// Remembered state of a visible button.
    pub async fn state(&self, context: &str) -> Option<ButtonState> {
        let slot = self.slot(context)?;
        let button = slot.button.lock().await;
        Some(button.state())
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// A button became visible. Must be called inside a Tokio runtime.
    ///
    /// Replaces any button already registered under `context`.
    pub fn will_appear(
        &self,
        context: impl Into<String>,
        kind: ActionKind,
        settings: ButtonSettings,
        surface: Arc<dyn ButtonSurface>,
    ) {
        let context = context.into();
        let button = Button::new(kind, settings);
        surface.set_title(&button.label());

        let miniserver = match button.settings().connection.as_ref() {
            Some(connection) if button.settings().is_configured() => {
                match self.connector.connect(connection) {
                    Ok(miniserver) => Some(miniserver),
                    Err(e) => {
                        warn!(context, error = %e, "cannot build Miniserver client");
                        surface.show_indicator(Indicator::Alert);
                        None
                    }
                }
            }
            _ => {
                debug!(context, "button needs configuration");
                None
            }
        };

        let slot = Arc::new(Slot {
            kind,
            button: Mutex::new(button),
            surface,
            miniserver: miniserver.clone(),
            cancel: CancellationToken::new(),
        });

        if let Some(miniserver) = miniserver {
            info!(context, kind = %kind, "starting poll loop");
            tokio::spawn(poll_loop(
                Arc::clone(&slot),
                miniserver,
                self.poll_interval,
            ));
        }

        if let Some(previous) = self.slots.insert(context, slot) {
            previous.cancel.cancel();
        }
    }

    /// A button left the screen: stop its poll loop and forget its state.
    pub fn will_disappear(&self, context: &str) -> bool {
        match self.slots.remove(context) {
            Some((_, slot)) => {
                slot.cancel.cancel();
                debug!(context, "poll loop cancelled");
                true
            }
            None => false,
        }
    }

    /// Settings changed: restart the button with the new settings.
    ///
    /// Remembered state is discarded along with the old poll loop.
    pub fn update_settings(&self, context: &str, settings: ButtonSettings) -> bool {
        let Some((_, previous)) = self.slots.remove(context) else {
            return false;
        };
        previous.cancel.cancel();
        self.will_appear(context, previous.kind, settings, Arc::clone(&previous.surface));
        true
    }

    /// Stop every poll loop.
    pub fn clear(&self) {
        for slot in &self.slots {
            slot.cancel.cancel();
        }
        self.slots.clear();
    }

    // ── Gestures ─────────────────────────────────────────────────────

    pub async fn key_down(&self, context: &str) -> Outcome {
        self.perform(context, Gesture::Press).await
    }

    pub async fn dial_rotate(&self, context: &str, ticks: i32) -> Outcome {
        self.perform(context, Gesture::Rotate(ticks)).await
    }

    /// Pushing a dial acts like pressing a key of the same family.
    pub async fn dial_down(&self, context: &str) -> Outcome {
        self.perform(context, Gesture::Press).await
    }

    fn slot(&self, context: &str) -> Option<Arc<Slot>> {
        self.slots.get(context).map(|entry| Arc::clone(entry.value()))
    }

    async fn perform(&self, context: &str, gesture: Gesture) -> Outcome {
        let Some(slot) = self.slot(context) else {
            debug!(context, "gesture for unknown button");
            return Outcome::Ignored;
        };
        let mut button = slot.button.lock().await;

        let Some(miniserver) = slot.miniserver.as_deref() else {
            if !button.settings().is_configured() {
                slot.surface.set_title(&button.label());
                return Outcome::NeedsSetup;
            }
            slot.surface.show_indicator(Indicator::Alert);
            return Outcome::Failed {
                verb: String::new(),
                message: "no Miniserver client for this button".into(),
            };
        };

        let surface = slot.surface.as_ref();
        match gesture {
            Gesture::Press => button.press(miniserver, surface).await,
            Gesture::Rotate(ticks) => button.rotate(ticks, miniserver, surface).await,
        }
    }
}

impl Drop for Deck {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Fetch now, then every `period`, until the slot's token fires.
async fn poll_loop(slot: Arc<Slot>, miniserver: Arc<dyn Miniserver>, period: Duration) {
    let cancel = slot.cancel.clone();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            fetched = miniserver.fetch_catalog() => fetched,
        };

        match fetched {
            Ok(catalog) => {
                let mut button = slot.button.lock().await;
                if cancel.is_cancelled() {
                    break;
                }
                if button.refresh(&catalog) {
                    slot.surface.set_title(&button.label());
                }
            }
            Err(e) => debug!(error = %e, "poll fetch failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::button::{RecordingSurface, SETUP_LABEL, SurfaceUpdate};
    use crate::testing::{FakeConnector, FakeMiniserver, settings_for};

    const TARGET: &str = "0f1e2d3c-0001-0000-0000-000000000001";

    fn catalog(active: u8) -> serde_json::Value {
        json!({
            "controls": { TARGET: { "name": "Lamp", "type": "Switch", "states": { "active": active } } }
        })
    }

    fn deck(miniserver: FakeMiniserver) -> (Deck, Arc<FakeConnector>) {
        let connector = Arc::new(FakeConnector::new(miniserver));
        let deck = Deck::new(Arc::clone(&connector) as Arc<dyn Connector>);
        (deck, connector)
    }

    #[tokio::test(start_paused = true)]
    async fn appear_fetches_immediately_then_every_interval() {
        let (deck, connector) = deck(FakeMiniserver::new(catalog(1)));
        let surface = Arc::new(RecordingSurface::new());

        deck.will_appear("ctx", ActionKind::Switch, settings_for(TARGET, "Lamp"), surface.clone());
        assert_eq!(surface.last_title().as_deref(), Some("Lamp\nOFF"));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connector.miniserver.fetches(), 1);
        assert_eq!(surface.last_title().as_deref(), Some("Lamp\nON"));
        assert_eq!(deck.state("ctx").await.map(|s| s.on), Some(true));

        tokio::time::sleep(POLL_INTERVAL).await;
        assert_eq!(connector.miniserver.fetches(), 2);

        connector.miniserver.set_catalog(catalog(0));
        tokio::time::sleep(POLL_INTERVAL).await;
        assert_eq!(connector.miniserver.fetches(), 3);
        assert_eq!(surface.last_title().as_deref(), Some("Lamp\nOFF"));
    }

    #[tokio::test(start_paused = true)]
    async fn disappear_stops_polling() {
        let (deck, connector) = deck(FakeMiniserver::new(catalog(1)));
        let surface = Arc::new(RecordingSurface::new());

        deck.will_appear("ctx", ActionKind::Switch, settings_for(TARGET, "Lamp"), surface);
        tokio::time::sleep(Duration::from_millis(1)).await;
        tokio::time::sleep(POLL_INTERVAL).await;
        assert_eq!(connector.miniserver.fetches(), 2);

        assert!(deck.will_disappear("ctx"));
        assert!(deck.is_empty());
        tokio::time::sleep(POLL_INTERVAL * 6).await;
        assert_eq!(connector.miniserver.fetches(), 2);
        assert!(!deck.will_disappear("ctx"));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_in_flight_at_hide_is_discarded() {
        let miniserver = FakeMiniserver::with_delay(catalog(1), Duration::from_secs(2));
        let (deck, connector) = deck(miniserver);
        let surface = Arc::new(RecordingSurface::new());

        deck.will_appear("ctx", ActionKind::Switch, settings_for(TARGET, "Lamp"), surface.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.miniserver.fetches(), 1);

        deck.will_disappear("ctx");
        tokio::time::sleep(POLL_INTERVAL * 4).await;

        assert_eq!(connector.miniserver.fetches(), 1);
        assert!(
            !surface
                .updates()
                .contains(&SurfaceUpdate::Title("Lamp\nON".into())),
            "late fetch must not reach the surface: {:?}",
            surface.updates()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn incomplete_settings_show_setup_without_polling() {
        let (deck, connector) = deck(FakeMiniserver::new(catalog(1)));
        let surface = Arc::new(RecordingSurface::new());

        let mut settings = settings_for(TARGET, "Lamp");
        settings.target = Some("  ".into());
        deck.will_appear("ctx", ActionKind::Switch, settings, surface.clone());
        tokio::time::sleep(POLL_INTERVAL * 2).await;

        assert_eq!(surface.last_title().as_deref(), Some(SETUP_LABEL));
        assert_eq!(connector.connects(), 0);
        assert_eq!(connector.miniserver.fetches(), 0);
        assert_eq!(deck.key_down("ctx").await, Outcome::NeedsSetup);
    }

    #[tokio::test(start_paused = true)]
    async fn gestures_route_to_the_right_button() {
        let (deck, connector) = deck(FakeMiniserver::new(catalog(0)));
        let key = Arc::new(RecordingSurface::new());
        let dial = Arc::new(RecordingSurface::new());

        deck.will_appear("key", ActionKind::Switch, settings_for(TARGET, "Lamp"), key.clone());
        deck.will_appear("dial", ActionKind::BlindDial, settings_for("blind-1", "Blind"), dial);
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(deck.key_down("key").await.is_success());
        assert!(deck.dial_rotate("dial", 3).await.is_success());
        assert!(deck.dial_down("dial").await.is_success());
        assert_eq!(deck.key_down("missing").await, Outcome::Ignored);

        assert_eq!(connector.miniserver.commands(), vec![
            (TARGET.to_owned(), "On".to_owned()),
            ("blind-1".to_owned(), "ManualPosition/15".to_owned()),
            ("blind-1".to_owned(), "FullDown".to_owned()),
        ]);
        assert_eq!(key.last_indicator(), Some(Indicator::Ok));
    }

    #[tokio::test(start_paused = true)]
    async fn update_settings_restarts_the_button() {
        let (deck, connector) = deck(FakeMiniserver::new(catalog(1)));
        let surface = Arc::new(RecordingSurface::new());

        deck.will_appear("ctx", ActionKind::Switch, settings_for(TARGET, "Lamp"), surface.clone());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(connector.miniserver.fetches(), 1);

        assert!(deck.update_settings("ctx", settings_for(TARGET, "Hall")));
        tokio::time::sleep(Duration::from_millis(1)).await;

        // One loop per button: the old one is gone, the new one fetched once.
        assert_eq!(connector.connects(), 2);
        assert_eq!(connector.miniserver.fetches(), 2);
        assert_eq!(surface.last_title().as_deref(), Some("Hall\nON"));
        assert_eq!(deck.len(), 1);

        tokio::time::sleep(POLL_INTERVAL).await;
        assert_eq!(connector.miniserver.fetches(), 3);
    }
}
