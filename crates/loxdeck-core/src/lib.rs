// loxdeck-core: Button actions, poll loops and shared sessions between
// loxdeck-api and its consumers (the hardware host and the CLI).

pub mod browse;
pub mod button;
pub mod config;
pub mod deck;
pub mod error;
pub mod miniserver;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use browse::{CACHE_TTL, CatalogBrowser, ConnectionReport, ControlEntry};
pub use button::{
    ActionKind, Button, ButtonSettings, ButtonState, ButtonSurface, DEFAULT_STEP, Indicator,
    Outcome, RecordingSurface, SETUP_LABEL,
};
pub use config::{ConnectionSettings, SessionKey, TlsVerification};
pub use deck::{Deck, POLL_INTERVAL};
pub use error::CoreError;
pub use miniserver::{Connector, HttpConnector, Miniserver};
pub use registry::{SessionLease, SessionOptions, SessionRegistry};
