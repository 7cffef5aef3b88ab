// loxdeck-api: Async client for the Loxone Miniserver local API

pub mod auth;
pub mod catalog;
pub mod client;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod session;
pub mod transport;

pub use auth::Credentials;
pub use catalog::{Catalog, Category, Control, MiniserverInfo, Room, StateRef};
pub use client::{MiniserverClient, base_url_from_address, websocket_url};
pub use envelope::{CODE_OK, CommandReply};
pub use error::Error;
pub use frame::{StateValue, ValueEvent, decode_value_frame};
pub use session::{ReconnectConfig, SessionConfig, SessionEvent, SessionHandle, SessionState};
pub use transport::{TlsMode, TransportConfig};
