// ── Core error types ──
//
// Button- and tool-facing errors. Consumers never match on reqwest or
// tungstenite failures directly; the `From<loxdeck_api::Error>` impl folds
// transport-layer errors into the handful of outcomes a button can show.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to Miniserver at {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Realtime session disconnected")]
    Disconnected,

    #[error("Miniserver request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Control not found: {identifier}")]
    NotFound { identifier: String },

    #[error("Unexpected Miniserver response: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration incomplete: {message}")]
    NotConfigured { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<loxdeck_api::Error> for CoreError {
    fn from(err: loxdeck_api::Error) -> Self {
        match err {
            loxdeck_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            loxdeck_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        address: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            loxdeck_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid Miniserver address: {e}"),
            },
            loxdeck_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            loxdeck_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            loxdeck_api::Error::Status { status: 401 } => CoreError::AuthenticationFailed {
                message: "Miniserver rejected the credentials".into(),
            },
            loxdeck_api::Error::Status { status: 404 } => CoreError::NotFound {
                identifier: "catalog".into(),
            },
            loxdeck_api::Error::Status { status } => CoreError::Api {
                message: format!("HTTP {status}"),
                status: Some(status),
            },
            loxdeck_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            loxdeck_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                address: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            loxdeck_api::Error::Disconnected => CoreError::Disconnected,
            loxdeck_api::Error::Deserialization { message, body: _ } => CoreError::Api {
                message: format!("Malformed catalog: {message}"),
                status: None,
            },
        }
    }
}
