// ── Runtime connection configuration ──
//
// These types describe *how* to reach one Miniserver. They carry the
// credentials in memory only and never touch disk. The binary builds them
// from its config file; the hardware host would build them from its
// settings store.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use loxdeck_api::transport::{TlsMode, TransportConfig};
use loxdeck_api::{Credentials, base_url_from_address};

use crate::error::CoreError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs). Default for local controllers.
    #[default]
    DangerAcceptInvalid,
}

/// Identity of a shared connection: one per `(address, username)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub address: String,
    pub username: String,
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.username, self.address)
    }
}

/// Where and how to reach a Miniserver.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Host, `host:port`, or full URL.
    pub address: String,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Transport timeout for the simple request path.
    pub timeout: Duration,
}

impl ConnectionSettings {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Presence check only: address and username must be non-blank.
    pub fn is_complete(&self) -> bool {
        !self.address.trim().is_empty() && !self.username.trim().is_empty()
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            address: self.address.trim().to_owned(),
            username: self.username.trim().to_owned(),
        }
    }

    pub fn base_url(&self) -> Result<Url, CoreError> {
        Ok(base_url_from_address(&self.address)?)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.trim(), self.password.clone())
    }

    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }
}
