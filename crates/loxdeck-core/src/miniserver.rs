// ── Miniserver seam ──
//
// Buttons and the catalog browser talk to a controller through the
// object-safe `Miniserver` trait so tests can substitute an in-memory
// fake. `HttpConnector` is the production path: one transient HTTP
// request per poll or command, no shared connection.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use loxdeck_api::{Catalog, MiniserverClient};

use crate::config::ConnectionSettings;
use crate::error::CoreError;

/// The two operations the runtime control path needs from a controller.
#[async_trait]
pub trait Miniserver: Send + Sync {
    /// Fetch a fresh catalog snapshot.
    async fn fetch_catalog(&self) -> Result<Catalog, CoreError>;

    /// Send one command and return the controller's numeric status code.
    /// Only transport failures are `Err`; a non-200 code is a value.
    async fn send_command(&self, target: &str, verb: &str) -> Result<u16, CoreError>;
}

/// Builds a [`Miniserver`] for a set of connection settings.
pub trait Connector: Send + Sync {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Miniserver>, CoreError>;
}

#[async_trait]
impl Miniserver for MiniserverClient {
    async fn fetch_catalog(&self) -> Result<Catalog, CoreError> {
        Ok(MiniserverClient::fetch_catalog(self).await?)
    }

    async fn send_command(&self, target: &str, verb: &str) -> Result<u16, CoreError> {
        Ok(MiniserverClient::send_command(self, target, verb).await?)
    }
}

/// Production connector over the plain HTTP API.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl Connector for HttpConnector {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Miniserver>, CoreError> {
        if !settings.is_complete() {
            return Err(CoreError::NotConfigured {
                message: "address and username are required".into(),
            });
        }
        let base_url = settings.base_url()?;
        debug!(url = %base_url, username = %settings.username, "building HTTP client");
        let client =
            MiniserverClient::new(base_url, settings.credentials(), &settings.transport())?;
        Ok(Arc::new(client))
    }
}
