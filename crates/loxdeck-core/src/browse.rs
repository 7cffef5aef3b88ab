// ── Catalog browsing ──
//
// Backs the companion tool used to look up identifiers while configuring
// buttons. Catalogs are cached for a short TTL per `(address, username)`
// so repeated lookups while filling in a form don't hammer the
// Miniserver. A cached catalog is only served to a caller presenting the
// password it was fetched with. Not used by the runtime control path.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use loxdeck_api::{Catalog, Control};

use crate::config::{ConnectionSettings, SessionKey};
use crate::error::CoreError;
use crate::miniserver::Connector;

/// How long a fetched catalog is served from cache.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Flattened, display-ready view of one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub room: Option<String>,
    pub category: Option<String>,
    /// Current numeric reading per named sub-channel, where known.
    pub states: BTreeMap<String, Option<f64>>,
}

impl ControlEntry {
    /// Build the view, resolving room and category names.
    pub fn from_catalog(catalog: &Catalog, id: &str, control: &Control) -> Self {
        let states = control
            .states
            .keys()
            .map(|state| (state.clone(), catalog.state_value(id, state)))
            .collect();
        Self {
            id: id.to_owned(),
            name: control.name.clone(),
            kind: control.kind.clone(),
            room: control
                .room
                .as_deref()
                .map(|r| catalog.room_name(r).unwrap_or(r).to_owned()),
            category: control
                .cat
                .as_deref()
                .map(|c| catalog.category_name(c).unwrap_or(c).to_owned()),
            states,
        }
    }

    /// Every entry of a catalog, sorted by name.
    pub fn list(catalog: &Catalog) -> Vec<Self> {
        catalog
            .entries()
            .into_iter()
            .map(|(id, control)| Self::from_catalog(catalog, id, control))
            .collect()
    }
}

/// Result of a connection test. Never an error: failures are reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub ok: bool,
    pub miniserver: Option<String>,
    pub serial: Option<String>,
    pub version: Option<String>,
    pub controls: usize,
    pub error: Option<String>,
}

impl ConnectionReport {
    fn success(catalog: &Catalog) -> Self {
        Self {
            ok: true,
            miniserver: catalog.ms_info.ms_name.clone(),
            serial: catalog.ms_info.serial_nr.clone(),
            version: catalog.ms_info.sw_version.clone(),
            controls: catalog.controls.len(),
            error: None,
        }
    }

    fn failure(error: &CoreError) -> Self {
        Self {
            ok: false,
            miniserver: None,
            serial: None,
            version: None,
            controls: 0,
            error: Some(error.to_string()),
        }
    }
}

struct CachedCatalog {
    catalog: Arc<Catalog>,
    password: SecretString,
    fetched_at: Instant,
}

/// Catalog lookups with a short-lived per-connection cache.
pub struct CatalogBrowser {
    connector: Arc<dyn Connector>,
    cache: DashMap<SessionKey, CachedCatalog>,
    ttl: Duration,
}

impl CatalogBrowser {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            cache: DashMap::new(),
            ttl: CACHE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The catalog for these settings, from cache unless stale or
    /// `force_refresh` is set.
    pub async fn fetch_catalog(
        &self,
        settings: &ConnectionSettings,
        force_refresh: bool,
    ) -> Result<Arc<Catalog>, CoreError> {
        let key = settings.key();

        if !force_refresh {
            if let Some(cached) = self.cached(&key, &settings.password) {
                debug!(key = %key, "catalog served from cache");
                return Ok(cached);
            }
        }

        let miniserver = self.connector.connect(settings)?;
        let catalog = Arc::new(miniserver.fetch_catalog().await?);
        info!(key = %key, controls = catalog.controls.len(), "catalog fetched");

        self.cache.insert(key, CachedCatalog {
            catalog: Arc::clone(&catalog),
            password: settings.password.clone(),
            fetched_at: Instant::now(),
        });
        Ok(catalog)
    }

    /// Fetch a fresh catalog and summarize the controller.
    pub async fn test_connection(&self, settings: &ConnectionSettings) -> ConnectionReport {
        match self.fetch_catalog(settings, true).await {
            Ok(catalog) => ConnectionReport::success(&catalog),
            Err(e) => {
                debug!(error = %e, "connection test failed");
                ConnectionReport::failure(&e)
            }
        }
    }

    /// One entry by identifier, or `None` if the catalog lacks it.
    pub async fn fetch_entry(
        &self,
        settings: &ConnectionSettings,
        id: &str,
    ) -> Result<Option<ControlEntry>, CoreError> {
        let catalog = self.fetch_catalog(settings, false).await?;
        Ok(catalog
            .control(id)
            .map(|control| ControlEntry::from_catalog(&catalog, id, control)))
    }

    /// Drop the cached catalog for these settings.
    pub fn invalidate(&self, settings: &ConnectionSettings) {
        self.cache.remove(&settings.key());
    }

    fn cached(&self, key: &SessionKey, password: &SecretString) -> Option<Arc<Catalog>> {
        let fresh = self
            .cache
            .get(key)
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .filter(|c| c.password.expose_secret() == password.expose_secret())
            .map(|c| Arc::clone(&c.catalog));
        if fresh.is_none() {
            self.cache.remove_if(key, |_, c| c.fetched_at.elapsed() >= self.ttl);
        }
        fresh
    }
}
