// In-memory fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use loxdeck_api::Catalog;

use crate::button::ButtonSettings;
use crate::config::ConnectionSettings;
use crate::error::CoreError;
use crate::miniserver::{Connector, Miniserver};

pub(crate) fn connection() -> ConnectionSettings {
    ConnectionSettings::new("10.0.0.2", "admin", SecretString::from("secret".to_string()))
}

pub(crate) fn settings_for(target: &str, name: &str) -> ButtonSettings {
    ButtonSettings {
        connection: Some(connection()),
        target: Some(target.to_owned()),
        name: Some(name.to_owned()),
        step_size: None,
    }
}

/// Serves a fixed catalog document and answers commands from a queue
/// (`None` = transport failure, empty queue = `200`).
pub(crate) struct FakeMiniserver {
    catalog: Mutex<serde_json::Value>,
    replies: Mutex<VecDeque<Option<u16>>>,
    commands: Mutex<Vec<(String, String)>>,
    fetches: AtomicUsize,
    fetch_delay: Duration,
}

impl FakeMiniserver {
    pub(crate) fn new(catalog: serde_json::Value) -> Self {
        Self::with_delay(catalog, Duration::ZERO)
    }

    pub(crate) fn with_delay(catalog: serde_json::Value, fetch_delay: Duration) -> Self {
        Self {
            catalog: Mutex::new(catalog),
            replies: Mutex::new(VecDeque::new()),
            commands: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            fetch_delay,
        }
    }

    pub(crate) fn set_catalog(&self, catalog: serde_json::Value) {
        *self.catalog.lock().expect("lock") = catalog;
    }

    pub(crate) fn queue_reply(&self, reply: Option<u16>) {
        self.replies.lock().expect("lock").push_back(reply);
    }

    pub(crate) fn commands(&self) -> Vec<(String, String)> {
        self.commands.lock().expect("lock").clone()
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Miniserver for FakeMiniserver {
    async fn fetch_catalog(&self) -> Result<Catalog, CoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let doc = self.catalog.lock().expect("lock").clone();
        serde_json::from_value(doc).map_err(|e| CoreError::Internal(e.to_string()))
    }

    async fn send_command(&self, target: &str, verb: &str) -> Result<u16, CoreError> {
        self.commands
            .lock()
            .expect("lock")
            .push((target.to_owned(), verb.to_owned()));
        match self.replies.lock().expect("lock").pop_front() {
            Some(Some(code)) => Ok(code),
            Some(None) => Err(CoreError::ConnectionFailed {
                address: "10.0.0.2".into(),
                reason: "connection refused".into(),
            }),
            None => Ok(200),
        }
    }
}

/// Hands out the same [`FakeMiniserver`] for every connection.
pub(crate) struct FakeConnector {
    pub(crate) miniserver: Arc<FakeMiniserver>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub(crate) fn new(miniserver: FakeMiniserver) -> Self {
        Self {
            miniserver: Arc::new(miniserver),
            connects: AtomicUsize::new(0),
        }
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    fn connect(&self, _settings: &ConnectionSettings) -> Result<Arc<dyn Miniserver>, CoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let miniserver: Arc<dyn Miniserver> = self.miniserver.clone();
        Ok(miniserver)
    }
}
