// ── Shared realtime sessions ──
//
// One `SessionHandle` per distinct `(address, username)`, shared by every
// dependent that asks for it. Each `acquire` hands out a `SessionLease`;
// the session is shut down and forgotten when the last lease for its key
// is dropped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use loxdeck_api::{ReconnectConfig, SessionConfig, SessionHandle, websocket_url};

use crate::config::{ConnectionSettings, SessionKey};
use crate::error::CoreError;

/// Session tuning applied to every session the registry opens.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub strict_auth: bool,
    pub request_timeout: Duration,
    pub keepalive_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            strict_auth: true,
            request_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

struct SharedSession {
    handle: SessionHandle,
    refs: usize,
}

struct RegistryInner {
    sessions: DashMap<SessionKey, SharedSession>,
    options: SessionOptions,
}

/// Reference-counted pool of realtime sessions.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl SessionRegistry {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: DashMap::new(),
                options,
            }),
        }
    }

    /// Join the session for these settings, opening it if needed.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn acquire(&self, settings: &ConnectionSettings) -> Result<SessionLease, CoreError> {
        if !settings.is_complete() {
            return Err(CoreError::NotConfigured {
                message: "address and username are required".into(),
            });
        }
        let key = settings.key();

        let handle = match self.inner.sessions.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let shared = occupied.get_mut();
                shared.refs += 1;
                debug!(key = %key, refs = shared.refs, "joined shared session");
                shared.handle.clone()
            }
            Entry::Vacant(vacant) => {
                let url = websocket_url(&settings.base_url()?)?;
                let options = &self.inner.options;
                let mut config = SessionConfig::new(url, settings.credentials());
                config.strict_auth = options.strict_auth;
                config.request_timeout = options.request_timeout;
                config.keepalive_interval = options.keepalive_interval;
                config.reconnect = options.reconnect.clone();

                info!(key = %key, "opening shared session");
                let handle = SessionHandle::spawn(config, CancellationToken::new());
                vacant.insert(SharedSession {
                    handle: handle.clone(),
                    refs: 1,
                });
                handle
            }
        };

        Ok(SessionLease {
            key,
            handle,
            registry: Arc::clone(&self.inner),
        })
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    /// Live leases on one session (0 if it is not open).
    pub fn refs(&self, key: &SessionKey) -> usize {
        self.inner.sessions.get(key).map_or(0, |s| s.refs)
    }
}

impl RegistryInner {
    fn release(&self, key: &SessionKey) {
        let last = match self.sessions.get_mut(key) {
            Some(mut shared) => {
                shared.refs = shared.refs.saturating_sub(1);
                shared.refs == 0
            }
            None => false,
        };
        if last {
            if let Some((_, shared)) = self.sessions.remove_if(key, |_, s| s.refs == 0) {
                info!(key = %key, "closing shared session");
                shared.handle.shutdown();
            }
        }
    }
}

/// A dependent's share of one session. Dropping it releases the share.
pub struct SessionLease {
    key: SessionKey,
    handle: SessionHandle,
    registry: Arc<RegistryInner>,
}

impl SessionLease {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }
}

impl std::ops::Deref for SessionLease {
    type Target = SessionHandle;

    fn deref(&self) -> &SessionHandle {
        &self.handle
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.registry.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn settings(username: &str) -> ConnectionSettings {
        // Nothing listens on the discard port; sessions just keep retrying.
        ConnectionSettings::new("127.0.0.1:9", username, SecretString::from("pw".to_string()))
    }

    #[tokio::test]
    async fn leases_share_one_session_per_key() {
        let registry = SessionRegistry::default();

        let a = registry.acquire(&settings("admin")).expect("lease");
        let b = registry.acquire(&settings("admin")).expect("lease");
        let c = registry.acquire(&settings("guest")).expect("lease");

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.refs(a.key()), 2);
        assert_eq!(registry.refs(c.key()), 1);

        drop(a);
        assert_eq!(registry.refs(b.key()), 1);
        assert!(!b.is_shut_down());

        let handle = b.handle().clone();
        drop(b);
        assert!(handle.is_shut_down());
        assert_eq!(registry.len(), 1);

        drop(c);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reacquire_after_release_opens_a_fresh_session() {
        let registry = SessionRegistry::default();
        let first = registry.acquire(&settings("admin")).expect("lease");
        let old = first.handle().clone();
        drop(first);

        let second = registry.acquire(&settings("admin")).expect("lease");
        assert!(old.is_shut_down());
        assert!(!second.is_shut_down());
        assert_eq!(registry.refs(second.key()), 1);
    }

    #[test]
    fn incomplete_settings_are_refused() {
        let registry = SessionRegistry::default();
        let result = registry.acquire(&settings(""));
        assert!(matches!(result, Err(CoreError::NotConfigured { .. })));
    }
}
