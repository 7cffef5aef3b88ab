// Simple request/response HTTP client
//
// Wraps `reqwest::Client` with Miniserver URL construction and basic auth.
// This is the path the buttons use: one transient request per catalog poll
// or command, no shared connection, no retry.

use secrecy::ExposeSecret;
use tracing::{debug, trace};
use url::Url;

use crate::auth::Credentials;
use crate::catalog::{CATALOG_PATH, Catalog, Control};
use crate::envelope;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Path of the persistent realtime channel.
pub const WEBSOCKET_PATH: &str = "ws/rfc6455";

/// Normalize a configured address (`"192.168.1.77"`, `"miniserver:8080"`,
/// `"https://ms.example"`) into a base URL.
///
/// Bare host names default to plain HTTP, matching the local API.
pub fn base_url_from_address(address: &str) -> Result<Url, Error> {
    let trimmed = address.trim().trim_end_matches('/');
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("http://{trimmed}")
    };
    Ok(Url::parse(&with_scheme)?)
}

/// The realtime channel URL for a base URL: `ws://host/ws/rfc6455`
/// (or `wss://` when the base is HTTPS).
pub fn websocket_url(base: &Url) -> Result<Url, Error> {
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    let host = base.host_str().ok_or(Error::InvalidUrl(url::ParseError::EmptyHost))?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    Ok(Url::parse(&format!("{scheme}://{authority}/{WEBSOCKET_PATH}"))?)
}

/// Raw HTTP client for one Miniserver.
pub struct MiniserverClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl MiniserverClient {
    /// Create a client from a `TransportConfig`.
    pub fn new(
        base_url: Url,
        credentials: Credentials,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url, credentials))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            base_url,
            credentials,
        }
    }

    /// The Miniserver base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// `{base}/jdev/sps/io/{target}/{verb}`
    ///
    /// The verb is embedded verbatim so multi-segment verbs such as
    /// `ManualPosition/40` keep their slash.
    pub fn command_url(&self, target: &str, verb: &str) -> Result<Url, Error> {
        self.url(&format!("jdev/sps/io/{target}/{verb}"))
    }

    // ── Requests ─────────────────────────────────────────────────────

    async fn get(&self, url: Url) -> Result<reqwest::Response, Error> {
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url)
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .send()
            .await?;
        Ok(resp)
    }

    /// Fetch the full catalog document.
    pub async fn fetch_catalog(&self) -> Result<Catalog, Error> {
        let resp = self.get(self.url(CATALOG_PATH)?).await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "Miniserver rejected the credentials".into(),
            });
        }
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = body.chars().take(200).collect::<String>();
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body: body.clone(),
            }
        })
    }

    /// Fetch the catalog and pick one entry out of it.
    pub async fn fetch_control(&self, id: &str) -> Result<Option<Control>, Error> {
        let mut catalog = self.fetch_catalog().await?;
        Ok(catalog.controls.remove(id))
    }

    /// Send one command and return the numeric status code.
    ///
    /// The code is taken from the `LL` envelope when the body carries one,
    /// otherwise the HTTP status is used. Only transport failures are `Err`.
    pub async fn send_command(&self, target: &str, verb: &str) -> Result<u16, Error> {
        let resp = self.get(self.command_url(target, verb)?).await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        let code = envelope::parse_reply(&body).map_or(status, |reply| reply.code);
        trace!(status, code, target, verb, "command reply");
        Ok(code)
    }
}
