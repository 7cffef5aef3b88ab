//! `serve`: the catalog browsing API used while configuring buttons.
//!
//! Every request carries its own Miniserver credentials; nothing is read
//! from the config file. Catalogs are shared through one
//! [`CatalogBrowser`] cache for the lifetime of the process.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use loxdeck_core::{CatalogBrowser, ConnectionSettings, ControlEntry, CoreError, HttpConnector};

use crate::cli::{GlobalOpts, ServeArgs};
use crate::error::CliError;

/// Body of every `/api/*` request.
#[derive(Debug, Deserialize)]
struct BrowseRequest {
    #[serde(default)]
    address: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    id: Option<String>,
    #[serde(default)]
    refresh: bool,
}

#[derive(Clone)]
struct AppState {
    browser: Arc<CatalogBrowser>,
    timeout: Duration,
}

impl AppState {
    fn settings(&self, req: &BrowseRequest) -> ConnectionSettings {
        let mut settings = ConnectionSettings::new(
            req.address.as_str(),
            req.username.as_str(),
            SecretString::from(req.password.clone()),
        );
        settings.timeout = self.timeout;
        settings
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/catalog", post(list_catalog))
        .route("/api/test", post(test_connection))
        .route("/api/entry", post(get_entry))
        .with_state(state)
}

pub async fn run(args: ServeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let state = AppState {
        browser: Arc::new(CatalogBrowser::new(Arc::new(HttpConnector))),
        timeout: Duration::from_secs(global.timeout.unwrap_or(30)),
    };

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(listen = %args.listen, "browsing service listening");
    if !global.quiet {
        eprintln!("Listening on http://{}", args.listen);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn list_catalog(State(state): State<AppState>, Json(req): Json<BrowseRequest>) -> Response {
    let settings = state.settings(&req);
    match state.browser.fetch_catalog(&settings, req.refresh).await {
        Ok(catalog) => {
            let entries = ControlEntry::list(&catalog);
            debug!(key = %settings.key(), entries = entries.len(), "catalog served");
            (
                StatusCode::OK,
                Json(json!({
                    "miniserver": catalog.ms_info.ms_name,
                    "controls": entries,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn test_connection(
    State(state): State<AppState>,
    Json(req): Json<BrowseRequest>,
) -> Response {
    let report = state.browser.test_connection(&state.settings(&req)).await;
    (StatusCode::OK, Json(report)).into_response()
}

async fn get_entry(State(state): State<AppState>, Json(req): Json<BrowseRequest>) -> Response {
    let Some(id) = req.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "id is required" })))
            .into_response();
    };
    let settings = state.settings(&req);
    if req.refresh {
        state.browser.invalidate(&settings);
    }
    match state.browser.fetch_entry(&settings, id).await {
        Ok(Some(entry)) => (StatusCode::OK, Json(entry)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no control with id {id}") })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::AuthenticationFailed { .. } => StatusCode::UNAUTHORIZED,
        CoreError::NotConfigured { .. } | CoreError::Config { .. } => StatusCode::BAD_REQUEST,
        CoreError::ConnectionFailed { .. } | CoreError::Disconnected | CoreError::Api { .. } => {
            StatusCode::BAD_GATEWAY
        }
        CoreError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &CoreError) -> Response {
    debug!(error = %err, "browse request failed");
    (status_for(err), Json(json!({ "error": err.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn spawn_service() -> String {
        let state = AppState {
            browser: Arc::new(CatalogBrowser::new(Arc::new(HttpConnector))),
            timeout: Duration::from_secs(5),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router(state)).await;
        });
        format!("http://{addr}")
    }

    async fn miniserver() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/LoxAPP3.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "msInfo": { "msName": "Home", "serialNr": "504F0001", "swVersion": "14.1" },
                "controls": {
                    "lamp-1": { "name": "Kitchen Light", "type": "Switch",
                                "states": { "active": "s-1" } }
                },
                "values": { "s-1": 1 }
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn healthz_answers() {
        let base = spawn_service().await;
        let body: Value = reqwest::get(format!("{base}/healthz"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn catalog_and_entry_come_from_the_miniserver() {
        let base = spawn_service().await;
        let ms = miniserver().await;
        let client = reqwest::Client::new();
        let creds = json!({ "address": ms.uri(), "username": "admin", "password": "pw" });

        let catalog: Value = client
            .post(format!("{base}/api/catalog"))
            .json(&creds)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(catalog["miniserver"], "Home");
        assert_eq!(catalog["controls"][0]["id"], "lamp-1");
        assert_eq!(catalog["controls"][0]["type"], "Switch");

        let mut req = creds.clone();
        req["id"] = "lamp-1".into();
        let entry: Value = client
            .post(format!("{base}/api/entry"))
            .json(&req)
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(entry["states"]["active"], 1.0);

        req["id"] = "missing".into();
        let missing = client
            .post(format!("{base}/api/entry"))
            .json(&req)
            .send()
            .await
            .expect("request");
        assert_eq!(missing.status().as_u16(), 404);
    }

    #[tokio::test]
    async fn test_endpoint_reports_controller() {
        let base = spawn_service().await;
        let ms = miniserver().await;
        let report: Value = reqwest::Client::new()
            .post(format!("{base}/api/test"))
            .json(&json!({ "address": ms.uri(), "username": "admin", "password": "pw" }))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(report["ok"], true);
        assert_eq!(report["serial"], "504F0001");
        assert_eq!(report["controls"], 1);
    }

    #[tokio::test]
    async fn incomplete_credentials_are_a_bad_request() {
        let base = spawn_service().await;
        let resp = reqwest::Client::new()
            .post(format!("{base}/api/catalog"))
            .json(&json!({ "address": "", "username": "" }))
            .send()
            .await
            .expect("request");
        assert_eq!(resp.status().as_u16(), 400);

        let no_id = reqwest::Client::new()
            .post(format!("{base}/api/entry"))
            .json(&json!({ "address": "10.0.0.2", "username": "admin" }))
            .send()
            .await
            .expect("request");
        assert_eq!(no_id.status().as_u16(), 400);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            status_for(&CoreError::AuthenticationFailed {
                message: String::new()
            }),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&CoreError::Timeout { timeout_secs: 5 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&CoreError::ConnectionFailed {
                address: String::new(),
                reason: String::new()
            }),
            StatusCode::BAD_GATEWAY
        );
    }
}
