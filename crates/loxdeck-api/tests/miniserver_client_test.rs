#![allow(clippy::unwrap_used)]
// Integration tests for `MiniserverClient` using wiremock.

use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use loxdeck_api::{Credentials, Error, MiniserverClient};

const SWITCH_ID: &str = "0f1e2d3c-0001-0000-0000-000000000001";

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, MiniserverClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = MiniserverClient::with_client(
        reqwest::Client::new(),
        base_url,
        Credentials::new("admin", SecretString::from("secret".to_string())),
    );
    (server, client)
}

fn catalog_body() -> serde_json::Value {
    json!({
        "msInfo": { "msName": "Home", "serialNr": "504F00000001" },
        "controls": {
            SWITCH_ID: { "name": "Kitchen Light", "type": "Switch", "states": { "active": 1 } }
        }
    })
}

// ── Catalog tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_fetch_catalog_sends_basic_auth() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .and(basic_auth("admin", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = client.fetch_catalog().await.unwrap();
    assert_eq!(catalog.ms_info.ms_name.as_deref(), Some("Home"));
    assert_eq!(catalog.state_value(SWITCH_ID, "active"), Some(1.0));
}

#[tokio::test]
async fn test_fetch_catalog_unauthorized() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client.fetch_catalog().await;
    assert!(
        matches!(result, Err(Error::Authentication { .. })),
        "expected Authentication error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_fetch_catalog_malformed_body() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    match client.fetch_catalog().await {
        Err(Error::Deserialization { body, .. }) => assert!(body.contains("oops")),
        other => panic!("expected Deserialization error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_control() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/data/LoxAPP3.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
        .mount(&server)
        .await;

    let control = client.fetch_control(SWITCH_ID).await.unwrap().unwrap();
    assert_eq!(control.name, "Kitchen Light");
    assert_eq!(control.kind, "Switch");
    assert!(client.fetch_control("missing").await.unwrap().is_none());
}

// ── Command tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_send_command_reads_envelope_code() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/jdev/sps/io/{SWITCH_ID}/On")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "LL": { "control": format!("dev/sps/io/{SWITCH_ID}/On"), "value": "1", "Code": "200" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.send_command(SWITCH_ID, "On").await.unwrap(), 200);
}

#[tokio::test]
async fn test_send_command_envelope_code_overrides_http_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/jdev/sps/io/{SWITCH_ID}/Pulse")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "LL": { "value": "0", "Code": "404" } })),
        )
        .mount(&server)
        .await;

    assert_eq!(client.send_command(SWITCH_ID, "Pulse").await.unwrap(), 404);
}

#[tokio::test]
async fn test_send_command_falls_back_to_http_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path(format!("/jdev/sps/io/{SWITCH_ID}/ManualPosition/40")))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    assert_eq!(
        client.send_command(SWITCH_ID, "ManualPosition/40").await.unwrap(),
        401
    );
}

#[tokio::test]
async fn test_send_command_transport_failure() {
    // Port 9 (discard) is closed on test hosts; the connect fails.
    let client = MiniserverClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9").unwrap(),
        Credentials::new("admin", SecretString::from("secret".to_string())),
    );

    let result = client.send_command(SWITCH_ID, "On").await;
    assert!(matches!(result, Err(Error::Transport(_))), "got: {result:?}");
}
