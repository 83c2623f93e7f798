use murmur_net::{HttpClient, HttpConfig, JsonFetcher, MediaFetcher, NetError};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> HttpClient {
    HttpClient::new(HttpConfig::default()).unwrap()
}

// ── Config ───────────────────────────────────────────────────────

#[test]
fn http_config_default() {
    let cfg = HttpConfig::default();
    assert_eq!(cfg.json_timeout_ms, 30_000);
    assert!(cfg.user_agent.starts_with("murmur-core/"));
}

// ── fetch_bytes ──────────────────────────────────────────────────

#[tokio::test]
async fn fetch_bytes_returns_body_and_mime() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/img/a.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/PNG; charset=binary")
                .set_body_bytes(vec![1u8, 2, 3]),
        )
        .mount(&server)
        .await;

    let media = client()
        .fetch_bytes(&format!("{}/img/a.png", server.uri()), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(media.bytes, vec![1, 2, 3]);
    assert_eq!(media.mime_type.as_deref(), Some("image/png"));
}

#[tokio::test]
async fn fetch_bytes_maps_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client()
        .fetch_bytes(&format!("{}/missing.png", server.uri()), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err, NetError::Http { status: 404 });
    assert!(err.is_not_found());
}

#[tokio::test]
async fn fetch_bytes_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let err = client()
        .fetch_bytes(&format!("{}/slow.png", server.uri()), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, NetError::Timeout);
}

// ── fetch_json ───────────────────────────────────────────────────

#[tokio::test]
async fn fetch_json_decodes_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/publications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .mount(&server)
        .await;

    let value = client()
        .fetch_json(&format!("{}/publications", server.uri()))
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!({"data": []}));
}

#[tokio::test]
async fn fetch_json_rejects_invalid_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/publications"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client()
        .fetch_json(&format!("{}/publications", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, NetError::Decode(_)));
}

#[tokio::test]
async fn fetch_json_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client().fetch_json(&server.uri()).await.unwrap_err();
    assert_eq!(err, NetError::Http { status: 503 });
}
