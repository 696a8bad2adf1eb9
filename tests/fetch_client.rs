//! HttpFetcher against a local axum upstream

use axum::{
    extract::Path,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::time::Duration;

use caption_relay::config::HttpConfig;
use caption_relay::{FetchError, FetchRequest, Fetcher, HttpFetcher};

async fn hop(Path(remaining): Path<u32>) -> impl IntoResponse {
    if remaining == 0 {
        (StatusCode::OK, HeaderMap::new(), "landed".to_string())
    } else {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LOCATION,
            format!("/hop/{}", remaining - 1).parse().unwrap(),
        );
        (StatusCode::FOUND, headers, String::new())
    }
}

async fn echo_agent(headers: HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// `<text start="1">hi</text>`, gzip-compressed
const GZIPPED_CAPTION: &[u8] = &[
    0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x03, 0xb3, 0x29, 0x49, 0xad, 0x28,
    0x51, 0x28, 0x2e, 0x49, 0x2c, 0x2a, 0xb1, 0x55, 0x32, 0x54, 0xb2, 0xcb, 0xc8, 0xb4, 0xd1,
    0x07, 0x09, 0xd9, 0x01, 0x00, 0xeb, 0x2a, 0x63, 0x46, 0x19, 0x00, 0x00, 0x00,
];

fn encoded(encoding: &'static str, body: &'static [u8]) -> impl IntoResponse {
    ([(header::CONTENT_ENCODING, encoding)], body)
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

fn upstream() -> Router {
    Router::new()
        .route("/ok", get(|| async { "captions" }))
        .route("/hop/{remaining}", get(hop))
        .route("/agent", get(echo_agent))
        .route(
            "/throttled",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "x".repeat(2000)) }),
        )
        .route(
            "/submit",
            post(|| async { (StatusCode::SEE_OTHER, [(header::LOCATION, "/ok")]) }),
        )
        .route("/slow", get(slow))
        .route("/gzip", get(|| async { encoded("gzip", GZIPPED_CAPTION) }))
        .route("/corrupt-gzip", get(|| async { encoded("gzip", b"definitely not gzip") }))
        .route("/zstd", get(|| async { encoded("zstd", b"\x28\xb5\x2f\xfd") }))
        .route(
            "/loop",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/loop")]) }),
        )
}

async fn spawn_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, upstream()).await.unwrap();
    });
    format!("http://{addr}")
}

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&HttpConfig::default()).unwrap()
}

#[tokio::test]
async fn test_plain_get() {
    let base = spawn_upstream().await;
    let body = fetcher().fetch(FetchRequest::get(format!("{base}/ok"))).await.unwrap();
    assert_eq!(body, "captions");
}

#[tokio::test]
async fn test_follows_redirects_up_to_limit() {
    let base = spawn_upstream().await;
    let body = fetcher().fetch(FetchRequest::get(format!("{base}/hop/3"))).await.unwrap();
    assert_eq!(body, "landed");
}

#[tokio::test]
async fn test_too_many_redirects() {
    let base = spawn_upstream().await;
    let err = fetcher()
        .fetch(FetchRequest::get(format!("{base}/hop/4")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooManyRedirects { limit: 3, .. }));
}

#[tokio::test]
async fn test_see_other_turns_post_into_get() {
    let base = spawn_upstream().await;
    let request = FetchRequest::post_json(format!("{base}/submit"), &serde_json::json!({"a": 1}));
    assert_eq!(fetcher().fetch(request).await.unwrap(), "captions");
}

#[tokio::test]
async fn test_identity_and_override_headers() {
    let base = spawn_upstream().await;
    let fetcher = fetcher();

    let agent = fetcher.fetch(FetchRequest::get(format!("{base}/agent"))).await.unwrap();
    assert_eq!(agent, HttpConfig::default().user_agent);

    let agent = fetcher
        .fetch(FetchRequest::get(format!("{base}/agent")).header("User-Agent", "relay-test"))
        .await
        .unwrap();
    assert_eq!(agent, "relay-test");
}

#[tokio::test]
async fn test_non_success_keeps_truncated_body_and_hides_query() {
    let base = spawn_upstream().await;
    let err = fetcher()
        .fetch(FetchRequest::get(format!("{base}/throttled?key=secret")))
        .await
        .unwrap_err();

    match &err {
        FetchError::Http { url, status, body } => {
            assert_eq!(*status, 429);
            assert!(!url.contains("secret"));
            assert!(body.chars().count() <= 513);
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert!(!err.to_string().contains("secret"));
}

#[tokio::test]
async fn test_timeout() {
    let base = spawn_upstream().await;
    let err = fetcher()
        .with_timeout(Duration::from_millis(200))
        .fetch(FetchRequest::get(format!("{base}/slow")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Timeout { millis: 200, .. }));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = fetcher()
        .fetch(FetchRequest::get(format!("http://{addr}/ok")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }));
}

#[tokio::test]
async fn test_gzip_body_is_decoded() {
    let base = spawn_upstream().await;
    let body = fetcher().fetch(FetchRequest::get(format!("{base}/gzip"))).await.unwrap();
    assert_eq!(body, r#"<text start="1">hi</text>"#);
}

#[tokio::test]
async fn test_corrupt_gzip_is_decode_error() {
    let base = spawn_upstream().await;
    let err = fetcher()
        .fetch(FetchRequest::get(format!("{base}/corrupt-gzip")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_unsupported_encoding_is_decode_error() {
    let base = spawn_upstream().await;
    let err = fetcher()
        .fetch(FetchRequest::get(format!("{base}/zstd")))
        .await
        .unwrap_err();

    match err {
        FetchError::Decode { reason, .. } => assert!(reason.contains("zstd")),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_redirect_loop_is_cut_off() {
    let base = spawn_upstream().await;
    let err = fetcher()
        .fetch(FetchRequest::get(format!("{base}/loop")))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooManyRedirects { limit: 3, .. }));
}
