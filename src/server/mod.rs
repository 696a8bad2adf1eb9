//! HTTP front end for the transcript pipeline

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::output::{self, ResponseEnvelope, MISSING_PARAMETERS};
use crate::pipeline::{TranscriptPipeline, TranscriptRequest};
use crate::TranscriptError;

/// Paths the transcript handler answers on
pub const TRANSCRIPT_PATHS: [&str; 2] = ["/api/transcript", "/.netlify/functions/youtube-transcript"];

pub struct AppState {
    pub pipeline: TranscriptPipeline,
    pub cache_max_age_secs: u64,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_pipeline(
            TranscriptPipeline::new(config)?,
            config.server.cache_max_age_secs,
        ))
    }

    pub fn with_pipeline(pipeline: TranscriptPipeline, cache_max_age_secs: u64) -> Self {
        Self {
            pipeline,
            cache_max_age_secs,
        }
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let has_content_type = self.header("content-type").is_some();

        let mut response = (status, self.body).into_response();
        let headers = response.headers_mut();
        if !has_content_type {
            headers.remove(header::CONTENT_TYPE);
        }
        for (name, value) in self.headers {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    headers.insert(name, value);
                }
                Err(_) => tracing::warn!("Dropping unrepresentable {} header", name),
            }
        }
        response
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new().route("/health", get(health_check));
    for path in TRANSCRIPT_PATHS {
        router = router.route(path, get(transcript).options(preflight));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn health_check() -> &'static str {
    "OK"
}

async fn preflight() -> ResponseEnvelope {
    output::preflight()
}

async fn transcript(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ResponseEnvelope {
    let request = match parse_request(&params) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!("Rejected request: {}", e);
            return output::error(&e);
        }
    };

    match state.pipeline.run(&request).await {
        Ok(outcome) => output::render(&request, &outcome, state.cache_max_age_secs),
        Err(e) => {
            tracing::error!("Transcript request failed: {}", e);
            output::error(&e)
        }
    }
}

/// Build a pipeline request from query parameters. Empty values count as missing.
pub fn parse_request(params: &HashMap<String, String>) -> Result<TranscriptRequest, TranscriptError> {
    let param = |name: &str| params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

    let (Some(video_id), Some(start), Some(end)) =
        (param("videoId"), param("startTime"), param("endTime"))
    else {
        return Err(TranscriptError::InvalidInput(MISSING_PARAMETERS.to_string()));
    };

    let request = TranscriptRequest::new(
        video_id,
        parse_seconds("startTime", start)?,
        parse_seconds("endTime", end)?,
    );
    Ok(request.with_debug(params.get("debug").map(String::as_str) == Some("1")))
}

fn parse_seconds(name: &str, value: &str) -> Result<f64, TranscriptError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TranscriptError::InvalidInput(format!("Invalid numeric parameter: {name}")))
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::new(config)?);
    tracing::info!("Strategies: {}", state.pipeline.strategy_names().join(", "));

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedFetcher;
    use crate::fetch::FetchError;
    use crate::strategies::StrategyRegistry;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use std::time::Duration;
    use tower::util::ServiceExt;

    const TRACK_LIST: &str = r#"<transcript_list><track id="0" name="English" lang_code="en" lang_original="English" lang_translated="English"/></transcript_list>"#;
    const CAPTIONS: &str = r#"<transcript><text start="5" dur="8">Hello &amp; welcome</text><text start="19" dur="3">end</text></transcript>"#;

    fn app(fetcher: ScriptedFetcher) -> Router {
        let config = Config::default();
        let pipeline = TranscriptPipeline::with_fetcher(&config, Arc::new(fetcher));
        create_router(Arc::new(AppState::with_pipeline(pipeline, 3600)))
    }

    /// Upstream where only the track-list route knows about captions
    fn track_list_upstream() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .respond("type=list", TRACK_LIST)
            .respond("name=English", CAPTIONS)
            .respond("/api/timedtext", "")
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_parse_request() {
        let request = parse_request(&params(&[
            ("videoId", "abc12345678"),
            ("startTime", "10"),
            ("endTime", "20.5"),
            ("debug", "1"),
        ]))
        .unwrap();
        assert_eq!(request.video_id, "abc12345678");
        assert_eq!(request.window.end, 20.5);
        assert!(request.debug);

        let request = parse_request(&params(&[
            ("videoId", "abc12345678"),
            ("startTime", "10"),
            ("endTime", "20"),
            ("debug", "true"),
        ]))
        .unwrap();
        assert!(!request.debug);
    }

    #[test]
    fn test_parse_request_empty_counts_as_missing() {
        let err = parse_request(&params(&[("videoId", ""), ("startTime", "10"), ("endTime", "20")]))
            .unwrap_err();
        assert_eq!(err.to_string(), MISSING_PARAMETERS);
    }

    #[test]
    fn test_parse_request_rejects_non_numeric() {
        for bad in ["ten", "NaN", "inf"] {
            let err = parse_request(&params(&[("videoId", "abc"), ("startTime", bad), ("endTime", "20")]))
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid numeric parameter: startTime");
        }
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _, body) = call(app(ScriptedFetcher::new()), Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn test_transcript_plain_text() {
        let (status, headers, body) = call(
            app(track_list_upstream()),
            Method::GET,
            "/api/transcript?videoId=abc12345678&startTime=10&endTime=20",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello & welcome end");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=3600");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_no_captions_anywhere_is_empty_ok() {
        let (status, headers, body) = call(
            app(ScriptedFetcher::new().respond("/", "")),
            Method::GET,
            "/api/transcript?videoId=abc12345678&startTime=10&endTime=20",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
    }

    #[tokio::test]
    async fn test_upstream_timeouts_are_empty_ok() {
        let timeout = FetchError::Timeout {
            url: "https://www.youtube.com/".to_string(),
            millis: 15_000,
        };
        let (status, _, body) = call(
            app(ScriptedFetcher::new().fail("/", timeout)),
            Method::GET,
            "/.netlify/functions/youtube-transcript?videoId=abc12345678&startTime=10&endTime=20",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn test_missing_end_time() {
        let (status, headers, body) = call(
            app(ScriptedFetcher::new()),
            Method::GET,
            "/api/transcript?videoId=abc12345678&startTime=10",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(
            body,
            r#"{"error":"Missing required parameters: videoId, startTime, endTime"}"#
        );
    }

    #[tokio::test]
    async fn test_debug_report() {
        let (status, headers, body) = call(
            app(track_list_upstream()),
            Method::GET,
            "/api/transcript?videoId=abc12345678&startTime=10&endTime=20&debug=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");

        let report: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(report["source"], "timedtext-list");
        assert_eq!(report["segments"], 2);
        assert_eq!(report["sample"], serde_json::json!(["Hello & welcome", "end"]));
        assert_eq!(report["text"], "Hello & welcome end");
    }

    #[tokio::test]
    async fn test_preflight() {
        let (status, headers, body) = call(app(ScriptedFetcher::new()), Method::OPTIONS, "/api/transcript").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, OPTIONS");
    }

    #[tokio::test]
    async fn test_pipeline_failure_is_500() {
        let pipeline = TranscriptPipeline::with_registry(StrategyRegistry::empty(), Duration::from_secs(1));
        let app = create_router(Arc::new(AppState::with_pipeline(pipeline, 3600)));

        let (status, _, body) = call(app, Method::GET, "/api/transcript?videoId=abc&startTime=1&endTime=2").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["error"], "Failed to fetch transcript");
        assert!(body["details"].is_string());
    }
}
