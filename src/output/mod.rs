use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::captions::{CaptionTrack, TimeWindow};
use crate::pipeline::{AttemptRecord, TranscriptOutcome, TranscriptRequest};
use crate::TranscriptError;

/// Texts included in the debug sample
const SAMPLE_SIZE: usize = 3;

pub const MISSING_PARAMETERS: &str = "Missing required parameters: videoId, startTime, endTime";
pub const FETCH_FAILED: &str = "Failed to fetch transcript";

pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Transport-independent response: status, headers and body
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl ResponseEnvelope {
    fn new(status: u16, content_type: Option<&str>, cache_control: String, body: String) -> Self {
        let mut headers = vec![
            ("Access-Control-Allow-Origin", "*".to_string()),
            ("Cache-Control", cache_control),
        ];
        if let Some(content_type) = content_type {
            headers.push(("Content-Type", content_type.to_string()));
        }
        Self {
            status,
            headers,
            body,
        }
    }

    fn json(status: u16, body: serde_json::Value) -> Self {
        Self::new(status, Some(CONTENT_TYPE_JSON), "no-store".to_string(), body.to_string())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Answer to a CORS preflight
pub fn preflight() -> ResponseEnvelope {
    let mut envelope = ResponseEnvelope::new(200, None, "no-store".to_string(), String::new());
    envelope
        .headers
        .push(("Access-Control-Allow-Headers", "Content-Type".to_string()));
    envelope
        .headers
        .push(("Access-Control-Allow-Methods", "GET, OPTIONS".to_string()));
    envelope
}

/// Map a pipeline error onto 400 (caller at fault) or 500
pub fn error(err: &TranscriptError) -> ResponseEnvelope {
    if err.is_user_error() {
        ResponseEnvelope::json(400, json!({ "error": err.to_string() }))
    } else {
        ResponseEnvelope::json(500, json!({ "error": FETCH_FAILED, "details": err.to_string() }))
    }
}

/// Plain-text success. Only non-empty text is publicly cacheable.
pub fn transcript_text(outcome: &TranscriptOutcome, cache_max_age_secs: u64) -> ResponseEnvelope {
    let text = outcome.text();
    let cache_control = if text.is_empty() || cache_max_age_secs == 0 {
        "no-store".to_string()
    } else {
        format!("public, max-age={cache_max_age_secs}")
    };
    ResponseEnvelope::new(200, Some(CONTENT_TYPE_TEXT), cache_control, text)
}

/// Diagnostic trace of a run
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugReport<'a> {
    pub source: &'a str,
    pub segments: usize,
    pub sample: Vec<&'a str>,
    pub parsed_segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<&'a CaptionTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<&'a str>,
    pub attempts: &'a [AttemptRecord],
    pub video_id: &'a str,
    pub window: TimeWindow,
    pub elapsed_ms: u64,
    pub budget_exhausted: bool,
    pub request_id: String,
    pub text: String,
}

impl<'a> DebugReport<'a> {
    pub fn new(request: &'a TranscriptRequest, outcome: &'a TranscriptOutcome) -> Self {
        Self {
            source: outcome.source.unwrap_or("none"),
            segments: outcome.segments.len(),
            sample: outcome
                .segments
                .iter()
                .take(SAMPLE_SIZE)
                .map(|s| s.text.as_str())
                .collect(),
            parsed_segments: outcome.parsed,
            track: outcome.track.as_ref(),
            client: outcome.client.as_deref(),
            attempts: &outcome.attempts,
            video_id: &request.video_id,
            window: request.window,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            budget_exhausted: outcome.budget_exhausted,
            request_id: outcome.request_id.to_string(),
            text: outcome.text(),
        }
    }
}

/// JSON diagnostic success, never cached
pub fn transcript_debug(request: &TranscriptRequest, outcome: &TranscriptOutcome) -> Result<ResponseEnvelope> {
    let body = serde_json::to_string_pretty(&DebugReport::new(request, outcome))?;
    Ok(ResponseEnvelope::new(200, Some(CONTENT_TYPE_JSON), "no-store".to_string(), body))
}

/// Pick the plain or diagnostic rendering for a request
pub fn render(
    request: &TranscriptRequest,
    outcome: &TranscriptOutcome,
    cache_max_age_secs: u64,
) -> ResponseEnvelope {
    if !request.debug {
        return transcript_text(outcome, cache_max_age_secs);
    }

    match transcript_debug(request, outcome) {
        Ok(envelope) => envelope,
        Err(e) => error(&TranscriptError::Unexpected(format!("Failed to render debug report: {e}"))),
    }
}

/// Print a run's result to stdout
pub fn print_to_console(request: &TranscriptRequest, outcome: &TranscriptOutcome) -> Result<()> {
    if request.debug {
        println!("{}", transcript_debug(request, outcome)?.body);
    } else {
        println!("{}", outcome.text());
    }
    Ok(())
}
