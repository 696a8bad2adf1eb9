use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::captions::{join_text, CaptionSegment, CaptionTrack, TimeWindow};
use crate::config::Config;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::strategies::{CaptionStrategy, RequestContext, StrategyHit, StrategyRegistry};
use crate::TranscriptError;

/// One caller invocation
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRequest {
    pub video_id: String,
    pub window: TimeWindow,
    /// Return the diagnostic trace instead of plain text
    pub debug: bool,
}

impl TranscriptRequest {
    pub fn new(video_id: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            video_id: video_id.into(),
            window: TimeWindow::new(start, end),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    /// Produced overlapping segments
    Success,
    /// Ran cleanly but had nothing for the window
    Empty,
    /// Errored or panicked
    Failed,
}

/// Trace entry for one strategy attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub strategy: &'static str,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Result of a pipeline run. No segments means no captions were found.
#[derive(Debug, Clone)]
pub struct TranscriptOutcome {
    pub request_id: Uuid,
    pub segments: Vec<CaptionSegment>,
    /// Source tag of the strategy that succeeded
    pub source: Option<&'static str>,
    pub track: Option<CaptionTrack>,
    pub client: Option<String>,
    /// Segments in the fetched track before window filtering
    pub parsed: usize,
    pub attempts: Vec<AttemptRecord>,
    pub elapsed: Duration,
    /// The run was cut short by the total budget
    pub budget_exhausted: bool,
}

impl TranscriptOutcome {
    /// Space-joined caption text, empty when nothing was found
    pub fn text(&self) -> String {
        join_text(&self.segments)
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Walks the strategies in order and stops at the first one with segments
pub struct TranscriptPipeline {
    registry: StrategyRegistry,
    total_budget: Duration,
}

impl TranscriptPipeline {
    /// Create a pipeline backed by the real HTTP client
    pub fn new(config: &Config) -> crate::Result<Self> {
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(HttpFetcher::new(&config.http).map_err(TranscriptError::Upstream)?);
        Ok(Self::with_fetcher(config, fetcher))
    }

    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_registry(StrategyRegistry::from_config(config, fetcher), config.total_budget())
    }

    pub fn with_registry(registry: StrategyRegistry, total_budget: Duration) -> Self {
        Self {
            registry,
            total_budget,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Run every strategy in order until one yields segments.
    ///
    /// Only malformed input or an empty strategy chain is an error; strategy
    /// failures, exhaustion and budget expiry all produce an outcome.
    pub async fn run(&self, request: &TranscriptRequest) -> Result<TranscriptOutcome, TranscriptError> {
        let video_id = request.video_id.trim();
        if video_id.is_empty() {
            return Err(TranscriptError::InvalidInput("videoId must not be empty".to_string()));
        }
        if !request.window.start.is_finite() || !request.window.end.is_finite() {
            return Err(TranscriptError::InvalidInput(
                "startTime and endTime must be finite numbers".to_string(),
            ));
        }
        if self.registry.is_empty() {
            return Err(TranscriptError::Unexpected("No caption strategies configured".to_string()));
        }
        if request.window.is_inverted() {
            tracing::debug!("Inverted window {:?} will match nothing", request.window);
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "transcript",
            %request_id,
            video_id = %video_id,
            start = request.window.start,
            end = request.window.end
        );

        async move {
            let ctx = RequestContext::new(video_id, request.window);
            let started = Instant::now();
            let mut attempts = Vec::new();

            let walked = tokio::time::timeout(self.total_budget, self.walk(&ctx, &mut attempts)).await;
            let (hit, budget_exhausted) = match walked {
                Ok(hit) => (hit, false),
                Err(_) => {
                    tracing::warn!(
                        "Total budget of {:?} spent after {} attempts, returning empty",
                        self.total_budget,
                        attempts.len()
                    );
                    (None, true)
                }
            };

            let mut outcome = TranscriptOutcome {
                request_id,
                segments: Vec::new(),
                source: None,
                track: None,
                client: None,
                parsed: 0,
                attempts,
                elapsed: started.elapsed(),
                budget_exhausted,
            };

            match hit {
                Some((source, hit)) => {
                    tracing::info!("{} segments from {}", hit.segments.len(), source);
                    outcome.source = Some(source);
                    outcome.segments = hit.segments;
                    outcome.track = hit.track;
                    outcome.client = hit.client;
                    outcome.parsed = hit.parsed;
                }
                None => tracing::info!("No captions found after {} attempts", outcome.attempts.len()),
            }

            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn walk(
        &self,
        ctx: &RequestContext,
        attempts: &mut Vec<AttemptRecord>,
    ) -> Option<(&'static str, StrategyHit)> {
        for strategy in self.registry.iter() {
            let started = Instant::now();
            tracing::debug!("Trying strategy {}", strategy.name());

            let result = AssertUnwindSafe(attempt(strategy, ctx)).catch_unwind().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let (status, error) = match result {
                Ok(Ok(Some(hit))) if !hit.segments.is_empty() => {
                    attempts.push(AttemptRecord {
                        strategy: strategy.name(),
                        status: AttemptStatus::Success,
                        error: None,
                        elapsed_ms,
                    });
                    return Some((strategy.source_tag(), hit));
                }
                Ok(Ok(_)) => (AttemptStatus::Empty, None),
                Ok(Err(e)) => {
                    tracing::debug!("Strategy {} failed: {:#}", strategy.name(), e);
                    (AttemptStatus::Failed, Some(format!("{e:#}")))
                }
                Err(_) => {
                    tracing::warn!("Strategy {} panicked", strategy.name());
                    (AttemptStatus::Failed, Some("strategy panicked".to_string()))
                }
            };

            attempts.push(AttemptRecord {
                strategy: strategy.name(),
                status,
                error,
                elapsed_ms,
            });
        }

        None
    }
}

// Deferred so that a panic while building the future is caught too
async fn attempt(
    strategy: &dyn CaptionStrategy,
    ctx: &RequestContext,
) -> crate::Result<Option<StrategyHit>> {
    strategy.attempt(ctx).await
}
