use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub mod direct;
pub mod html_scrape;
pub mod innertube;
pub mod track_list;

use crate::captions::{parser, CaptionSegment, CaptionTrack, TimeWindow};
use crate::config::Config;
use crate::fetch::{FetchError, FetchRequest, Fetcher};
use crate::utils::ensure_caption_format;
use crate::Result;

/// Strategy names accepted in `pipeline.strategies`, in default order
pub const KNOWN_STRATEGIES: [&str; 4] = ["direct", "track-list", "innertube", "html-scrape"];

/// State shared by the strategies of one pipeline run. Never outlives the request.
pub struct RequestContext {
    pub video_id: String,
    pub window: TimeWindow,
    watch_page: OnceCell<std::result::Result<Arc<String>, FetchError>>,
}

impl RequestContext {
    pub fn new(video_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            video_id: video_id.into(),
            window,
            watch_page: OnceCell::new(),
        }
    }

    /// Video id, percent-encoded for use in a URL
    pub fn encoded_id(&self) -> String {
        urlencoding::encode(&self.video_id).into_owned()
    }

    /// The watch page HTML, fetched at most once per run
    pub async fn watch_page(
        &self,
        fetcher: &dyn Fetcher,
        base: &str,
    ) -> std::result::Result<Arc<String>, FetchError> {
        self.watch_page
            .get_or_init(|| async {
                let url = format!("{}/watch?v={}", base, self.encoded_id());
                fetcher.fetch(FetchRequest::get(url)).await.map(Arc::new)
            })
            .await
            .clone()
    }
}

/// What a successful strategy hands back to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyHit {
    /// Segments overlapping the requested window, in source order
    pub segments: Vec<CaptionSegment>,

    /// Track the segments came from
    pub track: Option<CaptionTrack>,

    /// Internal-API client identity that exposed the track
    pub client: Option<String>,

    /// Segments parsed before window filtering
    pub parsed: usize,
}

/// One way of obtaining captions for a video
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptionStrategy: Send + Sync {
    /// Configuration name ("track-list")
    fn name(&self) -> &'static str;

    /// Tag reported as `source` in diagnostics ("timedtext-list")
    fn source_tag(&self) -> &'static str;

    /// Try to produce segments overlapping the window.
    ///
    /// `Ok(None)` means this strategy found nothing usable; errors are
    /// recovered by the orchestrator the same way.
    async fn attempt(&self, ctx: &RequestContext) -> Result<Option<StrategyHit>>;
}

/// Ordered set of strategies the pipeline walks through
pub struct StrategyRegistry {
    strategies: Vec<Box<dyn CaptionStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Build the strategies named in the configuration, in configured order
    pub fn from_config(config: &Config, fetcher: Arc<dyn Fetcher>) -> Self {
        let mut registry = Self::empty();
        let base = config.upstream_base.trim_end_matches('/').to_string();

        for name in &config.pipeline.strategies {
            match name.as_str() {
                "direct" => registry.register(Box::new(direct::DirectGuessStrategy::new(
                    fetcher.clone(),
                    base.clone(),
                    config.pipeline.direct_guesses.clone(),
                ))),
                "track-list" => registry.register(Box::new(track_list::TrackListStrategy::new(
                    fetcher.clone(),
                    base.clone(),
                ))),
                "innertube" => registry.register(Box::new(innertube::InnertubeStrategy::new(
                    fetcher.clone(),
                    base.clone(),
                    config.innertube.clone(),
                ))),
                "html-scrape" => registry.register(Box::new(
                    html_scrape::HtmlScrapeStrategy::new(fetcher.clone(), base.clone()),
                )),
                other => tracing::warn!("Ignoring unknown strategy '{}'", other),
            }
        }

        registry
    }

    /// Register a new strategy at the end of the chain
    pub fn register(&mut self, strategy: Box<dyn CaptionStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn CaptionStrategy> {
        self.strategies.iter().map(|boxed| boxed.as_ref())
    }

    /// Strategy names in attempt order
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Fetch a chosen track and keep the segments overlapping the window.
///
/// Returns `None` when nothing overlaps so the orchestrator moves on.
pub(crate) async fn fetch_track_segments(
    fetcher: &dyn Fetcher,
    track: &CaptionTrack,
    window: &TimeWindow,
) -> Result<Option<StrategyHit>> {
    let url = ensure_caption_format(&track.location_ref);
    let markup = fetcher.fetch(FetchRequest::get(url)).await?;

    let parsed = parser::parse_segments(&markup);
    let total = parsed.len();
    let segments: Vec<CaptionSegment> = parsed
        .into_iter()
        .filter(|segment| segment.overlaps(window))
        .collect();

    tracing::debug!(
        "Track {} ({}): {} segments, {} in window",
        track.language_code,
        track.kind,
        total,
        segments.len()
    );

    if segments.is_empty() {
        return Ok(None);
    }

    Ok(Some(StrategyHit {
        segments,
        track: Some(track.clone()),
        client: None,
        parsed: total,
    }))
}
