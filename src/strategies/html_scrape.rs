use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::innertube::{into_tracks, RawCaptionTrack};
use super::{fetch_track_segments, CaptionStrategy, RequestContext, StrategyHit};
use crate::captions::{select_track, CaptionTrack};
use crate::fetch::Fetcher;
use crate::Result;

fn caption_tracks_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""captionTracks"\s*:\s*\["#).expect("valid regex"))
}

/// Pull the first `captionTracks` array out of the watch page's embedded JSON.
///
/// Returns `None` when the key is absent or the array does not parse.
pub fn scrape_caption_tracks(html: &str, base: &str) -> Option<Vec<CaptionTrack>> {
    let found = caption_tracks_re().find(html)?;
    // the match ends just past '['
    let array_start = found.end() - 1;

    let mut stream =
        serde_json::Deserializer::from_str(&html[array_start..]).into_iter::<Vec<RawCaptionTrack>>();

    match stream.next() {
        Some(Ok(raw)) => Some(into_tracks(raw, base)),
        Some(Err(e)) => {
            tracing::debug!("captionTracks JSON did not parse: {}", e);
            None
        }
        None => None,
    }
}

/// Last resort: read caption track metadata straight from the watch page
pub struct HtmlScrapeStrategy {
    fetcher: Arc<dyn Fetcher>,
    base: String,
}

impl HtmlScrapeStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: String) -> Self {
        Self { fetcher, base }
    }
}

#[async_trait]
impl CaptionStrategy for HtmlScrapeStrategy {
    fn name(&self) -> &'static str {
        "html-scrape"
    }

    fn source_tag(&self) -> &'static str {
        "html-scrape"
    }

    async fn attempt(&self, ctx: &RequestContext) -> Result<Option<StrategyHit>> {
        let page = ctx.watch_page(self.fetcher.as_ref(), &self.base).await?;

        let Some(tracks) = scrape_caption_tracks(&page, &self.base) else {
            tracing::debug!("No captionTracks in watch page");
            return Ok(None);
        };

        let Some(track) = select_track(&tracks) else {
            return Ok(None);
        };

        fetch_track_segments(self.fetcher.as_ref(), track, &ctx.window).await
    }
}
