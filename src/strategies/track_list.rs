use async_trait::async_trait;
use std::sync::Arc;

use super::{fetch_track_segments, CaptionStrategy, RequestContext, StrategyHit};
use crate::captions::{parse_track_list, select_track, CaptionTrack, TrackKind};
use crate::fetch::{FetchRequest, Fetcher};
use crate::Result;

/// Asks the timed-text endpoint which tracks exist, then fetches the preferred one
pub struct TrackListStrategy {
    fetcher: Arc<dyn Fetcher>,
    base: String,
}

impl TrackListStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: String) -> Self {
        Self { fetcher, base }
    }

    async fn list_tracks(&self, ctx: &RequestContext) -> Result<Vec<CaptionTrack>> {
        let url = format!("{}/api/timedtext?type=list&v={}", self.base, ctx.encoded_id());
        let xml = self.fetcher.fetch(FetchRequest::get(url)).await?;

        let tracks = parse_track_list(&xml)
            .into_iter()
            .map(|listed| {
                let mut location = format!(
                    "{}/api/timedtext?v={}&lang={}",
                    self.base,
                    ctx.encoded_id(),
                    urlencoding::encode(&listed.lang_code)
                );
                if let Some(name) = &listed.name {
                    location.push_str("&name=");
                    location.push_str(&urlencoding::encode(name));
                }
                if listed.kind == TrackKind::Asr {
                    location.push_str("&kind=asr");
                }
                CaptionTrack::new(listed.lang_code, listed.kind, location).with_name(listed.name)
            })
            .collect();

        Ok(tracks)
    }
}

#[async_trait]
impl CaptionStrategy for TrackListStrategy {
    fn name(&self) -> &'static str {
        "track-list"
    }

    fn source_tag(&self) -> &'static str {
        "timedtext-list"
    }

    async fn attempt(&self, ctx: &RequestContext) -> Result<Option<StrategyHit>> {
        let tracks = self.list_tracks(ctx).await?;
        tracing::debug!("Track list advertised {} tracks", tracks.len());

        let Some(track) = select_track(&tracks) else {
            return Ok(None);
        };

        fetch_track_segments(self.fetcher.as_ref(), track, &ctx.window).await
    }
}
