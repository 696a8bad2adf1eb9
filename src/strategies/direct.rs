use async_trait::async_trait;
use std::sync::Arc;

use super::{fetch_track_segments, CaptionStrategy, RequestContext, StrategyHit};
use crate::captions::{CaptionTrack, TrackKind};
use crate::config::DirectGuess;
use crate::fetch::Fetcher;
use crate::Result;

/// Guesses timed-text URLs for a few likely language/kind combinations
pub struct DirectGuessStrategy {
    fetcher: Arc<dyn Fetcher>,
    base: String,
    guesses: Vec<DirectGuess>,
}

impl DirectGuessStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: String, guesses: Vec<DirectGuess>) -> Self {
        Self {
            fetcher,
            base,
            guesses,
        }
    }

    fn guess_track(&self, ctx: &RequestContext, guess: &DirectGuess) -> CaptionTrack {
        let mut url = format!(
            "{}/api/timedtext?v={}&lang={}",
            self.base,
            ctx.encoded_id(),
            urlencoding::encode(&guess.language)
        );
        if guess.kind == TrackKind::Asr {
            url.push_str("&kind=asr");
        }
        CaptionTrack::new(guess.language.clone(), guess.kind, url)
    }
}

#[async_trait]
impl CaptionStrategy for DirectGuessStrategy {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn source_tag(&self) -> &'static str {
        "timedtext-direct"
    }

    async fn attempt(&self, ctx: &RequestContext) -> Result<Option<StrategyHit>> {
        let mut last_error = None;
        let mut any_answered = false;

        for guess in &self.guesses {
            let track = self.guess_track(ctx, guess);

            match fetch_track_segments(self.fetcher.as_ref(), &track, &ctx.window).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => {
                    any_answered = true;
                    tracing::debug!("Direct guess {}/{} had nothing in window", guess.language, guess.kind);
                }
                Err(e) => {
                    tracing::debug!("Direct guess {}/{} failed: {}", guess.language, guess.kind, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !any_answered => Err(e),
            _ => Ok(None),
        }
    }
}
