//! Internal player API emulation
//!
//! The watch page exposes an API key, the web client version and a visitor
//! token. Each configured client identity then asks the player endpoint for
//! caption tracks; identities see different tracks, so they are tried in order.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, OnceLock};
use url::Url;

use super::{fetch_track_segments, CaptionStrategy, RequestContext, StrategyHit};
use crate::captions::{select_track, CaptionTrack, TrackKind};
use crate::config::{ClientIdentity, InnertubeConfig};
use crate::fetch::{FetchRequest, Fetcher};
use crate::Result;

/// Caption track as it appears in player JSON
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawCaptionTrack {
    base_url: Option<String>,
    language_code: Option<String>,
    kind: Option<String>,
    name: Option<RawTrackName>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrackName {
    simple_text: Option<String>,
    runs: Option<Vec<RawRun>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawRun {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    captions: Option<Captions>,
    playability_status: Option<PlayabilityStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Captions {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    caption_tracks: Option<Vec<RawCaptionTrack>>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

impl RawTrackName {
    fn text(&self) -> Option<String> {
        self.simple_text.clone().or_else(|| {
            self.runs
                .as_ref()?
                .iter()
                .find_map(|run| run.text.clone())
        })
    }
}

/// Convert raw player tracks, dropping entries without a language or location
pub(crate) fn into_tracks(raw: Vec<RawCaptionTrack>, base: &str) -> Vec<CaptionTrack> {
    let base = Url::parse(base).ok();

    raw.into_iter()
        .filter_map(|track| {
            let language = track.language_code.filter(|code| !code.is_empty())?;
            let location = track.base_url.filter(|url| !url.is_empty())?;
            let location = match Url::parse(&location) {
                Ok(absolute) => absolute.to_string(),
                Err(_) => base.as_ref()?.join(&location).ok()?.to_string(),
            };
            let name = track.name.as_ref().and_then(RawTrackName::text);

            Some(
                CaptionTrack::new(language, TrackKind::from_upstream(track.kind.as_deref()), location)
                    .with_name(name),
            )
        })
        .collect()
}

/// Tokens scraped from the watch page
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PageTokens {
    pub api_key: Option<String>,
    pub client_version: Option<String>,
    pub visitor_data: Option<String>,
}

fn capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|v| !v.is_empty())
}

impl PageTokens {
    pub fn scrape(html: &str) -> Self {
        static API_KEY: OnceLock<Regex> = OnceLock::new();
        static API_KEY_ALT: OnceLock<Regex> = OnceLock::new();
        static VERSION: OnceLock<Regex> = OnceLock::new();
        static VISITOR: OnceLock<Regex> = OnceLock::new();

        let api_key_re = API_KEY.get_or_init(|| {
            Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).expect("valid regex")
        });
        let api_key_alt_re = API_KEY_ALT.get_or_init(|| {
            Regex::new(r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#).expect("valid regex")
        });
        let version_re = VERSION.get_or_init(|| {
            Regex::new(r#""INNERTUBE_CLIENT_VERSION"\s*:\s*"([^"]+)""#).expect("valid regex")
        });
        let visitor_re = VISITOR
            .get_or_init(|| Regex::new(r#""VISITOR_DATA"\s*:\s*"([^"]+)""#).expect("valid regex"));

        Self {
            api_key: capture(api_key_re, html).or_else(|| capture(api_key_alt_re, html)),
            client_version: capture(version_re, html),
            visitor_data: capture(visitor_re, html),
        }
    }
}

/// Emulates player API calls across several client identities
pub struct InnertubeStrategy {
    fetcher: Arc<dyn Fetcher>,
    base: String,
    config: InnertubeConfig,
}

impl InnertubeStrategy {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: String, config: InnertubeConfig) -> Self {
        Self {
            fetcher,
            base,
            config,
        }
    }

    fn player_request(
        &self,
        ctx: &RequestContext,
        client: &ClientIdentity,
        version: &str,
        api_key: &str,
        tokens: &PageTokens,
    ) -> FetchRequest {
        let mut client_context = json!({
            "clientName": client.name,
            "clientVersion": version,
            "hl": "en",
            "gl": "US",
        });
        if let Some(visitor) = &tokens.visitor_data {
            client_context["visitorData"] = json!(visitor);
        }
        if let Some(sdk) = client.android_sdk_version {
            client_context["androidSdkVersion"] = json!(sdk);
        }

        let mut context = json!({ "client": client_context });
        if let Some(embed_url) = &client.embed_url {
            context["thirdParty"] = json!({ "embedUrl": embed_url });
        }

        let body = json!({
            "videoId": ctx.video_id,
            "context": context,
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let url = format!(
            "{}/youtubei/v1/player?key={}&prettyPrint=false",
            self.base,
            urlencoding::encode(api_key)
        );

        let mut request = FetchRequest::post_json(url, &body)
            .header("X-Youtube-Client-Name", client.header_id.clone())
            .header("X-Youtube-Client-Version", version)
            .header("Origin", self.base.clone());
        if let Some(agent) = &client.user_agent {
            request = request.header("User-Agent", agent.clone());
        }
        if let Some(visitor) = &tokens.visitor_data {
            request = request.header("X-Goog-Visitor-Id", visitor.clone());
        }
        request
    }

    /// Tracks one client identity can see. An absent caption block is an empty list.
    async fn client_tracks(
        &self,
        ctx: &RequestContext,
        client: &ClientIdentity,
        version: &str,
        api_key: &str,
        tokens: &PageTokens,
    ) -> Result<Vec<CaptionTrack>> {
        let request = self.player_request(ctx, client, version, api_key, tokens);
        let body = self.fetcher.fetch(request).await?;
        let response: PlayerResponse = serde_json::from_str(&body)
            .map_err(|e| crate::TranscriptError::Parse(format!("player response: {e}")))?;

        if let Some(status) = &response.playability_status {
            if status.status.as_deref().is_some_and(|s| s != "OK") {
                tracing::debug!(
                    "{} playability {:?}: {}",
                    client.name,
                    status.status,
                    status.reason.as_deref().unwrap_or("no reason given")
                );
            }
        }

        let raw = response
            .captions
            .and_then(|c| c.player_captions_tracklist_renderer)
            .and_then(|r| r.caption_tracks)
            .unwrap_or_default();

        Ok(into_tracks(raw, &self.base))
    }
}

#[async_trait]
impl CaptionStrategy for InnertubeStrategy {
    fn name(&self) -> &'static str {
        "innertube"
    }

    fn source_tag(&self) -> &'static str {
        "innertube"
    }

    async fn attempt(&self, ctx: &RequestContext) -> Result<Option<StrategyHit>> {
        let page = ctx.watch_page(self.fetcher.as_ref(), &self.base).await?;
        let tokens = PageTokens::scrape(&page);

        let Some(api_key) = self.config.api_key.clone().or_else(|| tokens.api_key.clone()) else {
            tracing::debug!("No API key available, skipping every client identity");
            return Ok(None);
        };

        let mut last_error = None;
        let mut any_answered = false;

        for client in &self.config.clients {
            let version = match (&tokens.client_version, client.requires_page_version) {
                (Some(page_version), true) => page_version.clone(),
                (None, true) => {
                    tracing::debug!("Skipping {}: watch page exposed no client version", client.name);
                    continue;
                }
                (_, false) => client.version.clone(),
            };

            let tracks = match self.client_tracks(ctx, client, &version, &api_key, &tokens).await {
                Ok(tracks) => tracks,
                Err(e) => {
                    tracing::debug!("{} player request failed: {}", client.name, e);
                    last_error = Some(e);
                    continue;
                }
            };
            any_answered = true;

            let Some(track) = select_track(&tracks) else {
                tracing::debug!("{} saw no caption tracks", client.name);
                continue;
            };

            match fetch_track_segments(self.fetcher.as_ref(), track, &ctx.window).await {
                Ok(Some(mut hit)) => {
                    hit.client = Some(client.name.clone());
                    return Ok(Some(hit));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!("{} track fetch failed: {}", client.name, e);
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
