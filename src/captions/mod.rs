use serde::{Deserialize, Serialize};

pub mod parser;

pub use parser::{decode_entities, extract_segments, join_text, parse_track_list};

/// Duration assumed for a timed-text element without one
pub const DEFAULT_SEGMENT_DURATION: f64 = 4.0;

/// Whether a caption track was authored or generated by speech recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Standard,
    Asr,
}

impl TrackKind {
    /// Interpret the upstream `kind` attribute; anything but "asr" is standard
    pub fn from_upstream(kind: Option<&str>) -> Self {
        match kind {
            Some(k) if k.eq_ignore_ascii_case("asr") => TrackKind::Asr,
            _ => TrackKind::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Standard => "standard",
            TrackKind::Asr => "asr",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caption track advertised by the upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    /// BCP-47-ish language code ("en", "en-US", "fr")
    pub language_code: String,

    pub kind: TrackKind,

    /// Human readable track name, if any
    pub name: Option<String>,

    /// Fetchable caption location
    #[serde(skip_serializing)]
    pub location_ref: String,
}

impl CaptionTrack {
    pub fn new(language_code: impl Into<String>, kind: TrackKind, location_ref: impl Into<String>) -> Self {
        Self {
            language_code: language_code.into(),
            kind,
            name: None,
            location_ref: location_ref.into(),
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.is_empty());
        self
    }

    fn is_english(&self) -> bool {
        self.language_code.starts_with("en")
    }
}

/// One timed caption cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionSegment {
    /// Start offset in seconds
    pub start: f64,

    /// Duration in seconds
    pub duration: f64,

    /// Decoded, markup-free text
    pub text: String,
}

impl CaptionSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Closed-interval overlap: the segment starts inside the window, ends
    /// inside it, or spans all of it.
    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        if window.is_inverted() {
            return false;
        }
        let (start, end) = (self.start, self.end());
        (start >= window.start && start <= window.end)
            || (end >= window.start && end <= window.end)
            || (start <= window.start && end >= window.end)
    }
}

/// Requested time range in seconds. An inverted range matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }
}

/// Pick the track to fetch: English authored, then English ASR, then the first one.
pub fn select_track(tracks: &[CaptionTrack]) -> Option<&CaptionTrack> {
    tracks
        .iter()
        .find(|t| t.is_english() && t.kind == TrackKind::Standard)
        .or_else(|| {
            tracks
                .iter()
                .find(|t| t.is_english() && t.kind == TrackKind::Asr)
        })
        .or_else(|| tracks.first())
}
