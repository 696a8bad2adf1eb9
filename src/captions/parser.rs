//! Timed-text markup parsing
//!
//! Upstream caption payloads are untrusted: elements with unparseable timing
//! are skipped one at a time and never abort the whole extraction. Two
//! dialects are understood:
//!
//! - classic `<text start="1.5" dur="2.0">...</text>` with seconds
//! - srv3 `<p t="1500" d="2000">...</p>` with milliseconds

use regex::Regex;
use std::sync::OnceLock;

use super::{CaptionSegment, TimeWindow, TrackKind, DEFAULT_SEGMENT_DURATION};

fn text_element_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<text\b([^>/]*)>(.*?)</text>").expect("valid regex"))
}

fn paragraph_element_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<p\b([^>/]*)>(.*?)</p>").expect("valid regex"))
}

fn track_element_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<track\b([^>]*?)/?>").expect("valid regex"))
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*"([^"]*)""#).expect("valid regex")
    })
}

fn inline_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid regex"))
}

/// Timing units of a timed-text dialect
#[derive(Debug, Clone, Copy)]
enum Dialect {
    /// `<text start dur>`, seconds
    Classic,
    /// `<p t d>`, milliseconds
    Srv3,
}

impl Dialect {
    fn attribute_names(&self) -> (&'static str, &'static str) {
        match self {
            Dialect::Classic => ("start", "dur"),
            Dialect::Srv3 => ("t", "d"),
        }
    }

    fn scale(&self) -> f64 {
        match self {
            Dialect::Classic => 1.0,
            Dialect::Srv3 => 1000.0,
        }
    }

    fn element_re(&self) -> &'static Regex {
        match self {
            Dialect::Classic => text_element_re(),
            Dialect::Srv3 => paragraph_element_re(),
        }
    }
}

/// An entry of the timed-text track list
#[derive(Debug, Clone, PartialEq)]
pub struct ListedTrack {
    pub lang_code: String,
    pub name: Option<String>,
    pub kind: TrackKind,
}

/// Decode the five XML entities in a single pass. Anything else is left as is.
pub fn decode_entities(input: &str) -> String {
    const ENTITIES: [(&str, char); 5] = [
        ("&amp;", '&'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&quot;", '"'),
        ("&#39;", '\''),
    ];

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        match ENTITIES.iter().find(|(entity, _)| tail.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn attributes(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    attribute_re().captures_iter(raw).filter_map(|caps| {
        let key = caps.get(1)?.as_str();
        let value = caps.get(2)?.as_str();
        Some((key, value))
    })
}

fn attribute<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    attributes(raw).find(|(key, _)| *key == name).map(|(_, value)| value)
}

/// Parse a non-negative, finite timing value
fn parse_timing(value: &str, scale: f64) -> Option<f64> {
    let parsed = value.trim().parse::<f64>().ok()?;
    if !parsed.is_finite() || parsed < 0.0 {
        return None;
    }
    Some(parsed / scale)
}

fn clean_text(inner: &str) -> String {
    let stripped = inline_tag_re().replace_all(inner, "");
    decode_entities(&stripped).trim().to_string()
}

fn parse_dialect(markup: &str, dialect: Dialect) -> Vec<CaptionSegment> {
    let (start_attr, dur_attr) = dialect.attribute_names();
    let mut segments = Vec::new();

    for caps in dialect.element_re().captures_iter(markup) {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let inner = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

        let Some(start) = attribute(attrs, start_attr).and_then(|v| parse_timing(v, dialect.scale()))
        else {
            tracing::trace!("Skipping caption element with unusable {}", start_attr);
            continue;
        };

        let duration = match attribute(attrs, dur_attr) {
            None => DEFAULT_SEGMENT_DURATION,
            Some(v) if v.trim().is_empty() => DEFAULT_SEGMENT_DURATION,
            Some(v) => match parse_timing(v, dialect.scale()) {
                Some(d) => d,
                None => {
                    tracing::trace!("Skipping caption element with unusable {}", dur_attr);
                    continue;
                }
            },
        };

        let text = clean_text(inner);
        if text.is_empty() {
            continue;
        }

        segments.push(CaptionSegment {
            start,
            duration,
            text,
        });
    }

    segments
}

/// Parse every caption segment in the markup, in source order
pub fn parse_segments(markup: &str) -> Vec<CaptionSegment> {
    let classic = parse_dialect(markup, Dialect::Classic);
    if !classic.is_empty() {
        return classic;
    }
    parse_dialect(markup, Dialect::Srv3)
}

/// Parse the markup and keep the segments overlapping the window
pub fn extract_segments(markup: &str, window: &TimeWindow) -> Vec<CaptionSegment> {
    parse_segments(markup)
        .into_iter()
        .filter(|segment| segment.overlaps(window))
        .collect()
}

/// Caller-facing text: segment texts joined by single spaces
pub fn join_text(segments: &[CaptionSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the timed-text track list. Entries without a language code are dropped.
pub fn parse_track_list(xml: &str) -> Vec<ListedTrack> {
    track_element_re()
        .captures_iter(xml)
        .filter_map(|caps| {
            let attrs = caps.get(1)?.as_str();
            let lang_code = attribute(attrs, "lang_code")
                .map(str::trim)
                .filter(|code| !code.is_empty())?
                .to_string();
            let name = attribute(attrs, "name")
                .map(decode_entities)
                .filter(|n| !n.is_empty());
            let kind = TrackKind::from_upstream(attribute(attrs, "kind"));

            Some(ListedTrack {
                lang_code,
                name,
                kind,
            })
        })
        .collect()
}
