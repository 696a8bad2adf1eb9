use regex::Regex;
use std::sync::OnceLock;
use url::Url;

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:youtu\.be/|youtube(?:-nocookie)?\.com/(?:watch\?(?:.*&)?v=|embed/|v/|shorts/))([A-Za-z0-9_-]{11})",
        )
        .expect("valid regex")
    })
}

/// Whether the input looks like a bare 11-character video id
pub fn is_video_id(input: &str) -> bool {
    input.len() == 11
        && input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract a video id from a bare id or any watch/short/embed URL
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if is_video_id(input) {
        return Some(input.to_string());
    }

    video_id_re()
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Drop the query string and fragment so API keys never reach logs or error bodies
pub fn redact_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    }
}

/// Truncate to at most `max` characters, marking the cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// Append `fmt=srv3` to a caption location unless it already names a format
pub fn ensure_caption_format(location: &str) -> String {
    if location.contains("fmt=") {
        location.to_string()
    } else if location.contains('?') {
        format!("{location}&fmt=srv3")
    } else {
        format!("{location}?fmt=srv3")
    }
}
