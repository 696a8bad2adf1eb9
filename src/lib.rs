//! Caption Relay - time-windowed caption text for YouTube videos
//!
//! This library fetches caption tracks from YouTube through an ordered chain of
//! fallback strategies and returns only the caption text overlapping a requested
//! time window. It powers both the `caption-relay` HTTP service and its CLI.

pub mod captions;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod strategies;
pub mod utils;

pub use captions::{CaptionSegment, CaptionTrack, TimeWindow, TrackKind};
pub use cli::{Cli, Commands};
pub use config::Config;
pub use fetch::{FetchError, FetchRequest, Fetcher, HttpFetcher};
pub use pipeline::{TranscriptOutcome, TranscriptPipeline, TranscriptRequest};
pub use strategies::{CaptionStrategy, StrategyRegistry};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types surfaced at the pipeline boundary
#[derive(thiserror::Error, Debug)]
pub enum TranscriptError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] FetchError),

    #[error("Failed to parse upstream data: {0}")]
    Parse(String),

    #[error("{0}")]
    Unexpected(String),
}

impl TranscriptError {
    /// Whether the caller is at fault (maps to HTTP 400)
    pub fn is_user_error(&self) -> bool {
        matches!(self, TranscriptError::InvalidInput(_))
    }
}
