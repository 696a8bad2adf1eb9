use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::captions::TrackKind;
use crate::strategies::KNOWN_STRATEGIES;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP service settings
    pub server: ServerConfig,

    /// Outbound request identity and limits
    pub http: HttpConfig,

    /// Strategy ordering and budgets
    pub pipeline: PipelineConfig,

    /// Internal player API emulation
    pub innertube: InnertubeConfig,

    /// Scheme and host every upstream URL is built from
    pub upstream_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,

    /// max-age for cacheable (non-debug, successful) responses
    pub cache_max_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Browser user agent sent with every request
    pub user_agent: String,

    /// Accept-Language header value
    pub accept_language: String,

    /// Consent cookies, sent to skip the consent interstitial
    pub cookies: Option<String>,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Redirect hops followed before giving up
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline for a whole pipeline run
    pub total_budget_secs: u64,

    /// Strategy names in the order they are attempted
    pub strategies: Vec<String>,

    /// Language/kind combinations tried by the direct strategy
    pub direct_guesses: Vec<DirectGuess>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectGuess {
    pub language: String,
    pub kind: TrackKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InnertubeConfig {
    /// API key override; scraped from the watch page when unset
    pub api_key: Option<String>,

    /// Client identities, tried in order
    pub clients: Vec<ClientIdentity>,
}

/// A simulated player client for the internal API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Value of `context.client.clientName`
    pub name: String,

    /// Fallback client version
    pub version: String,

    /// Value of the `X-Youtube-Client-Name` header
    pub header_id: String,

    /// User agent override for this client
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Skip this client unless the watch page exposes a client version
    #[serde(default)]
    pub requires_page_version: bool,

    /// Sent as `context.thirdParty.embedUrl` for embedded players
    #[serde(default)]
    pub embed_url: Option<String>,

    /// Sent as `context.client.androidSdkVersion`
    #[serde(default)]
    pub android_sdk_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            http: HttpConfig::default(),
            pipeline: PipelineConfig::default(),
            innertube: InnertubeConfig::default(),
            upstream_base: "https://www.youtube.com".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8888".to_string(),
            cache_max_age_secs: 3600,
        }
    }
}

impl HttpConfig {
    /// Whole-fetch timeout, redirects included
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            cookies: Some("CONSENT=YES+cb; SOCS=CAI".to_string()),
            timeout_secs: 15,
            max_redirects: 3,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            total_budget_secs: 25,
            strategies: KNOWN_STRATEGIES.iter().map(|s| s.to_string()).collect(),
            direct_guesses: vec![
                DirectGuess {
                    language: "en".to_string(),
                    kind: TrackKind::Standard,
                },
                DirectGuess {
                    language: "en".to_string(),
                    kind: TrackKind::Asr,
                },
                DirectGuess {
                    language: "en-US".to_string(),
                    kind: TrackKind::Standard,
                },
            ],
        }
    }
}

impl Default for InnertubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            clients: vec![
                ClientIdentity {
                    name: "WEB".to_string(),
                    version: "2.20240815.00.00".to_string(),
                    header_id: "1".to_string(),
                    user_agent: None,
                    requires_page_version: true,
                    embed_url: None,
                    android_sdk_version: None,
                },
                ClientIdentity {
                    name: "TVHTML5_SIMPLY_EMBEDDED_PLAYER".to_string(),
                    version: "2.0".to_string(),
                    header_id: "85".to_string(),
                    user_agent: Some(
                        "Mozilla/5.0 (PlayStation 4 5.55) AppleWebKit/601.2 (KHTML, like Gecko)"
                            .to_string(),
                    ),
                    requires_page_version: false,
                    embed_url: Some("https://www.youtube.com/".to_string()),
                    android_sdk_version: None,
                },
                ClientIdentity {
                    name: "ANDROID".to_string(),
                    version: "19.29.37".to_string(),
                    header_id: "3".to_string(),
                    user_agent: Some(
                        "com.google.android.youtube/19.29.37 (Linux; U; Android 14; en_US; Pixel 7 Pro)"
                            .to_string(),
                    ),
                    requires_page_version: false,
                    embed_url: None,
                    android_sdk_version: Some(34),
                },
            ],
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, the usual locations, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Option<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        dirs::config_dir().map(|dir| dir.join("caption-relay").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0 {
            anyhow::bail!("http.timeout_secs must be greater than zero");
        }

        if self.pipeline.total_budget_secs < self.http.timeout_secs {
            anyhow::bail!(
                "pipeline.total_budget_secs ({}) must be at least http.timeout_secs ({})",
                self.pipeline.total_budget_secs,
                self.http.timeout_secs
            );
        }

        if self.pipeline.strategies.is_empty() {
            anyhow::bail!("pipeline.strategies must name at least one strategy");
        }

        for name in &self.pipeline.strategies {
            if !KNOWN_STRATEGIES.contains(&name.as_str()) {
                anyhow::bail!(
                    "Unknown strategy '{}' (expected one of: {})",
                    name,
                    KNOWN_STRATEGIES.join(", ")
                );
            }
        }

        url::Url::parse(&self.upstream_base)
            .with_context(|| format!("Invalid upstream_base: {}", self.upstream_base))?;

        Ok(())
    }

    pub fn total_budget(&self) -> Duration {
        Duration::from_secs(self.pipeline.total_budget_secs)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Bind Address: {}", self.server.bind);
        println!("  Cache max-age: {}s", self.server.cache_max_age_secs);
        println!("  Upstream: {}", self.upstream_base);
        println!("  Request Timeout: {}s", self.http.timeout_secs);
        println!("  Max Redirects: {}", self.http.max_redirects);
        println!("  Total Budget: {}s", self.pipeline.total_budget_secs);
        println!("  Strategies: {}", self.pipeline.strategies.join(" -> "));
        println!(
            "  API Key: {}",
            if self.innertube.api_key.is_some() {
                "configured"
            } else {
                "scraped per request"
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.http.max_redirects, 3);
        assert_eq!(config.pipeline.strategies.len(), 4);
        assert_eq!(config.innertube.clients[0].name, "WEB");
        assert_eq!(config.http.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_rejects_unknown_strategy() {
        let mut config = Config::default();
        config.pipeline.strategies.push("carrier-pigeon".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn test_rejects_budget_below_timeout() {
        let mut config = Config::default();
        config.pipeline.total_budget_secs = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "server:\n  bind: 0.0.0.0:9000\npipeline:\n  strategies: [track-list]\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.server.cache_max_age_secs, 3600);
        assert_eq!(config.pipeline.strategies, vec!["track-list".to_string()]);
        assert_eq!(config.http.timeout_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.innertube.api_key = Some("test-key".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.innertube.api_key.as_deref(), Some("test-key"));
        assert_eq!(loaded.pipeline.direct_guesses, config.pipeline.direct_guesses);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "http:\n  timeout_secs: 0\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }
}
