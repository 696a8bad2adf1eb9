use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, LOCATION};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use crate::config::HttpConfig;
use crate::utils::{redact_url, truncate_chars};

/// Characters of an error body kept for diagnostics
const ERROR_BODY_LIMIT: usize = 512;

/// Failure of a single upstream fetch
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Request to {url} timed out after {millis}ms")]
    Timeout { url: String, millis: u128 },

    #[error("HTTP {status} from {url}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("Too many redirects (limit {limit}) starting at {url}")]
    TooManyRedirects { url: String, limit: usize },

    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    /// Per-call headers, replacing identity headers of the same name
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: Some(body.to_string()),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Something that can turn a request into decoded body text
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<String, FetchError>;
}

/// reqwest-backed fetcher with a browser identity, bounded redirects and a timeout
pub struct HttpFetcher {
    client: Client,
    identity: HeaderMap,
    timeout: Duration,
    max_redirects: usize,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("Failed to build HTTP client: {e}")))?;

        let mut identity = HeaderMap::new();
        insert_header(&mut identity, "User-Agent", &config.user_agent)?;
        insert_header(&mut identity, "Accept-Language", &config.accept_language)?;
        insert_header(&mut identity, "Accept", "*/*")?;
        if let Some(cookies) = &config.cookies {
            insert_header(&mut identity, "Cookie", cookies)?;
        }

        Ok(Self {
            client,
            identity,
            timeout: config.request_timeout(),
            max_redirects: config.max_redirects,
        })
    }

    /// Override the per-fetch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn headers_for(&self, request: &FetchRequest) -> Result<HeaderMap, FetchError> {
        let mut headers = self.identity.clone();
        for (name, value) in &request.headers {
            insert_header(&mut headers, name, value)?;
        }
        Ok(headers)
    }

    async fn fetch_following_redirects(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let origin = redact_url(&request.url);
        let mut url = Url::parse(&request.url)
            .map_err(|e| FetchError::InvalidRequest(format!("{origin}: {e}")))?;
        let headers = self.headers_for(request)?;
        let mut method = request.method;
        let mut body = request.body.clone();
        let mut redirects = 0;

        loop {
            let mut builder = match method {
                Method::Get => self.client.get(url.clone()),
                Method::Post => self.client.post(url.clone()),
            };
            builder = builder.headers(headers.clone());
            if let Some(body) = &body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| classify(e, &redact_url(url.as_str())))?;
            let status = response.status();

            if status.is_redirection() {
                if let Some(location) = response.headers().get(LOCATION) {
                    if redirects >= self.max_redirects {
                        return Err(FetchError::TooManyRedirects {
                            url: origin,
                            limit: self.max_redirects,
                        });
                    }
                    redirects += 1;

                    let location = location.to_str().map_err(|_| FetchError::Transport {
                        url: redact_url(url.as_str()),
                        reason: "non-ASCII Location header".to_string(),
                    })?;
                    url = url.join(location).map_err(|e| FetchError::Transport {
                        url: redact_url(url.as_str()),
                        reason: format!("bad Location header: {e}"),
                    })?;

                    if status == StatusCode::SEE_OTHER
                        || (method == Method::Post
                            && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND))
                    {
                        method = Method::Get;
                        body = None;
                    }

                    tracing::debug!("Following redirect {} to {}", redirects, redact_url(url.as_str()));
                    continue;
                }
            }

            let final_url = redact_url(url.as_str());

            // reqwest strips the header of every encoding it reversed
            if let Some(encoding) = response.headers().get(CONTENT_ENCODING) {
                let encoding = encoding.to_str().unwrap_or("<binary>").to_string();
                if !encoding.eq_ignore_ascii_case("identity") {
                    return Err(FetchError::Decode {
                        url: final_url,
                        reason: format!("unsupported content-encoding '{encoding}'"),
                    });
                }
            }

            let bytes = response.bytes().await.map_err(|e| classify(e, &final_url))?;
            let text = String::from_utf8_lossy(&bytes).into_owned();

            if !status.is_success() {
                return Err(FetchError::Http {
                    url: final_url,
                    status: status.as_u16(),
                    body: truncate_chars(&text, ERROR_BODY_LIMIT),
                });
            }

            return Ok(text);
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<String, FetchError> {
        tracing::debug!("{:?} {}", request.method, redact_url(&request.url));

        match tokio::time::timeout(self.timeout, self.fetch_following_redirects(&request)).await {
            Ok(result) => {
                if let Err(FetchError::Http { status, body, .. }) = &result {
                    tracing::debug!("Upstream answered {}: {}", status, body);
                }
                result
            }
            Err(_) => Err(FetchError::Timeout {
                url: redact_url(&request.url),
                millis: self.timeout.as_millis(),
            }),
        }
    }
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), FetchError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| FetchError::InvalidRequest(format!("invalid header name '{name}'")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| FetchError::InvalidRequest(format!("invalid value for header '{name}'")))?;
    headers.insert(name, value);
    Ok(())
}

fn classify(error: reqwest::Error, url: &str) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            millis: 0,
        }
    } else if error.is_decode() {
        FetchError::Decode {
            url: url.to_string(),
            reason: error.without_url().to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            reason: error.without_url().to_string(),
        }
    }
}
