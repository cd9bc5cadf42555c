//! HTTP transport: HEAD probes and full downloads behind a small trait.
//!
//! The resolver and the image stage only need two operations, so they talk
//! to a [`Fetcher`] instead of `reqwest` directly. [`HttpFetcher`] is the real
//! implementation; tests substitute an in-memory one.
//!
//! Every request carries the per-host headers from
//! [`crate::config::HttpPolicy`] and the configured timeout, so no call can
//! block indefinitely.

use crate::config::HttpPolicy;
use crate::error::{CoverGridError, ItemError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Status line and content type of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    /// Lower-cased `Content-Type`, if the server sent one.
    pub content_type: Option<String>,
}

impl ResponseHead {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the declared content type is an image type.
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.trim_start().starts_with("image"))
    }
}

/// A fully downloaded response.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub head: ResponseHead,
    /// Where the body was actually served from, after redirects.
    pub final_url: String,
    pub body: Vec<u8>,
}

/// The two network operations the pipeline needs.
///
/// Implementations report transport problems (DNS, TLS, timeout) as
/// `Err`; any HTTP status, including 4xx/5xx, is an `Ok` response for the
/// caller to judge.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Lightweight existence/type probe (HEAD).
    async fn head(&self, url: &str) -> Result<ResponseHead, ItemError>;

    /// Full download (GET).
    async fn get(&self, url: &str) -> Result<FetchedBody, ItemError>;
}

/// [`Fetcher`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    policy: HttpPolicy,
}

impl HttpFetcher {
    pub fn new(policy: &HttpPolicy) -> Result<Self, CoverGridError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(policy.timeout_secs))
            .build()
            .map_err(|e| CoverGridError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            policy: policy.clone(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder, url: &str) -> reqwest::RequestBuilder {
        let headers = self.policy.headers_for(url);
        if !headers.is_empty() {
            debug!("Adding {} special-domain headers for {}", headers.len(), url);
        }
        headers
            .into_iter()
            .fold(builder, |b, (name, value)| b.header(name, value))
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> ItemError {
        if e.is_timeout() {
            ItemError::Timeout {
                url: url.to_string(),
                secs: self.policy.timeout_secs,
            }
        } else {
            ItemError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

fn head_of(response: &reqwest::Response) -> ResponseHead {
    ResponseHead {
        status: response.status().as_u16(),
        content_type: response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase()),
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn head(&self, url: &str) -> Result<ResponseHead, ItemError> {
        let response = self
            .request(self.client.head(url), url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        Ok(head_of(&response))
    }

    async fn get(&self, url: &str) -> Result<FetchedBody, ItemError> {
        let response = self
            .request(self.client.get(url), url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;
        let head = head_of(&response);
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(url, e))?
            .to_vec();
        debug!("GET {} → {} ({} bytes)", final_url, head.status, body.len());
        Ok(FetchedBody {
            head,
            final_url,
            body,
        })
    }
}

/// GET `url` and insist on a 2xx status.
pub async fn download(fetcher: &dyn Fetcher, url: &str) -> Result<Vec<u8>, ItemError> {
    let fetched = fetcher.get(url).await?;
    if !fetched.head.is_success() {
        return Err(ItemError::HttpStatus {
            url: url.to_string(),
            status: fetched.head.status,
        });
    }
    Ok(fetched.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_content_types() {
        let head = |ct: Option<&str>| ResponseHead {
            status: 200,
            content_type: ct.map(str::to_string),
        };
        assert!(head(Some("image/jpeg")).is_image());
        assert!(head(Some("image/webp; charset=binary")).is_image());
        assert!(!head(Some("text/html; charset=utf-8")).is_image());
        assert!(!head(None).is_image());
    }

    #[test]
    fn success_range() {
        let head = |status| ResponseHead {
            status,
            content_type: None,
        };
        assert!(head(200).is_success());
        assert!(head(204).is_success());
        assert!(!head(301).is_success());
        assert!(!head(404).is_success());
    }

    #[test]
    fn http_fetcher_builds_from_default_policy() {
        assert!(HttpFetcher::new(&HttpPolicy::default()).is_ok());
    }
}
