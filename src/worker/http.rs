//! HTTP client for fetching resources
//!
//! One GET per call, no retries.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::debug;

use super::{FetchError, Result};
use crate::auth::AuthError;
use crate::config::HttpConfig;

/// Response headers have been checked; the body is still unread
#[derive(Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub content_length: Option<u64>,
    pub response: Response,
}

/// HTTP downloader
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self { client })
    }

    /// Send the request and validate the status line.
    ///
    /// The `reason` of [`FetchError::Http`] is the canonical phrase for the
    /// status code, not the phrase the server sent.
    pub async fn fetch(&self, url: &str, bearer: Option<&str>) -> Result<FetchResponse> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

        let mut headers = HeaderMap::new();
        if let Some(token) = bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| FetchError::Auth(AuthError::Lookup(format!("unusable token: {e}"))))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        debug!(url, authenticated = bearer.is_some(), "Sending request");

        let response = self
            .client
            .get(parsed)
            .headers(headers)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            return Err(FetchError::EmptyBody);
        }

        let content_length = response.content_length();
        debug!(url, status = status.as_u16(), ?content_length, "Response headers received");

        Ok(FetchResponse {
            status,
            content_length,
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        assert!(HttpClient::new(&HttpConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_network() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let err = client.fetch("not a url", None).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_bearer_with_newline_rejected() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let err = client
            .fetch("http://127.0.0.1:9/file", Some("bad\ntoken"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Auth(AuthError::Lookup(_))));
    }
}
