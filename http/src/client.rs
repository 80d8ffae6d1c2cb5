//! reqwest-backed [`HttpClient`] implementation

use crate::error::HttpError;
use futures::StreamExt;
use futures::future::BoxFuture;
use request_state_core::{HttpClient, Method, RequestConfig, Response};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Maximum response size (50MB)
pub const MAX_RESPONSE_SIZE: usize = 50 * 1024 * 1024;

/// Configuration for [`ReqwestClient`]
///
/// # Example
///
/// ```
/// use request_state_http::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::default()
///     .with_base_url("https://api.example.com/v1/")?
///     .with_header("accept", "application/json")
///     .with_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.base_url.unwrap().as_str(), "https://api.example.com/v1/");
/// # Ok::<(), request_state_http::HttpError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL relative request URLs are joined onto
    pub base_url: Option<Url>,
    /// Headers sent with every request; per-request headers win
    pub default_headers: BTreeMap<String, String>,
    /// Default timeout, overridden by `RequestConfig::timeout`
    pub timeout: Option<Duration>,
    /// Largest response body accepted, in bytes
    pub max_response_size: usize,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: BTreeMap::new(),
            timeout: Some(Duration::from_secs(30)),
            max_response_size: MAX_RESPONSE_SIZE,
            user_agent: concat!("request-state/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Set the base URL
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidUrl`] if `base_url` does not parse.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, HttpError> {
        let parsed = Url::parse(base_url).map_err(|e| HttpError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = Some(parsed);
        Ok(self)
    }

    /// Add a default header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Set the default timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the default timeout
    #[must_use]
    pub const fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the response size limit
    #[must_use]
    pub const fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }

    /// Set the `User-Agent` header
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// HTTP client backed by [`reqwest`]
///
/// Successful responses are decoded as JSON; an empty body becomes
/// `Value::Null`. Non-2xx statuses become [`HttpError::Status`].
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl ReqwestClient {
    /// Create a client from `config`
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Build`] if the TLS backend cannot be initialised.
    pub fn new(config: ClientConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Resolve a request URL against the base URL and append query params
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidUrl`] if the URL does not parse or is not
    /// `http`/`https`.
    pub fn resolve_url(
        &self,
        url: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<Url, HttpError> {
        let invalid = |reason: String| HttpError::InvalidUrl {
            url: url.to_string(),
            reason,
        };

        let mut resolved = match &self.config.base_url {
            Some(base) => base.join(url),
            None => Url::parse(url),
        }
        .map_err(|e| invalid(e.to_string()))?;

        if !matches!(resolved.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", resolved.scheme())));
        }

        if !params.is_empty() {
            resolved.query_pairs_mut().extend_pairs(params);
        }

        Ok(resolved)
    }

    async fn send(&self, config: RequestConfig) -> Result<Response<serde_json::Value>, HttpError> {
        let url = self.resolve_url(&config.url, &config.params)?;
        tracing::debug!(method = %config.method, %url, "Sending request");

        let mut request = self.client.request(to_reqwest_method(config.method), url);

        for (name, value) in &self.config.default_headers {
            if !config.headers.contains_key(name) {
                request = request.header(name, value);
            }
        }
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }

        if let Some(body) = &config.body {
            request = request.json(body);
        }

        if let Some(timeout) = config.timeout.or(self.config.timeout) {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = response.status();
        let body = read_body(response, self.config.max_response_size).await?;

        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Request failed with status");
            return Err(HttpError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(Response {
            status: status.as_u16(),
            data: decode_body(&body)?,
        })
    }
}

impl std::fmt::Debug for ReqwestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpClient for ReqwestClient {
    type Data = serde_json::Value;
    type Error = HttpError;

    fn request(
        &self,
        config: RequestConfig,
        token: CancellationToken,
    ) -> BoxFuture<'static, Result<Response<serde_json::Value>, HttpError>> {
        let client = self.clone();
        Box::pin(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::trace!("Request cancelled");
                    Err(HttpError::Cancelled)
                },
                result = client.send(config) => result,
            }
        })
    }

    fn is_cancel(&self, error: &HttpError) -> bool {
        matches!(error, HttpError::Cancelled)
    }
}

const fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// Stream the response body with a size limit
async fn read_body(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, HttpError> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| HttpError::Transport(e.to_string()))?;

        if body.len() + chunk.len() > limit {
            return Err(HttpError::TooLarge(limit));
        }

        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

fn decode_body(body: &[u8]) -> Result<serde_json::Value, HttpError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| HttpError::Decode(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(base: Option<&str>) -> ReqwestClient {
        let mut config = ClientConfig::default();
        if let Some(base) = base {
            config = config.with_base_url(base).unwrap();
        }
        ReqwestClient::new(config).unwrap()
    }

    #[test]
    fn test_relative_url_joins_base() {
        let client = client(Some("https://api.example.com/v1/"));
        let url = client.resolve_url("users", &BTreeMap::new()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users");
    }

    #[test]
    fn test_params_become_query_string() {
        let client = client(None);
        let params = BTreeMap::from([
            ("page".to_string(), "2".to_string()),
            ("q".to_string(), "a b".to_string()),
        ]);
        let url = client.resolve_url("http://localhost/search", &params).unwrap();
        assert_eq!(url.as_str(), "http://localhost/search?page=2&q=a+b");
    }

    #[test]
    fn test_relative_url_without_base_is_invalid() {
        let client = client(None);
        let error = client.resolve_url("/api", &BTreeMap::new()).unwrap_err();
        assert!(matches!(error, HttpError::InvalidUrl { .. }));
    }

    #[test]
    fn test_non_http_scheme_is_rejected() {
        let client = client(None);
        let error = client
            .resolve_url("file:///etc/passwd", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(error, HttpError::InvalidUrl { .. }));
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b"").unwrap(), serde_json::Value::Null);
        assert_eq!(decode_body(b" \n").unwrap(), serde_json::Value::Null);
        assert_eq!(decode_body(br#"{"ok":true}"#).unwrap(), json!({"ok": true}));
        assert!(matches!(decode_body(b"<html>"), Err(HttpError::Decode(_))));
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(to_reqwest_method(Method::Get), reqwest::Method::GET);
        assert_eq!(to_reqwest_method(Method::Patch), reqwest::Method::PATCH);
        assert_eq!(to_reqwest_method(Method::Options), reqwest::Method::OPTIONS);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let client = client(Some("http://127.0.0.1:9/"));
        let token = CancellationToken::new();
        token.cancel();

        let error = client
            .request(RequestConfig::get("never"), token)
            .await
            .unwrap_err();

        assert_eq!(error, HttpError::Cancelled);
        assert!(client.is_cancel(&error));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_a_cancel() {
        let client = client(None);
        let error = client
            .request(RequestConfig::get("not a url"), CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(error, HttpError::InvalidUrl { .. }));
        assert!(!client.is_cancel(&error));
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::default()
            .with_header("accept", "application/json")
            .with_max_response_size(1024)
            .with_user_agent("tests")
            .without_timeout();

        assert_eq!(config.default_headers.get("accept").unwrap(), "application/json");
        assert_eq!(config.max_response_size, 1024);
        assert_eq!(config.user_agent, "tests");
        assert!(config.timeout.is_none());
        assert!(ClientConfig::default().with_base_url("::").is_err());
    }
}
