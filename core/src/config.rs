//! Request descriptors.
//!
//! A [`RequestConfig`] describes one HTTP call: method, URL, query parameters,
//! headers, an optional JSON body and timeout, plus an optional `skip_request`
//! predicate that suppresses dependency-driven requests.
//!
//! # Examples
//!
//! ```
//! use request_state_core::config::{Method, RequestConfig};
//!
//! let config = RequestConfig::get("/api/users")
//!     .with_param("page", "2")
//!     .with_header("accept", "application/json");
//!
//! assert_eq!(config.method, Method::Get);
//! assert_eq!(config.params.get("page").map(String::as_str), Some("2"));
//! assert!(!config.should_skip());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type for [`Method`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported HTTP method: {0}")]
pub struct ParseMethodError(String);

/// HTTP method of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl Method {
    /// Upper-case wire name of the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseMethodError;

    /// Parses a method name case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ParseMethodError`] for anything outside the supported set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            _ => Err(ParseMethodError(s.to_string())),
        }
    }
}

/// Predicate deciding whether dependency-driven requests are suppressed.
pub type SkipPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Descriptor of a single HTTP call.
///
/// Immutable once handed to the controller; build a new one for every
/// observation. Cloning is cheap apart from the maps.
#[derive(Clone, Default)]
pub struct RequestConfig {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, or a path resolved against the client's base URL
    pub url: String,
    /// Query parameters, appended in key order
    pub params: BTreeMap<String, String>,
    /// Request headers
    pub headers: BTreeMap<String, String>,
    /// JSON request body
    pub body: Option<serde_json::Value>,
    /// Per-request timeout, overriding the client default
    pub timeout: Option<Duration>,
    /// When this returns `true`, the controller does not issue
    /// dependency-driven requests (manual reruns still go out)
    pub skip_request: Option<SkipPredicate>,
}

impl RequestConfig {
    /// Create a config for `method` and `url`.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Self::default()
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Shorthand for a `POST` request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Add a query parameter, replacing any previous value for `key`.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a header, replacing any previous value for `name`.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Install the `skip_request` predicate.
    #[must_use]
    pub fn with_skip_request<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.skip_request = Some(Arc::new(predicate));
        self
    }

    /// Evaluate `skip_request`; a missing predicate never skips.
    #[must_use]
    pub fn should_skip(&self) -> bool {
        self.skip_request.as_ref().is_some_and(|skip| skip())
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("timeout", &self.timeout)
            .field(
                "skip_request",
                &self.skip_request.as_ref().map(|_| "<predicate>"),
            )
            .finish()
    }
}
