//! # Request State Testing
//!
//! Testing utilities and helpers for request-state.
//!
//! This crate provides:
//! - [`MockHttpClient`]: scriptable HTTP client with a cancel spy
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - Property-based testing strategies for dependency lists
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use request_state_testing::MockHttpClient;
//! use request_state_runtime::RequestController;
//!
//! #[tokio::test]
//! async fn test_successful_request() {
//!     let client = MockHttpClient::<bool>::new();
//!     let controller = RequestController::create(client.clone())?;
//!
//!     let mut observation = controller.observe(RequestConfig::get("/api"), deps![])?;
//!     client.respond(true);
//!     observation.handle.wait().await;
//!
//!     assert_eq!(controller.state().data(), Some(&true));
//! }
//! ```


/// Mock implementations of Environment traits
///
/// [`MockHttpClient`](mocks::MockHttpClient) records every request and leaves
/// it pending until the test resolves it, the same way a mocked HTTP library
/// would in a UI test.
pub mod mocks {
    use futures::future::BoxFuture;
    use parking_lot::Mutex;
    use request_state_core::config::RequestConfig;
    use request_state_core::environment::{HttpClient, Response};
    use request_state_core::CancellationHandle;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thiserror::Error;
    use tokio::sync::oneshot;
    use tokio_util::sync::CancellationToken;

    /// Errors produced by [`MockHttpClient`].
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum MockError {
        /// The request was cancelled
        #[error("request cancelled")]
        Cancelled,

        /// Generic failure with a message
        #[error("request failed: {0}")]
        Failed(String),

        /// Non-success HTTP status
        #[error("HTTP status {0}")]
        Status(u16),
    }

    /// A request seen by the mock.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        /// Config the request was issued with
        pub config: RequestConfig,
        /// Token attached to the request
        pub token: CancellationToken,
    }

    type Outcome<T> = Result<Response<T>, MockError>;

    struct Inner<T> {
        requests: Vec<RecordedRequest>,
        responders: Vec<Option<oneshot::Sender<Outcome<T>>>>,
    }

    /// Scriptable HTTP client for tests.
    ///
    /// Requests stay pending until resolved with [`respond`](Self::respond) or
    /// [`fail`](Self::fail), or until their token is cancelled. Clones share
    /// the same recordings.
    ///
    /// # Example
    ///
    /// ```
    /// use request_state_testing::mocks::MockHttpClient;
    /// use request_state_core::{HttpClient, RequestConfig};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # tokio_test::block_on(async {
    /// let client = MockHttpClient::<u32>::new();
    /// let pending = client.request(RequestConfig::get("/api"), CancellationToken::new());
    ///
    /// assert_eq!(client.request_count(), 1);
    /// assert!(client.respond(7));
    /// assert_eq!(pending.await.map(|r| r.data), Ok(7));
    /// # });
    /// ```
    pub struct MockHttpClient<T> {
        inner: Arc<Mutex<Inner<T>>>,
        cancels: Arc<AtomicUsize>,
    }

    impl<T> MockHttpClient<T> {
        /// Create an empty mock
        #[must_use]
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    requests: Vec::new(),
                    responders: Vec::new(),
                })),
                cancels: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Number of requests issued so far
        #[must_use]
        pub fn request_count(&self) -> usize {
            self.inner.lock().requests.len()
        }

        /// All requests in issue order
        #[must_use]
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.inner.lock().requests.clone()
        }

        /// Most recent request
        #[must_use]
        pub fn last_request(&self) -> Option<RecordedRequest> {
            self.inner.lock().requests.last().cloned()
        }

        /// How many cancellation handles handed out by this mock were cancelled
        #[must_use]
        pub fn cancel_count(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }

        /// Resolve the most recent request with a `200` response.
        ///
        /// Returns `false` if there is no request or it was already resolved.
        pub fn respond(&self, data: T) -> bool {
            self.resolve_last(Ok(Response::ok(data)))
        }

        /// Resolve request `index` with a `200` response.
        pub fn respond_to(&self, index: usize, data: T) -> bool {
            self.resolve(index, Ok(Response::ok(data)))
        }

        /// Resolve request `index` with a full response.
        pub fn respond_with(&self, index: usize, response: Response<T>) -> bool {
            self.resolve(index, Ok(response))
        }

        /// Reject the most recent request with `error`.
        pub fn fail(&self, error: MockError) -> bool {
            self.resolve_last(Err(error))
        }

        /// Reject request `index` with `error`.
        pub fn fail_request(&self, index: usize, error: MockError) -> bool {
            self.resolve(index, Err(error))
        }

        /// Reject the most recent request with a cancellation error, as if the
        /// client aborted it on its own.
        pub fn fail_with_cancel(&self) -> bool {
            self.fail(MockError::Cancelled)
        }

        /// Forget all requests and reset the cancel spy.
        ///
        /// Requests still pending resolve as cancelled.
        pub fn reset(&self) {
            let mut inner = self.inner.lock();
            inner.requests.clear();
            inner.responders.clear();
            self.cancels.store(0, Ordering::SeqCst);
        }

        fn resolve_last(&self, outcome: Outcome<T>) -> bool {
            let last = self.inner.lock().responders.len().checked_sub(1);
            last.is_some_and(|index| self.resolve(index, outcome))
        }

        fn resolve(&self, index: usize, outcome: Outcome<T>) -> bool {
            let responder = self
                .inner
                .lock()
                .responders
                .get_mut(index)
                .and_then(Option::take);
            responder.is_some_and(|tx| tx.send(outcome).is_ok())
        }
    }

    impl<T> Default for MockHttpClient<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T> Clone for MockHttpClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
                cancels: Arc::clone(&self.cancels),
            }
        }
    }

    impl<T: Send + 'static> HttpClient for MockHttpClient<T> {
        type Data = T;
        type Error = MockError;

        fn request(
            &self,
            config: RequestConfig,
            token: CancellationToken,
        ) -> BoxFuture<'static, Result<Response<T>, MockError>> {
            let (tx, rx) = oneshot::channel();
            {
                let mut inner = self.inner.lock();
                inner.requests.push(RecordedRequest {
                    config,
                    token: token.clone(),
                });
                inner.responders.push(Some(tx));
            }

            Box::pin(async move {
                tokio::select! {
                    biased;
                    () = token.cancelled() => Err(MockError::Cancelled),
                    outcome = rx => outcome.unwrap_or(Err(MockError::Cancelled)),
                }
            })
        }

        fn is_cancel(&self, error: &MockError) -> bool {
            matches!(error, MockError::Cancelled)
        }

        fn cancellation_source(&self) -> CancellationHandle {
            let cancels = Arc::clone(&self.cancels);
            CancellationHandle::new().with_hook(move || {
                cancels.fetch_add(1, Ordering::SeqCst);
            })
        }
    }
}

/// Test helpers and utilities
pub mod helpers {
    use tracing_subscriber::EnvFilter;

    /// Install a test-friendly tracing subscriber honouring `RUST_LOG`.
    ///
    /// Safe to call from every test; only the first call installs.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

/// Property-based testing utilities
///
/// Strategies for dependency keys and lists.
pub mod properties {
    use proptest::prelude::*;
    use request_state_core::dependencies::{Dependency, DependencyList};

    /// Any primitive dependency key.
    pub fn dependency() -> impl Strategy<Value = Dependency> {
        prop_oneof![
            Just(Dependency::Null),
            any::<bool>().prop_map(Dependency::Bool),
            (-3i64..3).prop_map(Dependency::Int),
            "[a-c]{1,2}".prop_map(Dependency::from),
        ]
    }

    /// Dependency list of up to `max_len` primitive keys.
    pub fn dependency_list(max_len: usize) -> impl Strategy<Value = DependencyList> {
        proptest::collection::vec(dependency(), 0..=max_len).prop_map(DependencyList::from)
    }
}

// Re-export commonly used items
pub use helpers::init_test_tracing;
pub use mocks::{MockError, MockHttpClient, RecordedRequest};
pub use reducer_test::ReducerTest;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use request_state_core::{HttpClient, RequestConfig};
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_mock_resolves_last_request() {
        let client = MockHttpClient::<&'static str>::new();
        let first = client.request(RequestConfig::get("/a"), CancellationToken::new());
        let second = client.request(RequestConfig::get("/b"), CancellationToken::new());

        assert!(client.respond("second"));
        assert!(client.respond_to(0, "first"));
        assert!(!client.respond("again"));

        assert_eq!(second.await.unwrap().data, "second");
        assert_eq!(first.await.unwrap().data, "first");
        assert_eq!(client.last_request().unwrap().config.url, "/b");
    }

    #[tokio::test]
    async fn test_mock_rejects_on_token_cancel() {
        let client = MockHttpClient::<u8>::new();
        let handle = client.cancellation_source();
        let pending = client.request(RequestConfig::get("/a"), handle.token());

        handle.cancel();

        let error = pending.await.unwrap_err();
        assert!(client.is_cancel(&error));
        assert_eq!(client.cancel_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_is_not_cancel() {
        let client = MockHttpClient::<u8>::new();
        let pending = client.request(RequestConfig::get("/a"), CancellationToken::new());

        client.fail(MockError::Status(500));
        let error = pending.await.unwrap_err();

        assert_eq!(error, MockError::Status(500));
        assert!(!client.is_cancel(&error));
    }

    #[tokio::test]
    async fn test_reset_clears_recordings() {
        let client = MockHttpClient::<u8>::new();
        let pending = client.request(RequestConfig::get("/a"), CancellationToken::new());

        client.reset();

        assert_eq!(client.request_count(), 0);
        assert_eq!(pending.await.unwrap_err(), MockError::Cancelled);
    }
}
