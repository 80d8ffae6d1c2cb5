//! # Request State Core
//!
//! Core traits and types for tracking the lifecycle of an HTTP request that is
//! bound to a set of reactive dependencies.
//!
//! ## Core Concepts
//!
//! - **`RequestConfig`**: Description of the HTTP call plus a `skip_request` predicate
//! - **`DependencyList`**: Ordered keys; when they change, a new request is issued
//! - **`RequestState`**: `Idle | Loading | Success { data } | Error { error }`
//! - **Reducer**: Pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: Side effect descriptions (not execution)
//! - **Environment**: Injected dependencies, here the [`HttpClient`](environment::HttpClient)
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - One live cancellation handle per controller
//! - Cancellation is never an error
//!
//! ## Example
//!
//! ```ignore
//! use request_state_core::*;
//!
//! let reducer = RequestReducer::new();
//! let env = RequestEnvironment::new(Arc::new(client));
//! let mut state = ControllerState::default();
//!
//! let effects = reducer.reduce(
//!     &mut state,
//!     RequestAction::Observe {
//!         config: RequestConfig::get("/api"),
//!         dependencies: deps![],
//!     },
//!     &env,
//! );
//! assert!(state.request().is_loading());
//! ```

pub use smallvec::{SmallVec, smallvec};

/// Cancellation handles for in-flight requests
pub mod cancellation;

/// Request descriptors
pub mod config;

/// Dependency lists and comparison
pub mod dependencies;

/// Request lifecycle state machine
pub mod request;

mod dependency_macros;

/// Reducer module - The core trait for state transitions
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// They hold all transition logic and are deterministic and testable.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for state transitions
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Updates state in place
        /// 2. Returns effect descriptions to be executed
        ///
        /// # Arguments
        ///
        /// - `state`: Mutable reference to current state
        /// - `action`: The action to process
        /// - `env`: Reference to injected dependencies
        ///
        /// # Returns
        ///
        /// Effects to be executed by the runtime
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values returned from reducers and executed by the runtime.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what should happen,
    /// returned from reducers and executed by the controller runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap a future as an effect
        pub fn future<F>(fut: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }

        /// Whether this effect does anything
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }
    }
}

/// Environment module - Dependency injection traits
///
/// The HTTP client is abstracted behind [`HttpClient`](environment::HttpClient)
/// and injected through the reducer's environment.
pub mod environment {
    use crate::cancellation::CancellationHandle;
    use crate::config::RequestConfig;
    use futures::future::BoxFuture;
    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;

    /// Successful HTTP response as seen by the controller.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Response<T> {
        /// HTTP status code
        pub status: u16,
        /// Decoded payload
        pub data: T,
    }

    impl<T> Response<T> {
        /// A `200 OK` response carrying `data`.
        pub const fn ok(data: T) -> Self {
            Self { status: 200, data }
        }
    }

    /// HttpClient trait - the capability the controller consumes
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - backed by reqwest
    /// let client = ReqwestClient::new(ClientConfig::default())?;
    ///
    /// // Test - scripted responses
    /// let client = MockHttpClient::<bool>::new();
    /// ```
    pub trait HttpClient: Send + Sync + 'static {
        /// Payload type of a successful response
        type Data: Send + 'static;

        /// Error type of a failed request
        type Error: Send + 'static;

        /// Issue `config`; the request must fail with an error recognised by
        /// [`is_cancel`](Self::is_cancel) once `token` is cancelled.
        ///
        /// Implementations should register the request before returning, so
        /// callers can observe it without polling the future.
        fn request(
            &self,
            config: RequestConfig,
            token: CancellationToken,
        ) -> BoxFuture<'static, Result<Response<Self::Data>, Self::Error>>;

        /// Whether `error` is the result of cancellation
        fn is_cancel(&self, error: &Self::Error) -> bool;

        /// Fresh cancellation handle for the next request
        fn cancellation_source(&self) -> CancellationHandle {
            CancellationHandle::new()
        }
    }
}

pub use cancellation::CancellationHandle;
pub use config::{Method, RequestConfig};
pub use dependencies::{Dependency, DependencyComparison, DependencyList};
pub use effect::Effect;
pub use environment::{HttpClient, Response};
pub use reducer::Reducer;
pub use request::{
    ControllerState, RequestAction, RequestEnvironment, RequestReducer, RequestState,
    RequestStatus, Subscription, Trigger,
};
