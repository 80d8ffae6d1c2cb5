//! Request lifecycle state machine.
//!
//! [`RequestReducer`] owns every transition of [`RequestState`]:
//!
//! ```text
//! *        --(dependencies changed)-->  Idle | Loading
//! Loading  --(http success)---------->  Success
//! Loading  --(http failure)---------->  Error
//! Loading  --(cancelled)------------->  Loading (no transition)
//! *        --(rerun)----------------->  Loading --(settle)--> Success | Error
//! ```
//!
//! Each issued request belongs to an epoch. The epoch's [`Subscription`] holds
//! the only live cancellation handle; starting a new epoch or disposing closes
//! it. Results tagged with any other epoch are discarded.

use crate::cancellation::CancellationHandle;
use crate::config::RequestConfig;
use crate::dependencies::{DependencyComparison, DependencyList};
use crate::effect::Effect;
use crate::environment::HttpClient;
use crate::reducer::Reducer;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Lifecycle of the current request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RequestState<T, E> {
    /// No request issued; only reached when `skip_request` held
    Idle,
    /// A request is in flight
    Loading,
    /// The last request completed
    Success {
        /// Response payload
        data: T,
    },
    /// The last request failed for a reason other than cancellation
    Error {
        /// Error exactly as the client produced it
        error: E,
    },
}

impl<T, E> RequestState<T, E> {
    /// State entered on a fresh dependency epoch.
    #[must_use]
    pub const fn initial(skip: bool) -> Self {
        if skip { Self::Idle } else { Self::Loading }
    }

    /// Fieldless view of the variant.
    #[must_use]
    pub const fn status(&self) -> RequestStatus {
        match self {
            Self::Idle => RequestStatus::Idle,
            Self::Loading => RequestStatus::Loading,
            Self::Success { .. } => RequestStatus::Success,
            Self::Error { .. } => RequestStatus::Error,
        }
    }

    /// `true` for [`RequestState::Idle`].
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// `true` for [`RequestState::Loading`].
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Payload of a successful request.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        match self {
            Self::Success { data } => Some(data),
            _ => None,
        }
    }

    /// Error of a failed request.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match self {
            Self::Error { error } => Some(error),
            _ => None,
        }
    }
}

impl<T, E> Default for RequestState<T, E> {
    fn default() -> Self {
        Self::Idle
    }
}

/// Variant tag of a [`RequestState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// See [`RequestState::Idle`]
    Idle,
    /// See [`RequestState::Loading`]
    Loading,
    /// See [`RequestState::Success`]
    Success,
    /// See [`RequestState::Error`]
    Error,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Success => "success",
            Self::Error => "error",
        })
    }
}

/// What started a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The dependency list changed (or this was the first observation)
    Dependencies,
    /// `rerun()` was called
    Rerun,
}

impl Trigger {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::Rerun => "rerun",
        }
    }
}

/// One request epoch and the cancellation handle it owns.
///
/// Closing cancels the handle. Retiring releases it untouched, for requests
/// that already settled. A subscription dropped without either is closed.
#[derive(Debug)]
pub struct Subscription {
    epoch: u64,
    trigger: Trigger,
    handle: Option<CancellationHandle>,
}

impl Subscription {
    /// Subscription for `epoch` owning `handle`.
    #[must_use]
    pub const fn new(epoch: u64, trigger: Trigger, handle: CancellationHandle) -> Self {
        Self {
            epoch,
            trigger,
            handle: Some(handle),
        }
    }

    /// Epoch this subscription belongs to.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// What started the request.
    #[must_use]
    pub const fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Cancel the request.
    pub fn close(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }

    /// Release the handle without cancelling.
    pub fn retire(mut self) {
        self.handle.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

/// State owned by one controller instance.
pub struct ControllerState<T, E> {
    request: RequestState<T, E>,
    dependencies: Option<DependencyList>,
    config: Option<RequestConfig>,
    epoch: u64,
    live: Option<Subscription>,
    rerun_pending: bool,
    disposed: bool,
    revision: u64,
}

impl<T, E> ControllerState<T, E> {
    /// Current request state.
    #[must_use]
    pub const fn request(&self) -> &RequestState<T, E> {
        &self.request
    }

    /// Dependency snapshot of the current epoch.
    #[must_use]
    pub const fn dependencies(&self) -> Option<&DependencyList> {
        self.dependencies.as_ref()
    }

    /// Latest observed config.
    #[must_use]
    pub const fn config(&self) -> Option<&RequestConfig> {
        self.config.as_ref()
    }

    /// Epoch of the most recently issued request (0 before any).
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Epoch of the live subscription, if a request is outstanding.
    #[must_use]
    pub fn live_epoch(&self) -> Option<u64> {
        self.live.as_ref().map(Subscription::epoch)
    }

    /// Whether a manual rerun is outstanding.
    #[must_use]
    pub const fn rerun_pending(&self) -> bool {
        self.rerun_pending
    }

    /// Whether the controller was disposed.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Incremented on every request state transition.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    fn transition(&mut self, next: RequestState<T, E>) {
        self.request = next;
        self.revision += 1;
    }

    fn close_live(&mut self) {
        if let Some(subscription) = self.live.take() {
            if subscription.trigger() == Trigger::Rerun {
                self.rerun_pending = false;
            }
            subscription.close();
        }
    }

    /// Retire the live subscription if it belongs to `epoch`.
    ///
    /// Returns `false` for stale epochs.
    fn settle(&mut self, epoch: u64) -> bool {
        match self.live.take() {
            Some(subscription) if subscription.epoch() == epoch => {
                if subscription.trigger() == Trigger::Rerun {
                    self.rerun_pending = false;
                }
                subscription.retire();
                true
            },
            other => {
                self.live = other;
                false
            },
        }
    }
}

impl<T, E> Default for ControllerState<T, E> {
    fn default() -> Self {
        Self {
            request: RequestState::Idle,
            dependencies: None,
            config: None,
            epoch: 0,
            live: None,
            rerun_pending: false,
            disposed: false,
            revision: 0,
        }
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for ControllerState<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerState")
            .field("request", &self.request)
            .field("dependencies", &self.dependencies)
            .field("epoch", &self.epoch)
            .field("live_epoch", &self.live_epoch())
            .field("rerun_pending", &self.rerun_pending)
            .field("disposed", &self.disposed)
            .finish_non_exhaustive()
    }
}

/// Inputs to the request state machine.
#[derive(Clone, Debug)]
pub enum RequestAction<T, E> {
    /// One evaluation cycle with the caller's current config and dependencies
    Observe {
        /// Request to issue when the dependencies changed
        config: RequestConfig,
        /// Dependency keys of this evaluation
        dependencies: DependencyList,
    },
    /// Manual re-run, ignoring `skip_request`
    Rerun,
    /// The request of `epoch` completed
    Succeeded {
        /// Epoch the result belongs to
        epoch: u64,
        /// Response payload
        data: T,
    },
    /// The request of `epoch` failed
    Failed {
        /// Epoch the result belongs to
        epoch: u64,
        /// Error as produced by the client
        error: E,
    },
    /// The request of `epoch` was cancelled
    Cancelled {
        /// Epoch the result belongs to
        epoch: u64,
    },
    /// Teardown: cancel the live request and stop reacting
    Dispose,
}

impl<T, E> RequestAction<T, E> {
    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Observe { .. } => "observe",
            Self::Rerun => "rerun",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
            Self::Dispose => "dispose",
        }
    }

    /// Epoch carried by result actions.
    #[must_use]
    pub const fn epoch(&self) -> Option<u64> {
        match self {
            Self::Succeeded { epoch, .. } | Self::Failed { epoch, .. } | Self::Cancelled { epoch } => {
                Some(*epoch)
            },
            _ => None,
        }
    }
}

/// Dependencies injected into the [`RequestReducer`].
pub struct RequestEnvironment<C> {
    /// HTTP capability
    pub client: Arc<C>,
    /// How successive dependency lists are compared
    pub comparison: DependencyComparison,
}

impl<C> RequestEnvironment<C> {
    /// Environment with strict dependency comparison.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            comparison: DependencyComparison::default(),
        }
    }

    /// Override the dependency comparison mode.
    #[must_use]
    pub const fn with_comparison(mut self, comparison: DependencyComparison) -> Self {
        self.comparison = comparison;
        self
    }
}

impl<C> Clone for RequestEnvironment<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            comparison: self.comparison,
        }
    }
}

/// Request reducer
///
/// Implements every transition of the request lifecycle. Generic over the
/// client so it works with the production and mock clients alike.
#[derive(Debug, Clone, Copy)]
pub struct RequestReducer<C> {
    _phantom: PhantomData<fn() -> C>,
}

impl<C> RequestReducer<C> {
    /// Create a new request reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<C> Default for RequestReducer<C> {
    fn default() -> Self {
        Self::new()
    }
}

type ClientState<C> = ControllerState<<C as HttpClient>::Data, <C as HttpClient>::Error>;
type ClientAction<C> = RequestAction<<C as HttpClient>::Data, <C as HttpClient>::Error>;

/// Start a new epoch: retire the previous request, enter `Loading` and hand
/// the call to the client.
fn issue<C: HttpClient>(
    state: &mut ClientState<C>,
    config: RequestConfig,
    trigger: Trigger,
    env: &RequestEnvironment<C>,
) -> Effect<ClientAction<C>> {
    state.close_live();
    state.epoch += 1;
    let epoch = state.epoch;
    if trigger == Trigger::Rerun {
        state.rerun_pending = true;
    }
    state.transition(RequestState::Loading);

    let handle = env.client.cancellation_source();
    // Called eagerly so the client registers the request before any task runs.
    let pending = env.client.request(config, handle.token());
    state.live = Some(Subscription::new(epoch, trigger, handle));

    let client = Arc::clone(&env.client);
    Effect::future(async move {
        Some(match pending.await {
            Ok(response) => RequestAction::Succeeded {
                epoch,
                data: response.data,
            },
            Err(error) if client.is_cancel(&error) => RequestAction::Cancelled { epoch },
            Err(error) => RequestAction::Failed { epoch, error },
        })
    })
}

impl<C: HttpClient> Reducer for RequestReducer<C> {
    type State = ClientState<C>;
    type Action = ClientAction<C>;
    type Environment = RequestEnvironment<C>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        if state.disposed {
            return smallvec![Effect::None];
        }

        match action {
            RequestAction::Observe {
                config,
                dependencies,
            } => {
                let changed = state
                    .dependencies
                    .as_ref()
                    .is_none_or(|previous| !previous.matches(&dependencies, env.comparison));
                state.config = Some(config.clone());
                if !changed {
                    return smallvec![Effect::None];
                }

                state.dependencies = Some(dependencies);
                state.close_live();

                if config.should_skip() {
                    state.transition(RequestState::Idle);
                    return smallvec![Effect::None];
                }
                smallvec![issue(state, config, Trigger::Dependencies, env)]
            },
            RequestAction::Rerun => match state.config.clone() {
                Some(config) => smallvec![issue(state, config, Trigger::Rerun, env)],
                None => smallvec![Effect::None],
            },
            RequestAction::Succeeded { epoch, data } => {
                if state.settle(epoch) {
                    state.transition(RequestState::Success { data });
                }
                smallvec![Effect::None]
            },
            RequestAction::Failed { epoch, error } => {
                if state.settle(epoch) {
                    state.transition(RequestState::Error { error });
                }
                smallvec![Effect::None]
            },
            RequestAction::Cancelled { epoch } => {
                // Cancellation leaves the state untouched.
                state.settle(epoch);
                smallvec![Effect::None]
            },
            RequestAction::Dispose => {
                state.close_live();
                state.rerun_pending = false;
                state.disposed = true;
                smallvec![Effect::None]
            },
        }
    }
}
