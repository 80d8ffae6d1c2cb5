//! # Request State Runtime
//!
//! Runtime implementation for request-state.
//!
//! This crate provides the [`RequestController`] that owns a request's
//! lifecycle state, runs the request reducer and executes its effects.
//!
//! ## Core Components
//!
//! - **`RequestController`**: Explicit `create` / `observe` / `dispose` lifecycle
//! - **Effect Executor**: Runs request futures on tokio and feeds results back
//! - **`EffectHandle`**: Await the completion of the effects an action started
//!
//! ## Example
//!
//! ```ignore
//! use request_state_runtime::RequestController;
//! use request_state_core::{RequestConfig, deps};
//!
//! let controller = RequestController::create(client)?;
//!
//! // One evaluation cycle
//! let mut observation = controller.observe(RequestConfig::get("/api/users"), deps![page])?;
//! assert!(observation.state.is_loading());
//!
//! // Wait for the request to settle
//! observation.handle.wait().await;
//! let state = controller.state();
//!
//! // Unmount
//! controller.dispose();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Prometheus metrics for observability
pub mod metrics;

/// Error types for the controller runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during controller operations
    ///
    /// Request failures are never reported here; they become
    /// `RequestState::Error`. These errors only cover lifecycle misuse.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ControllerError {
        /// The controller was disposed and no longer accepts observations
        #[error("Controller has been disposed")]
        Disposed,

        /// No tokio runtime is available to execute effects
        ///
        /// Controllers must be created from within a tokio runtime.
        #[error("No tokio runtime available to execute effects")]
        NoRuntime,

        /// Graceful disposal timed out waiting for effects to complete
        #[error("Disposal timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::ControllerError;

use request_state_core::DependencyComparison;

/// Configuration for controller instances
///
/// # Example
///
/// ```
/// use request_state_core::DependencyComparison;
/// use request_state_runtime::ControllerConfig;
///
/// let config = ControllerConfig::default()
///     .with_comparison(DependencyComparison::SharedPrefix)
///     .with_broadcast_capacity(64);
///
/// assert_eq!(config.broadcast_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// How successive dependency lists are compared
    pub comparison: DependencyComparison,
    /// Number of state snapshots buffered for slow subscribers
    pub broadcast_capacity: usize,
}

impl ControllerConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(comparison: DependencyComparison, broadcast_capacity: usize) -> Self {
        Self {
            comparison,
            broadcast_capacity,
        }
    }

    /// Set the dependency comparison mode
    #[must_use]
    pub const fn with_comparison(mut self, comparison: DependencyComparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// Set the state broadcast capacity (minimum 1)
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = if capacity == 0 { 1 } else { capacity };
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            comparison: DependencyComparison::Strict,
            broadcast_capacity: 16,
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`RequestController::observe()`] and
/// [`RequestController::rerun()`] so callers can wait until the request they
/// started has settled and its result has been applied.
///
/// # Example
///
/// ```ignore
/// let mut handle = controller.rerun()?;
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a new effect handle and its tracking side
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Whether all tracked effects have finished
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.effects.load(Ordering::SeqCst) == 0
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                // Every tracker is gone, so the counter can no longer change.
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns `Err(())` if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), ()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| ())
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context passed through effect execution
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for disposal tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Controller module - the runtime for the request reducer
pub mod controller {
    use super::metrics::ControllerMetrics;
    use super::{
        Arc, AtomicCounterGuard, AtomicUsize, ControllerConfig, ControllerError, DecrementGuard,
        Duration, EffectHandle, EffectTracking, Ordering,
    };
    use parking_lot::Mutex;
    use request_state_core::{
        ControllerState, DependencyList, Effect, HttpClient, Reducer, RequestAction,
        RequestConfig, RequestEnvironment, RequestReducer, RequestState,
    };
    use std::sync::Weak;
    use tokio::runtime::Handle;
    use tokio::sync::broadcast;

    /// Request state produced by client `C`.
    pub type StateOf<C> = RequestState<<C as HttpClient>::Data, <C as HttpClient>::Error>;

    type ActionOf<C> = RequestAction<<C as HttpClient>::Data, <C as HttpClient>::Error>;
    type ControllerStateOf<C> = ControllerState<<C as HttpClient>::Data, <C as HttpClient>::Error>;

    struct Shared<C: HttpClient> {
        state: Mutex<ControllerStateOf<C>>,
        reducer: RequestReducer<C>,
        environment: RequestEnvironment<C>,
        runtime: Handle,
        changes: broadcast::Sender<StateOf<C>>,
        pending_effects: Arc<AtomicUsize>,
    }

    impl<C: HttpClient> Drop for Shared<C> {
        fn drop(&mut self) {
            // Dropping the state closes the live subscription.
            if !self.state.get_mut().is_disposed() {
                ControllerMetrics::record_disposed();
                tracing::debug!("Controller dropped without dispose");
            }
        }
    }

    /// Request controller - runtime coordinator for one request
    ///
    /// The controller manages:
    /// 1. Request state (behind a mutex; the reducer runs synchronously)
    /// 2. The dependency snapshot deciding when to issue a new request
    /// 3. The single live cancellation handle
    /// 4. Effect execution (with feedback of results into the reducer)
    ///
    /// Clones share the same state. Dropping the last clone disposes the
    /// controller and cancels any in-flight request; spawned effects only hold
    /// weak references.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let controller = RequestController::create(ReqwestClient::new(ClientConfig::default())?)?;
    ///
    /// let observation = controller.observe(
    ///     RequestConfig::get("/api/users").with_param("page", "1"),
    ///     deps![1],
    /// )?;
    /// ```
    pub struct RequestController<C: HttpClient> {
        shared: Arc<Shared<C>>,
    }

    /// Result of one evaluation cycle.
    pub struct Observation<C: HttpClient> {
        /// State right after the dependency comparison, before any request settles
        pub state: StateOf<C>,
        /// Manual controls
        pub controls: Controls<C>,
        /// Completes when the request started by this observation settles
        pub handle: EffectHandle,
    }

    /// Caller-facing controls.
    pub struct Controls<C: HttpClient> {
        controller: RequestController<C>,
    }

    impl<C: HttpClient> Clone for RequestController<C> {
        fn clone(&self) -> Self {
            Self {
                shared: Arc::clone(&self.shared),
            }
        }
    }

    impl<C: HttpClient> Clone for Controls<C> {
        fn clone(&self) -> Self {
            Self {
                controller: self.controller.clone(),
            }
        }
    }

    impl<C> Controls<C>
    where
        C: HttpClient,
        C::Data: Clone,
        C::Error: Clone,
    {
        /// Re-issue the last observed request, even if `skip_request` holds.
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::Disposed`] after disposal.
        pub fn rerun(&self) -> Result<EffectHandle, ControllerError> {
            self.controller.rerun()
        }
    }

    impl<C> RequestController<C>
    where
        C: HttpClient,
        C::Data: Clone,
        C::Error: Clone,
    {
        /// Create (mount) a controller with default configuration
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::NoRuntime`] when called outside a tokio runtime.
        pub fn create(client: C) -> Result<Self, ControllerError> {
            Self::with_config(client, ControllerConfig::default())
        }

        /// Create a controller with custom configuration
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::NoRuntime`] when called outside a tokio runtime.
        pub fn with_config(client: C, config: ControllerConfig) -> Result<Self, ControllerError> {
            Self::from_shared_client(Arc::new(client), config)
        }

        /// Create a controller over a client shared with other controllers
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::NoRuntime`] when called outside a tokio runtime.
        pub fn from_shared_client(
            client: Arc<C>,
            config: ControllerConfig,
        ) -> Result<Self, ControllerError> {
            let runtime = Handle::try_current().map_err(|_| ControllerError::NoRuntime)?;
            let (changes, _) = broadcast::channel(config.broadcast_capacity.max(1));

            tracing::debug!(comparison = ?config.comparison, "Controller created");

            Ok(Self {
                shared: Arc::new(Shared {
                    state: Mutex::new(ControllerState::default()),
                    reducer: RequestReducer::new(),
                    environment: RequestEnvironment::new(client)
                        .with_comparison(config.comparison),
                    runtime,
                    changes,
                    pending_effects: Arc::new(AtomicUsize::new(0)),
                }),
            })
        }

        /// Run one evaluation cycle
        ///
        /// Compares `dependencies` with the stored snapshot. When they differ,
        /// the state is reset to `Idle`/`Loading` and, unless `skip_request`
        /// holds, a new request is issued after cancelling the previous one.
        ///
        /// The returned state already reflects that reset.
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::Disposed`] after disposal.
        #[tracing::instrument(skip_all, name = "controller_observe", fields(url = %config.url))]
        pub fn observe(
            &self,
            config: RequestConfig,
            dependencies: DependencyList,
        ) -> Result<Observation<C>, ControllerError> {
            let (handle, state) = self.dispatch(RequestAction::Observe {
                config,
                dependencies,
            })?;

            Ok(Observation {
                state,
                controls: self.controls(),
                handle,
            })
        }

        /// Re-issue the last observed request, even if `skip_request` holds
        ///
        /// Does nothing before the first observation.
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::Disposed`] after disposal.
        #[tracing::instrument(skip_all, name = "controller_rerun")]
        pub fn rerun(&self) -> Result<EffectHandle, ControllerError> {
            self.dispatch(RequestAction::Rerun).map(|(handle, _)| handle)
        }

        /// Dispose (unmount) the controller
        ///
        /// Cancels the in-flight request, if any. Idempotent.
        #[tracing::instrument(skip_all, name = "controller_dispose")]
        pub fn dispose(&self) {
            let _ = self.dispatch(RequestAction::Dispose);
        }

        /// Dispose and wait for outstanding effects to drain
        ///
        /// # Errors
        ///
        /// Returns [`ControllerError::ShutdownTimeout`] if effects are still
        /// running when `timeout` elapses.
        pub async fn dispose_gracefully(&self, timeout: Duration) -> Result<(), ControllerError> {
            self.dispose();

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.shared.pending_effects.load(Ordering::Acquire);

                if pending == 0 {
                    tracing::debug!("All effects completed after disposal");
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(
                        pending_effects = pending,
                        "Disposal timeout: {} effects still running", pending
                    );
                    return Err(ControllerError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Controls bound to this controller
        #[must_use]
        pub fn controls(&self) -> Controls<C> {
            Controls {
                controller: self.clone(),
            }
        }

        /// Current request state
        #[must_use]
        pub fn state(&self) -> StateOf<C> {
            self.shared.state.lock().request().clone()
        }

        /// Read the full controller state via a closure
        ///
        /// ```ignore
        /// let epoch = controller.inspect(|s| s.epoch());
        /// ```
        pub fn inspect<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&ControllerStateOf<C>) -> T,
        {
            f(&self.shared.state.lock())
        }

        /// Whether [`dispose`](Self::dispose) was called
        #[must_use]
        pub fn is_disposed(&self) -> bool {
            self.shared.state.lock().is_disposed()
        }

        /// Number of effects still running
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.shared.pending_effects.load(Ordering::SeqCst)
        }

        /// Subscribe to state transitions
        ///
        /// Every transition publishes the new state; this is the signal a host
        /// uses to re-render.
        #[must_use]
        pub fn subscribe(&self) -> broadcast::Receiver<StateOf<C>> {
            self.shared.changes.subscribe()
        }

        /// Feed an action through the reducer and execute its effects.
        fn dispatch(
            &self,
            action: ActionOf<C>,
        ) -> Result<(EffectHandle, StateOf<C>), ControllerError> {
            let kind = action.kind();
            let (handle, tracking) = EffectHandle::new();

            let (effects, snapshot) = {
                let mut state = self.shared.state.lock();

                if state.is_disposed() {
                    return match action {
                        RequestAction::Observe { .. } | RequestAction::Rerun => {
                            tracing::warn!(kind, "Rejected action: controller is disposed");
                            Err(ControllerError::Disposed)
                        },
                        _ => {
                            tracing::trace!(kind, "Ignoring action after disposal");
                            Ok((EffectHandle::completed(), state.request().clone()))
                        },
                    };
                }

                if matches!(action, RequestAction::Rerun) && state.config().is_none() {
                    tracing::warn!("Rerun requested before the first observation, ignoring");
                }

                if let Some(epoch) = action.epoch() {
                    if state.live_epoch() != Some(epoch) {
                        tracing::debug!(
                            epoch,
                            current = state.epoch(),
                            kind,
                            "Discarding result of superseded request"
                        );
                        ControllerMetrics::record_stale();
                    }
                }

                let revision = state.revision();
                let epoch = state.epoch();

                let span = tracing::debug_span!("reducer_execution", kind);
                let _enter = span.enter();

                let start = std::time::Instant::now();
                let effects =
                    self.shared
                        .reducer
                        .reduce(&mut state, action, &self.shared.environment);
                ControllerMetrics::record_action(kind, start.elapsed());

                if state.epoch() != epoch {
                    let trigger = if kind == "rerun" { "rerun" } else { "dependencies" };
                    tracing::debug!(epoch = state.epoch(), trigger, "Request issued");
                    ControllerMetrics::record_issued(trigger);
                }

                if state.is_disposed() {
                    ControllerMetrics::record_disposed();
                    tracing::debug!("Controller disposed");
                }

                tracing::trace!(
                    status = %state.request().status(),
                    "Reducer completed, returned {} effects",
                    effects.len()
                );

                let snapshot = state.request().clone();
                if state.revision() != revision {
                    // Published under the lock so subscribers see transitions in order.
                    // No subscribers is fine; the state is still readable via `state()`.
                    let _ = self.shared.changes.send(snapshot.clone());
                }

                (effects, snapshot)
            };

            for effect in effects {
                self.execute_effect(effect, &tracking);
            }

            Ok((handle, snapshot))
        }

        /// Execute an effect with tracking
        ///
        /// `Future` effects run on the controller's runtime; the action they
        /// produce is fed back through [`dispatch`](Self::dispatch) if the
        /// controller is still alive.
        fn execute_effect(&self, effect: Effect<ActionOf<C>>, tracking: &EffectTracking) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Future(fut) => {
                    tracing::trace!("Executing Effect::Future");
                    tracking.increment();

                    self.shared.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard =
                        AtomicCounterGuard(Arc::clone(&self.shared.pending_effects));

                    let guard = DecrementGuard(tracking.clone());
                    let weak: Weak<Shared<C>> = Arc::downgrade(&self.shared);

                    self.shared.runtime.spawn(async move {
                        let _guard = guard;
                        let _pending_guard = pending_guard;

                        let Some(action) = fut.await else {
                            tracing::trace!("Effect::Future completed with no action");
                            return;
                        };

                        match weak.upgrade() {
                            Some(shared) => {
                                let controller = RequestController { shared };
                                let _ = controller.dispatch(action);
                            },
                            None => {
                                tracing::trace!("Controller dropped before the request settled");
                            },
                        }
                    });
                },
            }
        }
    }
}

pub use controller::{Controls, Observation, RequestController, StateOf};

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completed_handle_does_not_block() {
        let mut handle = EffectHandle::completed();
        assert!(handle.is_complete());
        handle.wait_with_timeout(Duration::from_millis(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_waits_for_tracked_effects() {
        let (mut handle, tracking) = EffectHandle::new();
        tracking.increment();
        let guard = DecrementGuard(tracking.clone());

        assert!(!handle.is_complete());
        assert!(handle.wait_with_timeout(Duration::from_millis(10)).await.is_err());

        drop(guard);
        handle.wait_with_timeout(Duration::from_millis(100)).await.unwrap();
    }

    #[test]
    fn test_config_clamps_broadcast_capacity() {
        let config = ControllerConfig::default().with_broadcast_capacity(0);
        assert_eq!(config.broadcast_capacity, 1);
        assert_eq!(config.comparison, DependencyComparison::Strict);
    }

    #[tokio::test]
    async fn test_disposal_metric_counts_each_controller_once() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            let client = request_state_testing::MockHttpClient::<u8>::new();

            let disposed_twice = RequestController::create(client.clone()).unwrap();
            let clone = disposed_twice.clone();
            disposed_twice.dispose();
            clone.dispose();

            let disposed_then_dropped = RequestController::create(client.clone()).unwrap();
            disposed_then_dropped.dispose();
            drop(disposed_then_dropped);

            let dropped = RequestController::create(client).unwrap();
            drop(dropped);
        });

        let rendered = handle.render();
        assert!(
            rendered.contains("request_controller_disposed_total 3"),
            "unexpected metrics: {rendered}"
        );
    }

    #[test]
    fn test_create_outside_runtime_fails() {
        let client = request_state_testing::MockHttpClient::<u8>::new();
        let result = RequestController::create(client);
        assert!(matches!(result, Err(ControllerError::NoRuntime)));
    }
}
