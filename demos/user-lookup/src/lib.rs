//! User lookup demo
//!
//! A tiny "component" that shows one user profile at a time. The selected
//! user id is the only dependency, so switching users cancels the previous
//! lookup and resets the view to `Loading`.

use request_state_core::{HttpClient, RequestConfig, RequestState, deps};
use request_state_runtime::{ControllerError, Observation, RequestController};
use std::fmt::Display;
use tokio::sync::broadcast::{self, error::RecvError};

/// Profile view over a request controller.
pub struct UserLookup<C: HttpClient> {
    controller: RequestController<C>,
    enabled: bool,
}

impl<C> UserLookup<C>
where
    C: HttpClient<Data = serde_json::Value>,
    C::Error: Clone + Display,
{
    /// Mount the view.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::NoRuntime`] outside a tokio runtime.
    pub fn mount(client: C) -> Result<Self, ControllerError> {
        Ok(Self {
            controller: RequestController::create(client)?,
            enabled: true,
        })
    }

    /// Toggle automatic fetching; a disabled view only fetches on refresh.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Show `user_id`, fetching it if it differs from the last shown user.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Disposed`] after [`unmount`](Self::unmount).
    pub fn show(&self, user_id: u32) -> Result<Observation<C>, ControllerError> {
        let enabled = self.enabled;
        let config = RequestConfig::get(format!("users/{user_id}"))
            .with_header("accept", "application/json")
            .with_skip_request(move || !enabled);

        self.controller.observe(config, deps![user_id])
    }

    /// Underlying controller.
    #[must_use]
    pub const fn controller(&self) -> &RequestController<C> {
        &self.controller
    }

    /// Current view text.
    #[must_use]
    pub fn render(&self) -> String {
        render(&self.controller.state())
    }

    /// Unmount the view, cancelling any lookup in flight.
    pub fn unmount(&self) {
        self.controller.dispose();
    }
}

/// Text for a request state.
#[must_use]
pub fn render<E: Display>(state: &RequestState<serde_json::Value, E>) -> String {
    match state {
        RequestState::Idle => "Press refresh to load".to_string(),
        RequestState::Loading => "Loading...".to_string(),
        RequestState::Success { data } => match data.get("name").and_then(|n| n.as_str()) {
            Some(name) => format!("User: {name}"),
            None => format!("User: {data}"),
        },
        RequestState::Error { error } => format!("Error: {error}"),
    }
}

/// Render every published state into `sink` until the controller goes away.
///
/// A subscriber that falls behind skips the states it missed and keeps
/// rendering from the oldest one still buffered.
pub async fn render_changes<E, F>(
    mut changes: broadcast::Receiver<RequestState<serde_json::Value, E>>,
    mut sink: F,
) where
    E: Clone + Display,
    F: FnMut(String),
{
    loop {
        match changes.recv().await {
            Ok(state) => sink(render(&state)),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Renderer fell behind, skipping states");
            },
            Err(RecvError::Closed) => break,
        }
    }
}
