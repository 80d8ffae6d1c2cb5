//! Integration tests for the user lookup view
//!
//! These tests drive the view end to end with a scripted HTTP client.

#![allow(clippy::unwrap_used)]

use request_state_core::RequestState;
use request_state_runtime::ControllerError;
use request_state_testing::{MockError, MockHttpClient};
use serde_json::{Value, json};
use std::time::Duration;
use user_lookup::UserLookup;

const TIMEOUT: Duration = Duration::from_secs(1);

#[tokio::test]
async fn test_show_user() {
    let client = MockHttpClient::<Value>::new();
    let view = UserLookup::mount(client.clone()).unwrap();

    let mut observation = view.show(1).unwrap();
    assert_eq!(view.render(), "Loading...");
    assert_eq!(client.last_request().unwrap().config.url, "users/1");

    assert!(client.respond(json!({"id": 1, "name": "Leanne Graham"})));
    observation.handle.wait_with_timeout(TIMEOUT).await.unwrap();

    assert_eq!(view.render(), "User: Leanne Graham");
}

#[tokio::test]
async fn test_switching_users_cancels_previous_lookup() {
    let client = MockHttpClient::<Value>::new();
    let view = UserLookup::mount(client.clone()).unwrap();

    let _ = view.show(1).unwrap();
    let mut second = view.show(2).unwrap();

    assert_eq!(client.request_count(), 2);
    assert!(client.requests()[0].token.is_cancelled());

    assert!(client.respond_to(1, json!({"id": 2, "name": "Ervin Howell"})));
    second.handle.wait_with_timeout(TIMEOUT).await.unwrap();
    assert_eq!(view.render(), "User: Ervin Howell");
}

#[tokio::test]
async fn test_showing_same_user_keeps_result() {
    let client = MockHttpClient::<Value>::new();
    let view = UserLookup::mount(client.clone()).unwrap();

    let mut observation = view.show(1).unwrap();
    client.respond(json!({"name": "Leanne Graham"}));
    observation.handle.wait_with_timeout(TIMEOUT).await.unwrap();

    let again = view.show(1).unwrap();
    assert!(matches!(again.state, RequestState::Success { .. }));
    assert_eq!(client.request_count(), 1);
}

#[tokio::test]
async fn test_disabled_view_fetches_only_on_refresh() {
    let client = MockHttpClient::<Value>::new();
    let view = UserLookup::mount(client.clone()).unwrap().with_enabled(false);

    let observation = view.show(1).unwrap();
    assert_eq!(view.render(), "Press refresh to load");
    assert_eq!(client.request_count(), 0);

    let mut refresh = observation.controls.rerun().unwrap();
    assert_eq!(client.request_count(), 1);

    client.fail(MockError::Status(404));
    refresh.wait_with_timeout(TIMEOUT).await.unwrap();
    assert_eq!(view.render(), "Error: HTTP status 404");
}

#[tokio::test]
async fn test_unmount_cancels_and_rejects_further_lookups() {
    let client = MockHttpClient::<Value>::new();
    let view = UserLookup::mount(client.clone()).unwrap();

    let _ = view.show(1).unwrap();
    view.unmount();

    assert_eq!(client.cancel_count(), 1);
    assert!(matches!(view.show(2), Err(ControllerError::Disposed)));
}
