//! User lookup demo binary
//!
//! Fetches users from a JSON API through a request controller.
//!
//! # Running the Example
//!
//! ```bash
//! cargo run -p user-lookup -- 1 2 3
//! ```
//!
//! Environment:
//! - `USER_LOOKUP_BASE_URL`: API root (default `https://jsonplaceholder.typicode.com/`)
//! - `USER_LOOKUP_METRICS_ADDR`: print Prometheus metrics on exit when set

use anyhow::Context;
use request_state_http::{ClientConfig, ReqwestClient};
use request_state_runtime::metrics::MetricsServer;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_lookup::{UserLookup, render_changes};

const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com/";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "user_lookup=info,request_state_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = match std::env::var("USER_LOOKUP_METRICS_ADDR") {
        Ok(addr) => {
            let mut server = MetricsServer::new(addr.parse().context("invalid metrics address")?);
            server.start()?;
            Some(server)
        },
        Err(_) => None,
    };

    let base_url =
        std::env::var("USER_LOOKUP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let user_ids: Vec<u32> = std::env::args()
        .skip(1)
        .map(|arg| arg.parse().with_context(|| format!("invalid user id '{arg}'")))
        .collect::<anyhow::Result<_>>()?;
    let user_ids = if user_ids.is_empty() { vec![1, 2, 3] } else { user_ids };

    println!("=== User Lookup: request controller demo ===\n");

    let client = ReqwestClient::new(
        ClientConfig::default()
            .with_base_url(&base_url)?
            .with_timeout(Duration::from_secs(10)),
    )?;
    let view = UserLookup::mount(client)?;

    // Re-render on every transition
    let changes = view.controller().subscribe();
    let renderer = tokio::spawn(render_changes(changes, |view| println!("  [render] {view}")));

    // Switching users before the first lookup settles cancels it
    if let [first, second, ..] = user_ids.as_slice() {
        println!(">>> Quick switch: user {first} then user {second}");
        let _ = view.show(*first)?;
        let mut observation = view.show(*second)?;
        let _ = observation.handle.wait_with_timeout(Duration::from_secs(15)).await;
        println!("Shown: {}\n", view.render());
    }

    for user_id in &user_ids {
        println!(">>> Show user {user_id}");
        let mut observation = view.show(*user_id)?;
        if observation.handle.wait_with_timeout(Duration::from_secs(15)).await.is_err() {
            tracing::warn!(user_id, "Lookup did not settle in time");
        }
        println!("Shown: {}\n", view.render());
    }

    if let Some(&last) = user_ids.last() {
        println!(">>> Refresh user {last}");
        let mut refresh = view.show(last)?.controls.rerun()?;
        let _ = refresh.wait_with_timeout(Duration::from_secs(15)).await;
        println!("Shown: {}\n", view.render());
    }

    view.unmount();
    drop(view);
    let _ = renderer.await;

    if let Some(text) = metrics.as_ref().and_then(MetricsServer::render) {
        println!("=== Metrics ===\n{text}");
    }

    Ok(())
}
