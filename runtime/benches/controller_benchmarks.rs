//! Controller Performance Benchmarks
//!
//! These benchmarks cover the hot paths of a request controller:
//! - Dependency comparison on every evaluation cycle
//! - Reducer execution for an unchanged and a changed dependency list
//! - Full observe-to-settle round trip through the runtime
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used)] // Benchmarks can use expect for setup

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use futures::future::BoxFuture;
use request_state_core::{
    ControllerState, DependencyComparison, HttpClient, Reducer, RequestAction, RequestConfig,
    RequestEnvironment, RequestReducer, Response, deps,
};
use request_state_runtime::RequestController;
use std::future::ready;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Client whose requests resolve immediately.
struct ReadyClient;

impl HttpClient for ReadyClient {
    type Data = u64;
    type Error = String;

    fn request(
        &self,
        _config: RequestConfig,
        _token: CancellationToken,
    ) -> BoxFuture<'static, Result<Response<u64>, String>> {
        Box::pin(ready(Ok(Response::ok(1))))
    }

    fn is_cancel(&self, error: &String) -> bool {
        error == "cancelled"
    }
}

/// Benchmark dependency comparison in isolation
fn benchmark_dependency_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("dependencies");
    group.throughput(Throughput::Elements(1));

    let previous = deps!["users", 42, true];
    let same = deps!["users", 42, true];
    let longer = deps!["users", 42, true, "extra"];

    group.bench_function("strict_equal", |b| {
        b.iter(|| black_box(previous.matches(black_box(&same), DependencyComparison::Strict)));
    });

    group.bench_function("shared_prefix_longer", |b| {
        b.iter(|| {
            black_box(previous.matches(black_box(&longer), DependencyComparison::SharedPrefix))
        });
    });

    group.finish();
}

/// Benchmark reducer execution (no runtime overhead)
fn benchmark_reducer_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("reducer");
    group.throughput(Throughput::Elements(1));

    let reducer = RequestReducer::new();
    let env = RequestEnvironment::new(Arc::new(ReadyClient));

    group.bench_function("observe_unchanged", |b| {
        let mut state = ControllerState::default();
        let _ = reducer.reduce(
            &mut state,
            RequestAction::Observe {
                config: RequestConfig::get("/api/users"),
                dependencies: deps![1],
            },
            &env,
        );

        b.iter(|| {
            let _effects = reducer.reduce(
                &mut state,
                black_box(RequestAction::Observe {
                    config: RequestConfig::get("/api/users"),
                    dependencies: deps![1],
                }),
                &env,
            );
        });
    });

    group.bench_function("observe_changed", |b| {
        let mut state = ControllerState::default();
        let mut page = 0_i64;

        b.iter(|| {
            page += 1;
            let _effects = reducer.reduce(
                &mut state,
                black_box(RequestAction::Observe {
                    config: RequestConfig::get("/api/users"),
                    dependencies: deps![page],
                }),
                &env,
            );
        });
    });

    group.finish();
}

/// Benchmark a full request cycle through the controller
fn benchmark_controller_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("controller");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let controller = runtime
        .block_on(async { RequestController::create(ReadyClient) })
        .expect("Failed to create controller");
    let _ = controller.observe(RequestConfig::get("/api/users"), deps![0]);

    group.bench_function("rerun_and_settle", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut handle = controller.rerun().expect("controller is live");
            handle.wait().await;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_dependency_comparison,
    benchmark_reducer_execution,
    benchmark_controller_round_trip
);
criterion_main!(benches);
