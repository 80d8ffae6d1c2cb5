//! Property tests for the request controller
//!
//! Feeds generated sequences of evaluation cycles through a live controller
//! and checks request issuance, cancellation and the rerun flag.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use proptest::prelude::*;
use request_state_core::{DependencyComparison, DependencyList, RequestConfig, RequestState};
use request_state_runtime::{ControllerConfig, RequestController};
use request_state_testing::MockHttpClient;
use request_state_testing::properties::dependency_list;

#[derive(Debug, Clone)]
enum Step {
    Observe(DependencyList),
    Rerun,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => dependency_list(3).prop_map(Step::Observe),
        1 => Just(Step::Rerun),
    ]
}

fn comparison() -> impl Strategy<Value = DependencyComparison> {
    prop_oneof![
        Just(DependencyComparison::Strict),
        Just(DependencyComparison::SharedPrefix),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #[test]
    fn prop_one_live_request_per_controller(
        steps in proptest::collection::vec(step(), 1..12),
        mode in comparison(),
    ) {
        let runtime = runtime();
        let _guard = runtime.enter();

        let client = MockHttpClient::<u8>::new();
        let controller = RequestController::with_config(
            client.clone(),
            ControllerConfig::default().with_comparison(mode),
        )
        .unwrap();

        let mut snapshot: Option<DependencyList> = None;
        let mut issued = 0_usize;
        let mut last_was_rerun = false;

        for step in steps {
            match step {
                Step::Observe(list) => {
                    let changed = snapshot.as_ref().is_none_or(|p| !p.matches(&list, mode));
                    controller.observe(RequestConfig::get("/api"), list.clone()).unwrap();
                    if changed {
                        snapshot = Some(list);
                        issued += 1;
                        last_was_rerun = false;
                    }
                },
                Step::Rerun => {
                    controller.rerun().unwrap();
                    if snapshot.is_some() {
                        issued += 1;
                        last_was_rerun = true;
                    }
                },
            }
        }

        prop_assert_eq!(client.request_count(), issued);
        // Every request but the live one was cancelled when it was superseded.
        prop_assert_eq!(client.cancel_count(), issued.saturating_sub(1));
        prop_assert_eq!(controller.inspect(|s| s.rerun_pending()), last_was_rerun);
        let expected = if issued == 0 { RequestState::Idle } else { RequestState::Loading };
        prop_assert_eq!(controller.state(), expected);

        controller.dispose();
        prop_assert_eq!(client.cancel_count(), issued);
        prop_assert!(!controller.inspect(|s| s.rerun_pending()));
    }
}
