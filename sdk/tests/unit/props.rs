//! Property tests for replay invariants
//!
//! These tests use proptest to check that futures resolve once, that signal
//! ordering inside a window is stable, and that replaying the same history
//! always produces the same decisions regardless of completion order.

use super::run;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;
use weft_sdk::testing::HistoryBuilder;
use weft_sdk::{
    ActivityOptions, Command, EventTarget, EventType, Failure, FutureState, TargetType,
    WorkflowFuture, WorkflowRegistry,
};

#[derive(Debug, Clone)]
enum Resolution {
    Set(i64),
    Fail(String),
}

fn arb_resolution() -> impl Strategy<Value = Resolution> {
    prop_oneof![
        any::<i64>().prop_map(Resolution::Set),
        "[a-z]{1,12}".prop_map(Resolution::Fail),
    ]
}

fn resolve(future: &WorkflowFuture, resolution: &Resolution) -> bool {
    match resolution {
        Resolution::Set(value) => future.set(json!(value)).is_ok(),
        Resolution::Fail(message) => future
            .fail(Failure::Other {
                message: message.clone(),
            })
            .is_ok(),
    }
}

fn fan_out_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("FanOut", |ctx, input| async move {
            let count = input.as_i64().unwrap_or(0);
            let futures = (0..count)
                .map(|i| ctx.schedule_activity("Square", json!(i), ActivityOptions::default()))
                .collect::<Result<Vec<_>, _>>()?;

            let all = ctx.wait_for_all(&futures.iter().collect::<Vec<_>>());
            all.await;

            let total: i64 = futures
                .iter()
                .filter_map(|f| f.outcome().and_then(|o| o.value().and_then(Value::as_i64)))
                .sum();
            Ok(json!(total))
        })
        .unwrap();
    registry
}

proptest! {
    /// Property: only the first resolution of a future takes effect
    #[test]
    fn future_resolves_exactly_once(resolutions in prop::collection::vec(arb_resolution(), 1..8)) {
        let future = WorkflowFuture::new(EventTarget::new(5, TargetType::Activity));

        let accepted: Vec<bool> = resolutions.iter().map(|r| resolve(&future, r)).collect();
        prop_assert!(accepted[0]);
        prop_assert!(accepted[1..].iter().all(|ok| !ok));

        match &resolutions[0] {
            Resolution::Set(value) => {
                prop_assert_eq!(future.state(), FutureState::Fulfilled);
                let outcome = future.outcome().unwrap();
                prop_assert_eq!(outcome.value(), Some(&json!(value)));
            }
            Resolution::Fail(message) => {
                prop_assert_eq!(future.state(), FutureState::Failed);
                let outcome = future.outcome().unwrap();
                prop_assert_eq!(outcome.failure().map(ToString::to_string), Some(message.clone()));
            }
        }
    }

    /// Property: with signals first, signals move ahead and both groups keep history order
    #[test]
    fn signals_first_keeps_relative_order(kinds in prop::collection::vec(any::<bool>(), 1..12)) {
        let mut builder = HistoryBuilder::started("Ordering", Value::Null);
        for (idx, is_signal) in kinds.iter().enumerate() {
            builder = if *is_signal {
                builder.signaled(&format!("s{idx}"), Value::Null)
            } else {
                builder.event(EventType::TimerFired, json!({"startedEventId": 100 + idx}))
            };
        }
        let windows = builder.workflow_task_started().build().collect_windows().unwrap();
        prop_assert_eq!(windows.len(), 1);

        let ordered: Vec<(EventType, i64)> = windows[0]
            .ordered_events(true)
            .iter()
            .map(|e| (e.event_type(), e.id()))
            .collect();
        prop_assert_eq!(ordered[0].0, EventType::WorkflowExecutionStarted);

        let signal_count = kinds.iter().filter(|s| **s).count();
        let (signals, others) = ordered[1..].split_at(signal_count);
        prop_assert!(signals.iter().all(|(t, _)| *t == EventType::WorkflowExecutionSignaled));
        prop_assert!(others.iter().all(|(t, _)| *t == EventType::TimerFired));
        prop_assert!(signals.windows(2).all(|pair| pair[0].1 < pair[1].1));
        prop_assert!(others.windows(2).all(|pair| pair[0].1 < pair[1].1));

        // Without signals first, history order is untouched
        let unordered: Vec<i64> = windows[0].ordered_events(false).iter().map(|e| e.id()).collect();
        prop_assert!(unordered.windows(2).all(|pair| pair[0] < pair[1]));
    }

    /// Property: completion order does not change the decisions
    #[test]
    fn fan_out_result_is_independent_of_completion_order(
        order in (1i64..6).prop_flat_map(|n| Just((0..n).collect::<Vec<i64>>()).prop_shuffle())
    ) {
        let count = order.len() as i64;
        let mut builder = HistoryBuilder::started("FanOut", json!(count)).workflow_task();
        for i in 0..count {
            builder = builder.activity_scheduled(&(5 + i).to_string(), "Square");
        }
        builder = builder.advance(Duration::from_secs(1));
        for i in &order {
            builder = builder.activity_completed(5 + i, json!(i * i));
        }
        let history = builder.workflow_task_started().build();

        let result = run(&fan_out_registry(), "FanOut", history);
        let expected: i64 = (0..count).map(|i| i * i).sum();
        prop_assert_eq!(result.commands, vec![Command::CompleteWorkflow { result: json!(expected) }]);
    }
}
