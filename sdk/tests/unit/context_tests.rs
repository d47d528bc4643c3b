//! Workflow context operations against built histories

use super::{executor, first_task, run};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weft_core::workflow::payload::encode_payloads;
use weft_core::FailureInfo;
use weft_sdk::testing::HistoryBuilder;
use weft_sdk::{
    run_saga, ActivityOptions, ChildWorkflowOptions, Command, ContinueAsNewOptions, CoreError,
    EventType, ExecutorConfig, InternalError, SdkFlag, WorkflowRegistry,
};

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

// === Signals ===

#[test]
fn test_signals_of_the_first_task_reach_their_handler() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Accumulate", |ctx, _input| async move {
            let total = Arc::new(AtomicI64::new(0));
            let sink = Arc::clone(&total);
            ctx.on_signal("add", move |value| {
                sink.fetch_add(value.as_i64().unwrap_or(0), Ordering::SeqCst);
            });

            let watched = Arc::clone(&total);
            ctx.wait_until(move || watched.load(Ordering::SeqCst) >= 12).await;
            Ok(json!(total.load(Ordering::SeqCst)))
        })
        .unwrap();

    let history = HistoryBuilder::started("Accumulate", Value::Null)
        .signaled("add", json!(5))
        .signaled("add", json!(7))
        .workflow_task_started()
        .build();

    let result = run(&registry, "Accumulate", history);
    assert_eq!(result.commands, vec![Command::CompleteWorkflow { result: json!(12) }]);
    assert_eq!(
        result.new_sdk_flags_used,
        BTreeSet::from([SdkFlag::HandleSignalsFirst, SdkFlag::SaveFirstTaskSignals])
    );
}

fn race_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Race", |ctx, _input| async move {
            let seen = Arc::new(AtomicBool::new(false));
            let flag = Arc::clone(&seen);
            ctx.on_signal("poke", move |_| flag.store(true, Ordering::SeqCst));

            ctx.sleep(Duration::from_secs(1)).await?;
            Ok(json!(seen.load(Ordering::SeqCst)))
        })
        .unwrap();
    registry
}

/// The timer fires and a signal arrives within the same workflow task
fn race_history() -> weft_sdk::History {
    HistoryBuilder::started("Race", Value::Null)
        .workflow_task()
        .timer_started("5", Duration::from_secs(1))
        .advance(Duration::from_secs(1))
        .timer_fired(5)
        .signaled("poke", Value::Null)
        .workflow_task_started()
        .build()
}

#[test]
fn test_signals_are_delivered_before_the_timer_resumes_the_workflow() {
    let registry = race_registry();
    let result = run(&registry, "Race", race_history());

    assert_eq!(result.commands, vec![Command::CompleteWorkflow { result: json!(true) }]);
    assert!(result.new_sdk_flags_used.contains(&SdkFlag::HandleSignalsFirst));
}

#[test]
fn test_legacy_ordering_resumes_the_workflow_first() {
    let registry = race_registry();
    let result = executor(&registry, "Race", race_history(), ExecutorConfig::LEGACY)
        .run()
        .unwrap();

    assert_eq!(result.commands, vec![Command::CompleteWorkflow { result: json!(false) }]);
    assert!(result.new_sdk_flags_used.is_empty());
}

fn late_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Late", |ctx, _input| async move {
            ctx.sleep(Duration::from_secs(1)).await?;

            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&received);
            ctx.on_signal("hello", move |value| sink.lock().push(value));

            let received = received.lock().clone();
            Ok(Value::Array(received))
        })
        .unwrap();
    registry
}

/// A signal arrives before the workflow registers its handler
fn late_history(flags: &[SdkFlag]) -> weft_sdk::History {
    HistoryBuilder::started("Late", Value::Null)
        .signaled("hello", json!("world"))
        .workflow_task_with_flags(flags)
        .timer_started("6", Duration::from_secs(1))
        .advance(Duration::from_secs(1))
        .timer_fired(6)
        .workflow_task_started()
        .build()
}

#[test]
fn test_early_signal_is_buffered_until_its_handler_exists() {
    let history = late_history(&[SdkFlag::HandleSignalsFirst, SdkFlag::SaveFirstTaskSignals]);
    let result = run(&late_registry(), "Late", history);

    assert_eq!(
        result.commands,
        vec![Command::CompleteWorkflow {
            result: json!(["world"])
        }]
    );
}

#[test]
fn test_early_signal_is_dropped_when_history_did_not_buffer_it() {
    let result = run(&late_registry(), "Late", late_history(&[]));

    assert_eq!(result.commands, vec![Command::CompleteWorkflow { result: json!([]) }]);
}

#[test]
fn test_any_signal_handler_gets_unmatched_signals() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Router", |ctx, _input| async move {
            let named = Arc::new(Mutex::new(Vec::new()));
            let unmatched = Arc::new(Mutex::new(Vec::new()));

            let sink = Arc::clone(&named);
            ctx.on_signal("a", move |value| sink.lock().push(value));
            let sink = Arc::clone(&unmatched);
            ctx.on_any_signal(move |name, _| sink.lock().push(name.to_string()));

            let (n, u) = (Arc::clone(&named), Arc::clone(&unmatched));
            ctx.wait_until(move || n.lock().len() + u.lock().len() >= 3).await;

            let named = named.lock().clone();
            let unmatched = unmatched.lock().clone();
            Ok(json!({ "named": named, "any": unmatched }))
        })
        .unwrap();

    let history = HistoryBuilder::started("Router", Value::Null)
        .signaled("a", json!(1))
        .signaled("b", json!(2))
        .signaled("c", json!(3))
        .workflow_task_started()
        .build();

    let result = run(&registry, "Router", history);
    assert_eq!(
        result.commands,
        vec![Command::CompleteWorkflow {
            result: json!({"named": [1], "any": ["b", "c"]})
        }]
    );
}

// === Markers ===

fn dice_registry(calls: Arc<AtomicUsize>) -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Dice", move |ctx, _input| {
            let calls = Arc::clone(&calls);
            async move {
                let roll: i64 = ctx.side_effect(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    42
                })?;
                Ok(json!(roll))
            }
        })
        .unwrap();
    registry
}

#[test]
fn test_side_effect_is_recorded_on_a_live_run() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = dice_registry(Arc::clone(&calls));

    let result = run(&registry, "Dice", first_task("Dice").build());
    assert_eq!(
        result.commands,
        vec![
            Command::RecordMarker {
                name: "SIDE_EFFECT".into(),
                details: json!({"data": 42}),
            },
            Command::CompleteWorkflow { result: json!(42) },
        ]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_side_effect_replays_the_recorded_value() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = dice_registry(Arc::clone(&calls));

    // The completion lands on id 6: the marker's id is never reused
    let history = HistoryBuilder::started("Dice", Value::Null)
        .workflow_task()
        .marker("SIDE_EFFECT", object(json!({"data": 7})))
        .workflow_completed(json!(7))
        .build();

    let result = run(&registry, "Dice", history);
    assert!(result.commands.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

fn release_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Release", |ctx, _input| async move { Ok(json!(ctx.has_release("v2"))) })
        .unwrap();
    registry
}

#[test]
fn test_release_is_turned_on_and_recorded_live() {
    let result = run(&release_registry(), "Release", first_task("Release").build());
    assert_eq!(
        result.commands,
        vec![
            Command::RecordMarker {
                name: "RELEASE".into(),
                details: json!({"data": "v2"}),
            },
            Command::CompleteWorkflow { result: json!(true) },
        ]
    );
}

#[test]
fn test_release_stays_off_for_runs_that_never_recorded_it() {
    let history = HistoryBuilder::started("Release", Value::Null)
        .workflow_task()
        .workflow_completed(json!(false))
        .build();

    let result = run(&release_registry(), "Release", history);
    assert!(result.commands.is_empty());
}

#[test]
fn test_recorded_release_replays_as_on() {
    let history = HistoryBuilder::started("Release", Value::Null)
        .workflow_task()
        .marker("RELEASE", object(json!({"data": "v2"})))
        .workflow_completed(json!(true))
        .build();

    let result = run(&release_registry(), "Release", history);
    assert!(result.commands.is_empty());
}

#[test]
fn test_unknown_marker_fails_the_task() {
    let history = HistoryBuilder::started("Release", Value::Null)
        .workflow_task()
        .marker("VERSION", object(json!({"data": 1})))
        .workflow_completed(json!(false))
        .build();

    let err = executor(&release_registry(), "Release", history, ExecutorConfig::DEFAULT)
        .run()
        .unwrap_err();
    assert_eq!(err.to_string(), "Unsupported marker type VERSION");
}

// === Search attributes ===

fn tagging_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Tagging", |ctx, _input| async move {
            ctx.upsert_search_attributes(object(json!({"CustomKeywordField": "pending"})))?;
            Ok(Value::Object(ctx.search_attributes()))
        })
        .unwrap();
    registry
}

#[test]
fn test_upserted_search_attributes_are_visible_right_away() {
    let result = run(&tagging_registry(), "Tagging", first_task("Tagging").build());
    assert_eq!(
        result.commands,
        vec![
            Command::UpsertSearchAttributes {
                search_attributes: object(json!({"CustomKeywordField": "pending"})),
            },
            Command::CompleteWorkflow {
                result: json!({"CustomKeywordField": "pending"})
            },
        ]
    );
}

#[test]
fn test_upserted_search_attributes_replay() {
    let history = HistoryBuilder::started("Tagging", Value::Null)
        .workflow_task()
        .search_attributes_upserted(object(json!({"CustomKeywordField": "pending"})))
        .workflow_completed(json!({"CustomKeywordField": "pending"}))
        .build();

    assert!(run(&tagging_registry(), "Tagging", history).commands.is_empty());
}

#[test]
fn test_empty_search_attributes_are_rejected() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Tagging", |ctx, _input| async move {
            let err = ctx.upsert_search_attributes(Map::new()).unwrap_err();
            Ok(json!(err.to_string()))
        })
        .unwrap();

    let result = run(&registry, "Tagging", first_task("Tagging").build());
    assert_eq!(
        result.commands,
        vec![Command::CompleteWorkflow {
            result: json!("Cannot upsert an empty map for search_attributes, as this would do nothing.")
        }]
    );
}

// === Timers and waiting ===

#[test]
fn test_wait_for_any_then_cancel_the_slow_timer() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("FirstOf", |ctx, _input| async move {
            let slow = ctx.start_timer(Duration::from_secs(60));
            let fast = ctx.start_timer(Duration::from_secs(1));

            let any = ctx.wait_for_any(&[&slow, &fast]);
            let first = any.await;

            ctx.cancel_timer(&slow)?;
            Ok(json!({ "first": first, "slow_canceled": slow.is_failed() }))
        })
        .unwrap();

    let history = HistoryBuilder::started("FirstOf", Value::Null)
        .workflow_task()
        .timer_started("5", Duration::from_secs(60))
        .timer_started("6", Duration::from_secs(1))
        .advance(Duration::from_secs(1))
        .timer_fired(6)
        .workflow_task_started()
        .build();

    let result = run(&registry, "FirstOf", history);
    assert_eq!(
        result.commands,
        vec![
            Command::CancelTimer {
                timer_id: "5".into()
            },
            Command::CompleteWorkflow {
                result: json!({"first": 1, "slow_canceled": true})
            },
        ]
    );
}

#[test]
fn test_workflow_time_follows_the_task_start() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Clock", |ctx, _input| async move {
            let before = ctx.now();
            ctx.sleep(Duration::from_secs(30)).await?;
            let after = ctx.now();
            Ok(json!((after - before).num_seconds()))
        })
        .unwrap();

    let history = HistoryBuilder::started("Clock", Value::Null)
        .workflow_task()
        .timer_started("5", Duration::from_secs(30))
        .advance(Duration::from_secs(30))
        .timer_fired(5)
        .workflow_task_started()
        .build();

    let result = run(&registry, "Clock", history);
    assert_eq!(result.commands, vec![Command::CompleteWorkflow { result: json!(30) }]);
}

// === Activities ===

#[test]
fn test_activity_failure_fails_the_workflow() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Charge", |ctx, input| async move {
            ctx.execute_activity("ChargeCard", input, ActivityOptions::default())
                .await
        })
        .unwrap();

    let history = HistoryBuilder::started("Charge", json!(10))
        .workflow_task()
        .activity_scheduled("5", "ChargeCard")
        .activity_failed(5, FailureInfo::application("CardDeclined", "insufficient funds"))
        .workflow_task_started()
        .build();

    let result = run(&registry, "Charge", history);
    match &result.commands[..] {
        [Command::FailWorkflow { failure }] => {
            assert_eq!(failure.message, "insufficient funds");
            assert_eq!(
                failure.application_failure_info.as_ref().unwrap().error_type,
                "CardDeclined"
            );
        }
        other => panic!("unexpected commands: {other:?}"),
    }
}

#[test]
fn test_activity_type_change_is_non_deterministic() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Charge", |ctx, input| async move {
            let _timer = ctx.start_timer(Duration::from_secs(1));
            ctx.execute_activity("ChargeCard", input, ActivityOptions::default())
                .await
        })
        .unwrap();

    let history = HistoryBuilder::started("Charge", json!(10))
        .workflow_task()
        .activity_scheduled("5", "ChargeCard")
        .build();

    let err = executor(&registry, "Charge", history, ExecutorConfig::DEFAULT)
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Internal(InternalError::NonDeterministicWorkflow(_))
    ));
    assert!(err
        .to_string()
        .starts_with("Unexpected command. The replaying code is issuing: timer (5), but the history of previous executions recorded: activity (5)."));
}

// === Sagas ===

fn booking_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Booking", |ctx, _input| async move {
            let forward = ctx.clone();
            let outcome = run_saga(&ctx, |saga| async move {
                forward
                    .execute_activity("BookHotel", json!("hotel"), ActivityOptions::default())
                    .await?;
                saga.add_compensation("CancelHotel", json!("hotel"));

                forward
                    .execute_activity("BookFlight", json!("flight"), ActivityOptions::default())
                    .await?;
                saga.add_compensation("CancelFlight", json!("flight"));
                Ok(())
            })
            .await?;

            Ok(json!({
                "compensated": outcome.is_compensated(),
                "reason": outcome.rollback_reason.map(|e| e.to_string()),
            }))
        })
        .unwrap();
    registry
}

/// Hotel booked, flight failed
fn booking_history() -> HistoryBuilder {
    HistoryBuilder::started("Booking", Value::Null)
        .workflow_task()
        .activity_scheduled("5", "BookHotel")
        .activity_completed(5, json!("h-1"))
        .workflow_task()
        .activity_scheduled("10", "BookFlight")
        .activity_failed(10, FailureInfo::application("NoSeats", "flight full"))
}

#[test]
fn test_saga_compensates_completed_steps() {
    let history = booking_history().workflow_task_started().build();
    let result = run(&booking_registry(), "Booking", history);

    match &result.commands[..] {
        [Command::ScheduleActivity(activity)] => {
            assert_eq!(activity.activity_type, "CancelHotel");
            assert_eq!(activity.activity_id, "15");
            assert_eq!(activity.input, json!("hotel"));
        }
        other => panic!("unexpected commands: {other:?}"),
    }
}

#[test]
fn test_saga_reports_the_rollback_reason() {
    let history = booking_history()
        .workflow_task()
        .activity_scheduled("15", "CancelHotel")
        .activity_completed(15, Value::Null)
        .workflow_task_started()
        .build();
    let result = run(&booking_registry(), "Booking", history);

    assert_eq!(
        result.commands,
        vec![Command::CompleteWorkflow {
            result: json!({
                "compensated": true,
                "reason": "Unregistered error type 'NoSeats': flight full",
            })
        }]
    );
}

// === Child workflows ===

fn parent_registry() -> WorkflowRegistry {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Parent", |ctx, _input| async move {
            let child = ctx.start_child_workflow(
                "Child",
                json!("in"),
                ChildWorkflowOptions::new().with_workflow_id("child-1"),
            )?;
            let result = child.get().await.into_result()?;
            let execution = child
                .execution()
                .outcome()
                .and_then(|outcome| outcome.value().cloned())
                .unwrap_or(Value::Null);
            Ok(json!({ "result": result, "execution": execution }))
        })
        .unwrap();
    registry
}

#[test]
fn test_child_workflow_is_started() {
    let result = run(&parent_registry(), "Parent", first_task("Parent").build());
    match &result.commands[..] {
        [Command::StartChildWorkflow(child)] => {
            assert_eq!(child.workflow_id, "child-1");
            assert_eq!(child.workflow_type, "Child");
            assert_eq!(child.input, json!("in"));
        }
        other => panic!("unexpected commands: {other:?}"),
    }
}

#[test]
fn test_child_workflow_result_and_execution() {
    let history = HistoryBuilder::started("Parent", Value::Null)
        .workflow_task()
        .event(
            EventType::StartChildWorkflowExecutionInitiated,
            json!({"workflowId": "child-1", "workflowType": {"name": "Child"}}),
        )
        .event(
            EventType::ChildWorkflowExecutionStarted,
            json!({
                "initiatedEventId": 5,
                "workflowExecution": {"workflowId": "child-1", "runId": "child-run"},
            }),
        )
        .event(
            EventType::ChildWorkflowExecutionCompleted,
            json!({"initiatedEventId": 5, "result": encode_payloads(&[json!("child done")])}),
        )
        .workflow_task_started()
        .build();

    let result = run(&parent_registry(), "Parent", history);
    assert_eq!(
        result.commands,
        vec![Command::CompleteWorkflow {
            result: json!({
                "result": "child done",
                "execution": {"workflowId": "child-1", "runId": "child-run"},
            })
        }]
    );
}

// === Completion ===

#[test]
fn test_continue_as_new_replaces_completion() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Looper", |ctx, input| async move {
            let next = input.as_i64().unwrap_or(0) + 1;
            ctx.continue_as_new(json!(next), ContinueAsNewOptions::default())?;
            Ok(Value::Null)
        })
        .unwrap();

    let history = HistoryBuilder::started("Looper", json!(1))
        .workflow_task_started()
        .build();
    let result = run(&registry, "Looper", history);

    match &result.commands[..] {
        [Command::ContinueAsNew(next)] => {
            assert_eq!(next.workflow_type, "Looper");
            assert_eq!(next.input, json!(2));
        }
        other => panic!("unexpected commands: {other:?}"),
    }
}

#[test]
fn test_command_after_completion_fails_the_task() {
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Eager", |ctx, _input| async move {
            ctx.complete(json!("early"));
            let _timer = ctx.start_timer(Duration::from_secs(1));
            Ok(Value::Null)
        })
        .unwrap();

    let err = executor(&registry, "Eager", first_task("Eager").build(), ExecutorConfig::DEFAULT)
        .run()
        .unwrap_err();
    assert!(err.to_string().starts_with(
        "You cannot do anything in a Workflow after it completes. The workflow completed, but then it sent a new command: StartTimer."
    ));
}
