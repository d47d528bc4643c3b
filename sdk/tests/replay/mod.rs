//! Replay tests against recorded histories
//!
//! Fixtures under `histories/` are server exports. Variants of them are
//! derived in the tests by rewriting the recorded workflow input, so that a
//! single recorded run can be replayed against diverging code paths.

mod workflows;

use prost::Message;
use serde_json::{json, Value};
use std::sync::Arc;
use weft_core::serialization::proto::{
    history_event::Attributes, HistoryEventProto, HistoryProto, NamedType, Payload, Payloads,
    ResultAttributes, WorkflowExecutionStartedAttributes, WorkflowTaskCompletedAttributes,
    WorkflowTaskStartedAttributes,
};
use weft_core::workflow::payload::encode_payloads;
use weft_core::EventType;
use weft_sdk::testing::{correct_event_types, HistoryBuilder, ReplayError, ReplayTester};
use weft_sdk::WorkflowRegistry;
use workflows::{GreetAndWait, TestReplayWorkflow};

const DO_NOTHING: &str = include_str!("histories/do_nothing.json");
const ACTIVITY_AND_TIMER: &str = include_str!("histories/activity_and_timer.json");

static TRACING_INITIALIZED: std::sync::Once = std::sync::Once::new();

fn init_tracing() {
    TRACING_INITIALIZED.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

        fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .init();
    });
}

fn replay_tester() -> ReplayTester {
    init_tracing();
    let registry = WorkflowRegistry::new();
    registry.register(TestReplayWorkflow).unwrap();
    registry.register(GreetAndWait).unwrap();
    ReplayTester::new(Arc::new(registry))
}

/// The do-nothing history with a different recorded workflow input
fn with_workflow_args(args: Value) -> String {
    let mut document: Value = serde_json::from_str(DO_NOTHING).unwrap();
    document["events"][0]["workflowExecutionStartedEventAttributes"]["input"] = encode_payloads(&[args]);
    document.to_string()
}

fn divergence(err: &ReplayError) -> String {
    err.non_determinism()
        .unwrap_or_else(|| panic!("expected a non-determinism error, got: {err}"))
        .to_string()
}

#[test]
fn test_replay_do_nothing_successful() {
    replay_tester().replay_history_json(DO_NOTHING).unwrap();
}

#[test]
fn test_replay_missing_start_workflow_execution_event() {
    let mut document: Value = serde_json::from_str(DO_NOTHING).unwrap();
    document["events"].as_array_mut().unwrap().remove(0);

    let err = replay_tester()
        .replay_history_json(&document.to_string())
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "History does not start with workflow_execution_started event"
    );
}

#[test]
fn test_replay_extra_activity() {
    let err = replay_tester()
        .replay_history_json(&with_workflow_args(json!({"run_activity": true})))
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with("Workflow code failed to replay successfully against history"));
    assert_eq!(
        divergence(&err),
        "Unexpected command. The replaying code is issuing: activity (5), but the history of previous \
         executions recorded: complete_workflow (5). Likely, either you have made a version-unsafe change \
         to your workflow or have non-deterministic behavior in your workflow."
    );

    // Points at the workflow code, not at the engine
    let trace = err.stack_trace().unwrap();
    assert!(trace.starts_with("Coroutine count: 1"));
    assert!(trace.contains("workflows.rs"));
    assert!(trace.contains("activity (5)"));
}

#[test]
fn test_replay_extra_timer() {
    let err = replay_tester()
        .replay_history_json(&with_workflow_args(json!({"run_sleep": true})))
        .unwrap_err();

    assert!(divergence(&err).starts_with(
        "Unexpected command. The replaying code is issuing: timer (5), but the history of previous \
         executions recorded: complete_workflow (5)."
    ));
}

#[test]
fn test_replay_continues_as_new_when_history_completed() {
    let err = replay_tester()
        .replay_history_json(&with_workflow_args(json!({"result": "continue_as_new"})))
        .unwrap_err();

    assert_eq!(
        divergence(&err),
        "Unexpected command. The replaying code is issuing: continue_as_new_workflow (5), but the history \
         of previous executions recorded: complete_workflow (5). Likely, either you have made a \
         version-unsafe change to your workflow or have non-deterministic behavior in your workflow."
    );
}

#[test]
fn test_replay_keeps_going_when_history_succeeded() {
    let err = replay_tester()
        .replay_history_json(&with_workflow_args(json!({"result": "await"})))
        .unwrap_err();

    assert_eq!(
        divergence(&err),
        "A command in the history of previous executions, complete_workflow (5), was not scheduled upon \
         replay. Likely, either you have made a version-unsafe change to your workflow or have \
         non-deterministic behavior in your workflow."
    );
    assert!(err.stack_trace().unwrap().contains("waiting on condition"));
}

#[test]
fn test_replay_fails_when_history_succeeded() {
    let err = replay_tester()
        .replay_history_json(&with_workflow_args(json!({"result": "fail"})))
        .unwrap_err();

    assert!(divergence(&err).starts_with(
        "Unexpected command. The replaying code is issuing: fail_workflow (5), but the history of \
         previous executions recorded: complete_workflow (5)."
    ));
}

#[test]
fn test_replay_activity_and_timer() {
    replay_tester().replay_history_json(ACTIVITY_AND_TIMER).unwrap();
}

#[test]
fn test_corrected_event_types_replay_the_same() {
    let corrected = correct_event_types(ACTIVITY_AND_TIMER).unwrap();
    let document: Value = serde_json::from_str(&corrected).unwrap();
    assert_eq!(
        document["events"][0]["eventType"],
        json!("EVENT_TYPE_WORKFLOW_EXECUTION_STARTED")
    );
    assert_eq!(
        document["events"][11]["eventType"],
        json!("EVENT_TYPE_TIMER_FIRED")
    );

    replay_tester().replay_history_json(&corrected).unwrap();
}

#[test]
fn test_replay_unfinished_history() {
    let history = HistoryBuilder::started("GreetAndWait", json!("Ada"))
        .workflow_task()
        .activity_scheduled("5", "Greet")
        .activity_completed(5, json!("Hello, Ada"))
        .workflow_task_started()
        .build();

    let err = replay_tester().replay_history(history).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Workflow task is issuing new commands when it should complete: [StartTimer]"
    );
}

#[test]
fn test_replay_built_history_as_json() {
    let mut builder = HistoryBuilder::started("GreetAndWait", json!("Grace")).workflow_task();
    let scheduled = builder.next_id();
    builder = builder
        .activity_scheduled(&scheduled.to_string(), "Greet")
        .activity_completed(scheduled, json!("Hello, Grace"))
        .workflow_task();
    let timer = builder.next_id();
    let builder = builder
        .timer_started(&timer.to_string(), std::time::Duration::from_secs(1))
        .advance(std::time::Duration::from_secs(1))
        .timer_fired(timer)
        .workflow_task()
        .workflow_completed(json!("Hello, Grace"));

    replay_tester().replay_history_json(&builder.to_json()).unwrap();
}

fn json_payloads(values: &[&str]) -> Option<Payloads> {
    Some(Payloads {
        payloads: values
            .iter()
            .map(|v| Payload {
                metadata: [("encoding".to_string(), b"json/plain".to_vec())].into(),
                data: v.as_bytes().to_vec(),
            })
            .collect(),
    })
}

fn proto_event(id: i64, event_type: EventType, attributes: Option<Attributes>) -> HistoryEventProto {
    HistoryEventProto {
        event_id: id,
        event_time: None,
        event_type: event_type.code(),
        attributes,
    }
}

fn do_nothing_protobuf(input: &str) -> Vec<u8> {
    HistoryProto {
        events: vec![
            proto_event(
                1,
                EventType::WorkflowExecutionStarted,
                Some(Attributes::WorkflowExecutionStarted(WorkflowExecutionStartedAttributes {
                    workflow_type: Some(NamedType {
                        name: "TestReplayWorkflow".into(),
                    }),
                    input: json_payloads(&[input]),
                    attempt: 1,
                    ..Default::default()
                })),
            ),
            proto_event(2, EventType::WorkflowTaskScheduled, None),
            proto_event(
                3,
                EventType::WorkflowTaskStarted,
                Some(Attributes::WorkflowTaskStarted(WorkflowTaskStartedAttributes {
                    scheduled_event_id: 2,
                    ..Default::default()
                })),
            ),
            proto_event(
                4,
                EventType::WorkflowTaskCompleted,
                Some(Attributes::WorkflowTaskCompleted(WorkflowTaskCompletedAttributes {
                    scheduled_event_id: 2,
                    started_event_id: 3,
                    ..Default::default()
                })),
            ),
            proto_event(
                5,
                EventType::WorkflowExecutionCompleted,
                Some(Attributes::WorkflowExecutionCompleted(ResultAttributes {
                    result: json_payloads(&["\"done\""]),
                })),
            ),
        ],
    }
    .encode_to_vec()
}

#[test]
fn test_replay_protobuf_successful() {
    replay_tester()
        .replay_history_protobuf(&do_nothing_protobuf("{}"))
        .unwrap();
}

#[test]
fn test_replay_protobuf_extra_activity() {
    let err = replay_tester()
        .replay_history_protobuf(&do_nothing_protobuf(r#"{"run_activity": true}"#))
        .unwrap_err();
    assert!(divergence(&err).contains("activity (5)"));
}

#[test]
fn test_replay_garbage_protobuf() {
    let err = replay_tester()
        .replay_history_protobuf(&[0xff, 0xff, 0xff])
        .unwrap_err();
    assert!(matches!(err, ReplayError::InvalidHistory(_)));
}
