//! Workflow task processing, from task to wire response

use super::{first_task, init_tracing};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use weft_sdk::testing::HistoryBuilder;
use weft_sdk::{
    ActivityOptions, History, QueryResult, SdkFlag, WorkerConfig, WorkflowQuery, WorkflowRegistry,
    WorkflowTask, WorkflowTaskProcessor, WorkflowTaskResult,
};

fn processor() -> WorkflowTaskProcessor {
    init_tracing();
    let registry = WorkflowRegistry::new();
    registry
        .register_fn("Greeter", |ctx, input| async move {
            ctx.on_query("status", |_| Ok(json!("greeting")));
            ctx.execute_activity("Greet", input, ActivityOptions::default())
                .await
        })
        .unwrap();

    let config = WorkerConfig::default()
        .with_namespace("billing")
        .with_task_queue("payments");
    WorkflowTaskProcessor::new(Arc::new(registry), config)
}

fn task(workflow_type: &str, history: History) -> WorkflowTask {
    WorkflowTask {
        workflow_type: workflow_type.to_string(),
        workflow_id: "wf-1".to_string(),
        run_id: "run-1".to_string(),
        history,
        queries: BTreeMap::new(),
    }
}

#[test]
fn test_task_completes_with_wire_commands() {
    let result = processor().process(task("Greeter", first_task("Greeter").build()));

    match result {
        WorkflowTaskResult::Completed {
            commands,
            query_results,
            sdk_flags,
        } => {
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0]["commandType"], "COMMAND_TYPE_SCHEDULE_ACTIVITY_TASK");

            let attributes = &commands[0]["scheduleActivityTaskCommandAttributes"];
            assert_eq!(attributes["activityId"], "5");
            assert_eq!(attributes["activityType"]["name"], "Greet");
            assert_eq!(attributes["namespace"], "billing");
            assert_eq!(attributes["taskQueue"]["name"], "payments");

            assert!(query_results.is_empty());
            assert!(sdk_flags.is_empty());
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_queries_are_answered_after_replay() {
    let mut task = task("Greeter", first_task("Greeter").build());
    task.queries.insert(
        "q1".into(),
        WorkflowQuery {
            query_type: "status".into(),
            args: Value::Null,
        },
    );
    task.queries.insert(
        "q2".into(),
        WorkflowQuery {
            query_type: "__stack_trace".into(),
            args: Value::Null,
        },
    );

    let WorkflowTaskResult::Completed { query_results, .. } = processor().process(task) else {
        panic!("task failed");
    };

    assert_eq!(query_results["q1"], QueryResult::Answer(json!("greeting")));
    match &query_results["q2"] {
        QueryResult::Answer(Value::String(trace)) => {
            assert!(trace.starts_with("Coroutine count: 1"));
            assert!(trace.contains("waiting on activity (5)"));
        }
        other => panic!("unexpected stack trace answer: {other:?}"),
    }
}

#[test]
fn test_flags_turned_on_are_reported() {
    let history = HistoryBuilder::started("Greeter", json!("Ada"))
        .signaled("ignored", Value::Null)
        .workflow_task_started()
        .build();

    let WorkflowTaskResult::Completed { sdk_flags, .. } = processor().process(task("Greeter", history))
    else {
        panic!("task failed");
    };

    let reported: BTreeSet<u32> = sdk_flags.into_iter().collect();
    assert_eq!(
        reported,
        BTreeSet::from([
            SdkFlag::HandleSignalsFirst.code(),
            SdkFlag::SaveFirstTaskSignals.code()
        ])
    );
}

#[test]
fn test_unregistered_workflow_type_fails_the_task() {
    let result = processor().process(task("Nope", first_task("Nope").build()));
    assert_eq!(
        result,
        WorkflowTaskResult::Failed {
            message: "Workflow 'Nope' is not registered".into(),
            stack_trace: None,
        }
    );
}

#[test]
fn test_divergence_fails_the_task_with_a_stack_trace() {
    let history = HistoryBuilder::started("Greeter", json!("Ada"))
        .workflow_task()
        .workflow_completed(json!("done"))
        .build();

    match processor().process(task("Greeter", history)) {
        WorkflowTaskResult::Failed {
            message,
            stack_trace,
        } => {
            assert!(message.starts_with(
                "Unexpected command. The replaying code is issuing: activity (5), but the history of previous executions recorded: complete_workflow (5)."
            ));
            assert!(stack_trace.unwrap().contains("waiting on activity (5)"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_result_serializes_with_status_tag() {
    let result = processor().process(task("Nope", first_task("Nope").build()));
    let wire = serde_json::to_value(&result).unwrap();
    assert_eq!(wire["status"], "failed");
    assert_eq!(wire["message"], "Workflow 'Nope' is not registered");
}

#[tokio::test]
async fn test_tasks_are_processed_concurrently() {
    let processor = Arc::new(processor());

    let handles: Vec<_> = (0..4)
        .map(|idx| {
            let processor = Arc::clone(&processor);
            tokio::task::spawn_blocking(move || {
                let mut task = task("Greeter", first_task("Greeter").build());
                task.workflow_id = format!("wf-{idx}");
                processor.process(task)
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_completed());
    }
}
