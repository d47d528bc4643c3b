//! Workflows whose recorded histories live in `histories/`

use std::time::Duration;
use weft_sdk::prelude::*;

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ReplayInput {
    pub run_activity: bool,
    pub run_sleep: bool,
    pub result: Option<String>,
}

/// Does nothing unless its input asks it to
pub struct TestReplayWorkflow;

#[async_trait]
impl WorkflowDefinition for TestReplayWorkflow {
    type Input = ReplayInput;
    type Output = Value;

    fn kind(&self) -> &str {
        "TestReplayWorkflow"
    }

    async fn execute(&self, ctx: &WorkflowContext, input: ReplayInput) -> Result<Value> {
        if input.run_activity {
            ctx.execute_activity("TestReplayActivity", Value::Null, ActivityOptions::default())
                .await?;
        }

        if input.run_sleep {
            ctx.sleep(Duration::from_secs(1)).await?;
        }

        match input.result.as_deref().unwrap_or("success") {
            "success" => Ok(json!("done")),
            "continue_as_new" => {
                ctx.continue_as_new(Value::Null, ContinueAsNewOptions::default())?;
                Ok(Value::Null)
            }
            "await" => {
                ctx.wait_until(|| false).await;
                Ok(Value::Null)
            }
            "fail" => Err(WorkflowError::application("RuntimeError", "failed")),
            other => Err(WorkflowError::Other(format!("unknown result '{}'", other))),
        }
    }
}

/// Greets through an activity, then waits a second
pub struct GreetAndWait;

#[async_trait]
impl WorkflowDefinition for GreetAndWait {
    type Input = String;
    type Output = String;

    fn kind(&self) -> &str {
        "GreetAndWait"
    }

    async fn execute(&self, ctx: &WorkflowContext, name: String) -> Result<String> {
        let greeting = ctx
            .execute_activity("Greet", json!(name), ActivityOptions::default())
            .await?;
        ctx.sleep(Duration::from_secs(1)).await?;
        Ok(serde_json::from_value(greeting)?)
    }
}
