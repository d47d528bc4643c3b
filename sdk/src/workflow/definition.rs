//! WorkflowDefinition trait

use crate::error::Result;
use crate::workflow::context::WorkflowContext;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Workflow with typed input and output.
///
/// Input and output types implement `JsonSchema` so that a worker can
/// describe the workflows it hosts.
#[async_trait]
pub trait WorkflowDefinition: Send + Sync {
    type Input: Serialize + DeserializeOwned + JsonSchema + Send;
    type Output: Serialize + DeserializeOwned + JsonSchema + Send;

    /// Workflow type name, as found in `WorkflowExecutionStarted`
    fn kind(&self) -> &str;

    /// Run the workflow.
    ///
    /// Must be deterministic: everything that may differ between runs goes
    /// through `ctx`.
    async fn execute(&self, ctx: &WorkflowContext, input: Self::Input) -> Result<Self::Output>;

    fn description(&self) -> Option<&str> {
        None
    }

    fn input_schema(&self) -> Option<Value> {
        Some(generate_schema::<Self::Input>())
    }

    fn output_schema(&self) -> Option<Value> {
        Some(generate_schema::<Self::Output>())
    }
}

/// JSON Schema of a type
pub fn generate_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or(Value::Null)
}

/// Untyped workflow working on raw JSON values.
///
/// Schemas are not derived; provide them by hand if needed.
#[async_trait]
pub trait DynamicWorkflow: Send + Sync {
    fn kind(&self) -> &str;

    async fn execute(&self, ctx: &WorkflowContext, input: Value) -> Result<Value>;

    fn description(&self) -> Option<&str> {
        None
    }

    fn input_schema(&self) -> Option<Value> {
        None
    }

    fn output_schema(&self) -> Option<Value> {
        None
    }
}

#[async_trait]
impl<T: DynamicWorkflow> WorkflowDefinition for T {
    type Input = Value;
    type Output = Value;

    fn kind(&self) -> &str {
        DynamicWorkflow::kind(self)
    }

    async fn execute(&self, ctx: &WorkflowContext, input: Value) -> Result<Value> {
        DynamicWorkflow::execute(self, ctx, input).await
    }

    fn description(&self) -> Option<&str> {
        DynamicWorkflow::description(self)
    }

    fn input_schema(&self) -> Option<Value> {
        DynamicWorkflow::input_schema(self)
    }

    fn output_schema(&self) -> Option<Value> {
        DynamicWorkflow::output_schema(self)
    }
}
