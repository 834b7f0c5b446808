//! Named, schema-described capabilities the model may invoke mid-turn.

use crate::errors::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of one tool execution. `success == false` is a normal result
/// (for example "product not found"), distinct from an execution error,
/// which the registry converts into a failed result as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    /// Successful result. The payload is converted to plain structured data
    /// up front so nested domain types never leak into the model context.
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
                metadata: None,
            },
            Err(err) => Self::fail(format!("Failed to serialize tool result: {err}")),
        }
    }

    pub fn ok_with_metadata(data: impl Serialize, metadata: Value) -> Self {
        let mut result = Self::ok(data);
        if result.success {
            result.metadata = Some(metadata);
        }
        result
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: None,
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments, in the shape the model's
    /// function-calling API expects.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<ToolResult>;
}

/// Process-wide catalog of tools, constructed once at startup and shared by
/// reference. Registration is rejected for duplicate names unless an
/// explicit override is requested.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register<T>(&mut self, tool: T) -> Result<()>
    where
        T: Tool + 'static,
    {
        if self.get(tool.name()).is_some() {
            return Err(AgentError::DuplicateTool {
                name: tool.name().to_string(),
            });
        }
        debug!(tool = tool.name(), "registered tool");
        self.tools.push(Arc::new(tool));
        Ok(())
    }

    pub fn register_with_override<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.name().to_string();
        self.tools.retain(|existing| existing.name() != name);
        debug!(tool = %name, "registered tool (override)");
        self.tools.push(Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|tool| tool.name().to_string())
            .collect()
    }

    /// Function declarations for the model, in registration order.
    pub fn definitions(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executes a tool by name. Unknown names and execution errors are
    /// converted into failed results rather than surfaced as errors, so a
    /// broken tool call can never abort the turn that issued it.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "tool not found");
            return ToolResult::fail(format!("Tool {name} not found"));
        };

        let started = Instant::now();
        let result = match tool.execute(args).await {
            Ok(result) => result,
            Err(err) => {
                warn!(tool = name, error = %err, "tool execution failed");
                ToolResult::fail(err.to_string())
            }
        };
        debug!(
            tool = name,
            success = result.success,
            duration_ms = started.elapsed().as_millis() as u64,
            "tool execution finished"
        );
        result
    }
}
