//! Local functions a run may call through `submit_tool_outputs`.
//!
//! The registry ships empty: the assistant is expected to rely on hosted tools such as
//! `file_search`. A run that asks for a function nobody registered fails with
//! [`Error::UnknownTool`], which ends the reply stream with an error part.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::errors::{Error, Result};
use crate::upstream::models::{ToolCall, ToolOutput};

/// A function the assistant can call.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the function with its decoded JSON arguments and return the output handed back to the run.
    async fn call(&self, arguments: Value) -> Result<String>;
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, handler: impl ToolHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered function names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Produce one output per tool call, in call order.
    #[instrument(skip_all, fields(calls = calls.len()), err)]
    pub async fn resolve(&self, calls: &[ToolCall]) -> Result<Vec<ToolOutput>> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let arguments: Value = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    Error::Other(anyhow::anyhow!(
                        "Invalid arguments for tool call {} ({}): {}",
                        call.id,
                        call.function.name,
                        e
                    ))
                })?
            };

            let handler = self.handlers.get(&call.function.name).ok_or_else(|| Error::UnknownTool {
                name: call.function.name.clone(),
            })?;

            debug!(tool_call_id = %call.id, function = %call.function.name, "Calling tool");
            let output = handler.call(arguments).await?;
            outputs.push(ToolOutput {
                tool_call_id: call.id.clone(),
                output,
            });
        }
        Ok(outputs)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}
