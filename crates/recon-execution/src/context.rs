//! Execution pipeline inputs and outputs.

use indexmap::IndexMap;
use serde_json::Value;

use recon_core::ActionDefinition;

/// The raw outcome of a command: the command string as run and its
/// unprocessed response body or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub command: String,
    pub response: String,
}

impl CommandResponse {
    #[must_use]
    pub fn new(command: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            response: response.into(),
        }
    }
}

/// The outcome of the full pipeline: the raw command response plus the rows
/// produced by the output mapping.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub command_response: CommandResponse,
    pub mapped_command_response: Vec<IndexMap<String, Value>>,
}

/// Everything the pipeline needs to run one action: the feature pack it
/// belongs to, the action definition and the substitution context.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub feature_pack_id: i64,
    pub action: ActionDefinition,
    pub substitution_context: IndexMap<String, Value>,
}

impl ExecutionContext {
    #[must_use]
    pub fn new(
        feature_pack_id: i64,
        action: ActionDefinition,
        substitution_context: IndexMap<String, Value>,
    ) -> Self {
        Self {
            feature_pack_id,
            action,
            substitution_context,
        }
    }
}
