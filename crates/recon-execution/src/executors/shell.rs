//! Shell command executor.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use recon_substitution::SubstitutionEngine;

use crate::context::{CommandResponse, ExecutionContext};
use crate::error::CommandError;
use crate::executors::{CommandExecutor, ProcessRunner};

/// Executes shell actions: renders the configured command line and runs it
/// in the restricted shell.
pub struct ShellExecutor {
    substitution: Arc<SubstitutionEngine>,
    process: Arc<ProcessRunner>,
}

impl ShellExecutor {
    #[must_use]
    pub fn new(substitution: Arc<SubstitutionEngine>, process: Arc<ProcessRunner>) -> Self {
        Self {
            substitution,
            process,
        }
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, context: &ExecutionContext) -> Result<CommandResponse, CommandError> {
        let template = context
            .action
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                CommandError::invalid_properties("shell action requires a 'command'")
            })?;

        let command = self.substitution.render(
            template,
            &context.substitution_context,
            Some(context.feature_pack_id),
        )?;

        debug!(command = %command, "executing shell action");
        let output = self.process.run(&command, &IndexMap::new())?;
        Ok(CommandResponse::new(command, output))
    }
}
