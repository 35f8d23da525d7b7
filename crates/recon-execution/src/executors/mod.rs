//! Command executors.
//!
//! Each executor turns an action definition into a concrete command run:
//! an HTTP request, a restricted shell command or a python script. The
//! engine selects the executor by the action type through an explicit
//! registry.

use std::collections::HashMap;
use std::sync::Arc;

use recon_core::ActionType;

use crate::context::{CommandResponse, ExecutionContext};
use crate::error::CommandError;

pub mod http;
pub mod process;
pub mod python;
pub mod shell;

pub use http::HttpExecutor;
pub use process::ProcessRunner;
pub use python::{PythonAssetStore, PythonExecutor};
pub use shell::ShellExecutor;

/// Runs the command of an action and returns its raw response.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, context: &ExecutionContext) -> Result<CommandResponse, CommandError>;
}

/// Maps action types to their executors.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<ActionType, Arc<dyn CommandExecutor>>,
}

impl ExecutorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for an action type, replacing any previous one.
    pub fn register(&mut self, action_type: ActionType, executor: Arc<dyn CommandExecutor>) {
        self.executors.insert(action_type, executor);
    }

    /// Look up the executor for an action type.
    #[must_use]
    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn CommandExecutor>> {
        self.executors.get(&action_type).cloned()
    }
}
