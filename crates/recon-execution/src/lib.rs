//! Action execution engine.
//!
//! Every configured action runs through the same pipeline: pre function,
//! command, post function, json mapping. Commands are dispatched to an
//! executor by action type: HTTP requests, restricted shell commands or
//! python scripts resolved from feature-pack assets.

pub mod context;
pub mod engine;
pub mod error;
pub mod executors;
pub mod runner;
pub mod steps;

pub use context::{CommandResponse, ExecutionContext, ExecutionResult};
pub use engine::ExecutionEngine;
pub use error::{CommandError, ExecutionError};
pub use executors::{CommandExecutor, ExecutorRegistry};
pub use runner::NestedActionRunner;
