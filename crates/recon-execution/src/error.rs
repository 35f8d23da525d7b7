//! Execution error types.
//!
//! [`CommandError`] classifies executor failures (transient vs. permanent)
//! and carries the command string plus any captured output so the pipeline
//! can surface partial results. [`ExecutionError`] wraps a step failure with
//! the step name and, when available, the command response captured before
//! the failure.

use thiserror::Error;

use recon_core::ServiceError;
use recon_substitution::SubstitutionError;

use crate::context::CommandResponse;

/// Error raised by a command executor.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The remote endpoint could not be reached. Transient.
    #[error("connection failed for '{command}': {message}")]
    ConnectionFailed { command: String, message: String },

    /// Connectivity retries were exhausted.
    #[error("'{command}' failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        command: String,
        attempts: u32,
        message: String,
    },

    /// The endpoint answered with a non-success status.
    #[error("'{command}' returned status {status}")]
    HttpResponse {
        command: String,
        status: u16,
        body: String,
    },

    /// The request could not be built or sent for a non-connectivity reason.
    #[error("request failed for '{command}': {message}")]
    RequestFailed { command: String, message: String },

    /// The subprocess exited with a non-zero status.
    #[error("'{command}' exited with code {exit_code}")]
    ProcessFailed {
        command: String,
        output: String,
        exit_code: i32,
    },

    /// The subprocess could not be spawned or its output read.
    #[error("process error for '{command}': {message}")]
    ProcessIo {
        command: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The action properties are missing or malformed for this executor.
    #[error("invalid action properties: {message}")]
    InvalidProperties { message: String },

    /// Template rendering failed while preparing the command.
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    /// A collaborator service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl CommandError {
    /// Whether retrying the command may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CommandError::ConnectionFailed { .. })
    }

    /// Whether the failure is permanent for this command.
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            CommandError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            CommandError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            CommandError::HttpResponse { .. } => "HTTP_RESPONSE_ERROR",
            CommandError::RequestFailed { .. } => "REQUEST_FAILED",
            CommandError::ProcessFailed { .. } => "PROCESS_FAILED",
            CommandError::ProcessIo { .. } => "PROCESS_IO_ERROR",
            CommandError::InvalidProperties { .. } => "INVALID_PROPERTIES",
            CommandError::Substitution(e) => e.error_code(),
            CommandError::Service(e) => e.error_code(),
        }
    }

    /// The command string that failed, when one was built.
    pub fn command(&self) -> Option<&str> {
        match self {
            CommandError::ConnectionFailed { command, .. }
            | CommandError::RetriesExhausted { command, .. }
            | CommandError::HttpResponse { command, .. }
            | CommandError::RequestFailed { command, .. }
            | CommandError::ProcessFailed { command, .. }
            | CommandError::ProcessIo { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Output captured before the command failed, when any.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            CommandError::HttpResponse { body, .. } => Some(body),
            CommandError::ProcessFailed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Create an invalid properties error.
    pub fn invalid_properties(message: impl Into<String>) -> Self {
        CommandError::InvalidProperties {
            message: message.into(),
        }
    }

    /// Create a process io error with source.
    pub fn process_io_with_source(
        command: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        CommandError::ProcessIo {
            command: command.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Error raised by the execution pipeline.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A pipeline step failed. Carries the command response captured before
    /// the failure so callers can report partial output.
    #[error("'{step}' step failed: {message}")]
    StepFailed {
        step: &'static str,
        message: String,
        command: Option<String>,
        command_output: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No executor is registered for the action type.
    #[error("no executor registered for action type '{action_type}'")]
    UnsupportedActionType { action_type: String },

    /// The command output handed to the mapping step is not a JSON array
    /// or object.
    #[error("mapping input is not a JSON array or object: {input}")]
    InvalidMappingInput {
        input: String,
        command: Option<String>,
        command_output: Option<String>,
    },
}

impl ExecutionError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ExecutionError::StepFailed { .. } => "STEP_FAILED",
            ExecutionError::UnsupportedActionType { .. } => "UNSUPPORTED_ACTION_TYPE",
            ExecutionError::InvalidMappingInput { .. } => "INVALID_MAPPING_INPUT",
        }
    }

    /// Create a step failed error without a captured command response.
    pub fn step_failed(
        step: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ExecutionError::StepFailed {
            step,
            message: source.to_string(),
            command: None,
            command_output: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a step failed error carrying the command response captured
    /// before the failure.
    pub fn step_failed_with_response(
        step: &'static str,
        response: &CommandResponse,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ExecutionError::StepFailed {
            step,
            message: source.to_string(),
            command: Some(response.command.clone()),
            command_output: Some(response.response.clone()),
            source: Some(Box::new(source)),
        }
    }

    /// Create a step failed error from a command error, preserving the
    /// command string and any output captured before the failure.
    pub fn command_step_failed(step: &'static str, error: CommandError) -> Self {
        ExecutionError::StepFailed {
            step,
            message: error.to_string(),
            command: error.command().map(str::to_string),
            command_output: error.captured_output().map(str::to_string),
            source: Some(Box::new(error)),
        }
    }

    /// The command response captured before the failure, when any.
    pub fn command_response(&self) -> Option<CommandResponse> {
        match self {
            ExecutionError::StepFailed {
                command: Some(command),
                command_output,
                ..
            }
            | ExecutionError::InvalidMappingInput {
                command: Some(command),
                command_output,
                ..
            } => Some(CommandResponse {
                command: command.clone(),
                response: command_output.clone().unwrap_or_default(),
            }),
            _ => None,
        }
    }
}
