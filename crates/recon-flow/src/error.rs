//! Flow error types.

use thiserror::Error;

use recon_execution::ExecutionError;
use recon_substitution::SubstitutionError;

/// Error raised while driving a discovery or reconciliation flow.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The flow inputs failed validation.
    #[error("validation failed: {message}")]
    Validation { message: String },

    /// A flow stage failed.
    #[error("'{stage}' stage failed: {message}")]
    StageFailed {
        stage: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A filter references a condition the registry does not know.
    #[error("filter '{filter}' uses unsupported condition '{condition}'")]
    UnsupportedCondition { filter: String, condition: String },

    /// A condition argument could not be parsed.
    #[error("invalid condition argument '{arg}': {message}")]
    InvalidConditionArg { arg: String, message: String },

    /// A fanned-out task panicked or was torn down unexpectedly.
    #[error("flow task failed: {message}")]
    TaskPanicked { message: String },

    /// An action execution failed inside a stage function.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Template rendering or script evaluation failed inside a stage.
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),
}

impl FlowError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            FlowError::Validation { .. } => "VALIDATION_FAILED",
            FlowError::StageFailed { .. } => "STAGE_FAILED",
            FlowError::UnsupportedCondition { .. } => "UNSUPPORTED_CONDITION",
            FlowError::InvalidConditionArg { .. } => "INVALID_CONDITION_ARG",
            FlowError::TaskPanicked { .. } => "TASK_PANICKED",
            FlowError::Execution(e) => e.error_code(),
            FlowError::Substitution(e) => e.error_code(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        FlowError::Validation {
            message: message.into(),
        }
    }

    /// Create a stage failed error.
    pub fn stage_failed(stage: &'static str, message: impl Into<String>) -> Self {
        FlowError::StageFailed {
            stage,
            message: message.into(),
            source: None,
        }
    }

    /// Create a stage failed error with source.
    pub fn stage_failed_with_source(
        stage: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FlowError::StageFailed {
            stage,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid condition argument error.
    pub fn invalid_condition_arg(arg: impl Into<String>, message: impl Into<String>) -> Self {
        FlowError::InvalidConditionArg {
            arg: arg.into(),
            message: message.into(),
        }
    }
}
