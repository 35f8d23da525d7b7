//! Substitution error types.

use thiserror::Error;

use recon_core::ServiceError;

use crate::jq::JqError;

/// Error raised while rendering a template or evaluating a helper.
#[derive(Debug, Error)]
pub enum SubstitutionError {
    /// The template engine reported one or more render errors.
    #[error("substitution failed: {message}")]
    RenderFailed { message: String },

    /// A helper was invoked with a missing or malformed argument.
    #[error("invalid argument for '{function}': {message}")]
    InvalidArgument { function: String, message: String },

    /// Script compilation or evaluation failed.
    #[error("script evaluation failed: {message}")]
    ScriptFailed { message: String },

    /// A nested action invoked from a template failed.
    #[error("nested action execution failed: {message}")]
    NestedActionFailed { message: String },

    /// A jq expression failed to parse, compile or evaluate.
    #[error(transparent)]
    Jq(#[from] JqError),

    /// A collaborator service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl SubstitutionError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            SubstitutionError::RenderFailed { .. } => "SUBSTITUTION_FAILED",
            SubstitutionError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            SubstitutionError::ScriptFailed { .. } => "SCRIPT_FAILED",
            SubstitutionError::NestedActionFailed { .. } => "NESTED_ACTION_FAILED",
            SubstitutionError::Jq(_) => "JQ_FAILED",
            SubstitutionError::Service(e) => e.error_code(),
        }
    }

    /// Create a render failed error.
    pub fn render_failed(message: impl Into<String>) -> Self {
        SubstitutionError::RenderFailed {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        SubstitutionError::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    /// Create a script failed error.
    pub fn script_failed(message: impl Into<String>) -> Self {
        SubstitutionError::ScriptFailed {
            message: message.into(),
        }
    }

    /// Create a nested action failed error.
    pub fn nested_action_failed(message: impl Into<String>) -> Self {
        SubstitutionError::NestedActionFailed {
            message: message.into(),
        }
    }
}

/// Result type for substitution operations.
pub type SubstitutionResult<T> = Result<T, SubstitutionError>;
