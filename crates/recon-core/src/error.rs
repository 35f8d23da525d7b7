//! Errors raised by the external collaborator services.

use thiserror::Error;

/// Error returned by the asset and properties collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested asset does not exist in the feature pack.
    #[error("asset '{name}' not found in feature pack {feature_pack_id}")]
    AssetNotFound { name: String, feature_pack_id: i64 },

    /// No properties are defined for the feature pack.
    #[error("no properties found for feature pack {feature_pack_id}")]
    PropertiesNotFound { feature_pack_id: i64 },

    /// Filesystem or stream error while reading collaborator data.
    #[error("io error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backing store reported a failure.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServiceError {
    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::AssetNotFound { .. } => "ASSET_NOT_FOUND",
            ServiceError::PropertiesNotFound { .. } => "PROPERTIES_NOT_FOUND",
            ServiceError::Io { .. } => "IO_ERROR",
            ServiceError::Backend { .. } => "BACKEND_ERROR",
        }
    }

    /// Create an io error.
    pub fn io(message: impl Into<String>) -> Self {
        ServiceError::Io {
            message: message.into(),
            source: None,
        }
    }

    /// Create an io error with source.
    pub fn io_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ServiceError::Io {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        ServiceError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error with source.
    pub fn backend_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ServiceError::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for collaborator operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServiceError::AssetNotFound {
                name: "script.py".to_string(),
                feature_pack_id: 1
            }
            .error_code(),
            "ASSET_NOT_FOUND"
        );
        assert_eq!(ServiceError::io("disk full").error_code(), "IO_ERROR");
        assert_eq!(ServiceError::backend("down").error_code(), "BACKEND_ERROR");
    }

    #[test]
    fn test_error_display() {
        let err = ServiceError::AssetNotFound {
            name: "enrich.py".to_string(),
            feature_pack_id: 42,
        };
        assert_eq!(
            err.to_string(),
            "asset 'enrich.py' not found in feature pack 42"
        );
    }
}
