use std::fmt;

use crate::artifact_manager::ArtifactError;

/// Represents the different types of errors that can occur while recording,
/// training or predicting.
#[derive(Debug)]
pub enum PipelineError {
    /// The payload is missing its container key or does not match the feature schema
    SchemaError(String),
    /// Training or inference was attempted with an empty or absent store
    NoDataError(String),
    /// No trained artifact exists for a requested label key
    ModelNotFoundError(String),
    /// A persisted artifact is unreadable or does not match the current schema
    ArtifactCorruptError(String),
    /// The training data file could not be read or written
    StorageError(String),
    /// Invalid configuration or request parameters
    ValidationError(String),
}

impl PipelineError {
    /// Whether the error is the caller's fault (a 4xx-equivalent) rather than
    /// a failure of the store or its artifacts.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::SchemaError(_)
                | Self::NoDataError(_)
                | Self::ModelNotFoundError(_)
                | Self::ValidationError(_)
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaError(msg) => write!(f, "Schema error: {}", msg),
            Self::NoDataError(msg) => write!(f, "No data: {}", msg),
            Self::ModelNotFoundError(msg) => write!(f, "Model not found: {}", msg),
            Self::ArtifactCorruptError(msg) => write!(f, "Artifact corrupt: {}", msg),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ArtifactError> for PipelineError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(label) => PipelineError::ModelNotFoundError(format!(
                "no trained model for label '{}'",
                label
            )),
            ArtifactError::IoError(e) => PipelineError::StorageError(e.to_string()),
            other => PipelineError::ArtifactCorruptError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(PipelineError::SchemaError("x".into()).is_client_error());
        assert!(PipelineError::NoDataError("x".into()).is_client_error());
        assert!(!PipelineError::StorageError("x".into()).is_client_error());
        assert!(!PipelineError::ArtifactCorruptError("x".into()).is_client_error());
    }

    #[test]
    fn test_artifact_error_conversion() {
        let err: PipelineError = ArtifactError::NotFound("top".into()).into();
        assert!(matches!(err, PipelineError::ModelNotFoundError(_)));
        assert!(err.to_string().contains("'top'"));

        let err: PipelineError = ArtifactError::Malformed("bad header".into()).into();
        assert!(matches!(err, PipelineError::ArtifactCorruptError(_)));
    }
}
