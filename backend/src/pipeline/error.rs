use std::time::Duration;

use shared::FailureKind;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),
    #[error("Could not decode image: {0}")]
    Decode(String),
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Model inference failed: {0}")]
    Inference(String),
    #[error("Predicted class index {index} is outside the {count} registered labels")]
    UnknownLabel { index: usize, count: usize },
    #[error("Model inference exceeded {0:?}")]
    Timeout(Duration),
    #[error("Failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Validation(_) => FailureKind::ValidationError,
            PipelineError::Decode(_) => FailureKind::DecodeError,
            PipelineError::UnsupportedFormat(_) => FailureKind::UnsupportedFormatError,
            PipelineError::Inference(_) => FailureKind::InferenceError,
            PipelineError::UnknownLabel { .. } => FailureKind::UnknownLabelError,
            PipelineError::Timeout(_) => FailureKind::TimeoutError,
            PipelineError::Staging(_) => FailureKind::StagingError,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        PipelineError::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            PipelineError::validation("No selected file").kind(),
            FailureKind::ValidationError
        );
        assert_eq!(
            PipelineError::UnknownLabel { index: 7, count: 5 }.kind(),
            FailureKind::UnknownLabelError
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(PipelineError::from(io).kind(), FailureKind::StagingError);
    }

    #[test]
    fn validation_message_is_passed_through() {
        assert_eq!(
            PipelineError::validation("No image part in the request").to_string(),
            "No image part in the request"
        );
    }
}
