use thiserror::Error;

/// Failures surfaced to the session state machine.
///
/// Malformed language-model responses are not represented here: they are
/// recovered into default values by [`crate::validate`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("no API key available")]
    ApiKeyMissing,
    #[error("API key rejected by the generative service")]
    InvalidApiKey,
    #[error("failed to load detection models: {0}")]
    ModelLoadFailed(String),
    #[error("detection models are not loaded")]
    ModelsNotLoaded,
    #[error("failed to load video source: {0}")]
    SourceLoadFailed(String),
    #[error("video is {duration:.1}s long, maximum is {max:.1}s")]
    DurationExceeded { duration: f64, max: f64 },
    #[error("frame capture unavailable: {0}")]
    CaptureContextUnavailable(String),
    #[error("not a video: declared media type {0:?}")]
    InvalidMediaType(String),
    #[error("no face detected in any sampled frame")]
    NoFaceDetected,
    #[error("expression detection failed: {0}")]
    DetectionFailed(String),
    #[error("generative service failed: {0}")]
    ExternalService(String),
    #[error("input text is empty")]
    UserInputEmpty,
}

impl AnalysisError {
    /// Machine-readable classifier, also the key into the message catalog.
    pub fn message_key(&self) -> &'static str {
        match self {
            AnalysisError::ApiKeyMissing => "error.apiKeyMissing",
            AnalysisError::InvalidApiKey => "error.invalidApiKey",
            AnalysisError::ModelLoadFailed(_) => "error.modelLoadFailed",
            AnalysisError::ModelsNotLoaded => "error.modelNotLoaded",
            AnalysisError::SourceLoadFailed(_) => "error.videoLoadFailed",
            AnalysisError::DurationExceeded { .. } => "error.videoTooLong",
            AnalysisError::CaptureContextUnavailable(_) => "error.canvasContext",
            AnalysisError::InvalidMediaType(_) => "error.invalidVideoFile",
            AnalysisError::NoFaceDetected => "error.noFaceDetected",
            AnalysisError::DetectionFailed(_) => "error.detectionFailed",
            AnalysisError::ExternalService(_) => "error.aiServiceGeneric",
            AnalysisError::UserInputEmpty => "error.textEmpty",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Language;

    #[test]
    fn test_every_key_is_translated() {
        let all = [
            AnalysisError::ApiKeyMissing,
            AnalysisError::InvalidApiKey,
            AnalysisError::ModelLoadFailed("x".into()),
            AnalysisError::ModelsNotLoaded,
            AnalysisError::SourceLoadFailed("x".into()),
            AnalysisError::DurationExceeded { duration: 20.0, max: 15.0 },
            AnalysisError::CaptureContextUnavailable("x".into()),
            AnalysisError::InvalidMediaType("text/plain".into()),
            AnalysisError::NoFaceDetected,
            AnalysisError::DetectionFailed("x".into()),
            AnalysisError::ExternalService("x".into()),
            AnalysisError::UserInputEmpty,
        ];
        for err in all {
            let key = err.message_key();
            assert_ne!(Language::En.message(key), key, "missing en for {key}");
            assert_ne!(Language::Fa.message(key), key, "missing fa for {key}");
        }
    }

    #[test]
    fn test_duration_display() {
        let err = AnalysisError::DurationExceeded { duration: 20.04, max: 15.0 };
        assert_eq!(err.to_string(), "video is 20.0s long, maximum is 15.0s");
    }
}
