use persona_core::AnalysisError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("video is {duration:.2}s long, limit is {max:.2}s")]
    DurationExceeded { duration: f64, max: f64 },
    #[error("capture context unavailable: {0}")]
    CaptureContextUnavailable(String),
    #[error("source could not be loaded: {0}")]
    SourceLoadFailed(String),
    #[error("no picture left at {offset:.3}s")]
    EndOfStream { offset: f64 },
    #[error("capture at {offset:.3}s failed: {message}")]
    CaptureFailed { offset: f64, message: String },
    #[error("sampling rate must be positive, got {0}")]
    InvalidRate(f64),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SamplerError> for AnalysisError {
    fn from(err: SamplerError) -> Self {
        match err {
            SamplerError::DurationExceeded { duration, max } => {
                AnalysisError::DurationExceeded { duration, max }
            }
            SamplerError::CaptureContextUnavailable(msg) => AnalysisError::CaptureContextUnavailable(msg),
            other => AnalysisError::SourceLoadFailed(other.to_string()),
        }
    }
}
