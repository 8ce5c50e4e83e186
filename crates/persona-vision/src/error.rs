use persona_core::AnalysisError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while fetching or loading the model bundles.
///
/// Cloneable so one failed load can be handed to every caller awaiting it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("model file not found: {} (run `persona models fetch`)", .0.display())]
    NotFound(PathBuf),
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },
    #[error("io error at {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("onnx runtime: {0}")]
    Session(String),
    #[error("unexpected model layout: {0}")]
    Layout(String),
    #[error("failed to start engine thread: {0}")]
    EngineSpawn(String),
}

impl From<ort::Error> for ModelError {
    fn from(err: ort::Error) -> Self {
        ModelError::Session(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("detection models are not loaded")]
    ModelsNotLoaded,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl From<ort::Error> for VisionError {
    fn from(err: ort::Error) -> Self {
        VisionError::Inference(err.to_string())
    }
}

impl From<VisionError> for AnalysisError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::ModelsNotLoaded => AnalysisError::ModelsNotLoaded,
            VisionError::Model(e) => AnalysisError::ModelLoadFailed(e.to_string()),
            other @ (VisionError::Inference(_) | VisionError::ChannelClosed) => {
                AnalysisError::DetectionFailed(other.to_string())
            }
        }
    }
}

impl From<ModelError> for AnalysisError {
    fn from(err: ModelError) -> Self {
        AnalysisError::ModelLoadFailed(err.to_string())
    }
}
