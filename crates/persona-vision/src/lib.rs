//! persona-vision — facial expression scoring.
//!
//! SCRFD finds faces, a 106-point landmark model localizes them and a FER+
//! classifier scores their expression. All three run via ONNX Runtime on a
//! dedicated engine thread.

pub mod adapter;
pub mod crop;
pub mod detector;
pub mod engine;
pub mod error;
pub mod expression;
pub mod landmarks;
pub mod models;
pub mod pipeline;
pub mod types;

pub use adapter::{ExpressionDetector, LoadPolicy, ModelExpressionDetector};
pub use engine::EngineHandle;
pub use error::{ModelError, VisionError};
pub use models::{ModelService, ModelStore};
pub use types::{BoundingBox, FaceExpression};

use ort::session::Session;
use std::path::Path;

pub(crate) fn load_session(model_path: &Path) -> ort::Result<Session> {
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;
    Ok(session)
}
