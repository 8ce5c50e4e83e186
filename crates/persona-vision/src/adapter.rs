//! The expression-detector seam used by the analysis pipeline.

use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

use crate::error::VisionError;
use crate::models::ModelService;
use crate::types::FaceExpression;

/// Finds faces in a still and scores their expressions.
///
/// Results are ordered by detector confidence, most prominent face first.
#[async_trait]
pub trait ExpressionDetector: Send + Sync {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError>;
}

/// What to do when models are not loaded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Trigger loading and wait for it.
    #[default]
    Lazy,
    /// Fail with [`VisionError::ModelsNotLoaded`].
    RequireLoaded,
}

/// [`ExpressionDetector`] backed by the ONNX engine of a [`ModelService`].
pub struct ModelExpressionDetector {
    models: Arc<ModelService>,
    policy: LoadPolicy,
}

impl ModelExpressionDetector {
    pub fn new(models: Arc<ModelService>, policy: LoadPolicy) -> Self {
        Self { models, policy }
    }

    pub fn policy(&self) -> LoadPolicy {
        self.policy
    }
}

#[async_trait]
impl ExpressionDetector for ModelExpressionDetector {
    async fn detect(&self, image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError> {
        let engine = match self.policy {
            LoadPolicy::Lazy => self.models.ensure_loaded().await?,
            LoadPolicy::RequireLoaded => self.models.handle().ok_or(VisionError::ModelsNotLoaded)?,
        };
        engine.analyze(image.clone()).await
    }
}
