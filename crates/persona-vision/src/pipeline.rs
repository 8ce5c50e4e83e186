//! Detector → landmarks → expression, per still image.

use image::RgbImage;

use crate::detector::FaceDetector;
use crate::engine::FaceAnalyzer;
use crate::error::{ModelError, VisionError};
use crate::expression::ExpressionClassifier;
use crate::landmarks::Landmarker;
use crate::models::{ModelStore, DETECTOR, EXPRESSION, LANDMARKS};
use crate::types::FaceExpression;

/// The three loaded ONNX sessions.
pub struct OnnxPipeline {
    detector: FaceDetector,
    landmarker: Landmarker,
    classifier: ExpressionClassifier,
}

impl OnnxPipeline {
    /// Load all three bundles from `store`. Fails if any one is missing or
    /// invalid; nothing is kept from a partial load.
    pub fn load(store: &ModelStore) -> Result<Self, ModelError> {
        let detector = FaceDetector::load(&store.path(&DETECTOR))?;
        let landmarker = Landmarker::load(&store.path(&LANDMARKS))?;
        let classifier = ExpressionClassifier::load(&store.path(&EXPRESSION))?;
        Ok(Self {
            detector,
            landmarker,
            classifier,
        })
    }
}

impl FaceAnalyzer for OnnxPipeline {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError> {
        let boxes = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let landmarks = self.landmarker.locate(image, &bbox)?;
            let emotions = self.classifier.classify(image, &landmarks)?;
            faces.push(FaceExpression {
                bbox,
                landmarks,
                emotions,
            });
        }
        Ok(faces)
    }
}
