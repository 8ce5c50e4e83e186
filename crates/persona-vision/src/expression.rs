//! FER+ facial-expression classifier via ONNX Runtime.
//!
//! Input is a 64×64 grayscale patch (raw 0–255 values, 1×1×64×64). The eight
//! output logits are softmaxed and folded onto the seven reported emotions.

use crate::crop::SquareCrop;
use crate::error::{ModelError, VisionError};
use crate::types::BoundingBox;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use persona_core::EmotionVector;
use std::path::Path;

// --- Named constants ---
const FERPLUS_INPUT_SIZE: usize = 64;
const FERPLUS_CLASSES: usize = 8;
/// Margin added around the landmark hull before cropping.
const FERPLUS_MARGIN: f32 = 1.1;

pub struct ExpressionClassifier {
    session: Session,
}

impl ExpressionClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }
        let session = crate::load_session(model_path)?;
        tracing::info!(path = %model_path.display(), "loaded FER+ expression model");
        Ok(Self { session })
    }

    /// Score the face enclosed by `landmarks`.
    pub fn classify(
        &mut self,
        image: &RgbImage,
        landmarks: &[(f32, f32)],
    ) -> Result<EmotionVector, VisionError> {
        let hull = BoundingBox::enclosing(landmarks, 1.0)
            .ok_or_else(|| VisionError::Inference("no landmarks to crop".to_string()))?;
        let input = preprocess(image, &face_crop(&hull));

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Inference(format!("expression logits: {e}")))?;

        if logits.len() < FERPLUS_CLASSES {
            return Err(VisionError::Inference(format!(
                "expected {FERPLUS_CLASSES} expression logits, got {}",
                logits.len()
            )));
        }
        Ok(to_emotions(&softmax(&logits[..FERPLUS_CLASSES])))
    }
}

fn face_crop(hull: &BoundingBox) -> SquareCrop {
    let (cx, cy) = hull.center();
    SquareCrop::new(cx, cy, hull.width.max(hull.height) * FERPLUS_MARGIN, FERPLUS_INPUT_SIZE)
}

fn preprocess(image: &RgbImage, crop: &SquareCrop) -> Array4<f32> {
    let size = crop.out;
    let gray = crop.sample_gray(image);
    let mut tensor = Array4::<f32>::zeros((1, 1, size, size));
    for (i, v) in gray.into_iter().enumerate() {
        tensor[[0, 0, i / size, i % size]] = v;
    }
    tensor
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&e| e / sum).collect()
}

/// FER+ class order: neutral, happiness, surprise, sadness, anger, disgust,
/// fear, contempt. Contempt is reported as disgust.
fn to_emotions(p: &[f32]) -> EmotionVector {
    EmotionVector {
        neutral: p[0],
        happy: p[1],
        surprised: p[2],
        sad: p[3],
        angry: p[4],
        disgusted: p[5] + p[7],
        fearful: p[6],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0, 0.5, -1.0, 0.0, 0.0, 4.0]);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(p[7] > p[2]);
    }

    #[test]
    fn test_softmax_large_logits_stable() {
        let p = softmax(&[1000.0, 0.0]);
        assert!((p[0] - 1.0).abs() < 1e-6);
        assert!(p.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_contempt_folds_into_disgust() {
        let e = to_emotions(&[0.1, 0.2, 0.05, 0.05, 0.1, 0.15, 0.05, 0.3]);
        assert!((e.disgusted - 0.45).abs() < 1e-6);
        assert_eq!(e.happy, 0.2);
        assert_eq!(e.surprised, 0.05);
        let total: f32 = e.components().iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_face_crop_square_around_hull() {
        let hull = BoundingBox::enclosing(&[(10.0, 10.0), (50.0, 30.0)], 1.0).unwrap();
        let crop = face_crop(&hull);
        assert_eq!((crop.cx, crop.cy), (30.0, 20.0));
        assert!((crop.side - 44.0).abs() < 1e-4);
        assert_eq!(crop.out, 64);
    }

    #[test]
    fn test_preprocess_keeps_raw_range() {
        let img = RgbImage::from_pixel(100, 100, image::Rgb([200, 200, 200]));
        let t = preprocess(&img, &SquareCrop::new(50.0, 50.0, 40.0, 64));
        assert_eq!(t.shape(), &[1, 1, 64, 64]);
        assert!((t[[0, 0, 32, 32]] - 200.0).abs() < 0.5);
    }
}
