//! 106-point facial landmarks (InsightFace `2d106det`).
//!
//! The network sees a 192×192 window centred on the detector box, sized at
//! 1.5× the box's longer side. It emits 212 values in [-1, 1] which map to
//! patch pixels as `(p + 1) * 96`.

use crate::crop::SquareCrop;
use crate::error::{ModelError, VisionError};
use crate::types::BoundingBox;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// --- Named constants ---
const LANDMARK_INPUT_SIZE: usize = 192;
const LANDMARK_CONTEXT: f32 = 1.5;
const LANDMARK_POINTS: usize = 106;

pub struct Landmarker {
    session: Session,
}

impl Landmarker {
    pub fn load(model_path: &Path) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }
        let session = crate::load_session(model_path)?;
        tracing::info!(path = %model_path.display(), "loaded landmark model");
        Ok(Self { session })
    }

    /// Locate the 106 landmarks of `face` in image coordinates.
    pub fn locate(
        &mut self,
        image: &RgbImage,
        face: &BoundingBox,
    ) -> Result<Vec<(f32, f32)>, VisionError> {
        let crop = window(face);
        let input = preprocess(image, &crop);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Inference(format!("landmarks: {e}")))?;

        decode(raw, &crop)
    }
}

/// Square window around the detector box.
fn window(face: &BoundingBox) -> SquareCrop {
    let (cx, cy) = face.center();
    let side = face.width.max(face.height) * LANDMARK_CONTEXT;
    SquareCrop::new(cx, cy, side, LANDMARK_INPUT_SIZE)
}

/// Raw RGB values, NCHW. The exported graph normalizes internally.
fn preprocess(image: &RgbImage, crop: &SquareCrop) -> Array4<f32> {
    let size = crop.out;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (i, rgb) in crop.sample_rgb(image).into_iter().enumerate() {
        let (y, x) = (i / size, i % size);
        for c in 0..3 {
            tensor[[0, c, y, x]] = rgb[c];
        }
    }
    tensor
}

fn decode(raw: &[f32], crop: &SquareCrop) -> Result<Vec<(f32, f32)>, VisionError> {
    if raw.len() < LANDMARK_POINTS * 2 {
        return Err(VisionError::Inference(format!(
            "expected {} landmark values, got {}",
            LANDMARK_POINTS * 2,
            raw.len()
        )));
    }
    let half = crop.out as f32 / 2.0;
    Ok(raw
        .chunks_exact(2)
        .take(LANDMARK_POINTS)
        .map(|p| crop.to_source((p[0] + 1.0) * half, (p[1] + 1.0) * half))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 0.9,
            keypoints: None,
        }
    }

    #[test]
    fn test_window_uses_longer_side() {
        let crop = window(&face(100.0, 50.0, 80.0, 120.0));
        assert_eq!((crop.cx, crop.cy), (140.0, 110.0));
        assert!((crop.side - 180.0).abs() < 1e-4);
        assert_eq!(crop.out, 192);
    }

    #[test]
    fn test_decode_maps_back_to_image() {
        let crop = window(&face(100.0, 50.0, 80.0, 120.0));
        let mut raw = vec![0.0f32; LANDMARK_POINTS * 2];
        // Point 1 at the top-left corner of the window.
        raw[2] = -1.0;
        raw[3] = -1.0;
        let pts = decode(&raw, &crop).unwrap();

        assert_eq!(pts.len(), LANDMARK_POINTS);
        assert!((pts[0].0 - 140.0).abs() < 1e-3 && (pts[0].1 - 110.0).abs() < 1e-3);
        assert!((pts[1].0 - 50.0).abs() < 1e-3 && (pts[1].1 - 20.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_short_output() {
        let crop = window(&face(0.0, 0.0, 10.0, 10.0));
        assert!(matches!(
            decode(&[0.0; 10], &crop),
            Err(VisionError::Inference(_))
        ));
    }

    #[test]
    fn test_preprocess_shape() {
        let img = RgbImage::from_pixel(64, 64, image::Rgb([10, 20, 30]));
        let crop = window(&face(16.0, 16.0, 32.0, 32.0));
        let t = preprocess(&img, &crop);
        assert_eq!(t.shape(), &[1, 3, 192, 192]);
        assert!((t[[0, 2, 96, 96]] - 30.0).abs() < 0.5);
    }
}
