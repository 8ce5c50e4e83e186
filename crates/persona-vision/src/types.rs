use persona_core::EmotionVector;
use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional five-point keypoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point keypoints: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub keypoints: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Smallest box containing every point. `None` for an empty slice.
    pub fn enclosing(points: &[(f32, f32)], confidence: f32) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
            confidence,
            keypoints: None,
        })
    }
}

/// One analysed face: where it is and what it expresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceExpression {
    pub bbox: BoundingBox,
    /// 106-point landmarks in image coordinates.
    pub landmarks: Vec<(f32, f32)>,
    pub emotions: EmotionVector,
}
