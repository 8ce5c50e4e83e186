use image::RgbImage;
use tokio::sync::{mpsc, oneshot};

use crate::error::{ModelError, VisionError};
use crate::types::FaceExpression;

/// Per-image analysis run on the engine thread.
pub trait FaceAnalyzer: Send + 'static {
    fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError>;
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    Analyze {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<FaceExpression>, VisionError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl EngineHandle {
    /// Detect faces in `image` and score each one's expression.
    pub async fn analyze(&self, image: RgbImage) -> Result<Vec<FaceExpression>, VisionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| VisionError::ChannelClosed)?;
        reply_rx.await.map_err(|_| VisionError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns `analyzer` and serves requests until every handle is dropped.
pub fn spawn_engine<A: FaceAnalyzer>(mut analyzer: A) -> Result<EngineHandle, ModelError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("persona-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { image, reply } => {
                        let result = analyzer.analyze(&image);
                        if let Ok(faces) = &result {
                            tracing::debug!(
                                width = image.width(),
                                height = image.height(),
                                faces = faces.len(),
                                "analyzed frame"
                            );
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| ModelError::EngineSpawn(e.to_string()))?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use persona_core::EmotionVector;

    /// Reports one face per bright image, fails on an empty one.
    struct Brightness;

    impl FaceAnalyzer for Brightness {
        fn analyze(&mut self, image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError> {
            if image.width() == 0 {
                return Err(VisionError::Inference("empty image".into()));
            }
            if image.get_pixel(0, 0)[0] < 128 {
                return Ok(Vec::new());
            }
            Ok(vec![FaceExpression {
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: image.width() as f32,
                    height: image.height() as f32,
                    confidence: 0.99,
                    keypoints: None,
                },
                landmarks: Vec::new(),
                emotions: EmotionVector { happy: 1.0, ..Default::default() },
            }])
        }
    }

    #[tokio::test]
    async fn test_round_trip_through_thread() {
        let handle = spawn_engine(Brightness).unwrap();

        let bright = RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
        let faces = handle.analyze(bright).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].emotions.happy, 1.0);

        let dark = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]));
        assert!(handle.clone().analyze(dark).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analyzer_error_is_returned() {
        let handle = spawn_engine(Brightness).unwrap();
        let err = handle.analyze(RgbImage::new(0, 0)).await.unwrap_err();
        assert!(matches!(err, VisionError::Inference(_)));
    }
}
