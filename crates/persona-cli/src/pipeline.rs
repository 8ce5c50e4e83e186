//! Video and text analysis runs.

use persona_core::{
    AnalysisError, AnalysisOutcome, AnalysisRequest, EmotionVector, FrameStats, Language,
    VideoUpload,
};
use persona_llm::{LanguageModel, ProfileSynthesizer};
use persona_media::{FfmpegDecoder, FrameSampler, MediaDecoder};
use persona_vision::{ExpressionDetector, VisionError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coarse progress of a run, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExtractingFrames,
    AnalyzingFrame { index: usize, total: usize },
    CallingAi,
    AnalyzingText,
}

impl Stage {
    pub fn message_key(&self) -> &'static str {
        match self {
            Stage::ExtractingFrames => "progress.extractingFrames",
            Stage::AnalyzingFrame { .. } => "progress.analyzingFrame",
            Stage::CallingAi => "progress.callingAI",
            Stage::AnalyzingText => "progress.analyzingText",
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(Stage) + Send + Sync>;

/// Sampling and synthesis parameters.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub fps: f64,
    pub max_duration_secs: f64,
    pub description_frames: usize,
}

/// Everything a run needs, shareable across tasks.
#[derive(Clone)]
pub struct Analyzer {
    detector: Arc<dyn ExpressionDetector>,
    model: Arc<dyn LanguageModel>,
    settings: PipelineSettings,
    progress: ProgressFn,
}

impl Analyzer {
    pub fn new(
        detector: Arc<dyn ExpressionDetector>,
        model: Arc<dyn LanguageModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            detector,
            model,
            settings,
            progress: Arc::new(|_| {}),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = progress;
        self
    }

    fn synthesizer(&self, language: Language) -> ProfileSynthesizer {
        ProfileSynthesizer::new(Arc::clone(&self.model), language)
            .with_description_frames(self.settings.description_frames)
    }

    /// Analyze one accepted request.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        credential: &str,
        language: Language,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        match request {
            AnalysisRequest::Text(text) => self.analyze_text(text, credential, language).await,
            AnalysisRequest::Video(upload) => self.analyze_video(upload, credential, language).await,
        }
    }

    pub async fn analyze_text(
        &self,
        text: &str,
        credential: &str,
        language: Language,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::UserInputEmpty);
        }
        (self.progress)(Stage::AnalyzingText);
        let profile = self
            .synthesizer(language)
            .from_text(Some(credential), text)
            .await?;
        Ok(AnalysisOutcome::from_text(profile))
    }

    pub async fn analyze_video(
        &self,
        upload: &VideoUpload,
        credential: &str,
        language: Language,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if !upload.is_video() {
            return Err(AnalysisError::InvalidMediaType(upload.mime().to_string()));
        }
        let decoder = FfmpegDecoder::open(upload.path()).await?;
        self.analyze_decoded(decoder, credential, language).await
    }

    /// Sample `decoder`, score each frame's primary face, then ask for the
    /// profile and the description concurrently.
    pub async fn analyze_decoded<D: MediaDecoder>(
        &self,
        decoder: D,
        credential: &str,
        language: Language,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        (self.progress)(Stage::ExtractingFrames);
        let sampler = FrameSampler::new(decoder, self.settings.fps, self.settings.max_duration_secs)?;
        let frames = sampler.collect().await?;
        info!(frames = frames.len(), "frames extracted");

        let total = frames.len();
        let mut vectors: Vec<EmotionVector> = Vec::with_capacity(total);
        for frame in &frames {
            (self.progress)(Stage::AnalyzingFrame {
                index: frame.index,
                total,
            });
            match self.detector.detect(&frame.image).await {
                Ok(faces) => match faces.first() {
                    Some(primary) => vectors.push(primary.emotions),
                    None => debug!(index = frame.index, "no face in frame"),
                },
                // Load and engine failures hit every frame alike.
                Err(
                    e @ (VisionError::ModelsNotLoaded
                    | VisionError::Model(_)
                    | VisionError::ChannelClosed),
                ) => return Err(e.into()),
                Err(e) => warn!(index = frame.index, error = %e, "detection failed, skipping frame"),
            }
        }

        if vectors.is_empty() {
            return Err(AnalysisError::NoFaceDetected);
        }
        let stats = FrameStats {
            sampled: total,
            with_face: vectors.len(),
        };
        info!(sampled = stats.sampled, with_face = stats.with_face, "faces scored");

        (self.progress)(Stage::CallingAi);
        let synth = self.synthesizer(language);
        let (profile, description) = tokio::try_join!(
            synth.from_emotions(Some(credential), &vectors),
            synth.describe(Some(credential), &frames),
        )?;

        Ok(AnalysisOutcome {
            profile,
            description: Some(description),
            emotions: EmotionVector::average(&vectors),
            frames: Some(stats),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::RgbImage;
    use persona_core::{prompts, BigFiveTrait};
    use persona_llm::{GeminiError, Prompt};
    use persona_media::SamplerError;
    use persona_vision::{
        BoundingBox, EngineHandle, FaceExpression, LoadPolicy, ModelError, ModelExpressionDetector,
        ModelService,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeDecoder {
        duration: f64,
    }

    #[async_trait]
    impl MediaDecoder for FakeDecoder {
        fn duration(&self) -> f64 {
            self.duration
        }

        async fn capture_at(&mut self, offset: f64) -> Result<RgbImage, SamplerError> {
            // Frame brightness encodes the capture offset.
            let v = (offset * 20.0) as u8;
            Ok(RgbImage::from_pixel(4, 4, image::Rgb([v, v, v])))
        }
    }

    /// Face in every frame whose brightness is at least `min_brightness`;
    /// fails on frames at exactly `fail_brightness`.
    struct FakeDetector {
        calls: AtomicUsize,
        min_brightness: u8,
        fail_brightness: Option<u8>,
    }

    impl FakeDetector {
        fn new(min_brightness: u8) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                min_brightness,
                fail_brightness: None,
            })
        }
    }

    fn face(happy: f32, confidence: f32) -> FaceExpression {
        FaceExpression {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 4.0,
                height: 4.0,
                confidence,
                keypoints: None,
            },
            landmarks: Vec::new(),
            emotions: EmotionVector { happy, neutral: 1.0 - happy, ..Default::default() },
        }
    }

    #[async_trait]
    impl ExpressionDetector for FakeDetector {
        async fn detect(&self, image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let v = image.get_pixel(0, 0)[0];
            if Some(v) == self.fail_brightness {
                return Err(VisionError::Inference("corrupt".into()));
            }
            if v < self.min_brightness {
                return Ok(Vec::new());
            }
            // Primary face first, a weaker second face that must be ignored.
            Ok(vec![face(1.0, 0.9), face(0.0, 0.6)])
        }
    }

    /// Answers JSON prompts with a fixed profile and text prompts with a sentence.
    #[derive(Default)]
    struct FakeModel {
        prompts: Mutex<Vec<Prompt>>,
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn generate(&self, _api_key: &str, prompt: &Prompt) -> Result<String, GeminiError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            if prompt.json {
                Ok(r#"{"openness":{"score":70,"explanation":"Open."},
                       "conscientiousness":{"score":60,"explanation":"Steady."},
                       "extraversion":{"score":90,"explanation":"Lively."},
                       "agreeableness":{"score":50,"explanation":"Fair."},
                       "neuroticism":{"score":10,"explanation":"Calm."}}"#
                    .to_string())
            } else {
                Ok("A person smiles at the camera.".to_string())
            }
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            fps: 2.0,
            max_duration_secs: 15.0,
            description_frames: 5,
        }
    }

    fn analyzer(detector: Arc<FakeDetector>, model: Arc<FakeModel>) -> Analyzer {
        Analyzer::new(detector, model, settings())
    }

    #[tokio::test]
    async fn test_video_run_end_to_end() {
        let detector = FakeDetector::new(0);
        let model = Arc::new(FakeModel::default());
        let outcome = analyzer(detector.clone(), model.clone())
            .analyze_decoded(FakeDecoder { duration: 10.0 }, "k", Language::En)
            .await
            .unwrap();

        assert_eq!(detector.calls.load(Ordering::SeqCst), 20);
        assert_eq!(outcome.frames, Some(FrameStats { sampled: 20, with_face: 20 }));
        assert_eq!(outcome.profile.get(BigFiveTrait::Extraversion).score, 90);
        assert_eq!(outcome.description.as_deref(), Some("A person smiles at the camera."));
        // Only the primary face contributes.
        assert_eq!(outcome.emotions.unwrap().happy, 1.0);

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        let description = prompts.iter().find(|p| !p.json).unwrap();
        assert_eq!(description.image_count(), 5);
    }

    #[tokio::test]
    async fn test_too_long_video_never_reaches_detector() {
        let detector = FakeDetector::new(0);
        let model = Arc::new(FakeModel::default());
        let err = analyzer(detector.clone(), model.clone())
            .analyze_decoded(FakeDecoder { duration: 20.0 }, "k", Language::En)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::DurationExceeded { .. }));
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_face_anywhere() {
        let detector = FakeDetector::new(255);
        let model = Arc::new(FakeModel::default());
        let err = analyzer(detector, model.clone())
            .analyze_decoded(FakeDecoder { duration: 3.0 }, "k", Language::En)
            .await
            .unwrap_err();

        assert_eq!(err, AnalysisError::NoFaceDetected);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_frames_count_as_faceless() {
        // Brightness is offset * 20: frames at 0.0, 0.5, 1.0, 1.5 → 0, 10, 20, 30.
        let detector = Arc::new(FakeDetector {
            calls: AtomicUsize::new(0),
            min_brightness: 10,
            fail_brightness: Some(20),
        });
        let outcome = analyzer(detector, Arc::new(FakeModel::default()))
            .analyze_decoded(FakeDecoder { duration: 2.0 }, "k", Language::En)
            .await
            .unwrap();

        assert_eq!(outcome.frames, Some(FrameStats { sampled: 4, with_face: 2 }));
    }

    struct Unloaded;

    #[async_trait]
    impl ExpressionDetector for Unloaded {
        async fn detect(&self, _image: &RgbImage) -> Result<Vec<FaceExpression>, VisionError> {
            Err(VisionError::ModelsNotLoaded)
        }
    }

    #[tokio::test]
    async fn test_unloaded_models_abort_the_run() {
        let model = Arc::new(FakeModel::default());
        let err = Analyzer::new(Arc::new(Unloaded), model.clone(), settings())
            .analyze_decoded(FakeDecoder { duration: 3.0 }, "k", Language::En)
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::ModelsNotLoaded);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lazy_load_failure_surfaces_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let service = Arc::new(ModelService::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let result: Result<EngineHandle, ModelError> =
                Err(ModelError::NotFound("/models/det_10g.onnx".into()));
            Box::pin(async move { result })
        }));
        let detector = Arc::new(ModelExpressionDetector::new(service, LoadPolicy::Lazy));
        let model = Arc::new(FakeModel::default());

        let err = Analyzer::new(detector, model.clone(), settings())
            .analyze_decoded(FakeDecoder { duration: 3.0 }, "k", Language::En)
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::ModelLoadFailed(ref m) if m.contains("det_10g")), "{err:?}");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_text_calls_nothing() {
        let detector = FakeDetector::new(0);
        let model = Arc::new(FakeModel::default());
        let err = analyzer(detector.clone(), model.clone())
            .run(&AnalysisRequest::Text("   ".into()), "k", Language::En)
            .await
            .unwrap_err();

        assert_eq!(err, AnalysisError::UserInputEmpty);
        assert!(model.prompts.lock().unwrap().is_empty());
        assert_eq!(detector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_text_run() {
        let model = Arc::new(FakeModel::default());
        let outcome = analyzer(FakeDetector::new(0), model.clone())
            .run(&AnalysisRequest::Text("I love meeting people.".into()), "k", Language::Fa)
            .await
            .unwrap();

        assert_eq!(outcome.profile.openness.score, 70);
        assert!(outcome.description.is_none() && outcome.frames.is_none());
        assert_ne!(outcome.profile, prompts::default_profile(Language::Fa));
    }

    #[tokio::test]
    async fn test_non_video_upload_rejected() {
        let upload = VideoUpload::from_path("/tmp/notes.txt", Some("text/plain".into()));
        let err = analyzer(FakeDetector::new(0), Arc::new(FakeModel::default()))
            .run(&AnalysisRequest::Video(upload), "k", Language::En)
            .await
            .unwrap_err();
        assert_eq!(err, AnalysisError::InvalidMediaType("text/plain".into()));
    }

    #[tokio::test]
    async fn test_progress_reports_stages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let progress: ProgressFn = Arc::new(move |stage| sink.lock().unwrap().push(stage));

        analyzer(FakeDetector::new(0), Arc::new(FakeModel::default()))
            .with_progress(progress)
            .analyze_decoded(FakeDecoder { duration: 1.0 }, "k", Language::En)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&Stage::ExtractingFrames));
        assert_eq!(seen.last(), Some(&Stage::CallingAi));
        assert_eq!(seen.len(), 4);
    }
}
