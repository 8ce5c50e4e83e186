//! Big Five profile synthesis over a [`LanguageModel`].
//!
//! Failure policy: a rejected API key is surfaced as
//! [`AnalysisError::InvalidApiKey`]; every other service failure degrades to
//! the default profile (or the fixed fallback description). Nothing is sent
//! without a credential.

use persona_core::{prompts, validate, AnalysisError, EmotionVector, Language, Profile};
use persona_media::{select_evenly_spaced, Snapshot};
use std::sync::Arc;
use tracing::{info, warn};

use crate::gemini::{GeminiError, LanguageModel, Prompt};

/// Frames sent with a description request.
pub const DEFAULT_DESCRIPTION_FRAMES: usize = 5;

pub struct ProfileSynthesizer {
    model: Arc<dyn LanguageModel>,
    language: Language,
    description_frames: usize,
}

impl ProfileSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, language: Language) -> Self {
        Self {
            model,
            language,
            description_frames: DEFAULT_DESCRIPTION_FRAMES,
        }
    }

    pub fn with_description_frames(mut self, frames: usize) -> Self {
        self.description_frames = frames.max(1);
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Profile from per-frame emotion vectors, averaged component-wise.
    pub async fn from_emotions(
        &self,
        credential: Option<&str>,
        vectors: &[EmotionVector],
    ) -> Result<Profile, AnalysisError> {
        let key = require_key(credential)?;
        let default = prompts::default_profile(self.language);

        let Some(mean) = EmotionVector::average(vectors) else {
            warn!("no emotion data, returning default profile");
            return Ok(default);
        };
        info!(frames = vectors.len(), dominant = mean.dominant(), "requesting profile from emotions");

        let prompt = Prompt::json(prompts::emotion_profile(&mean, self.language));
        self.profile(key, &prompt, default).await
    }

    /// Profile from the user's own words.
    pub async fn from_text(
        &self,
        credential: Option<&str>,
        text: &str,
    ) -> Result<Profile, AnalysisError> {
        let key = require_key(credential)?;
        if text.trim().is_empty() {
            return Err(AnalysisError::UserInputEmpty);
        }
        info!(chars = text.chars().count(), "requesting profile from text");

        let prompt = Prompt::json(prompts::text_profile(text, self.language));
        self.profile(key, &prompt, prompts::default_profile(self.language)).await
    }

    /// One neutral sentence describing what the subject is doing.
    pub async fn describe(
        &self,
        credential: Option<&str>,
        frames: &[Snapshot],
    ) -> Result<String, AnalysisError> {
        let key = require_key(credential)?;
        if frames.is_empty() {
            return Ok(prompts::no_frames_for_description(self.language).to_string());
        }
        let fallback = || prompts::description_unavailable(self.language).to_string();

        let mut prompt = Prompt::text(prompts::frame_description(self.language));
        for frame in select_evenly_spaced(frames, self.description_frames) {
            match frame.to_base64_jpeg() {
                Ok(data) => prompt = prompt.with_jpeg(data),
                Err(e) => {
                    warn!(index = frame.index, error = %e, "could not encode frame");
                    return Ok(fallback());
                }
            }
        }
        info!(images = prompt.image_count(), "requesting video description");

        match self.model.generate(key, &prompt).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Ok(fallback())
                } else {
                    Ok(text.to_string())
                }
            }
            Err(e) => degrade(e).map(|()| fallback()),
        }
    }

    async fn profile(
        &self,
        key: &str,
        prompt: &Prompt,
        default: Profile,
    ) -> Result<Profile, AnalysisError> {
        match self.model.generate(key, prompt).await {
            Ok(raw) => Ok(validate(&raw, &default)),
            Err(e) => degrade(e).map(|()| default),
        }
    }
}

fn require_key(credential: Option<&str>) -> Result<&str, AnalysisError> {
    match credential.map(str::trim) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(AnalysisError::ApiKeyMissing),
    }
}

/// `Err` only for failures that must reach the user.
fn degrade(err: GeminiError) -> Result<(), AnalysisError> {
    match AnalysisError::from(err) {
        AnalysisError::InvalidApiKey => Err(AnalysisError::InvalidApiKey),
        other => {
            warn!(error = %other, "generative service failed, using fallback");
            Ok(())
        }
    }
}
