//! Decode-and-validate step for untrusted language-model responses.
//!
//! The response text is never trusted to match the requested schema. Each
//! trait is checked independently and replaced by its default entry when it
//! fails, so the returned [`Profile`] is always complete.
//!
//! Scores are rounded to the nearest integer with ties away from zero
//! (`67.5 -> 68`).

use crate::types::{BigFiveTrait, Profile, TraitScore};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a whole response was discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponseRejection {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response JSON is not an object")]
    NotAnObject,
}

/// Why a single trait entry was discarded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraitRejection {
    #[error("trait missing from response")]
    Missing,
    #[error("trait value is not an object")]
    NotAnObject,
    #[error("score missing or not a number")]
    ScoreNotNumeric,
    #[error("score {0} outside [0, 100]")]
    ScoreOutOfRange(f64),
    #[error("explanation missing or not a string")]
    ExplanationNotString,
    #[error("explanation is blank")]
    ExplanationBlank,
}

/// Outcome of validating one response, including what was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub profile: Profile,
    pub response: Result<(), ResponseRejection>,
    pub rejected: Vec<(BigFiveTrait, TraitRejection)>,
}

impl Validation {
    /// True when every trait came from the response.
    pub fn is_complete(&self) -> bool {
        self.response.is_ok() && self.rejected.is_empty()
    }
}

/// Validate a raw response, falling back to `default` per invalid trait.
pub fn validate(raw: &str, default: &Profile) -> Profile {
    validate_detailed(raw, default).profile
}

/// Like [`validate`], but reports the individual rejections.
pub fn validate_detailed(raw: &str, default: &Profile) -> Validation {
    let object = match decode(raw) {
        Ok(object) => object,
        Err(rejection) => {
            tracing::warn!(error = %rejection, response = raw, "discarding language model response");
            return Validation {
                profile: default.clone(),
                response: Err(rejection),
                rejected: Vec::new(),
            };
        }
    };

    let mut profile = default.clone();
    let mut rejected = Vec::new();

    for t in BigFiveTrait::ALL {
        match check_trait(object.get(t.key())) {
            Ok(score) => profile.set(t, score),
            Err(reason) => {
                tracing::warn!(
                    trait_name = t.key(),
                    reason = %reason,
                    received = ?object.get(t.key()),
                    "invalid trait in response; using default"
                );
                rejected.push((t, reason));
            }
        }
    }

    Validation {
        profile,
        response: Ok(()),
        rejected,
    }
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };

    let tag_len = inner
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(inner.len());
    let body = inner[tag_len..].trim();
    if body.is_empty() {
        trimmed
    } else {
        body
    }
}

/// Parse the (possibly fenced) response into a JSON object.
pub fn decode(raw: &str) -> Result<Map<String, Value>, ResponseRejection> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ResponseRejection::InvalidJson(e.to_string()))?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(ResponseRejection::NotAnObject),
    }
}

/// Check one trait entry: `{ "score": 0..=100, "explanation": "non-blank" }`.
pub fn check_trait(value: Option<&Value>) -> Result<TraitScore, TraitRejection> {
    let entry = value
        .ok_or(TraitRejection::Missing)?
        .as_object()
        .ok_or(TraitRejection::NotAnObject)?;

    let score = entry
        .get("score")
        .and_then(Value::as_f64)
        .ok_or(TraitRejection::ScoreNotNumeric)?;
    if !(0.0..=100.0).contains(&score) {
        return Err(TraitRejection::ScoreOutOfRange(score));
    }

    let explanation = entry
        .get("explanation")
        .and_then(Value::as_str)
        .ok_or(TraitRejection::ExplanationNotString)?;
    if explanation.trim().is_empty() {
        return Err(TraitRejection::ExplanationBlank);
    }

    Ok(TraitScore::new(round_score(score), explanation))
}

/// Nearest integer, ties away from zero. Input must already be in [0, 100].
pub fn round_score(score: f64) -> u8 {
    score.round().clamp(0.0, 100.0) as u8
}
