use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-image emotion magnitudes as reported by the expression classifier.
///
/// Each component is a probability-like weight in [0, 1]. The components are
/// not required to sum to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmotionVector {
    pub neutral: f32,
    pub happy: f32,
    pub sad: f32,
    pub angry: f32,
    pub fearful: f32,
    pub disgusted: f32,
    pub surprised: f32,
}

impl EmotionVector {
    /// Component names in canonical order.
    pub const LABELS: [&'static str; 7] = [
        "neutral",
        "happy",
        "sad",
        "angry",
        "fearful",
        "disgusted",
        "surprised",
    ];

    /// Components in the same order as [`LABELS`](Self::LABELS).
    pub fn components(&self) -> [f32; 7] {
        [
            self.neutral,
            self.happy,
            self.sad,
            self.angry,
            self.fearful,
            self.disgusted,
            self.surprised,
        ]
    }

    pub fn from_components(c: [f32; 7]) -> Self {
        Self {
            neutral: c[0],
            happy: c[1],
            sad: c[2],
            angry: c[3],
            fearful: c[4],
            disgusted: c[5],
            surprised: c[6],
        }
    }

    /// Component-wise arithmetic mean. Returns `None` for an empty slice.
    pub fn average(vectors: &[EmotionVector]) -> Option<EmotionVector> {
        if vectors.is_empty() {
            return None;
        }

        let mut sums = [0.0f64; 7];
        for v in vectors {
            for (sum, c) in sums.iter_mut().zip(v.components()) {
                *sum += c as f64;
            }
        }

        let n = vectors.len() as f64;
        Some(Self::from_components(sums.map(|s| (s / n) as f32)))
    }

    /// Render as `neutral: 12.3%, happy: 80.0%, ...` for prompt embedding.
    pub fn summary(&self) -> String {
        Self::LABELS
            .iter()
            .zip(self.components())
            .map(|(label, value)| format!("{label}: {:.1}%", value * 100.0))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Label of the strongest component.
    pub fn dominant(&self) -> &'static str {
        let mut best = 0;
        let c = self.components();
        for i in 1..c.len() {
            if c[i] > c[best] {
                best = i;
            }
        }
        Self::LABELS[best]
    }
}

/// One of the five Big Five dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BigFiveTrait {
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
}

impl BigFiveTrait {
    /// Fixed order used for validation and display.
    pub const ALL: [BigFiveTrait; 5] = [
        BigFiveTrait::Openness,
        BigFiveTrait::Conscientiousness,
        BigFiveTrait::Extraversion,
        BigFiveTrait::Agreeableness,
        BigFiveTrait::Neuroticism,
    ];

    /// JSON key used by the language model response.
    pub fn key(self) -> &'static str {
        match self {
            BigFiveTrait::Openness => "openness",
            BigFiveTrait::Conscientiousness => "conscientiousness",
            BigFiveTrait::Extraversion => "extraversion",
            BigFiveTrait::Agreeableness => "agreeableness",
            BigFiveTrait::Neuroticism => "neuroticism",
        }
    }
}

impl fmt::Display for BigFiveTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Integer score in [0, 100] with a short justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitScore {
    pub score: u8,
    pub explanation: String,
}

impl TraitScore {
    pub const NEUTRAL_SCORE: u8 = 50;

    pub fn new(score: u8, explanation: impl Into<String>) -> Self {
        Self {
            score: score.min(100),
            explanation: explanation.into(),
        }
    }
}

/// A complete Big Five profile. Always holds all five traits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub openness: TraitScore,
    pub conscientiousness: TraitScore,
    pub extraversion: TraitScore,
    pub agreeableness: TraitScore,
    pub neuroticism: TraitScore,
}

impl Profile {
    /// Every trait at the neutral score with the same placeholder explanation.
    pub fn neutral(explanation: &str) -> Self {
        let entry = || TraitScore::new(TraitScore::NEUTRAL_SCORE, explanation);
        Self {
            openness: entry(),
            conscientiousness: entry(),
            extraversion: entry(),
            agreeableness: entry(),
            neuroticism: entry(),
        }
    }

    pub fn get(&self, t: BigFiveTrait) -> &TraitScore {
        match t {
            BigFiveTrait::Openness => &self.openness,
            BigFiveTrait::Conscientiousness => &self.conscientiousness,
            BigFiveTrait::Extraversion => &self.extraversion,
            BigFiveTrait::Agreeableness => &self.agreeableness,
            BigFiveTrait::Neuroticism => &self.neuroticism,
        }
    }

    pub(crate) fn set(&mut self, t: BigFiveTrait, score: TraitScore) {
        let slot = match t {
            BigFiveTrait::Openness => &mut self.openness,
            BigFiveTrait::Conscientiousness => &mut self.conscientiousness,
            BigFiveTrait::Extraversion => &mut self.extraversion,
            BigFiveTrait::Agreeableness => &mut self.agreeableness,
            BigFiveTrait::Neuroticism => &mut self.neuroticism,
        };
        *slot = score;
    }

    /// Traits in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (BigFiveTrait, &TraitScore)> {
        BigFiveTrait::ALL.into_iter().map(move |t| (t, self.get(t)))
    }
}

/// Result of one completed analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub profile: Profile,
    /// One-sentence description of the subject (video runs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Mean emotion vector the profile was derived from (video runs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotions: Option<EmotionVector>,
    /// Frames captured / frames with a detected face (video runs only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<FrameStats>,
}

impl AnalysisOutcome {
    pub fn from_text(profile: Profile) -> Self {
        Self {
            profile,
            description: None,
            emotions: None,
            frames: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub sampled: usize,
    pub with_face: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(v: f32) -> EmotionVector {
        EmotionVector::from_components([v; 7])
    }

    #[test]
    fn test_average_single_vector_unchanged() {
        let v = EmotionVector {
            neutral: 0.1,
            happy: 0.7,
            sad: 0.05,
            angry: 0.0,
            fearful: 0.02,
            disgusted: 0.03,
            surprised: 0.1,
        };
        assert_eq!(EmotionVector::average(&[v]), Some(v));
    }

    #[test]
    fn test_average_componentwise_mean() {
        let a = EmotionVector { happy: 1.0, sad: 0.2, ..Default::default() };
        let b = EmotionVector { happy: 0.0, sad: 0.4, neutral: 0.6, ..Default::default() };
        let avg = EmotionVector::average(&[a, b]).unwrap();
        assert!((avg.happy - 0.5).abs() < 1e-6);
        assert!((avg.sad - 0.3).abs() < 1e-6);
        assert!((avg.neutral - 0.3).abs() < 1e-6);
        assert_eq!(avg.angry, 0.0);
    }

    #[test]
    fn test_average_is_unweighted() {
        let avg = EmotionVector::average(&[vector(0.0), vector(0.0), vector(0.9)]).unwrap();
        for c in avg.components() {
            assert!((c - 0.3).abs() < 1e-6);
        }
    }

    #[test]
    fn test_average_empty() {
        assert_eq!(EmotionVector::average(&[]), None);
    }

    #[test]
    fn test_summary_format() {
        let v = EmotionVector { neutral: 0.123, happy: 0.8, ..Default::default() };
        let s = v.summary();
        assert!(s.starts_with("neutral: 12.3%, happy: 80.0%, sad: 0.0%"), "{s}");
        assert!(s.ends_with("surprised: 0.0%"), "{s}");
    }

    #[test]
    fn test_dominant() {
        let v = EmotionVector { neutral: 0.2, surprised: 0.6, ..Default::default() };
        assert_eq!(v.dominant(), "surprised");
    }

    #[test]
    fn test_neutral_profile_has_five_traits() {
        let p = Profile::neutral("n/a");
        assert_eq!(p.iter().count(), 5);
        assert!(p.iter().all(|(_, s)| s.score == 50 && s.explanation == "n/a"));
    }

    #[test]
    fn test_profile_serializes_exact_keys() {
        let json = serde_json::to_value(Profile::neutral("x")).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        for t in BigFiveTrait::ALL {
            assert_eq!(obj[t.key()]["score"], 50);
        }
    }
}
