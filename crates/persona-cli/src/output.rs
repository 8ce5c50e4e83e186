//! Terminal and JSON rendering of results and errors.

use chrono::{DateTime, Utc};
use persona_core::{AnalysisError, AnalysisMode, AnalysisOutcome, BigFiveTrait, Language};
use serde::Serialize;
use std::fmt::Write;
use uuid::Uuid;

const BAR_WIDTH: usize = 20;

/// Machine-readable result of one run.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub request_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub mode: AnalysisMode,
    pub language: Language,
    #[serde(flatten)]
    pub outcome: &'a AnalysisOutcome,
}

#[derive(Debug, Serialize)]
struct ErrorReport<'a> {
    error: &'static str,
    message: String,
    detail: &'a str,
}

pub fn trait_label(t: BigFiveTrait, language: Language) -> String {
    language.message(&format!("bigFive.{}.label", t.key()))
}

fn bar(score: u8) -> String {
    let filled = (usize::from(score.min(100)) * BAR_WIDTH + 50) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

/// Human-readable report: one scored bar per trait with its explanation.
pub fn render_text(outcome: &AnalysisOutcome, language: Language) -> String {
    let mut out = String::new();
    if let Some(description) = &outcome.description {
        let _ = writeln!(out, "{description}\n");
    }

    let width = BigFiveTrait::ALL
        .iter()
        .map(|t| trait_label(*t, language).chars().count())
        .max()
        .unwrap_or(0);
    for (t, score) in outcome.profile.iter() {
        let label = trait_label(t, language);
        let pad = width.saturating_sub(label.chars().count());
        let _ = writeln!(
            out,
            "{label}{:pad$}  {} {:>3}",
            "",
            bar(score.score),
            score.score
        );
        if !score.explanation.is_empty() {
            let _ = writeln!(out, "    {}", score.explanation);
        }
    }

    if let Some(stats) = outcome.frames {
        let _ = write!(out, "\nframes: {}/{} with a face", stats.with_face, stats.sampled);
        if let Some(emotions) = &outcome.emotions {
            let _ = write!(out, ", dominant {}", emotions.dominant());
        }
        out.push('\n');
    }
    out
}

pub fn render_json(report: &Report<'_>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Localized one-line error, with the technical detail when it adds anything.
pub fn render_error(err: &AnalysisError, language: Language) -> String {
    let title = language.message("error.title");
    let message = language.message(err.message_key());
    let detail = err.to_string();
    match err {
        AnalysisError::ApiKeyMissing
        | AnalysisError::InvalidApiKey
        | AnalysisError::NoFaceDetected
        | AnalysisError::UserInputEmpty
        | AnalysisError::ModelsNotLoaded => format!("{title}: {message}"),
        _ => format!("{title}: {message} ({detail})"),
    }
}

pub fn render_error_json(err: &AnalysisError, language: Language) -> serde_json::Result<String> {
    let detail = err.to_string();
    serde_json::to_string_pretty(&ErrorReport {
        error: err.message_key(),
        message: language.message(err.message_key()),
        detail: &detail,
    })
}
