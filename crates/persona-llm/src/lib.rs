//! persona-llm — turns emotion data, free text or frames into a Big Five
//! profile or a short description via the Gemini API.

pub mod gemini;
pub mod synthesizer;

pub use gemini::{GeminiClient, GeminiError, LanguageModel, Prompt, PromptPart};
pub use synthesizer::ProfileSynthesizer;
