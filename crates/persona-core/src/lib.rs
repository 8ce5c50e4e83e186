//! persona-core — Big Five profile model and the pieces that do not touch
//! media or the network: response validation, prompt templates, credential
//! resolution and the session state machine.

pub mod credentials;
pub mod error;
pub mod language;
pub mod prompts;
pub mod request;
pub mod session;
pub mod types;
pub mod validate;

pub use credentials::{CredentialChain, CredentialProvider, FileCredentialStore};
pub use error::AnalysisError;
pub use language::Language;
pub use request::{AnalysisMode, AnalysisRequest, VideoUpload};
pub use session::{Accepted, Session, SessionState, SubmitError, Ticket};
pub use types::{AnalysisOutcome, BigFiveTrait, EmotionVector, FrameStats, Profile, TraitScore};
pub use validate::validate;
