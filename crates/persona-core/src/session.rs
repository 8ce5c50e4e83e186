//! Application state machine.
//!
//! ```text
//! Initializing ──models ok──▶ Idle ──submit──▶ Processing ──ok──▶ Done
//!      │                       ▲                    │               │
//!      └──models failed──▶ Error ◀──────failed──────┘               │
//!                              └──────────reset──────▶ Idle ◀─reset─┘
//! ```
//!
//! At most one request is in flight. Completions carry the [`Ticket`] they
//! answer; a completion arriving after a reset is discarded.

use crate::credentials::CredentialProvider;
use crate::error::AnalysisError;
use crate::request::{AnalysisMode, AnalysisRequest};
use crate::types::AnalysisOutcome;
use crate::Language;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Identifies one accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(Uuid);

impl Ticket {
    fn next() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Initializing,
    Idle,
    Processing { ticket: Ticket },
    Done,
    Error(AnalysisError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Idle => "idle",
            SessionState::Processing { .. } => "processing",
            SessionState::Done => "done",
            SessionState::Error(_) => "error",
        }
    }
}

/// Why a submission or mode switch was not accepted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("an analysis is already in progress")]
    Busy,
    #[error("session is {0}; reset before submitting")]
    NotReady(&'static str),
    /// The session moved to the Error state.
    #[error("{0}")]
    Failed(AnalysisError),
}

/// A submission accepted into the Processing state.
#[derive(Debug, Clone)]
pub struct Accepted {
    pub ticket: Ticket,
    pub request: Arc<AnalysisRequest>,
    pub credential: String,
}

pub struct Session {
    state: SessionState,
    mode: AnalysisMode,
    language: Language,
    credentials: Arc<dyn CredentialProvider>,
    models_ready: bool,
    request: Option<Arc<AnalysisRequest>>,
    outcome: Option<AnalysisOutcome>,
}

impl Session {
    /// Start a session. Video mode begins in Initializing until the models
    /// report ready.
    pub fn new(credentials: Arc<dyn CredentialProvider>, mode: AnalysisMode, language: Language) -> Self {
        let state = match mode {
            AnalysisMode::Video => SessionState::Initializing,
            AnalysisMode::Text => SessionState::Idle,
        };
        Self {
            state,
            mode,
            language,
            credentials,
            models_ready: false,
            request: None,
            outcome: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn outcome(&self) -> Option<&AnalysisOutcome> {
        self.outcome.as_ref()
    }

    /// The in-flight or most recently analyzed request.
    pub fn request(&self) -> Option<&AnalysisRequest> {
        self.request.as_deref()
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.credential().is_some()
    }

    /// Whether the caller should start a model preload.
    pub fn needs_models(&self) -> bool {
        self.mode == AnalysisMode::Video && !self.models_ready
    }

    /// Report the result of a model preload.
    pub fn models_loaded(&mut self, result: Result<(), AnalysisError>) {
        match result {
            Ok(()) => {
                self.models_ready = true;
                if self.state == SessionState::Initializing {
                    self.transition(SessionState::Idle);
                }
            }
            Err(err) => {
                self.models_ready = false;
                if matches!(self.state, SessionState::Initializing | SessionState::Idle) {
                    self.transition(SessionState::Error(err));
                }
            }
        }
    }

    /// Switch between video and text analysis. Only allowed while Idle.
    pub fn switch_mode(&mut self, mode: AnalysisMode) -> Result<(), SubmitError> {
        if self.state != SessionState::Idle {
            return Err(SubmitError::NotReady(self.state.name()));
        }
        self.mode = mode;
        if self.needs_models() {
            self.transition(SessionState::Initializing);
        }
        Ok(())
    }

    /// Accept a request for processing.
    ///
    /// Without a credential, or with input that fails local checks, the
    /// session moves straight to Error and no service is contacted. A video
    /// request arriving before the models are loaded is not accepted: the
    /// session switches to video mode and goes back to Initializing.
    pub fn submit(&mut self, request: AnalysisRequest) -> Result<Accepted, SubmitError> {
        match &self.state {
            SessionState::Idle => {}
            SessionState::Processing { .. } => return Err(SubmitError::Busy),
            other => return Err(SubmitError::NotReady(other.name())),
        }

        let Some(credential) = self.credentials.credential() else {
            return Err(self.fail(AnalysisError::ApiKeyMissing));
        };
        if let Err(err) = request.check() {
            return Err(self.fail(err));
        }
        if request.mode() == AnalysisMode::Video && !self.models_ready {
            // The caller starts a preload and resubmits once Idle again.
            self.mode = AnalysisMode::Video;
            self.transition(SessionState::Initializing);
            return Err(SubmitError::NotReady(self.state.name()));
        }

        self.mode = request.mode();
        self.outcome = None;
        let request = Arc::new(request);
        self.request = Some(Arc::clone(&request));
        let ticket = Ticket::next();
        self.transition(SessionState::Processing { ticket });

        Ok(Accepted {
            ticket,
            request,
            credential,
        })
    }

    /// Deliver the result for `ticket`. Returns false if it was superseded.
    pub fn complete(&mut self, ticket: Ticket, result: Result<AnalysisOutcome, AnalysisError>) -> bool {
        if self.state != (SessionState::Processing { ticket }) {
            tracing::debug!(%ticket, state = self.state.name(), "discarding stale completion");
            return false;
        }
        match result {
            Ok(outcome) => {
                self.outcome = Some(outcome);
                self.transition(SessionState::Done);
            }
            Err(err) => self.transition(SessionState::Error(err)),
        }
        true
    }

    /// Return to Idle, dropping the last result and any transient media held
    /// by the last request. An in-flight request is abandoned, not aborted.
    pub fn reset(&mut self) {
        if self.state == SessionState::Initializing {
            return;
        }
        self.outcome = None;
        if let Some(request) = self.request.take() {
            if let AnalysisRequest::Video(upload) = request.as_ref() {
                tracing::debug!(transient = upload.is_transient(), "releasing video upload");
            }
        }
        let next = if self.needs_models() {
            SessionState::Initializing
        } else {
            SessionState::Idle
        };
        self.transition(next);
    }

    /// Localized status line for the current state.
    pub fn status_message(&self) -> String {
        let key = match &self.state {
            SessionState::Initializing => "status.initializing",
            SessionState::Idle => "status.ready",
            SessionState::Processing { .. } => "status.processing",
            SessionState::Done => "status.analysisComplete",
            SessionState::Error(err) => {
                return format!(
                    "{}: {}",
                    self.language.message("error.title"),
                    self.language.message(err.message_key())
                )
            }
        };
        self.language.message(key)
    }

    fn fail(&mut self, err: AnalysisError) -> SubmitError {
        self.transition(SessionState::Error(err.clone()));
        SubmitError::Failed(err)
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(from = self.state.name(), to = next.name(), "session transition");
        if let SessionState::Error(err) = &next {
            tracing::warn!(key = err.message_key(), error = %err, "session error");
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InjectedCredential;
    use crate::prompts::default_profile;
    use crate::request::VideoUpload;

    fn session(key: Option<&str>, mode: AnalysisMode) -> Session {
        let creds = Arc::new(InjectedCredential::new(key.map(str::to_string)));
        Session::new(creds, mode, Language::En)
    }

    fn outcome() -> AnalysisOutcome {
        AnalysisOutcome::from_text(default_profile(Language::En))
    }

    #[test]
    fn test_text_mode_starts_idle() {
        assert_eq!(session(Some("k"), AnalysisMode::Text).state(), &SessionState::Idle);
    }

    #[test]
    fn test_video_mode_initializes_until_models_ready() {
        let mut s = session(Some("k"), AnalysisMode::Video);
        assert_eq!(s.state(), &SessionState::Initializing);
        assert!(s.needs_models());
        assert!(matches!(
            s.submit(AnalysisRequest::Text("hi".into())),
            Err(SubmitError::NotReady("initializing"))
        ));
        s.models_loaded(Ok(()));
        assert_eq!(s.state(), &SessionState::Idle);
        assert!(!s.needs_models());
    }

    #[test]
    fn test_model_load_failure() {
        let mut s = session(Some("k"), AnalysisMode::Video);
        s.models_loaded(Err(AnalysisError::ModelLoadFailed("404".into())));
        assert!(matches!(s.state(), SessionState::Error(AnalysisError::ModelLoadFailed(_))));

        // reset goes back through Initializing since models are still missing
        s.reset();
        assert_eq!(s.state(), &SessionState::Initializing);
    }

    #[test]
    fn test_submit_without_credential_errors() {
        let mut s = session(None, AnalysisMode::Text);
        let err = s.submit(AnalysisRequest::Text("about me".into())).unwrap_err();
        assert_eq!(err, SubmitError::Failed(AnalysisError::ApiKeyMissing));
        assert_eq!(s.state(), &SessionState::Error(AnalysisError::ApiKeyMissing));
        assert!(s.request().is_none());
    }

    #[test]
    fn test_submit_empty_text_errors() {
        let mut s = session(Some("k"), AnalysisMode::Text);
        let err = s.submit(AnalysisRequest::Text("   ".into())).unwrap_err();
        assert_eq!(err, SubmitError::Failed(AnalysisError::UserInputEmpty));
    }

    #[test]
    fn test_submit_non_video_errors() {
        let mut s = session(Some("k"), AnalysisMode::Text);
        let req = AnalysisRequest::Video(VideoUpload::from_path("a.txt", None));
        assert!(matches!(
            s.submit(req),
            Err(SubmitError::Failed(AnalysisError::InvalidMediaType(_)))
        ));
    }

    #[test]
    fn test_happy_path_and_reset() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        let accepted = s.submit(AnalysisRequest::Text("about me".into())).unwrap();
        assert_eq!(accepted.credential, "key");
        assert_eq!(s.state(), &SessionState::Processing { ticket: accepted.ticket });

        assert!(s.complete(accepted.ticket, Ok(outcome())));
        assert_eq!(s.state(), &SessionState::Done);
        assert!(s.outcome().is_some());
        assert!(s.request().is_some());

        s.reset();
        assert_eq!(s.state(), &SessionState::Idle);
        assert!(s.outcome().is_none());
        assert!(s.request().is_none());
    }

    #[test]
    fn test_concurrent_submission_rejected() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        s.submit(AnalysisRequest::Text("first".into())).unwrap();
        assert_eq!(
            s.submit(AnalysisRequest::Text("second".into())).unwrap_err(),
            SubmitError::Busy
        );
    }

    #[test]
    fn test_failure_then_reset() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        let accepted = s.submit(AnalysisRequest::Text("x".into())).unwrap();
        s.complete(accepted.ticket, Err(AnalysisError::InvalidApiKey));
        assert_eq!(s.state(), &SessionState::Error(AnalysisError::InvalidApiKey));
        assert!(s.status_message().contains("rejected"));

        assert!(matches!(
            s.submit(AnalysisRequest::Text("y".into())),
            Err(SubmitError::NotReady("error"))
        ));
        s.reset();
        assert_eq!(s.state(), &SessionState::Idle);
    }

    #[test]
    fn test_stale_completion_discarded_after_reset() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        let first = s.submit(AnalysisRequest::Text("x".into())).unwrap();
        s.reset();
        let second = s.submit(AnalysisRequest::Text("y".into())).unwrap();

        assert!(!s.complete(first.ticket, Ok(outcome())));
        assert_eq!(s.state(), &SessionState::Processing { ticket: second.ticket });
        assert!(s.complete(second.ticket, Err(AnalysisError::NoFaceDetected)));
    }

    #[test]
    fn test_reset_releases_transient_upload() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        s.models_loaded(Ok(()));
        let upload = VideoUpload::from_bytes(b"fake", "video/mp4").unwrap();
        let path = upload.path().to_path_buf();

        let accepted = s.submit(AnalysisRequest::Video(upload)).unwrap();
        assert_eq!(s.mode(), AnalysisMode::Video);
        drop(accepted);
        assert!(path.exists());

        s.reset();
        assert!(!path.exists());
    }

    #[test]
    fn test_video_submit_without_models_waits_for_preload() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        let upload = VideoUpload::from_path("clip.mp4", None);

        let err = s.submit(AnalysisRequest::Video(upload)).unwrap_err();
        assert_eq!(err, SubmitError::NotReady("initializing"));
        assert_eq!(s.state(), &SessionState::Initializing);
        assert_eq!(s.mode(), AnalysisMode::Video);
        assert!(s.needs_models());
        assert!(s.request().is_none());

        s.models_loaded(Ok(()));
        let accepted = s
            .submit(AnalysisRequest::Video(VideoUpload::from_path("clip.mp4", None)))
            .unwrap();
        assert_eq!(s.state(), &SessionState::Processing { ticket: accepted.ticket });
    }

    #[test]
    fn test_switch_mode_only_when_idle() {
        let mut s = session(Some("key"), AnalysisMode::Text);
        s.switch_mode(AnalysisMode::Video).unwrap();
        assert_eq!(s.state(), &SessionState::Initializing);
        assert!(s.switch_mode(AnalysisMode::Text).is_err());
        s.models_loaded(Ok(()));
        s.switch_mode(AnalysisMode::Text).unwrap();
        s.switch_mode(AnalysisMode::Video).unwrap();
        assert_eq!(s.state(), &SessionState::Idle);
    }
}
