use persona_core::credentials::FileCredentialStore;
use persona_core::Language;
use persona_vision::ModelStore;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded from `PERSONA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the ONNX model bundles.
    pub model_dir: PathBuf,
    /// Mirror replacing each bundle's default download location.
    pub model_base_url: Option<String>,
    /// Download missing bundles before loading them.
    pub model_auto_fetch: bool,
    /// Directory holding `credentials.toml`.
    pub data_dir: PathBuf,
    pub language: Language,
    pub gemini_model: String,
    pub gemini_base_url: String,
    /// Frames captured per second of video.
    pub fps: f64,
    /// Longest accepted video, in seconds.
    pub max_duration_secs: f64,
    /// Frames sent with the description request.
    pub description_frames: usize,
    pub http_timeout_secs: u64,
    /// Injected API key (`PERSONA_API_KEY`).
    pub api_key: Option<String>,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("PERSONA_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| {
            var("XDG_DATA_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| {
                    let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                    PathBuf::from(home).join(".local/share")
                })
                .join("persona")
        });

        let model_dir = var("PERSONA_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("models"));

        let language = match var("PERSONA_LANGUAGE") {
            Some(code) => code.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring PERSONA_LANGUAGE");
                Language::default()
            }),
            None => Language::default(),
        };

        Self {
            model_dir,
            model_base_url: var("PERSONA_MODEL_BASE_URL").filter(|v| !v.trim().is_empty()),
            model_auto_fetch: var("PERSONA_MODEL_AUTO_FETCH")
                .map(|v| v != "0")
                .unwrap_or(true),
            data_dir,
            language,
            gemini_model: var("PERSONA_GEMINI_MODEL")
                .unwrap_or_else(|| persona_llm::gemini::DEFAULT_MODEL.to_string()),
            gemini_base_url: var("PERSONA_GEMINI_BASE_URL")
                .unwrap_or_else(|| persona_llm::gemini::DEFAULT_BASE_URL.to_string()),
            fps: env_parse(&var, "PERSONA_FPS", persona_media::sampler::DEFAULT_FPS),
            max_duration_secs: env_parse(
                &var,
                "PERSONA_MAX_DURATION_SECS",
                persona_media::sampler::DEFAULT_MAX_DURATION_SECS,
            ),
            description_frames: env_parse(
                &var,
                "PERSONA_DESCRIPTION_FRAMES",
                persona_llm::synthesizer::DEFAULT_DESCRIPTION_FRAMES,
            ),
            http_timeout_secs: env_parse(
                &var,
                "PERSONA_HTTP_TIMEOUT_SECS",
                persona_llm::gemini::DEFAULT_TIMEOUT.as_secs(),
            ),
            api_key: var("PERSONA_API_KEY").filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn model_store(&self) -> ModelStore {
        ModelStore::new(&self.model_dir, self.model_base_url.clone())
    }

    pub fn credential_store(&self) -> FileCredentialStore {
        FileCredentialStore::in_dir(&self.data_dir)
    }
}

fn env_parse<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
