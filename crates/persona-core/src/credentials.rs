//! API credential resolution.
//!
//! Sources are consulted in order and the first non-empty value wins:
//! environment variables, values injected by the caller, then the
//! user-entered key persisted in `credentials.toml`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;

/// Environment variables checked for a key, in priority order.
pub const ENV_VARS: [&str; 4] = ["GEMINI_API_KEY", "API_KEY", "VITE_GEMINI_API_KEY", "VITE_API_KEY"];

const CREDENTIAL_FILE: &str = "credentials.toml";

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file {path} is malformed: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to encode credential file: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("refusing to store an empty API key")]
    Empty,
}

/// Something that can supply the generative-service API key.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads the key from environment variables.
pub struct EnvCredentials {
    vars: Vec<String>,
}

impl EnvCredentials {
    pub fn new(vars: &[&str]) -> Self {
        Self {
            vars: vars.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(&ENV_VARS)
    }
}

impl CredentialProvider for EnvCredentials {
    fn credential(&self) -> Option<String> {
        self.vars
            .iter()
            .find_map(|var| non_empty(std::env::var(var).ok()))
    }
}

/// A value injected by the caller (configuration or command-line flag).
pub struct InjectedCredential(Option<String>);

impl InjectedCredential {
    pub fn new(value: Option<String>) -> Self {
        Self(non_empty(value))
    }
}

impl CredentialProvider for InjectedCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// On-disk layout of `credentials.toml`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    gemini_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
}

/// User-entered key persisted under the data directory.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CREDENTIAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored key. A missing file is not an error.
    pub fn load(&self) -> Result<Option<String>, CredentialError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let file: CredentialFile = toml::from_str(&text).map_err(|source| CredentialError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(non_empty(file.gemini_api_key).or_else(|| non_empty(file.api_key)))
    }

    pub fn save(&self, key: &str) -> Result<(), CredentialError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(CredentialError::Empty);
        }
        let io_err = |source| CredentialError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(io_err)?;
        }
        let body = toml::to_string(&CredentialFile {
            gemini_api_key: Some(key.to_string()),
            api_key: None,
        })?;
        std::fs::write(&self.path, body).map_err(io_err)?;
        restrict_permissions(&self.path);
        tracing::info!(path = %self.path.display(), fingerprint = %fingerprint(key), "stored API key");
        Ok(())
    }

    /// Remove the stored key. Returns whether a file was removed.
    pub fn clear(&self) -> Result<bool, CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CredentialError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

impl CredentialProvider for FileCredentialStore {
    fn credential(&self) -> Option<String> {
        match self.load() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable credential file");
                None
            }
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        tracing::warn!(error = %e, "could not restrict credential file permissions");
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}

/// Ordered chain of providers with change notification.
///
/// The resolved value is cached; [`refresh`](Self::refresh) re-resolves it and
/// notifies subscribers when it changed.
pub struct CredentialChain {
    sources: Vec<Box<dyn CredentialProvider>>,
    current: watch::Sender<Option<String>>,
}

impl CredentialChain {
    pub fn new(sources: Vec<Box<dyn CredentialProvider>>) -> Self {
        let initial = resolve(&sources);
        let (current, _) = watch::channel(initial);
        Self { sources, current }
    }

    /// Re-resolve the credential. Returns true if the value changed.
    pub fn refresh(&self) -> bool {
        let resolved = resolve(&self.sources);
        self.current.send_if_modified(|value| {
            if *value == resolved {
                false
            } else {
                *value = resolved;
                true
            }
        })
    }

    /// Receive every change of the resolved credential.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }

    /// Poll the credential file for modifications and re-resolve on change.
    ///
    /// Covers keys written by another `persona` process while a session runs.
    pub fn spawn_file_watcher(
        self: Arc<Self>,
        store: FileCredentialStore,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut last = store.modified();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = store.modified();
                if now != last {
                    last = now;
                    if self.refresh() {
                        tracing::info!(path = %store.path().display(), "credential changed on disk");
                    }
                }
            }
        })
    }
}

impl CredentialProvider for CredentialChain {
    fn credential(&self) -> Option<String> {
        self.current.borrow().clone()
    }
}

fn resolve(sources: &[Box<dyn CredentialProvider>]) -> Option<String> {
    sources.iter().find_map(|s| non_empty(s.credential()))
}

/// Short SHA-256 fingerprint for logging a key without revealing it.
pub fn fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.trim().as_bytes());
    digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        assert_eq!(store.load().unwrap(), None);

        store.save("  AIzaTestKey  ").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("AIzaTestKey"));

        assert!(store.clear().unwrap());
        assert!(!store.clear().unwrap());
        assert_eq!(store.credential(), None);
    }

    #[test]
    fn test_store_rejects_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        assert!(matches!(store.save("   "), Err(CredentialError::Empty)));
    }

    #[test]
    fn test_store_reads_legacy_key_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CREDENTIAL_FILE), "api_key = \"legacy\"\n").unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        assert_eq!(store.load().unwrap().as_deref(), Some("legacy"));
    }

    #[test]
    fn test_store_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CREDENTIAL_FILE), "gemini_api_key = ").unwrap();
        let store = FileCredentialStore::in_dir(dir.path());
        assert!(matches!(store.load(), Err(CredentialError::Parse { .. })));
        assert_eq!(store.credential(), None);
    }

    #[test]
    fn test_chain_first_non_empty_wins() {
        let chain = CredentialChain::new(vec![
            Box::new(InjectedCredential::new(Some("   ".into()))),
            Box::new(InjectedCredential::new(None)),
            Box::new(InjectedCredential::new(Some("second".into()))),
            Box::new(InjectedCredential::new(Some("third".into()))),
        ]);
        assert_eq!(chain.credential().as_deref(), Some("second"));
    }

    #[test]
    fn test_env_credentials_unset_vars() {
        let env = EnvCredentials::new(&["PERSONA_TEST_SURELY_UNSET_VAR_1", "PERSONA_TEST_SURELY_UNSET_VAR_2"]);
        assert_eq!(env.credential(), None);
    }

    #[test]
    fn test_chain_refresh_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let chain = CredentialChain::new(vec![
            Box::new(InjectedCredential::new(None)),
            Box::new(FileCredentialStore::in_dir(dir.path())),
        ]);
        let mut rx = chain.subscribe();
        assert_eq!(chain.credential(), None);
        assert!(!chain.refresh());

        FileCredentialStore::in_dir(dir.path()).save("fresh").unwrap();
        assert!(chain.refresh());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("fresh"));
        assert_eq!(chain.credential().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_file_watcher_picks_up_new_key() {
        let dir = tempfile::tempdir().unwrap();
        let chain = Arc::new(CredentialChain::new(vec![Box::new(FileCredentialStore::in_dir(
            dir.path(),
        ))]));
        let mut rx = chain.subscribe();
        let watcher = Arc::clone(&chain)
            .spawn_file_watcher(FileCredentialStore::in_dir(dir.path()), Duration::from_millis(10));

        FileCredentialStore::in_dir(dir.path()).save("written-elsewhere").unwrap();
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("watcher never noticed the file")
            .unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some("written-elsewhere"));
        assert_eq!(chain.credential().as_deref(), Some("written-elsewhere"));
        watcher.abort();
    }

    #[test]
    fn test_fingerprint_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint(" abc "));
        assert_eq!(fingerprint("abc").len(), 12);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
