//! Model bundles: where they live, how they are fetched, and the service that
//! loads them at most once.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::engine::{spawn_engine, EngineHandle};
use crate::error::ModelError;
use crate::pipeline::OnnxPipeline;

/// One named model file and its default download location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelBundle {
    pub name: &'static str,
    pub file: &'static str,
    pub url: &'static str,
}

pub const DETECTOR: ModelBundle = ModelBundle {
    name: "detector",
    file: "det_10g.onnx",
    url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/det_10g.onnx",
};

pub const LANDMARKS: ModelBundle = ModelBundle {
    name: "landmarks",
    file: "2d106det.onnx",
    url: "https://huggingface.co/public-data/insightface/resolve/main/models/buffalo_l/2d106det.onnx",
};

pub const EXPRESSION: ModelBundle = ModelBundle {
    name: "expression",
    file: "emotion-ferplus-8.onnx",
    url: "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/emotion_ferplus/model/emotion-ferplus-8.onnx",
};

/// Every bundle the expression pipeline needs. Loading is all-or-nothing.
pub const BUNDLES: [ModelBundle; 3] = [DETECTOR, LANDMARKS, EXPRESSION];

/// On-disk state of one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleStatus {
    pub bundle: ModelBundle,
    pub path: PathBuf,
    /// File size, `None` when absent.
    pub bytes: Option<u64>,
}

/// Local model directory plus the remote it is filled from.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
    base_url: Option<String>,
}

impl ModelStore {
    /// `base_url` replaces every bundle's default location with
    /// `{base_url}/{file}`.
    pub fn new(dir: impl Into<PathBuf>, base_url: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.filter(|u| !u.trim().is_empty()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, bundle: &ModelBundle) -> PathBuf {
        self.dir.join(bundle.file)
    }

    pub fn url(&self, bundle: &ModelBundle) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), bundle.file),
            None => bundle.url.to_string(),
        }
    }

    pub fn status(&self) -> Vec<BundleStatus> {
        BUNDLES
            .iter()
            .map(|bundle| {
                let path = self.path(bundle);
                let bytes = std::fs::metadata(&path).ok().filter(|m| m.is_file()).map(|m| m.len());
                BundleStatus {
                    bundle: *bundle,
                    path,
                    bytes,
                }
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.status().iter().all(|s| s.bytes.is_some())
    }

    /// Download every missing bundle (or every bundle when `force`).
    /// Returns the paths written.
    pub async fn fetch(
        &self,
        client: &reqwest::Client,
        force: bool,
    ) -> Result<Vec<PathBuf>, ModelError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;

        let mut written = Vec::new();
        for status in self.status() {
            if status.bytes.is_some() && !force {
                debug!(bundle = status.bundle.name, "model already present");
                continue;
            }
            let url = self.url(&status.bundle);
            download(client, &url, &status.path).await?;
            written.push(status.path);
        }
        Ok(written)
    }
}

/// Stream `url` into `dest` through a `.part` file so a failed transfer
/// never leaves a truncated model behind.
async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> Result<(), ModelError> {
    let fail = |message: String| ModelError::Download {
        url: url.to_string(),
        message,
    };

    info!(url, path = %dest.display(), "downloading model");
    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| fail(e.to_string()))?;

    let part = dest.with_extension("onnx.part");
    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| io_error(&part, e))?;

    let mut total = 0u64;
    let result: Result<(), ModelError> = async {
        while let Some(chunk) = response.chunk().await.map_err(|e| fail(e.to_string()))? {
            file.write_all(&chunk).await.map_err(|e| io_error(&part, e))?;
            total += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| io_error(&part, e))?;
        if total == 0 {
            return Err(fail("empty response body".to_string()));
        }
        Ok(())
    }
    .await;

    drop(file);
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e);
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| io_error(dest, e))?;
    info!(path = %dest.display(), bytes = total, "model downloaded");
    Ok(())
}

fn io_error(path: &Path, err: std::io::Error) -> ModelError {
    ModelError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

type LoadResult = Result<EngineHandle, ModelError>;
type SharedLoad = Shared<BoxFuture<'static, LoadResult>>;
type Loader = Arc<dyn Fn() -> BoxFuture<'static, LoadResult> + Send + Sync>;

enum LoadState {
    Unloaded,
    Loading(SharedLoad),
    Loaded(EngineHandle),
    Failed(ModelError),
}

struct Slot {
    /// Bumped on every new load attempt so a stale completion cannot
    /// overwrite a newer attempt's state.
    generation: u64,
    state: LoadState,
}

/// Owns the loaded model engine.
///
/// `ensure_loaded` hands every concurrent caller the same in-flight load;
/// once it resolves the engine is shared read-only. A failed load leaves the
/// service retryable.
pub struct ModelService {
    loader: Loader,
    slot: Mutex<Slot>,
}

impl ModelService {
    /// Service that loads the ONNX bundles from `store`, downloading missing
    /// files first when `auto_fetch` is set.
    pub fn new(store: ModelStore, client: reqwest::Client, auto_fetch: bool) -> Self {
        Self::with_loader(move || {
            let store = store.clone();
            let client = client.clone();
            async move {
                if auto_fetch {
                    store.fetch(&client, false).await?;
                }
                let pipeline = tokio::task::spawn_blocking(move || OnnxPipeline::load(&store))
                    .await
                    .map_err(|e| ModelError::EngineSpawn(e.to_string()))??;
                spawn_engine(pipeline)
            }
            .boxed()
        })
    }

    /// Service driven by an arbitrary loader.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, LoadResult> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            slot: Mutex::new(Slot {
                generation: 0,
                state: LoadState::Unloaded,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The engine, if loading has completed.
    pub fn handle(&self) -> Option<EngineHandle> {
        match &self.lock().state {
            LoadState::Loaded(handle) => Some(handle.clone()),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle().is_some()
    }

    pub fn state_name(&self) -> &'static str {
        match &self.lock().state {
            LoadState::Unloaded => "unloaded",
            LoadState::Loading(_) => "loading",
            LoadState::Loaded(_) => "loaded",
            LoadState::Failed(_) => "failed",
        }
    }

    /// Last load failure, if the most recent attempt failed.
    pub fn last_error(&self) -> Option<ModelError> {
        match &self.lock().state {
            LoadState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Load the models, or join a load already in flight.
    pub async fn ensure_loaded(&self) -> LoadResult {
        let (generation, pending) = {
            let mut slot = self.lock();
            let in_flight = match &slot.state {
                LoadState::Loaded(handle) => return Ok(handle.clone()),
                LoadState::Loading(pending) => Some(pending.clone()),
                LoadState::Unloaded | LoadState::Failed(_) => None,
            };
            match in_flight {
                Some(pending) => (slot.generation, pending),
                None => {
                    slot.generation += 1;
                    info!(attempt = slot.generation, "loading expression models");
                    let pending = (self.loader)().shared();
                    slot.state = LoadState::Loading(pending.clone());
                    (slot.generation, pending)
                }
            }
        };

        let result = pending.await;

        let mut slot = self.lock();
        if slot.generation == generation && matches!(slot.state, LoadState::Loading(_)) {
            slot.state = match &result {
                Ok(handle) => {
                    info!("expression models ready");
                    LoadState::Loaded(handle.clone())
                }
                Err(e) => {
                    warn!(error = %e, "expression model load failed");
                    LoadState::Failed(e.clone())
                }
            };
        }
        result
    }
}
