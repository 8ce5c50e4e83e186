use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Video,
    Text,
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisMode::Video => f.write_str("video"),
            AnalysisMode::Text => f.write_str("text"),
        }
    }
}

/// A video submitted for analysis.
///
/// Uploads read from a stream are spooled to a transient file that lives
/// exactly as long as the upload.
#[derive(Debug)]
pub struct VideoUpload {
    path: PathBuf,
    mime: String,
    spool: Option<NamedTempFile>,
}

impl VideoUpload {
    /// Reference a file on disk. Without an explicit MIME type it is inferred
    /// from the extension.
    pub fn from_path(path: impl Into<PathBuf>, mime: Option<String>) -> Self {
        let path = path.into();
        let mime = mime.unwrap_or_else(|| mime_from_extension(&path).to_string());
        Self {
            path,
            mime,
            spool: None,
        }
    }

    /// Spool in-memory video bytes to a transient file.
    pub fn from_bytes(bytes: &[u8], mime: impl Into<String>) -> std::io::Result<Self> {
        let mime = mime.into();
        let mut spool = tempfile::Builder::new()
            .prefix("persona-upload-")
            .suffix(extension_for_mime(&mime))
            .tempfile()?;
        spool.write_all(bytes)?;
        spool.flush()?;
        tracing::debug!(path = %spool.path().display(), bytes = bytes.len(), "spooled upload");
        Ok(Self {
            path: spool.path().to_path_buf(),
            mime,
            spool: Some(spool),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn is_transient(&self) -> bool {
        self.spool.is_some()
    }

    pub fn is_video(&self) -> bool {
        self.mime.trim().to_ascii_lowercase().starts_with("video/")
    }
}

/// One submitted unit of work.
#[derive(Debug)]
pub enum AnalysisRequest {
    Video(VideoUpload),
    Text(String),
}

impl AnalysisRequest {
    pub fn mode(&self) -> AnalysisMode {
        match self {
            AnalysisRequest::Video(_) => AnalysisMode::Video,
            AnalysisRequest::Text(_) => AnalysisMode::Text,
        }
    }

    /// Input checks that need no external service.
    pub fn check(&self) -> Result<(), AnalysisError> {
        match self {
            AnalysisRequest::Text(text) if text.trim().is_empty() => Err(AnalysisError::UserInputEmpty),
            AnalysisRequest::Video(upload) if !upload.is_video() => {
                Err(AnalysisError::InvalidMediaType(upload.mime().to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ogv" => "video/ogg",
        "mpg" | "mpeg" => "video/mpeg",
        "3gp" => "video/3gpp",
        "gif" => "image/gif",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "video/mp4" => ".mp4",
        "video/webm" => ".webm",
        "video/quicktime" => ".mov",
        "video/x-matroska" => ".mkv",
        "video/x-msvideo" => ".avi",
        "video/ogg" => ".ogv",
        _ => ".bin",
    }
}
