//! Decoder backed by the `ffmpeg` / `ffprobe` command-line tools.

use async_trait::async_trait;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::SamplerError;
use crate::probe::{probe_video, VideoInfo};
use crate::sampler::MediaDecoder;

/// Seeks with `ffmpeg -ss` and decodes one PNG still per capture into a
/// private scratch directory. The directory is removed when the decoder drops.
pub struct FfmpegDecoder {
    input: PathBuf,
    ffmpeg: PathBuf,
    info: VideoInfo,
    scratch: TempDir,
    captures: usize,
}

impl FfmpegDecoder {
    /// Locate the tools, create the scratch surface and probe `input`.
    pub async fn open(input: &Path) -> Result<Self, SamplerError> {
        let ffmpeg = which::which("ffmpeg").map_err(|_| {
            SamplerError::CaptureContextUnavailable("ffmpeg not found in PATH".to_string())
        })?;
        let ffprobe = which::which("ffprobe").map_err(|_| {
            SamplerError::CaptureContextUnavailable("ffprobe not found in PATH".to_string())
        })?;

        let scratch = tempfile::Builder::new()
            .prefix("persona-frames-")
            .tempdir()
            .map_err(|e| {
                SamplerError::CaptureContextUnavailable(format!("cannot create scratch dir: {e}"))
            })?;

        let info = probe_video(&ffprobe, input).await?;
        info!(
            path = %input.display(),
            duration = info.duration,
            width = info.width,
            height = info.height,
            codec = %info.codec,
            "video opened"
        );

        Ok(Self {
            input: input.to_path_buf(),
            ffmpeg,
            info,
            scratch,
            captures: 0,
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    fn duration(&self) -> f64 {
        self.info.duration
    }

    async fn capture_at(&mut self, offset: f64) -> Result<RgbImage, SamplerError> {
        let out = self
            .scratch
            .path()
            .join(format!("frame_{:04}.png", self.captures));
        self.captures += 1;

        let output = Command::new(&self.ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-ss"])
            .arg(format!("{offset:.3}"))
            .arg("-i")
            .arg(&self.input)
            .args(["-frames:v", "1"])
            .arg(&out)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| SamplerError::CaptureContextUnavailable(format!("failed to run ffmpeg: {e}")))?;

        if !output.status.success() {
            return Err(SamplerError::CaptureFailed {
                offset,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        // ffmpeg exits 0 without writing anything when the seek lands past
        // the last decodable frame.
        if !tokio::fs::try_exists(&out).await.unwrap_or(false) {
            return Err(SamplerError::EndOfStream { offset });
        }
        let image = image::open(&out)
            .map_err(|e| SamplerError::CaptureFailed {
                offset,
                message: format!("no decodable still: {e}"),
            })?
            .to_rgb8();

        if let Err(e) = tokio::fs::remove_file(&out).await {
            debug!(path = %out.display(), error = %e, "could not remove capture");
        }

        Ok(image)
    }
}
