//! Fixed-rate frame sampling over a seekable decoder.
//!
//! Captures are taken at `i / fps` for every `i` whose offset is strictly
//! less than the source duration, one seek at a time. A capture only
//! resolves once the decoder has a fully decoded still for that offset.
//! Running out of pictures after the first capture ends the sequence early.

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::SamplerError;
use crate::frame::Snapshot;

// --- Named constants ---

/// Default capture rate (frames per second of source time).
pub const DEFAULT_FPS: f64 = 2.0;
/// Default longest accepted source, in seconds.
pub const DEFAULT_MAX_DURATION_SECS: f64 = 15.0;

/// A seekable source of decoded stills.
///
/// Implementations own any scratch surface they need and release it on drop.
#[async_trait]
pub trait MediaDecoder: Send {
    /// Source duration in seconds.
    fn duration(&self) -> f64;

    /// Seek to `offset` seconds and decode exactly one still.
    async fn capture_at(&mut self, offset: f64) -> Result<RgbImage, SamplerError>;
}

/// Capture offsets for a source of `duration` seconds at `fps`.
pub fn capture_offsets(duration: f64, fps: f64) -> Vec<f64> {
    let mut offsets = Vec::new();
    if !(fps > 0.0) || !duration.is_finite() {
        return offsets;
    }
    let mut i = 0usize;
    loop {
        let t = i as f64 / fps;
        if t >= duration {
            break;
        }
        offsets.push(t);
        i += 1;
    }
    offsets
}

/// Walks a decoder at a fixed rate, yielding snapshots in offset order.
pub struct FrameSampler<D: MediaDecoder> {
    decoder: D,
    offsets: Vec<f64>,
    next: usize,
    finished: bool,
}

impl<D: MediaDecoder> FrameSampler<D> {
    /// Validate the source against `max_duration` and plan captures.
    ///
    /// An over-long source is rejected here, before any seek happens.
    pub fn new(decoder: D, fps: f64, max_duration: f64) -> Result<Self, SamplerError> {
        if !(fps > 0.0) || !fps.is_finite() {
            return Err(SamplerError::InvalidRate(fps));
        }

        let duration = decoder.duration();
        if !duration.is_finite() || duration < 0.0 {
            return Err(SamplerError::SourceLoadFailed(format!(
                "invalid source duration {duration}"
            )));
        }
        if duration > max_duration {
            warn!(duration, max_duration, "source exceeds maximum duration");
            return Err(SamplerError::DurationExceeded {
                duration,
                max: max_duration,
            });
        }

        let offsets = capture_offsets(duration, fps);
        info!(duration, fps, planned = offsets.len(), "frame sampler ready");

        Ok(Self {
            decoder,
            offsets,
            next: 0,
            finished: false,
        })
    }

    pub fn duration(&self) -> f64 {
        self.decoder.duration()
    }

    /// All planned capture offsets.
    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    /// Captures not yet taken.
    pub fn remaining(&self) -> usize {
        if self.finished {
            0
        } else {
            self.offsets.len() - self.next
        }
    }

    /// Take the next capture. Returns `None` once every offset has been
    /// visited, once the source runs out of pictures, or after the first
    /// capture error.
    pub async fn next_frame(&mut self) -> Option<Result<Snapshot, SamplerError>> {
        if self.finished {
            return None;
        }
        let index = self.next;
        let offset = *self.offsets.get(index)?;
        self.next += 1;

        match self.decoder.capture_at(offset).await {
            Ok(image) => {
                debug!(index, offset, "frame captured");
                Some(Ok(Snapshot { image, offset, index }))
            }
            Err(SamplerError::EndOfStream { .. }) if index > 0 => {
                info!(index, offset, "source ended before the planned offset");
                self.finished = true;
                None
            }
            Err(e) => {
                warn!(index, offset, error = %e, "frame capture failed");
                self.finished = true;
                Some(Err(e))
            }
        }
    }

    /// Drain every capture. Consumes the sampler, so the decoder and its
    /// scratch surface are released whether this succeeds or fails.
    pub async fn collect(mut self) -> Result<Vec<Snapshot>, SamplerError> {
        let mut frames = Vec::with_capacity(self.offsets.len());
        while let Some(frame) = self.next_frame().await {
            frames.push(frame?);
        }
        Ok(frames)
    }
}
