//! Captured still frames.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

/// JPEG quality used when frames are sent to the generative service.
pub const JPEG_QUALITY: u8 = 85;

/// A fully decoded still taken from a video at a known offset.
#[derive(Clone)]
pub struct Snapshot {
    pub image: RgbImage,
    /// Position in the source, in seconds.
    pub offset: f64,
    /// Zero-based capture index within one sampling pass.
    pub index: usize,
}

impl Snapshot {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let pixels = self.image.pixels().len();
        if pixels == 0 {
            return 0.0;
        }
        let sum: f32 = self
            .image
            .pixels()
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .sum();
        sum / pixels as f32
    }

    /// Encode as baseline JPEG.
    pub fn to_jpeg(&self) -> image::ImageResult<Vec<u8>> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&self.image)?;
        Ok(buf)
    }

    /// JPEG bytes, base64 encoded for inline request parts.
    pub fn to_base64_jpeg(&self) -> image::ImageResult<String> {
        Ok(BASE64.encode(self.to_jpeg()?))
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("index", &self.index)
            .field("offset", &self.offset)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// Indices of up to `max` evenly spaced items out of `total`:
/// `floor(i * total / selected)` for `i` in `0..selected`.
pub fn evenly_spaced_indices(total: usize, max: usize) -> Vec<usize> {
    let selected = total.min(max);
    (0..selected).map(|i| i * total / selected).collect()
}

/// Pick up to `max` evenly spaced frames, preserving order.
pub fn select_evenly_spaced(frames: &[Snapshot], max: usize) -> Vec<&Snapshot> {
    evenly_spaced_indices(frames.len(), max)
        .into_iter()
        .map(|i| &frames[i])
        .collect()
}
