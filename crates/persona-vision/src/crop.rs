//! Axis-aligned square crops with bilinear resampling.
//!
//! Both the landmark and the expression models consume a square window
//! around the face. A crop maps output pixel `(u, v)` of an `out × out`
//! patch to source point `center + ((u, v) - out / 2) / scale`.

use image::RgbImage;

/// A square window in source coordinates, resampled to `out × out`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareCrop {
    pub cx: f32,
    pub cy: f32,
    /// Side of the window in source pixels.
    pub side: f32,
    /// Output patch size in pixels.
    pub out: usize,
}

impl SquareCrop {
    pub fn new(cx: f32, cy: f32, side: f32, out: usize) -> Self {
        Self {
            cx,
            cy,
            side: side.max(1.0),
            out,
        }
    }

    /// Output pixels per source pixel.
    pub fn scale(&self) -> f32 {
        self.out as f32 / self.side
    }

    /// Patch coordinates → source coordinates.
    pub fn to_source(&self, u: f32, v: f32) -> (f32, f32) {
        let half = self.out as f32 / 2.0;
        let s = self.scale();
        (self.cx + (u - half) / s, self.cy + (v - half) / s)
    }

    /// Sample the RGB patch, row-major, `[r, g, b]` per pixel.
    /// Pixels outside the source are black.
    pub fn sample_rgb(&self, image: &RgbImage) -> Vec<[f32; 3]> {
        let mut patch = Vec::with_capacity(self.out * self.out);
        for v in 0..self.out {
            for u in 0..self.out {
                let (sx, sy) = self.to_source(u as f32 + 0.5, v as f32 + 0.5);
                patch.push(bilinear(image, sx - 0.5, sy - 0.5));
            }
        }
        patch
    }

    /// Sample the patch as luma (0.0–255.0), row-major.
    pub fn sample_gray(&self, image: &RgbImage) -> Vec<f32> {
        self.sample_rgb(image)
            .into_iter()
            .map(|[r, g, b]| 0.299 * r + 0.587 * g + 0.114 * b)
            .collect()
    }
}

fn bilinear(image: &RgbImage, sx: f32, sy: f32) -> [f32; 3] {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - sx.floor();
    let fy = sy - sy.floor();

    let px = |x: i64, y: i64| -> [f32; 3] {
        if x < 0 || y < 0 || x >= w || y >= h {
            [0.0; 3]
        } else {
            let p = image.get_pixel(x as u32, y as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        }
    };

    let tl = px(x0, y0);
    let tr = px(x0 + 1, y0);
    let bl = px(x0, y0 + 1);
    let br = px(x0 + 1, y0 + 1);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        out[c] = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
    }
    out
}
