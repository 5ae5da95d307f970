//! Built-in background removers.
//!
//! These are deliberately simple, model-free transforms so the binary works end to end. Any
//! segmentation backend can be plugged in through [`FrameTransform`].

use std::fmt;
use std::str::FromStr;

use image::RgbaImage;
use rayon::prelude::*;

use crate::foundation::error::{JobError, JobResult};
use crate::pipeline::pool::FrameTransform;

/// Background colour to key out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyColor {
    /// Estimate per frame from the per-channel median of the image border.
    #[default]
    Auto,
    /// Fixed RGB colour.
    Rgb([u8; 3]),
}

impl fmt::Display for KeyColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Rgb([r, g, b]) => write!(f, "{r:02x}{g:02x}{b:02x}"),
        }
    }
}

impl FromStr for KeyColor {
    type Err = JobError;

    /// Accepts `auto`, `RRGGBB` or `#RRGGBB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(JobError::config(format!(
                "key colour must be 'auto' or RRGGBB, got '{s}'"
            )));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| JobError::config(format!("invalid hex in key colour '{s}'")))
        };
        Ok(Self::Rgb([channel(0)?, channel(2)?, channel(4)?]))
    }
}

/// Options for [`ColorKeyMatte`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ColorKeyOpts {
    /// Colour treated as background.
    pub key: KeyColor,
    /// RGB distance (0..=442) below which a pixel is fully transparent.
    pub tolerance: f32,
    /// Width of the linear alpha ramp above `tolerance`.
    ///
    /// GIF output has no partial transparency; [`GifEncoder`](crate::GifEncoder) cuts the ramp
    /// at half coverage, which moves the edge to `tolerance + softness / 2`.
    pub softness: f32,
}

impl Default for ColorKeyOpts {
    fn default() -> Self {
        Self {
            key: KeyColor::Auto,
            tolerance: 40.0,
            softness: 20.0,
        }
    }
}

/// Chroma-key style background remover.
#[derive(Clone, Debug)]
pub struct ColorKeyMatte {
    opts: ColorKeyOpts,
}

impl ColorKeyMatte {
    /// Validate `opts` and build the matte.
    pub fn new(opts: ColorKeyOpts) -> JobResult<Self> {
        if !opts.tolerance.is_finite() || opts.tolerance < 0.0 {
            return Err(JobError::config("matte tolerance must be a finite value >= 0"));
        }
        if !opts.softness.is_finite() || opts.softness < 0.0 {
            return Err(JobError::config("matte softness must be a finite value >= 0"));
        }
        Ok(Self { opts })
    }

    /// Options in use.
    pub fn opts(&self) -> &ColorKeyOpts {
        &self.opts
    }

    fn coverage(&self, dist: f32) -> f32 {
        let tol = self.opts.tolerance;
        if dist <= tol {
            0.0
        } else if self.opts.softness == 0.0 || dist >= tol + self.opts.softness {
            1.0
        } else {
            (dist - tol) / self.opts.softness
        }
    }
}

impl FrameTransform for ColorKeyMatte {
    fn transform(&self, mut image: RgbaImage) -> anyhow::Result<RgbaImage> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("cannot matte an empty image");
        }
        let key = match self.opts.key {
            KeyColor::Auto => border_median(&image),
            KeyColor::Rgb(rgb) => rgb,
        };
        let row_len = image.width() as usize * 4;

        image.par_chunks_mut(row_len).for_each(|row| {
            for px in row.chunks_exact_mut(4) {
                let cover = self.coverage(rgb_distance([px[0], px[1], px[2]], key));
                px[3] = (f32::from(px[3]) * cover).round() as u8;
            }
        });
        Ok(image)
    }
}

/// Pass-through transform.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityMatte;

impl FrameTransform for IdentityMatte {
    fn transform(&self, image: RgbaImage) -> anyhow::Result<RgbaImage> {
        Ok(image)
    }
}

fn rgb_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let d = |i: usize| f32::from(a[i]) - f32::from(b[i]);
    (d(0) * d(0) + d(1) * d(1) + d(2) * d(2)).sqrt()
}

/// Per-channel median of the outermost ring of pixels.
pub(crate) fn border_median(image: &RgbaImage) -> [u8; 3] {
    let (w, h) = image.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();
    let mut push = |x: u32, y: u32| {
        let p = image.get_pixel(x, y).0;
        for (c, v) in channels.iter_mut().zip(p) {
            c.push(v);
        }
    };
    for x in 0..w {
        push(x, 0);
        if h > 1 {
            push(x, h - 1);
        }
    }
    for y in 1..h.saturating_sub(1) {
        push(0, y);
        if w > 1 {
            push(w - 1, y);
        }
    }

    channels.map(|mut c| {
        c.sort_unstable();
        c[c.len() / 2]
    })
}

#[cfg(test)]
#[path = "../tests/unit/matte/matte.rs"]
mod tests;
