use std::fmt;

use image::RgbaImage;

use crate::foundation::error::{JobError, JobResult};

/// 0-based position of a frame in decode order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// The index that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frames-per-second represented as a rational `num/den`.
///
/// Used as the source sample rate: how many frames are taken per second of input video.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> JobResult<Self> {
        let fps = Self { num, den };
        fps.validate()?;
        Ok(fps)
    }

    pub(crate) fn validate(self) -> JobResult<()> {
        if self.den == 0 {
            return Err(JobError::config("fps den must be > 0"));
        }
        if self.num == 0 {
            return Err(JobError::config("fps num must be > 0"));
        }
        Ok(())
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }
}

impl Default for Fps {
    fn default() -> Self {
        Self { num: 10, den: 1 }
    }
}

impl fmt::Display for Fps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameSize {
    /// Bytes needed for one tightly packed RGBA8 frame of this size.
    pub fn rgba_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Output resolution policy applied while decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scale {
    /// Keep the source resolution.
    Original,
    /// Resize to the given width; height follows the source aspect ratio, rounded to an even
    /// number of pixels.
    Width(u32),
}

impl Default for Scale {
    fn default() -> Self {
        Self::Width(320)
    }
}

impl Scale {
    pub(crate) fn validate(self) -> JobResult<()> {
        match self {
            Self::Width(0) => Err(JobError::config("scale width must be > 0")),
            _ => Ok(()),
        }
    }

    /// Resolve the decoded frame size for a source of the given size.
    pub fn resolve(self, source: FrameSize) -> FrameSize {
        match self {
            Self::Original => source,
            Self::Width(width) => {
                if source.width == 0 {
                    return FrameSize { width, height: 0 };
                }
                let exact = f64::from(source.height) * f64::from(width) / f64::from(source.width);
                let half = ((exact / 2.0).round() as u32).min(u32::MAX / 2);
                let even = (half * 2).max(2);
                FrameSize {
                    width,
                    height: even,
                }
            }
        }
    }
}

/// One decoded image together with its position in decode order.
///
/// Frames are moved from stage to stage; nothing in the pipeline clones the pixel payload.
#[derive(Debug)]
pub struct Frame {
    index: FrameIndex,
    image: RgbaImage,
}

impl Frame {
    /// Pair an image with its decode-order index.
    pub fn new(index: FrameIndex, image: RgbaImage) -> Self {
        Self { index, image }
    }

    /// Decode-order index.
    pub fn index(&self) -> FrameIndex {
        self.index
    }

    /// Borrow the pixels.
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Frame dimensions.
    pub fn size(&self) -> FrameSize {
        FrameSize {
            width: self.image.width(),
            height: self.image.height(),
        }
    }

    /// Take the pixels out, dropping the index.
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Split into index and pixels.
    pub fn into_parts(self) -> (FrameIndex, RgbaImage) {
        (self.index, self.image)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
