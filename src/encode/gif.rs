use anyhow::Context as _;

use crate::encode::{FrameEncoder, FrameTiming};
use crate::foundation::core::Frame;

/// Lowest alpha kept opaque in GIF output; anything below becomes transparent.
pub const ALPHA_CUTOFF: u8 = 128;

/// Encodes RGBA frames into an animated GIF.
///
/// GIF transparency is binary: pixels with alpha below [`ALPHA_CUTOFF`] map to the transparent
/// index and the rest become opaque. Every frame uses background disposal so cut-out regions
/// never show the previous frame.
#[derive(Clone, Debug)]
pub struct GifEncoder {
    speed: i32,
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self { speed: 10 }
    }
}

impl GifEncoder {
    /// Encoder with the default quantization speed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Palette quantization speed, `1` (best) to `30` (fastest). Out-of-range values are clamped.
    pub fn with_speed(speed: i32) -> Self {
        Self {
            speed: speed.clamp(1, 30),
        }
    }
}

impl FrameEncoder for GifEncoder {
    fn encode(&mut self, frames: Vec<Frame>, timing: &FrameTiming) -> anyhow::Result<Vec<u8>> {
        let first = frames
            .first()
            .context("cannot encode an empty frame sequence")?;
        let size = first.size();
        let width = u16::try_from(size.width)
            .with_context(|| format!("frame width {} exceeds the GIF limit", size.width))?;
        let height = u16::try_from(size.height)
            .with_context(|| format!("frame height {} exceeds the GIF limit", size.height))?;
        let delay_cs = delay_centis(timing.frame_delay_ms);

        let mut out = Vec::new();
        {
            let mut enc = ::gif::Encoder::new(&mut out, width, height, &[])
                .context("failed to start GIF stream")?;
            let repeat = match timing.loop_count {
                0 => ::gif::Repeat::Infinite,
                n => ::gif::Repeat::Finite(n),
            };
            enc.set_repeat(repeat)
                .context("failed to write GIF loop extension")?;

            for frame in frames {
                if frame.size() != size {
                    anyhow::bail!(
                        "frame {} is {} but the animation is {}",
                        frame.index(),
                        frame.size(),
                        size
                    );
                }
                let index = frame.index();
                let mut rgba = frame.into_image().into_raw();
                binarize_alpha(&mut rgba);
                let mut gif_frame =
                    ::gif::Frame::from_rgba_speed(width, height, &mut rgba, self.speed);
                gif_frame.delay = delay_cs;
                gif_frame.dispose = ::gif::DisposalMethod::Background;
                enc.write_frame(&gif_frame)
                    .with_context(|| format!("failed to write GIF frame {index}"))?;
            }
        }
        Ok(out)
    }
}

/// GIF delays are stored in hundredths of a second.
fn delay_centis(ms: u32) -> u16 {
    let cs = ms.saturating_add(5) / 10;
    cs.clamp(1, u32::from(u16::MAX)) as u16
}

/// The quantizer treats any non-zero alpha as opaque, so soft edges are cut at half coverage.
fn binarize_alpha(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        px[3] = if px[3] >= ALPHA_CUTOFF { u8::MAX } else { 0 };
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/gif.rs"]
mod tests;
