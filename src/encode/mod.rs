//! Output assembly.
//!
//! Encoders receive the complete, ordered frame sequence once the pipeline has drained. They are
//! never invoked for a failed job.

/// Animated GIF output.
pub mod gif;
/// Recording encoder for tests and debugging.
pub mod memory;

use std::time::Duration;

use crate::foundation::core::Frame;
use crate::foundation::error::{JobError, JobResult};

/// Per-frame timing and looping applied to the output animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FrameTiming {
    /// Display time of every frame in milliseconds.
    pub frame_delay_ms: u32,
    /// `0` loops forever; `n` repeats the animation `n` times.
    pub loop_count: u16,
}

impl Default for FrameTiming {
    fn default() -> Self {
        Self {
            frame_delay_ms: 120,
            loop_count: 0,
        }
    }
}

impl FrameTiming {
    /// Frame delay as a [`Duration`].
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_delay_ms))
    }

    pub(crate) fn validate(&self) -> JobResult<()> {
        if self.frame_delay_ms == 0 {
            return Err(JobError::config("timing.frame_delay_ms must be > 0"));
        }
        Ok(())
    }
}

/// Encoder capability: turns the ordered frames into the output byte stream.
pub trait FrameEncoder: Send {
    /// Encode `frames` (strictly increasing index order) with `timing`.
    fn encode(&mut self, frames: Vec<Frame>, timing: &FrameTiming) -> anyhow::Result<Vec<u8>>;
}
