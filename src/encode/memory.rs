use crate::encode::{FrameEncoder, FrameTiming};
use crate::foundation::core::{Frame, FrameIndex};

/// Encoder that keeps the frames it receives.
///
/// The returned byte stream is empty; inspect [`frames`](Self::frames) instead.
#[derive(Debug, Default)]
pub struct InMemoryEncoder {
    frames: Vec<Frame>,
    timing: Option<FrameTiming>,
    calls: usize,
}

impl InMemoryEncoder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames from the last `encode` call, in the order received.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Indices of the recorded frames.
    pub fn indices(&self) -> Vec<FrameIndex> {
        self.frames.iter().map(Frame::index).collect()
    }

    /// Timing passed to the last `encode` call.
    pub fn timing(&self) -> Option<FrameTiming> {
        self.timing
    }

    /// How many times `encode` was invoked.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl FrameEncoder for InMemoryEncoder {
    fn encode(&mut self, frames: Vec<Frame>, timing: &FrameTiming) -> anyhow::Result<Vec<u8>> {
        self.calls += 1;
        self.frames = frames;
        self.timing = Some(*timing);
        Ok(Vec::new())
    }
}
