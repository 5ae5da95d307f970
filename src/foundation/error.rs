use std::fmt;
use std::time::Duration;

use crate::foundation::core::FrameIndex;

/// Convenience result type used across the pipeline.
pub type JobResult<T> = Result<T, JobError>;

/// Pipeline stage that raised an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Decoding frames and feeding the ingress channel.
    Source,
    /// Worker pool applying the per-frame transform.
    Transform,
    /// Reassembly of transformed frames into decode order.
    Sequence,
    /// Final assembly of the output byte stream.
    Encode,
    /// The coordinating controller itself.
    Controller,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Source => "source",
            Self::Transform => "transform",
            Self::Sequence => "sequence",
            Self::Encode => "encode",
            Self::Controller => "controller",
        };
        f.write_str(name)
    }
}

/// Returned by channel and window operations once the pipeline has been torn down.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("channel closed")]
pub struct ChannelClosed;

/// The decoder reported a malformed or truncated source.
#[derive(thiserror::Error, Debug)]
#[error("decode failed after {frames_read} frame(s): {source:#}")]
pub struct DecodeError {
    /// Frames successfully produced before the failure.
    pub frames_read: u64,
    /// Underlying decoder error.
    #[source]
    pub source: anyhow::Error,
}

/// The transform failed on one specific frame.
#[derive(thiserror::Error, Debug)]
#[error("frame {index} failed: {source:#}")]
pub struct TransformFailure {
    /// Decode-order index of the failed frame.
    pub index: FrameIndex,
    /// Underlying transform error.
    #[source]
    pub source: anyhow::Error,
}

/// The single consolidated error a job reports to its caller.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    /// The job configuration was rejected before any stage started.
    #[error("invalid job config: {0}")]
    Config(String),

    /// Malformed or truncated source.
    #[error("source stage: {0}")]
    Decode(#[from] DecodeError),

    /// Operation attempted on a torn-down pipeline.
    #[error("{stage} stage: channel closed")]
    ChannelClosed {
        /// Stage that observed the closed channel.
        stage: Stage,
    },

    /// The external transform failed on a frame.
    #[error("transform stage: {0}")]
    Transform(#[from] TransformFailure),

    /// The job deadline elapsed.
    #[error("job exceeded its deadline of {deadline:?}")]
    Timeout {
        /// Configured deadline.
        deadline: Duration,
    },

    /// The encoder failed to assemble the output.
    #[error("encode stage: {0:#}")]
    Encode(anyhow::Error),

    /// The job was cancelled through its handle.
    #[error("job cancelled")]
    Cancelled,

    /// A stage panicked or a pipeline invariant was broken.
    #[error("{stage} stage: internal error: {message}")]
    Internal {
        /// Stage where the invariant broke.
        stage: Stage,
        /// Human-readable description.
        message: String,
    },
}

impl JobError {
    /// Build a [`JobError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a [`JobError::Internal`] value.
    pub fn internal(stage: Stage, msg: impl Into<String>) -> Self {
        Self::Internal {
            stage,
            message: msg.into(),
        }
    }

    /// Build a [`JobError::ChannelClosed`] value for `stage`.
    pub fn closed(stage: Stage) -> Self {
        Self::ChannelClosed { stage }
    }

    /// Stage the error is attributed to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config(_) | Self::Timeout { .. } | Self::Cancelled => Stage::Controller,
            Self::Decode(_) => Stage::Source,
            Self::ChannelClosed { stage } | Self::Internal { stage, .. } => *stage,
            Self::Transform(_) => Stage::Transform,
            Self::Encode(_) => Stage::Encode,
        }
    }

    /// `true` for errors that only report a teardown caused by some earlier failure.
    pub fn is_symptom(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. })
    }

    /// Frame index attached to the error, when there is one.
    pub fn frame_index(&self) -> Option<FrameIndex> {
        match self {
            Self::Transform(failure) => Some(failure.index),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
