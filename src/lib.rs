//! cutout turns a video into an animated GIF with the background removed.
//!
//! The heart of the crate is a bounded streaming pipeline:
//!
//! - a [`FrameSource`] decodes the video into indexed frames,
//! - a [`BoundedChannel`] hands them to a fixed-size [`TransformPool`],
//! - a sequencer restores decode order with an [`OrderedResult`] buffer,
//! - a [`FrameEncoder`] assembles the ordered frames once everything succeeded.
//!
//! A [`Job`] wires the stages together and owns cancellation, the deadline and error
//! propagation. Decoding, the per-frame transform and encoding are capabilities passed in by
//! the caller; [`FfmpegSource`], [`ColorKeyMatte`] and [`GifEncoder`] are the built-in ones.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod foundation;

/// Output encoders.
pub mod encode;
/// Built-in background removers.
pub mod matte;
/// Video decoding.
pub mod media;
/// Streaming pipeline stages and the job controller.
pub mod pipeline;

pub use crate::config::{DEFAULT_CHANNEL_CAPACITY, JobConfig};
pub use crate::foundation::core::{Fps, Frame, FrameIndex, FrameSize, Scale};
pub use crate::foundation::error::{
    ChannelClosed, DecodeError, JobError, JobResult, Stage, TransformFailure,
};

pub use crate::encode::gif::GifEncoder;
pub use crate::encode::memory::InMemoryEncoder;
pub use crate::encode::{FrameEncoder, FrameTiming};
pub use crate::matte::{ColorKeyMatte, ColorKeyOpts, IdentityMatte, KeyColor};
pub use crate::media::ffmpeg::{
    FfmpegDecoder, FfmpegSource, VideoInfo, is_ffmpeg_on_path, probe_video,
};
pub use crate::pipeline::channel::{BoundedChannel, Recv};
pub use crate::pipeline::controller::{
    Job, JobHandle, JobOutput, JobStats, PipelineState, run_job,
};
pub use crate::pipeline::pool::{FrameTransform, TransformPool, Transformed};
pub use crate::pipeline::sequencer::{OrderedResult, SequenceError};
pub use crate::pipeline::source::{FrameDecoder, FrameSource, IterDecoder, VideoSource};
