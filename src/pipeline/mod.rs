//! Streaming pipeline: source -> ingress channel -> worker pool -> sequencer -> encoder.
//!
//! Memory stays bounded end to end. The ingress channel holds at most `channel_capacity` frames,
//! the reorder window admits at most one frame per worker, and the sequencer therefore buffers at
//! most `workers - 1` frames that completed ahead of a slower one.

/// Blocking bounded MPMC channel with end-of-stream and teardown.
pub mod channel;
/// Job lifecycle, cancellation and deadline handling.
pub mod controller;
/// Fixed-size transform worker pool.
pub mod pool;
/// Reorder buffer restoring decode order.
pub mod sequencer;
/// Decoder adapter producing indexed frames.
pub mod source;
pub(crate) mod window;
