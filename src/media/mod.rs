//! Video decoding through the system `ffmpeg`/`ffprobe` binaries.

/// Subprocess-backed probe and frame decoder.
pub mod ffmpeg;
