use std::path::Path;
use std::time::Duration;

use crate::encode::FrameTiming;
use crate::foundation::core::{Fps, Scale};
use crate::foundation::error::{JobError, JobResult};

/// Default capacity of the ingress channel between the source and the worker pool.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Everything a [`Job`](crate::Job) needs besides its capabilities.
///
/// Missing JSON fields fall back to their defaults, so `{}` is a valid config.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Frames sampled per second of source video.
    pub sample_rate: Fps,
    /// Output resolution policy.
    pub scale: Scale,
    /// Transform workers; `None` uses the available parallelism.
    pub pool_size: Option<usize>,
    /// Capacity of the ingress channel.
    pub channel_capacity: usize,
    /// Wall-clock limit for the whole job, encoding included.
    pub deadline_ms: Option<u64>,
    /// Output animation timing.
    pub timing: FrameTiming,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            sample_rate: Fps::default(),
            scale: Scale::default(),
            pool_size: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            deadline_ms: None,
            timing: FrameTiming::default(),
        }
    }
}

impl JobConfig {
    /// Load a config from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> JobResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| JobError::config(format!("read {}: {e}", path.display())))?;
        Self::from_json(&text)
            .map_err(|e| JobError::config(format!("{}: {e}", path.display())))
    }

    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reject values no stage can work with.
    pub fn validate(&self) -> JobResult<()> {
        self.sample_rate.validate()?;
        self.scale.validate()?;
        if self.pool_size == Some(0) {
            return Err(JobError::config("pool_size must be >= 1 when set"));
        }
        if self.channel_capacity == 0 {
            return Err(JobError::config("channel_capacity must be >= 1"));
        }
        if self.deadline_ms == Some(0) {
            return Err(JobError::config("deadline_ms must be > 0 when set"));
        }
        self.timing.validate()?;
        Ok(())
    }

    /// Job deadline, if any.
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
