use std::panic::{AssertUnwindSafe, catch_unwind};

use image::RgbaImage;
use tokio_util::sync::CancellationToken;

use crate::foundation::core::Frame;
use crate::foundation::error::{JobError, JobResult, Stage, TransformFailure};
use crate::pipeline::channel::{BoundedChannel, Recv};
use crate::pipeline::window::ReorderWindow;

/// Per-frame transform capability (background removal).
///
/// Called concurrently from every worker thread with independent frames; implementations must be
/// thread-safe. An error fails the whole job.
pub trait FrameTransform: Send + Sync {
    /// Transform one frame.
    fn transform(&self, image: RgbaImage) -> anyhow::Result<RgbaImage>;
}

impl<F> FrameTransform for F
where
    F: Fn(RgbaImage) -> anyhow::Result<RgbaImage> + Send + Sync,
{
    fn transform(&self, image: RgbaImage) -> anyhow::Result<RgbaImage> {
        self(image)
    }
}

/// Item on the pool's output channel: a transformed frame, or a failure tagged with its index.
pub type Transformed = Result<Frame, TransformFailure>;

/// Fixed-size worker pool applying a [`FrameTransform`] to frames pulled from a channel.
///
/// Each of the `W` threads runs one worker loop for the whole job. Workers pull independently,
/// so the output channel is not ordered; the sequencer restores order.
pub struct TransformPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl TransformPool {
    /// Build a pool with `workers` threads, or one per available CPU when `None`.
    pub fn new(workers: Option<usize>) -> JobResult<Self> {
        let workers = match workers {
            Some(0) => {
                return Err(JobError::config("pool_size must be >= 1 when set"));
            }
            Some(n) => n,
            None => default_workers(),
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cutout-worker-{i}"))
            .build()
            .map_err(|e| {
                JobError::internal(
                    Stage::Transform,
                    format!("failed to build worker pool: {e}"),
                )
            })?;
        Ok(Self { pool, workers })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every worker to completion, then emit exactly one end-of-stream marker on `egress`.
    ///
    /// Returns how many frames the workers handed downstream.
    pub(crate) fn run(
        &self,
        ingress: &BoundedChannel<Frame>,
        egress: &BoundedChannel<Transformed>,
        window: &ReorderWindow,
        transform: &dyn FrameTransform,
        cancel: &CancellationToken,
    ) -> JobResult<u64> {
        let ctx = WorkerCtx {
            ingress,
            egress,
            window,
            transform,
            cancel,
        };
        let results = self.pool.broadcast(|b| ctx.run_worker(b.index()));

        let mut handled = 0u64;
        let mut failure: Option<JobError> = None;
        for res in results {
            match res {
                Ok(n) => handled += n,
                Err(e) => keep_root_cause(&mut failure, e),
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        egress
            .finish()
            .map_err(|_| JobError::closed(Stage::Transform))?;
        tracing::debug!(handled, workers = self.workers, "transform pool drained");
        Ok(handled)
    }
}

/// Worker count used when the configuration leaves it unset.
pub(crate) fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Keep the first error that is not a teardown symptom.
pub(crate) fn keep_root_cause(slot: &mut Option<JobError>, err: JobError) {
    match slot {
        None => *slot = Some(err),
        Some(existing) if existing.is_symptom() && !err.is_symptom() => *slot = Some(err),
        Some(_) => {}
    }
}

struct WorkerCtx<'a> {
    ingress: &'a BoundedChannel<Frame>,
    egress: &'a BoundedChannel<Transformed>,
    window: &'a ReorderWindow,
    transform: &'a dyn FrameTransform,
    cancel: &'a CancellationToken,
}

impl WorkerCtx<'_> {
    fn run_worker(&self, worker: usize) -> JobResult<u64> {
        let closed = |_| JobError::closed(Stage::Transform);
        let mut handled = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return Err(JobError::closed(Stage::Transform));
            }
            self.window.acquire().map_err(closed)?;
            let frame = match self.ingress.take().map_err(closed)? {
                Recv::Item(frame) => frame,
                Recv::EndOfStream => {
                    // Let workers still waiting on a credit reach the end-of-stream too.
                    self.window.release();
                    break;
                }
            };

            let (index, image) = frame.into_parts();
            let outcome = match catch_unwind(AssertUnwindSafe(|| self.transform.transform(image))) {
                Ok(Ok(image)) => Ok(Frame::new(index, image)),
                Ok(Err(source)) => Err(TransformFailure { index, source }),
                Err(_) => Err(TransformFailure {
                    index,
                    source: anyhow::anyhow!("transform panicked"),
                }),
            };

            if self.cancel.is_cancelled() {
                tracing::debug!(worker, %index, "discarding frame transformed after cancellation");
                return Err(JobError::closed(Stage::Transform));
            }

            let failed = outcome.is_err();
            if failed {
                tracing::debug!(worker, %index, "transform failed");
            }
            self.egress.put(outcome).map_err(closed)?;
            handled += 1;
            if failed {
                // The job is over; the failure is on its way to the sequencer.
                break;
            }
        }
        tracing::trace!(worker, handled, "worker finished");
        Ok(handled)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/pool.rs"]
mod tests;
