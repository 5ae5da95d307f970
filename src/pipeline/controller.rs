use std::fmt;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::JobConfig;
use crate::encode::FrameEncoder;
use crate::foundation::core::Frame;
use crate::foundation::error::{JobError, JobResult, Stage};
use crate::pipeline::channel::BoundedChannel;
use crate::pipeline::pool::{FrameTransform, TransformPool, Transformed, keep_root_cause};
use crate::pipeline::sequencer::{Sequenced, Sequencer};
use crate::pipeline::source::{FrameSource, VideoSource};
use crate::pipeline::window::ReorderWindow;

/// Lifecycle of a [`Job`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Frames are being decoded and transformed.
    Running,
    /// The source is exhausted; in-flight frames are finishing.
    Draining,
    /// Every frame was transformed, sequenced and encoded.
    Completed,
    /// The job stopped on an error, a cancellation or its deadline.
    Failed,
}

impl PipelineState {
    /// `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters collected while a job runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobStats {
    /// Frames the source produced.
    pub frames_decoded: u64,
    /// Frames handed to the encoder.
    pub frames_encoded: u64,
    /// Most frames ever buffered in the ingress channel.
    pub peak_ingress_depth: usize,
    /// Most frames ever waiting in the reorder buffer.
    pub peak_reorder_depth: usize,
    /// Transform workers used.
    pub workers: usize,
    /// Wall-clock time from start to encoded output.
    pub elapsed: Duration,
}

/// Result of a successful [`Job::run`].
#[derive(Clone, Debug)]
pub struct JobOutput {
    /// Job identifier.
    pub id: Uuid,
    /// Encoded animation.
    pub bytes: Vec<u8>,
    /// Run statistics.
    pub stats: JobStats,
}

enum StageEvent {
    Produced(JobResult<u64>),
    Transformed(JobResult<u64>),
    Sequenced(JobResult<Sequenced>),
    Panicked(Stage),
    CancelRequested,
}

struct Shared {
    state: Mutex<PipelineState>,
    cancel_requested: CancellationToken,
}

impl Shared {
    fn state(&self) -> PipelineState {
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: PipelineState) {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let from = *state;
        if from != next && !from.is_terminal() {
            tracing::info!(%from, to = %next, "job state");
            *state = next;
        }
    }
}

/// Cloneable, thread-safe view of a [`Job`] for observing and cancelling it.
#[derive(Clone)]
pub struct JobHandle {
    id: Uuid,
    shared: Arc<Shared>,
    events: Sender<StageEvent>,
}

impl JobHandle {
    /// Job identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.shared.state()
    }

    /// Request cancellation. The job fails with [`JobError::Cancelled`] unless it already
    /// finished. Calling this more than once has no further effect.
    pub fn cancel(&self) {
        if self.shared.cancel_requested.is_cancelled() {
            return;
        }
        self.shared.cancel_requested.cancel();
        // The job may already be gone; the flag alone is enough then.
        let _ = self.events.send(StageEvent::CancelRequested);
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// One end-to-end pipeline execution.
///
/// Owns the video source and configuration. The source is opened on the producer stage at the
/// configured sample rate and scale. Channels, the worker pool and the reorder buffer are created
/// by [`run`](Self::run).
pub struct Job<S> {
    id: Uuid,
    source: S,
    config: JobConfig,
    shared: Arc<Shared>,
    events_tx: Sender<StageEvent>,
    events_rx: Receiver<StageEvent>,
}

impl<S: VideoSource> Job<S> {
    /// Create a job with a fresh id. The configuration is validated here.
    pub fn new(source: S, config: JobConfig) -> JobResult<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel();
        Ok(Self {
            id: Uuid::new_v4(),
            source,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Running),
                cancel_requested: CancellationToken::new(),
            }),
            events_tx,
            events_rx,
        })
    }

    /// Job identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration in use.
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Handle for observing and cancelling the job from other threads.
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            shared: Arc::clone(&self.shared),
            events: self.events_tx.clone(),
        }
    }

    /// Stream every frame through `transform`, then encode the ordered result.
    ///
    /// Returns exactly one error on failure; `encoder` is only invoked when every frame made it
    /// through. A failure, cancellation or deadline returns as soon as the stages are told to
    /// stop. Stages still blocked inside the decoder or the transform finish on their own and
    /// their results are dropped.
    pub fn run(
        self,
        transform: Arc<dyn FrameTransform>,
        encoder: &mut dyn FrameEncoder,
    ) -> JobResult<JobOutput> {
        let span = tracing::info_span!("job", id = %self.id);
        let _enter = span.enter();
        let started = Instant::now();

        let res = self.run_inner(transform, encoder, started, &span);
        match &res {
            Ok(out) => tracing::info!(
                frames = out.stats.frames_encoded,
                bytes = out.bytes.len(),
                elapsed_ms = out.stats.elapsed.as_millis() as u64,
                "job completed"
            ),
            Err(e) => tracing::warn!(error = %e, "job failed"),
        }
        res
    }

    fn run_inner(
        self,
        transform: Arc<dyn FrameTransform>,
        encoder: &mut dyn FrameEncoder,
        started: Instant,
        span: &tracing::Span,
    ) -> JobResult<JobOutput> {
        let Self {
            id,
            source,
            config,
            shared,
            events_tx,
            events_rx,
        } = self;

        if shared.cancel_requested.is_cancelled() {
            shared.set_state(PipelineState::Failed);
            return Err(JobError::Cancelled);
        }
        let pool = match TransformPool::new(config.pool_size) {
            Ok(pool) => pool,
            Err(e) => {
                shared.set_state(PipelineState::Failed);
                return Err(e);
            }
        };
        let workers = pool.workers();
        let deadline = config.deadline();
        let mut ctl = Controller {
            shared: Arc::clone(&shared),
            ingress: Arc::new(BoundedChannel::new(config.channel_capacity)),
            egress: Arc::new(BoundedChannel::new(workers * 2)),
            window: Arc::new(ReorderWindow::new(workers)),
            cancel: CancellationToken::new(),
            failure: None,
            swept: false,
        };
        tracing::debug!(
            workers,
            capacity = ctl.ingress.capacity(),
            window = ctl.window.size(),
            deadline_ms = ?config.deadline_ms,
            "starting stages"
        );

        let (sample_rate, scale) = (config.sample_rate, config.scale);
        let (ingress, cancel) = (Arc::clone(&ctl.ingress), ctl.cancel.clone());
        let producer = spawn_stage(Stage::Source, &events_tx, span, move || {
            let res = FrameSource::open(source, sample_rate, scale)
                .map_err(JobError::from)
                .and_then(|frames| frames.feed(&ingress, &cancel));
            StageEvent::Produced(res)
        });

        let (ingress, egress) = (Arc::clone(&ctl.ingress), Arc::clone(&ctl.egress));
        let (window, cancel) = (Arc::clone(&ctl.window), ctl.cancel.clone());
        let coordinator = spawn_stage(Stage::Transform, &events_tx, span, move || {
            let res = pool.run(&ingress, &egress, &window, transform.as_ref(), &cancel);
            StageEvent::Transformed(res)
        });

        let (egress, window) = (Arc::clone(&ctl.egress), Arc::clone(&ctl.window));
        let sequencer = spawn_stage(Stage::Sequence, &events_tx, span, move || {
            StageEvent::Sequenced(Sequencer::new(&egress, &window).run())
        });
        drop(events_tx);

        let stages = [producer, coordinator, sequencer]
            .into_iter()
            .collect::<JobResult<Vec<_>>>();
        let stages = match stages {
            Ok(stages) => stages,
            Err(e) => {
                ctl.sweep(e);
                return Err(ctl.into_failure());
            }
        };

        let (frames_decoded, sequenced) = ctl.supervise(&events_rx, started, deadline);
        if ctl.failure.is_some() {
            return Err(ctl.into_failure());
        }
        for (stage, handle) in stages {
            if handle.join().is_err() {
                ctl.sweep(JobError::internal(stage, "stage panicked"));
            }
        }
        if ctl.failure.is_some() {
            return Err(ctl.into_failure());
        }
        let (Some(frames_decoded), Some(sequenced)) = (frames_decoded, sequenced) else {
            shared.set_state(PipelineState::Failed);
            return Err(JobError::internal(
                Stage::Controller,
                "stages finished without reporting a result",
            ));
        };

        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                shared.set_state(PipelineState::Failed);
                return Err(JobError::Timeout { deadline: limit });
            }
        }

        let Sequenced {
            frames,
            peak_buffered,
        } = sequenced;
        let frames_encoded = frames.len() as u64;
        tracing::debug!(frames = frames_encoded, "encoding");
        let bytes = match encoder.encode(frames, &config.timing) {
            Ok(bytes) => bytes,
            Err(e) => {
                shared.set_state(PipelineState::Failed);
                return Err(JobError::Encode(e));
            }
        };

        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                shared.set_state(PipelineState::Failed);
                return Err(JobError::Timeout { deadline: limit });
            }
        }
        if shared.cancel_requested.is_cancelled() {
            shared.set_state(PipelineState::Failed);
            return Err(JobError::Cancelled);
        }

        shared.set_state(PipelineState::Completed);
        Ok(JobOutput {
            id,
            bytes,
            stats: JobStats {
                frames_decoded,
                frames_encoded,
                peak_ingress_depth: ctl.ingress.high_water(),
                peak_reorder_depth: peak_buffered,
                workers,
                elapsed: started.elapsed(),
            },
        })
    }
}

/// Run one job to completion with a fresh [`Job`].
pub fn run_job<S: VideoSource>(
    source: S,
    transform: Arc<dyn FrameTransform>,
    encoder: &mut dyn FrameEncoder,
    config: JobConfig,
) -> JobResult<Vec<u8>> {
    Ok(Job::new(source, config)?.run(transform, encoder)?.bytes)
}

/// Start `body` on a named thread that reports its result, or a panic, as a stage event.
fn spawn_stage<F>(
    stage: Stage,
    events: &Sender<StageEvent>,
    span: &tracing::Span,
    body: F,
) -> JobResult<(Stage, JoinHandle<()>)>
where
    F: FnOnce() -> StageEvent + Send + 'static,
{
    let tx = events.clone();
    let span = span.clone();
    std::thread::Builder::new()
        .name(format!("cutout-{stage}"))
        .spawn(move || {
            let _enter = span.enter();
            let guard = StageGuard::new(stage, tx);
            let event = body();
            guard.finish(event);
        })
        .map(|handle| (stage, handle))
        .map_err(|e| JobError::internal(stage, format!("failed to spawn stage thread: {e}")))
}

/// Tells the controller a stage died if its thread unwinds before reporting.
struct StageGuard {
    stage: Stage,
    tx: Sender<StageEvent>,
    reported: bool,
}

impl StageGuard {
    fn new(stage: Stage, tx: Sender<StageEvent>) -> Self {
        tracing::debug!(%stage, "stage started");
        Self {
            stage,
            tx,
            reported: false,
        }
    }

    fn finish(mut self, event: StageEvent) {
        self.reported = true;
        tracing::debug!(stage = %self.stage, "stage finished");
        // The controller may have returned already; a late result is discarded.
        let _ = self.tx.send(event);
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        if !self.reported {
            let _ = self.tx.send(StageEvent::Panicked(self.stage));
        }
    }
}

struct Controller {
    shared: Arc<Shared>,
    ingress: Arc<BoundedChannel<Frame>>,
    egress: Arc<BoundedChannel<Transformed>>,
    window: Arc<ReorderWindow>,
    cancel: CancellationToken,
    failure: Option<JobError>,
    swept: bool,
}

impl Controller {
    /// Wait for all three stages to report success, or for the first failure, cancellation or
    /// deadline. Stops waiting once a root cause is recorded.
    fn supervise(
        &mut self,
        events: &Receiver<StageEvent>,
        started: Instant,
        deadline: Option<Duration>,
    ) -> (Option<u64>, Option<Sequenced>) {
        let mut outstanding = 3usize;
        let mut frames_decoded = None;
        let mut sequenced = None;

        while outstanding > 0 {
            if self.failure.as_ref().is_some_and(|e| !e.is_symptom()) {
                break;
            }
            let wait = if self.swept { None } else { deadline };
            let event = match wait {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    match events.recv_timeout(remaining) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            self.sweep(JobError::Timeout { deadline: limit });
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match events.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            match event {
                StageEvent::Produced(res) => {
                    outstanding -= 1;
                    match res {
                        Ok(n) => {
                            frames_decoded = Some(n);
                            self.shared.set_state(PipelineState::Draining);
                        }
                        Err(e) => self.sweep(e),
                    }
                }
                StageEvent::Transformed(res) => {
                    outstanding -= 1;
                    if let Err(e) = res {
                        self.sweep(e);
                    }
                }
                StageEvent::Sequenced(res) => {
                    outstanding -= 1;
                    match res {
                        Ok(seq) => sequenced = Some(seq),
                        Err(e) => self.sweep(e),
                    }
                }
                StageEvent::Panicked(stage) => {
                    outstanding -= 1;
                    self.sweep(JobError::internal(stage, "stage panicked"));
                }
                StageEvent::CancelRequested => self.sweep(JobError::Cancelled),
            }
        }
        (frames_decoded, sequenced)
    }

    /// Record `cause` and, the first time, tear every stage down.
    fn sweep(&mut self, cause: JobError) {
        keep_root_cause(&mut self.failure, cause);
        if self.swept {
            return;
        }
        self.swept = true;
        if let Some(e) = &self.failure {
            tracing::warn!(stage = %e.stage(), error = %e, "cancelling pipeline");
        }
        self.cancel.cancel();
        self.ingress.close();
        self.egress.close();
        self.window.close();
        self.shared.set_state(PipelineState::Failed);
    }

    fn into_failure(mut self) -> JobError {
        self.shared.set_state(PipelineState::Failed);
        self.failure.take().unwrap_or_else(|| {
            JobError::internal(Stage::Controller, "pipeline stopped without a cause")
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/controller.rs"]
mod tests;
