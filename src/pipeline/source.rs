use image::RgbaImage;
use tokio_util::sync::CancellationToken;

use crate::foundation::core::{Fps, Frame, FrameIndex, Scale};
use crate::foundation::error::{DecodeError, JobError, JobResult, Stage};
use crate::pipeline::channel::BoundedChannel;

/// Decode capability: opens a source at the job's sample rate and output scale.
///
/// A [`Job`](crate::Job) calls [`open`](Self::open) on its source stage with
/// `JobConfig::sample_rate` and `JobConfig::scale`. Closures
/// `FnOnce(Fps, Scale) -> anyhow::Result<D>` implement it, which is handy for synthetic sources.
pub trait VideoSource: Send + 'static {
    /// Decoder produced by [`open`](Self::open).
    type Decoder: FrameDecoder;

    /// Start decoding, sampling `sample_rate` frames per second resized per `scale`.
    fn open(self, sample_rate: Fps, scale: Scale) -> anyhow::Result<Self::Decoder>;
}

impl<F, D> VideoSource for F
where
    F: FnOnce(Fps, Scale) -> anyhow::Result<D> + Send + 'static,
    D: FrameDecoder,
{
    type Decoder = D;

    fn open(self, sample_rate: Fps, scale: Scale) -> anyhow::Result<D> {
        self(sample_rate, scale)
    }
}

/// Decoder opened by a [`VideoSource`]: yields raw RGBA frames in source order.
///
/// `Ok(None)` means the source is exhausted. Errors are treated as a malformed or truncated
/// source and end the job.
pub trait FrameDecoder: Send {
    /// Decode the next frame.
    fn next_image(&mut self) -> anyhow::Result<Option<RgbaImage>>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn next_image(&mut self) -> anyhow::Result<Option<RgbaImage>> {
        (**self).next_image()
    }
}

/// Adapts any iterator of decoded images into a [`FrameDecoder`].
///
/// Handy for synthetic sources and tests.
pub struct IterDecoder<I> {
    iter: I,
}

impl<I> IterDecoder<I>
where
    I: Iterator<Item = anyhow::Result<RgbaImage>> + Send,
{
    /// Wrap `iter`.
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> FrameDecoder for IterDecoder<I>
where
    I: Iterator<Item = anyhow::Result<RgbaImage>> + Send,
{
    fn next_image(&mut self) -> anyhow::Result<Option<RgbaImage>> {
        self.iter.next().transpose()
    }
}

/// Lazy, finite, non-restartable sequence of indexed [`Frame`]s.
///
/// Indices start at 0 and increase by one per frame. Once the decoder reports end-of-stream or
/// an error, the source is fused and keeps returning `Ok(None)`.
pub struct FrameSource<D> {
    decoder: D,
    next: FrameIndex,
    done: bool,
}

impl<D: FrameDecoder> FrameSource<D> {
    /// Wrap an opened decoder.
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            next: FrameIndex(0),
            done: false,
        }
    }

    /// Open `source` at `sample_rate`/`scale` and wrap the resulting decoder.
    ///
    /// A failure to open counts as a decode failure with no frames read.
    pub fn open<S>(source: S, sample_rate: Fps, scale: Scale) -> Result<Self, DecodeError>
    where
        S: VideoSource<Decoder = D>,
    {
        let decoder = source
            .open(sample_rate, scale)
            .map_err(|source| DecodeError {
                frames_read: 0,
                source,
            })?;
        Ok(Self::new(decoder))
    }

    /// Frames produced so far.
    pub fn produced(&self) -> u64 {
        self.next.0
    }

    /// Pull the next frame, or `Ok(None)` at end-of-stream.
    pub fn pull(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.done {
            return Ok(None);
        }
        match self.decoder.next_image() {
            Ok(Some(image)) => {
                let frame = Frame::new(self.next, image);
                self.next = self.next.next();
                Ok(Some(frame))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(source) => {
                self.done = true;
                Err(DecodeError {
                    frames_read: self.next.0,
                    source,
                })
            }
        }
    }

    /// Producer loop: push every frame into `ingress`, then the end-of-stream marker.
    ///
    /// Blocks whenever `ingress` is full. Returns the number of frames produced.
    pub(crate) fn feed(
        mut self,
        ingress: &BoundedChannel<Frame>,
        cancel: &CancellationToken,
    ) -> JobResult<u64> {
        loop {
            if cancel.is_cancelled() {
                return Err(JobError::closed(Stage::Source));
            }
            match self.pull()? {
                Some(frame) => {
                    let index = frame.index();
                    ingress
                        .put(frame)
                        .map_err(|_| JobError::closed(Stage::Source))?;
                    tracing::trace!(%index, "frame queued");
                }
                None => {
                    ingress
                        .finish()
                        .map_err(|_| JobError::closed(Stage::Source))?;
                    tracing::debug!(frames = self.produced(), "source exhausted");
                    return Ok(self.produced());
                }
            }
        }
    }
}

impl<D: FrameDecoder> Iterator for FrameSource<D> {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pull().transpose()
    }
}

impl<D: FrameDecoder> std::iter::FusedIterator for FrameSource<D> {}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/source.rs"]
mod tests;
