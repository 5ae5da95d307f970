use std::collections::BTreeMap;

use crate::foundation::core::{Frame, FrameIndex};
use crate::foundation::error::{JobError, JobResult, Stage};
use crate::pipeline::channel::{BoundedChannel, Recv};
use crate::pipeline::pool::Transformed;
use crate::pipeline::window::ReorderWindow;

/// Rejected [`OrderedResult::insert`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    /// The index was already released downstream.
    #[error("frame {0} arrived after it was already released")]
    Stale(FrameIndex),
    /// The index is already waiting in the buffer.
    #[error("frame {0} delivered twice")]
    Duplicate(FrameIndex),
}

/// Reorder buffer: index-keyed map plus the next index expected downstream.
///
/// Items are released strictly in increasing index order, starting at 0. An item is released
/// only once every smaller index has been released.
#[derive(Debug)]
pub struct OrderedResult<T> {
    pending: BTreeMap<FrameIndex, T>,
    next: FrameIndex,
    peak: usize,
}

impl<T> Default for OrderedResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedResult<T> {
    /// Empty buffer expecting index 0 first.
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next: FrameIndex(0),
            peak: 0,
        }
    }

    /// Index that must arrive before anything else can be released.
    pub fn next_expected(&self) -> FrameIndex {
        self.next
    }

    /// Number of items waiting for a smaller index.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Largest number of items that were ever waiting for a smaller index at once.
    pub fn peak_buffered(&self) -> usize {
        self.peak
    }

    /// Accept an item that completed out of order.
    pub fn insert(&mut self, index: FrameIndex, item: T) -> Result<(), SequenceError> {
        if index < self.next {
            return Err(SequenceError::Stale(index));
        }
        if self.pending.contains_key(&index) {
            return Err(SequenceError::Duplicate(index));
        }
        self.pending.insert(index, item);
        // The next-expected item never waits, so it does not count towards the peak.
        if index != self.next {
            self.peak = self.peak.max(self.pending.len());
        }
        Ok(())
    }

    /// Release the next-expected item if it is present.
    pub fn pop_ready(&mut self) -> Option<(FrameIndex, T)> {
        let item = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next = self.next.next();
        Some((index, item))
    }
}

/// Output of a successful sequencer run.
#[derive(Debug)]
pub(crate) struct Sequenced {
    pub(crate) frames: Vec<Frame>,
    pub(crate) peak_buffered: usize,
}

/// Fan-in stage: restores decode order and appends frames to the output accumulator.
pub(crate) struct Sequencer<'a> {
    egress: &'a BoundedChannel<Transformed>,
    window: &'a ReorderWindow,
}

impl<'a> Sequencer<'a> {
    pub(crate) fn new(egress: &'a BoundedChannel<Transformed>, window: &'a ReorderWindow) -> Self {
        Self { egress, window }
    }

    pub(crate) fn run(self) -> JobResult<Sequenced> {
        let mut order = OrderedResult::<Frame>::new();
        let mut frames = Vec::new();

        loop {
            let item = self
                .egress
                .take()
                .map_err(|_| JobError::closed(Stage::Sequence))?;
            let frame = match item {
                Recv::Item(Ok(frame)) => frame,
                // Buffered state is dropped with `order`.
                Recv::Item(Err(failure)) => return Err(failure.into()),
                Recv::EndOfStream => break,
            };

            order
                .insert(frame.index(), frame)
                .map_err(|e| JobError::internal(Stage::Sequence, e.to_string()))?;
            while let Some((index, frame)) = order.pop_ready() {
                tracing::trace!(%index, "frame released");
                frames.push(frame);
                self.window.release();
            }
        }

        if order.buffered() > 0 {
            return Err(JobError::internal(
                Stage::Sequence,
                format!(
                    "stream ended with {} frame(s) buffered while waiting for frame {}",
                    order.buffered(),
                    order.next_expected()
                ),
            ));
        }

        tracing::debug!(
            frames = frames.len(),
            peak_buffered = order.peak_buffered(),
            "sequencer drained"
        );
        Ok(Sequenced {
            frames,
            peak_buffered: order.peak_buffered(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/sequencer.rs"]
mod tests;
